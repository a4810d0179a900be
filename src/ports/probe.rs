use crate::error::FlowResult;
use async_trait::async_trait;
use serde_json::Value;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoProber: Send + Sync {
    /// Stream descriptions of a local path or URL, as ffprobe reports them
    async fn probe_streams(&self, file_path: &str) -> FlowResult<Vec<Value>>;
}
