use super::identity::{document, IdentityCache};
use crate::domain::video::{best_video_stream, locator_identity, stream_identity};
use crate::domain::{SourceLocator, Video};
use crate::error::{FlowError, FlowResult};
use crate::ports::documents::{Document, DocumentStore};
use crate::ports::probe::VideoProber;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Resolves a source locator to its stable video identity.
pub struct VideoResolver<D, P> {
    cache: IdentityCache<D>,
    prober: Arc<P>,
}

impl<D, P> Clone for VideoResolver<D, P> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            prober: self.prober.clone(),
        }
    }
}

impl<D: DocumentStore, P: VideoProber> VideoResolver<D, P> {
    pub fn new(cache: IdentityCache<D>, prober: Arc<P>) -> Self {
        Self { cache, prober }
    }

    /// Looked up by `srcPath`; probed only the first time a locator is seen.
    ///
    /// Each locator keeps its own record, so locators resolving to the same
    /// stream never overwrite one another.
    pub async fn resolve(&self, locator: &SourceLocator) -> FlowResult<Video> {
        let predicate = document(json!({ "srcPath": locator.src_path }));
        self.cache
            .resolve_as(Video::KIND, predicate, || self.probe(locator))
            .await
    }

    async fn probe(&self, locator: &SourceLocator) -> FlowResult<Document> {
        if locator.is_local() && !tokio::fs::try_exists(&locator.file_path).await? {
            return Err(FlowError::InvalidLocator(format!(
                "No such file: {}",
                locator.file_path
            )));
        }

        let streams = self.prober.probe_streams(&locator.file_path).await?;
        let stream = best_video_stream(&streams)
            .ok_or_else(|| FlowError::ComputationFailed("No video stream found".to_string()))?;
        let video_id = stream_identity(stream)?;
        info!("Probed {} -> video {}", locator.file_path, video_id);

        Ok(document(json!({
            "_id": locator_identity(&locator.src_path),
            "videoId": video_id,
            "filePath": locator.file_path,
            "stream": stream,
        })))
    }
}
