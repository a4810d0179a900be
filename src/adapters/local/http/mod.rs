//! HTTP inbound adapter.
//!
//! - `GET /flow/*locator` streams job snapshots as newline-delimited JSON
//! - `GET /blocks/:address` streams the chain's decompressed payloads in order
//! - `GET /jobs/:video_id` returns the persisted job
//! - `GET /artifacts` returns the engine artifact identities
//! - `GET /ws` speaks the flow protocol over a WebSocket

mod blocks;
mod flow;
mod ws;

use crate::application::FlowService;
use crate::error::FlowError;
use crate::ports::{ComputationEngine, DocumentStore, ObjectStore, VideoProber};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

pub fn router<D, O, E, P>(service: FlowService<D, O, E, P>) -> Router
where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    Router::new()
        .route("/flow/*locator", get(flow::handle::<D, O, E, P>))
        .route("/blocks/:address", get(blocks::chain::<D, O, E, P>))
        .route("/jobs/:video_id", get(blocks::job::<D, O, E, P>))
        .route("/artifacts", get(blocks::artifacts::<D, O, E, P>))
        .route("/ws", get(ws::upgrade::<D, O, E, P>))
        .with_state(service)
}

/// A pipeline error rendered as `{"error": ...}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub FlowError);

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            FlowError::InvalidLocator(_) => StatusCode::BAD_REQUEST,
            FlowError::ChainIntegrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FlowError::ResourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::adapters::memory::{MemoryDocumentStore, MemoryObjectStore};
    use crate::adapters::synthetic::SyntheticEngine;
    use crate::application::FlowService;
    use crate::config::{EngineProperties, FlowConfig};
    use crate::ports::probe::MockVideoProber;
    use serde_json::json;
    use std::sync::Arc;

    pub type TestService =
        FlowService<MemoryDocumentStore, MemoryObjectStore, SyntheticEngine, MockVideoProber>;

    pub fn service(frames: u64) -> TestService {
        let mut prober = MockVideoProber::new();
        prober.expect_probe_streams().returning(|_| {
            Ok(vec![json!({"codec_type": "video", "width": 320, "height": 240})])
        });
        let config = FlowConfig {
            engine: EngineProperties {
                number_of_pools: 1,
                ..Default::default()
            },
            ..FlowConfig::default()
        };
        FlowService::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryObjectStore::new()),
            Arc::new(SyntheticEngine::new(frames, 1)),
            Arc::new(prober),
            &config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        let status = |e| ApiError(e).status();
        assert_eq!(
            status(FlowError::InvalidLocator("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(FlowError::ChainIntegrity("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(FlowError::ConsistencyViolation("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
