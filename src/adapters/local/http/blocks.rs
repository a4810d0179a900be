//! Read-side routes: chain payloads, job records and artifact identities.

use super::ApiError;
use crate::application::{ArtifactIds, FlowService};
use crate::domain::{ContentAddress, Job};
use crate::error::FlowError;
use crate::ports::{ComputationEngine, DocumentStore, ObjectStore, VideoProber};
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde_json::json;
use tracing::warn;

/// Decompressed block payloads from first to last, concatenated.
///
/// Integrity failures found after the first byte was sent abort the body.
pub async fn chain<D, O, E, P>(
    State(service): State<FlowService<D, O, E, P>>,
    Path(address): Path<String>,
) -> Result<Response, ApiError>
where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    let head: ContentAddress = address
        .parse()
        .map_err(|e: FlowError| FlowError::InvalidLocator(e.to_string()))?;
    let blocks = service.read(head).await?;

    let payloads = blocks.into_stream().map(|block| {
        let block = block?;
        let data = block.node.payload()?;
        Ok::<_, FlowError>(Bytes::from(data))
    });
    let payloads = payloads.inspect(|item| {
        if let Err(e) = item {
            warn!("Chain read aborted: {}", e);
        }
    });

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(payloads),
    )
        .into_response())
}

pub async fn job<D, O, E, P>(
    State(service): State<FlowService<D, O, E, P>>,
    Path(video_id): Path<String>,
) -> Result<Response, ApiError>
where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    let job: Option<Job> = service.job(&video_id).await?;
    Ok(match job {
        Some(job) => Json(job).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("No job for video {}", video_id) })),
        )
            .into_response(),
    })
}

pub async fn artifacts<D, O, E, P>(
    State(service): State<FlowService<D, O, E, P>>,
) -> Result<Json<ArtifactIds>, ApiError>
where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    Ok(Json(service.artifact_ids().await?))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;
    use crate::adapters::synthetic::SyntheticEngine;
    use crate::domain::FrameRange;

    const LOCATOR: &str = "http/cdn.example.com/clip.mp4";

    #[tokio::test]
    async fn test_chain_streams_payloads_in_order() {
        let service = service(900);
        let job = service.request(LOCATOR).await.unwrap();
        let head = job.last_block_id.unwrap().to_string();

        let response = chain(State(service), Path(head)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let expected = SyntheticEngine::new(900, 1).expected(FrameRange::new(0, 900));
        assert_eq!(body.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_malformed_address_is_bad_request() {
        let err = chain(State(service(10)), Path("not-hex".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_head_is_an_integrity_error() {
        let head = ContentAddress::of(b"nothing here").to_string();
        let err = chain(State(service(10)), Path(head)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_job_lookup() {
        let service = service(100);
        let job = service.request(LOCATOR).await.unwrap();

        let found = super::job(State(service.clone()), Path(job.video_id.clone()))
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);

        let missing = super::job(State(service), Path("unknown".to_string()))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_artifacts_without_files() {
        let Json(ids) = artifacts(State(service(10))).await.unwrap();
        assert_eq!(ids, ArtifactIds::default());
    }
}
