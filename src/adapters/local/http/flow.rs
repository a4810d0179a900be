//! `GET /flow/*locator`: start (or resume) a computation and follow it.
//!
//! The response is newline-delimited JSON: the job as loaded, then one
//! snapshot per committed block. A failed computation ends the stream with
//! an `{"error": ...}` line.

use super::ApiError;
use crate::application::FlowService;
use crate::domain::Job;
use crate::error::{FlowError, FlowResult};
use crate::ports::{ComputationEngine, DocumentStore, ObjectStore, VideoProber};
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

pub const NDJSON: &str = "application/x-ndjson";

/// Snapshots of one job: as loaded, then per committed block, ending with a
/// done job or the computation's error.
pub type Snapshots = BoxStream<'static, FlowResult<Job>>;

pub async fn handle<D, O, E, P>(
    State(service): State<FlowService<D, O, E, P>>,
    Path(locator): Path<String>,
) -> Result<Response, ApiError>
where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    let snapshots = follow(service, locator.trim_start_matches('/')).await?;
    let lines = snapshots.map(|snapshot| {
        Ok::<_, Infallible>(match snapshot {
            Ok(job) => json_line(&job),
            Err(e) => json_line(&json!({ "error": e.to_string() })),
        })
    });

    Ok((
        [(header::CONTENT_TYPE, NDJSON)],
        Body::from_stream(lines),
    )
        .into_response())
}

/// Prepare the job behind `locator` and, unless it is done, compute it in
/// the background while following its snapshots.
pub async fn follow<D, O, E, P>(
    service: FlowService<D, O, E, P>,
    locator: &str,
) -> FlowResult<Snapshots>
where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    let (video, job) = service.prepare(locator).await?;
    info!("Flow request for {} -> job {} ({})", locator, job.id, job.status);

    let first = stream::iter([Ok(job.clone())]);
    if !job.needs_computation() {
        return Ok(first.boxed());
    }

    let job_id = job.id.clone();
    let updates = service.hub().subscribe();
    let task = tokio::spawn(async move { service.compute(&video, job).await });
    let follower = Follower {
        job_id,
        updates,
        task: Some(task),
    };

    let rest = stream::unfold(follower, |mut follower| async move {
        follower.next().await.map(|snapshot| (snapshot, follower))
    });
    Ok(first.chain(rest).boxed())
}

fn json_line(value: &impl Serialize) -> Bytes {
    let mut line = serde_json::to_vec(value)
        .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string().into_bytes());
    line.push(b'\n');
    Bytes::from(line)
}

/// Follows one job's snapshots until it is done or its computation ends.
struct Follower {
    job_id: String,
    updates: Receiver<Job>,
    task: Option<JoinHandle<FlowResult<Job>>>,
}

enum Event {
    Update(Result<Job, RecvError>),
    Finished(Result<FlowResult<Job>, JoinError>),
}

impl Follower {
    async fn next(&mut self) -> Option<FlowResult<Job>> {
        loop {
            let task = self.task.as_mut()?;
            // Buffered snapshots go out before the task's outcome.
            let event = tokio::select! {
                biased;
                update = self.updates.recv() => Event::Update(update),
                result = task => Event::Finished(result),
            };

            match event {
                Event::Update(Ok(job)) if job.id == self.job_id => {
                    if job.status.is_terminal() {
                        self.task = None;
                    }
                    return Some(Ok(job));
                }
                Event::Update(Ok(_)) => continue,
                Event::Update(Err(RecvError::Lagged(skipped))) => {
                    warn!("Job {} follower skipped {} snapshots", self.job_id, skipped);
                    continue;
                }
                Event::Update(Err(RecvError::Closed)) => {
                    let task = self.task.take()?;
                    return Some(outcome(task.await));
                }
                Event::Finished(result) => {
                    self.task = None;
                    return Some(outcome(result));
                }
            }
        }
    }
}

fn outcome(result: Result<FlowResult<Job>, JoinError>) -> FlowResult<Job> {
    let result = result.map_err(FlowError::from).and_then(|r| r);
    if let Err(e) = &result {
        warn!("Flow computation failed: {}", e);
    }
    result
}
