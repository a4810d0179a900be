use crate::application::JobHub;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Log every job snapshot published on `hub` until the hub goes away.
pub fn start(hub: &JobHub) -> JoinHandle<usize> {
    let mut rx = hub.subscribe();

    tokio::spawn(async move {
        let mut seen = 0;
        loop {
            match rx.recv().await {
                Ok(job) => {
                    seen += 1;
                    match (job.block_nr, job.nb_blocks) {
                        (Some(nr), Some(total)) => {
                            info!("Job {} {}: block {}/{}", job.id, job.status, nr, total)
                        }
                        _ => info!("Job {} {}", job.id, job.status),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Progress log skipped {} snapshots", skipped)
                }
                Err(RecvError::Closed) => return seen,
            }
        }
    })
}
