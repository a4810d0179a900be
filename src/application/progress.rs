use crate::domain::Job;
use tokio::sync::broadcast;

/// Fan-out of job snapshots to any number of observers.
#[derive(Debug, Clone)]
pub struct JobHub {
    sender: broadcast::Sender<Job>,
}

impl JobHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a snapshot; returns how many observers received it.
    pub fn publish(&self, job: Job) -> usize {
        // No subscribers is not an error.
        self.sender.send(job).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Job> {
        self.sender.subscribe()
    }
}

impl Default for JobHub {
    fn default() -> Self {
        // Capacity of 100 snapshots covers a few concurrent jobs
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;

    fn job(status: JobStatus) -> Job {
        Job {
            id: Job::id_for("v"),
            kind: Job::KIND.to_string(),
            db_version: String::new(),
            created_at: None,
            video_id: "v".to_string(),
            status,
            block_nr: None,
            nb_blocks: None,
            last_block_id: None,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let hub = JobHub::default();
        assert_eq!(hub.publish(job(JobStatus::Queued)), 0);

        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.publish(job(JobStatus::Running)), 2);

        assert_eq!(a.recv().await.unwrap().status, JobStatus::Running);
        assert_eq!(b.recv().await.unwrap().status, JobStatus::Running);
    }
}
