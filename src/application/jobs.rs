use super::identity::{document, to_document, IdentityCache};
use crate::domain::Job;
use crate::error::FlowResult;
use crate::ports::documents::{Document, DocumentStore};
use serde_json::json;
use tracing::debug;

/// Persists job records through the identity cache.
pub struct JobRepository<D> {
    cache: IdentityCache<D>,
}

impl<D> Clone for JobRepository<D> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<D: DocumentStore> JobRepository<D> {
    pub fn new(cache: IdentityCache<D>) -> Self {
        Self { cache }
    }

    /// The job of `video_id`, created `queued` on first request.
    pub async fn load_or_create(&self, video_id: &str) -> FlowResult<Job> {
        self.cache
            .resolve_as(Job::KIND, predicate(video_id), || async {
                Ok(document(json!({
                    "status": "queued",
                    "blockNr": null,
                    "nbBlocks": null,
                    "lastBlockId": null,
                })))
            })
            .await
    }

    pub async fn find(&self, video_id: &str) -> FlowResult<Option<Job>> {
        match self.cache.find(Job::KIND, predicate(video_id)).await? {
            Some(found) => Ok(Some(serde_json::from_value(found.into())?)),
            None => Ok(None),
        }
    }

    /// Overwrite the stored record with `job`.
    pub async fn save(&self, job: &Job) -> FlowResult<()> {
        debug!(
            "Saving job {} ({}, block {:?}/{:?})",
            job.id, job.status, job.block_nr, job.nb_blocks
        );
        self.cache.store().put(to_document(job)?).await
    }
}

fn predicate(video_id: &str) -> Document {
    document(json!({
        "_id": Job::id_for(video_id),
        "videoId": video_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryDocumentStore;
    use crate::domain::{ContentAddress, JobStatus};
    use std::sync::Arc;

    fn repository() -> JobRepository<MemoryDocumentStore> {
        JobRepository::new(IdentityCache::new(Arc::new(MemoryDocumentStore::new())))
    }

    #[tokio::test]
    async fn test_new_job_is_queued() {
        let jobs = repository();
        let job = jobs.load_or_create("abc").await.unwrap();
        assert_eq!(job.id, "abc-job");
        assert_eq!(job.video_id, "abc");
        assert_eq!(job.kind, Job::KIND);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.created_at.is_some());
        assert!(job.last_block_id.is_none());
    }

    #[tokio::test]
    async fn test_saved_progress_survives_reload() {
        let jobs = repository();
        let mut job = jobs.load_or_create("abc").await.unwrap();
        let head = ContentAddress::of(b"head");
        job.commit_block(1, 2, head).unwrap();
        jobs.save(&job).await.unwrap();

        let reloaded = jobs.load_or_create("abc").await.unwrap();
        assert_eq!(reloaded, job);
        assert_eq!(reloaded.status, JobStatus::Running);
        assert_eq!(reloaded.last_block_id, Some(head));
        assert_eq!(jobs.find("abc").await.unwrap(), Some(job));
        assert!(jobs.find("other").await.unwrap().is_none());
    }
}
