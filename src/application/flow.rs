//! The request path: locator → video → job → chain.

use super::chain_builder::ChainBuilder;
use super::computation::ComputationAdapter;
use super::identity::{document, IdentityCache};
use super::jobs::JobRepository;
use super::progress::JobHub;
use super::reader::{ChainReader, ChainSequence};
use super::video::VideoResolver;
use crate::config::FlowConfig;
use crate::domain::{BlockLayout, ContentAddress, Job, SourceLocator, Video};
use crate::error::FlowResult;
use crate::ports::documents::DocumentStore;
use crate::ports::engine::ComputationEngine;
use crate::ports::objects::ObjectStore;
use crate::ports::probe::VideoProber;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Identities of the engine artifacts a result was computed with.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactIds {
    pub lib_id: Option<String>,
    pub model_id: Option<String>,
}

pub struct FlowService<D, O, E, P> {
    cache: IdentityCache<D>,
    videos: VideoResolver<D, P>,
    jobs: JobRepository<D>,
    adapter: ComputationAdapter<E>,
    builder: ChainBuilder<O, D>,
    reader: ChainReader<O>,
    hub: JobHub,
    gateway_url: String,
    lib_file: Option<PathBuf>,
    model_file: Option<PathBuf>,
}

impl<D, O, E, P> Clone for FlowService<D, O, E, P> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            videos: self.videos.clone(),
            jobs: self.jobs.clone(),
            adapter: self.adapter.clone(),
            builder: self.builder.clone(),
            reader: self.reader.clone(),
            hub: self.hub.clone(),
            gateway_url: self.gateway_url.clone(),
            lib_file: self.lib_file.clone(),
            model_file: self.model_file.clone(),
        }
    }
}

impl<D, O, E, P> FlowService<D, O, E, P>
where
    D: DocumentStore + 'static,
    O: ObjectStore + 'static,
    E: ComputationEngine + 'static,
    P: VideoProber + 'static,
{
    pub fn new(
        documents: Arc<D>,
        objects: Arc<O>,
        engine: Arc<E>,
        prober: Arc<P>,
        config: &FlowConfig,
    ) -> Self {
        let cache = IdentityCache::new(documents);
        let jobs = JobRepository::new(cache.clone());
        let hub = JobHub::default();
        Self {
            videos: VideoResolver::new(cache.clone(), prober),
            adapter: ComputationAdapter::new(engine, config.layout(), config.engine.clone()),
            builder: ChainBuilder::new(objects.clone(), jobs.clone(), hub.clone()),
            reader: ChainReader::with_max_blocks(objects, config.max_chain_blocks),
            cache,
            jobs,
            hub,
            gateway_url: config.gateway_url.clone(),
            lib_file: config.lib_file.clone(),
            model_file: config.model_file.clone(),
        }
    }

    pub fn hub(&self) -> &JobHub {
        &self.hub
    }

    pub fn layout(&self) -> BlockLayout {
        self.adapter.layout()
    }

    pub fn locate(&self, input: &str) -> FlowResult<SourceLocator> {
        SourceLocator::parse(input, &self.gateway_url)
    }

    /// Resolve the video behind `input` and load its job, publishing the
    /// job as the first snapshot.
    pub async fn prepare(&self, input: &str) -> FlowResult<(Video, Job)> {
        let locator = self.locate(input)?;
        let video = self.videos.resolve(&locator).await?;
        let job = self.jobs.load_or_create(&video.video_id).await?;
        self.hub.publish(job.clone());
        Ok((video, job))
    }

    /// Build the chain for `job` unless it is already done.
    ///
    /// Unfinished jobs are recomputed from the first block.
    pub async fn compute(&self, video: &Video, mut job: Job) -> FlowResult<Job> {
        if !job.needs_computation() {
            info!(
                "Job {} already done, head {:?}",
                job.id,
                job.last_block_id.map(|a| a.to_string())
            );
            return Ok(job);
        }

        info!("Starting job {} ({}) for {}", job.id, job.status, video.src_path);
        let blocks = self.adapter.start(&video.file_path).await?;
        self.builder.build(&mut job, blocks).await?;
        info!("Job {} is {}", job.id, job.status);
        Ok(job)
    }

    pub async fn request(&self, input: &str) -> FlowResult<Job> {
        let (video, job) = self.prepare(input).await?;
        self.compute(&video, job).await
    }

    pub async fn job(&self, video_id: &str) -> FlowResult<Option<Job>> {
        self.jobs.find(video_id).await
    }

    pub async fn read(&self, head: ContentAddress) -> FlowResult<ChainSequence> {
        self.reader.read(head).await
    }

    /// Content identities of the configured engine library and model.
    pub async fn artifact_ids(&self) -> FlowResult<ArtifactIds> {
        let mut ids = ArtifactIds::default();
        if let Some(lib) = &self.lib_file {
            ids.lib_id = Some(self.artifact_id("lib", lib).await?);
        }
        if let Some(model) = &self.model_file {
            ids.model_id = Some(self.artifact_id("model", model).await?);
        }
        Ok(ids)
    }

    async fn artifact_id(&self, kind: &str, path: &Path) -> FlowResult<String> {
        let id = ContentAddress::of(&tokio::fs::read(path).await?).to_string();
        let owned = path.to_path_buf();
        let entity = self
            .cache
            .resolve(kind, document(json!({ "_id": id })), move || async move {
                let path = owned.as_path();
                let modified = tokio::fs::metadata(path).await?.modified()?;
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(document(json!({
                    "mtime": chrono::DateTime::<chrono::Utc>::from(modified).to_rfc3339(),
                    "path": name,
                })))
            })
            .await?;
        info!(
            "Using {} {} ({})",
            kind,
            id,
            entity.get("path").and_then(|p| p.as_str()).unwrap_or("?")
        );
        Ok(id)
    }
}
