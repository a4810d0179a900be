use super::address::ContentAddress;
use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
}

impl JobStatus {
    /// Move to `next`, refusing any step backward.
    pub fn advance(self, next: JobStatus) -> FlowResult<JobStatus> {
        if next < self {
            return Err(FlowError::InvalidTransition(format!(
                "{} -> {}",
                self, next
            )));
        }
        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        self == JobStatus::Done
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
        };
        f.write_str(name)
    }
}

/// Durable progress record of one video's computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub db_version: String,
    #[serde(default)]
    pub created_at: Option<String>,
    pub video_id: String,
    pub status: JobStatus,
    pub block_nr: Option<u64>,
    pub nb_blocks: Option<u64>,
    pub last_block_id: Option<ContentAddress>,
}

impl Job {
    pub const KIND: &'static str = "job";

    pub fn id_for(video_id: &str) -> String {
        format!("{}-job", video_id)
    }

    pub fn needs_computation(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Record that block `block_nr` of `nb_blocks` now heads the chain at `address`.
    ///
    /// Block 1 starts a fresh chain (a re-run after restart); any other block
    /// must directly follow the last committed one.
    pub fn commit_block(
        &mut self,
        block_nr: u64,
        nb_blocks: u64,
        address: ContentAddress,
    ) -> FlowResult<()> {
        if self.status.is_terminal() {
            return Err(FlowError::InvalidTransition(format!(
                "job {} is already done",
                self.id
            )));
        }
        if block_nr == 0 || block_nr > nb_blocks {
            return Err(FlowError::InvalidTransition(format!(
                "block {} out of range 1..={}",
                block_nr, nb_blocks
            )));
        }
        if block_nr != 1 && self.block_nr != Some(block_nr - 1) {
            return Err(FlowError::InvalidTransition(format!(
                "block {} does not follow {:?}",
                block_nr, self.block_nr
            )));
        }

        let next = if block_nr == nb_blocks {
            JobStatus::Done
        } else {
            JobStatus::Running
        };
        self.status = self.status.advance(next)?;
        self.block_nr = Some(block_nr);
        self.nb_blocks = Some(nb_blocks);
        self.last_block_id = Some(address);
        Ok(())
    }
}
