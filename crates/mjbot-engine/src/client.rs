use anyhow::Result;
use indexmap::IndexMap;
use mjbot_contracts::tasks::{NewTaskRecord, TaskOption};
use serde::{Deserialize, Serialize};

/// What the remote side returns for a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    pub hash: String,
    pub flags: i64,
    pub proxy_url: String,
    #[serde(default)]
    pub options: Vec<TaskOption>,
}

impl JobDescriptor {
    pub fn to_record(&self, owner_id: &str, prompt: &str) -> NewTaskRecord {
        NewTaskRecord {
            owner_id: owner_id.to_string(),
            remote_job_id: self.id.clone(),
            content_hash: self.hash.clone(),
            flags: self.flags,
            prompt: prompt.to_string(),
            options: self.options.clone(),
        }
    }
}

/// Press one button on an existing job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub job_id: String,
    pub custom: String,
    pub flags: i64,
}

/// Account fields in display order, keyed by the remote field name.
pub type AccountInfo = IndexMap<String, String>;

/// The Midjourney automation client as seen by the bot.
///
/// One instance is shared by every command handler, so implementations must be
/// safe to call from several threads at once. Any error is treated alike by
/// the caller; there is no distinction between transient and permanent
/// failures.
pub trait MidjourneyClient: Send + Sync {
    fn name(&self) -> &str;
    fn imagine(&self, prompt: &str) -> Result<JobDescriptor>;
    fn blend(&self, urls: &[String]) -> Result<JobDescriptor>;
    fn face_swap(&self, target_url: &str, source_url: &str) -> Result<JobDescriptor>;
    fn describe(&self, url: &str) -> Result<Vec<String>>;
    fn shorten(&self, prompt: &str) -> Result<Vec<String>>;
    fn info(&self) -> Result<AccountInfo>;
    fn invoke_action(&self, request: &ActionRequest) -> Result<JobDescriptor>;
    /// Releases the underlying connection. Later calls fail.
    fn close(&self) -> Result<()>;
}
