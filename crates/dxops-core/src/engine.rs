//! Seams between the orchestration core and an engine.
//!
//! Workers only ever talk to an engine through [`Connector`] and
//! [`EngineSession`]. [`HttpConnector`] is the production implementation on
//! top of `dx-engine`; tests substitute in-memory fakes.

use async_trait::async_trait;
use dx_engine::{ConsumerRecord, DxClient, DxError, Endpoint, SourceOperation};
use serde::Serialize;
use thiserror::Error;

use crate::config::Target;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Last known state of a tracked job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Submitted but not yet polled.
    Unknown,
    Running,
    Suspended,
    Waiting,
    Canceled,
    Completed,
    Failed,
    /// A state string this tool does not know; treated as still running.
    Other(String),
}

impl JobState {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => JobState::Running,
            "SUSPENDED" => JobState::Suspended,
            "WAITING" => JobState::Waiting,
            "CANCELED" | "CANCELLED" => JobState::Canceled,
            "COMPLETED" => JobState::Completed,
            "FAILED" => JobState::Failed,
            "" | "UNKNOWN" => JobState::Unknown,
            _ => JobState::Other(s.trim().to_string()),
        }
    }

    /// CANCELED, COMPLETED and FAILED jobs are dropped from tracking.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Canceled | JobState::Completed | JobState::Failed
        )
    }

    /// Terminal without having completed.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Canceled | JobState::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Unknown => "UNKNOWN",
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
            JobState::Waiting => "WAITING",
            JobState::Canceled => "CANCELED",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Other(s) => s,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DatabaseUsage
// ---------------------------------------------------------------------------

/// One row of the `--list` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseUsage {
    pub name: String,
    pub parent: Option<String>,
    pub active_space_bytes: f64,
    pub sync_space_bytes: f64,
}

impl DatabaseUsage {
    /// Provisioning container; databases without a parent are dSources.
    pub fn container(&self) -> &str {
        self.parent.as_deref().unwrap_or("dSource")
    }

    pub fn active_gb(&self) -> f64 {
        self.active_space_bytes / BYTES_PER_GB
    }

    pub fn sync_gb(&self) -> f64 {
        self.sync_space_bytes / BYTES_PER_GB
    }
}

impl From<ConsumerRecord> for DatabaseUsage {
    fn from(c: ConsumerRecord) -> Self {
        Self {
            name: c.name,
            parent: c.parent.filter(|p| !p.is_empty()),
            active_space_bytes: c.breakdown.active_space,
            sync_space_bytes: c.breakdown.sync_space,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Failure reported by an engine call. Carries the engine's message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl From<DxError> for EngineError {
    fn from(e: DxError) -> Self {
        EngineError(e.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Opens sessions. One session per worker; sessions are never shared.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &Target) -> EngineResult<Box<dyn EngineSession>>;
}

#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Reference of the VDB called `name`, or `None` if the engine has none.
    async fn find_source(&self, name: &str) -> EngineResult<Option<String>>;

    /// Run `op` on the VDB. Returns the job handle for asynchronous
    /// operations, `None` when the engine completed it synchronously.
    async fn invoke(&self, op: SourceOperation, reference: &str) -> EngineResult<Option<String>>;

    async fn job_state(&self, job: &str) -> EngineResult<JobState>;

    async fn list_databases(&self) -> EngineResult<Vec<DatabaseUsage>>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Connects to real engines over the JSON management API.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

pub fn endpoint_for(target: &Target) -> Endpoint {
    Endpoint {
        address: target.ip_address.clone(),
        port: target.port,
        use_https: target.use_https,
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, target: &Target) -> EngineResult<Box<dyn EngineSession>> {
        let client = DxClient::login(&endpoint_for(target), &target.username, &target.password)
            .await?;
        Ok(Box::new(HttpSession { client }))
    }
}

struct HttpSession {
    client: DxClient,
}

#[async_trait]
impl EngineSession for HttpSession {
    async fn find_source(&self, name: &str) -> EngineResult<Option<String>> {
        Ok(self
            .client
            .find_source_by_name(name)
            .await?
            .map(|s| s.reference))
    }

    async fn invoke(&self, op: SourceOperation, reference: &str) -> EngineResult<Option<String>> {
        Ok(self.client.source_operation(reference, op).await?)
    }

    async fn job_state(&self, job: &str) -> EngineResult<JobState> {
        let record = self.client.job(job).await?;
        tracing::debug!(
            job = %record.reference,
            action = ?record.action_type,
            percent = ?record.percent_complete,
            "job record"
        );
        Ok(JobState::parse(&record.job_state))
    }

    async fn list_databases(&self) -> EngineResult<Vec<DatabaseUsage>> {
        let consumers = self.client.capacity_consumers().await?;
        Ok(consumers.into_iter().map(DatabaseUsage::from).collect())
    }
}
