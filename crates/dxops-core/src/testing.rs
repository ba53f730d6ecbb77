//! In-memory engines for worker and orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dx_engine::SourceOperation;

use crate::config::Target;
use crate::engine::{
    Connector, DatabaseUsage, EngineError, EngineResult, EngineSession, JobState,
};

pub fn target(name: &str, default: bool) -> Target {
    Target {
        hostname: name.to_string(),
        ip_address: format!("{name}.example"),
        port: None,
        username: "admin".to_string(),
        password: "secret".to_string(),
        use_https: false,
        default,
    }
}

/// Shared, ordered record of every call made against any fake engine,
/// formatted as `"<engine> <call> <arg>"`.
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub struct FakeEngine {
    refuse: Option<String>,
    sources: HashMap<String, String>,
    jobs: HashMap<String, Option<String>>,
    states: Mutex<HashMap<String, VecDeque<EngineResult<JobState>>>>,
    reject_invoke: Option<String>,
    databases: Vec<DatabaseUsage>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_connection(mut self, message: &str) -> Self {
        self.refuse = Some(message.to_string());
        self
    }

    pub fn reject_invoke(mut self, message: &str) -> Self {
        self.reject_invoke = Some(message.to_string());
        self
    }

    /// A VDB whose operation completes synchronously.
    pub fn sync_source(mut self, name: &str, reference: &str) -> Self {
        self.sources.insert(name.to_string(), reference.to_string());
        self.jobs.insert(reference.to_string(), None);
        self
    }

    /// A VDB whose operation starts `job`, which then reports `states` in
    /// order; the last state repeats forever.
    pub fn async_source(
        mut self,
        name: &str,
        reference: &str,
        job: &str,
        states: Vec<EngineResult<JobState>>,
    ) -> Self {
        self.sources.insert(name.to_string(), reference.to_string());
        self.jobs
            .insert(reference.to_string(), Some(job.to_string()));
        self.states
            .get_mut()
            .unwrap()
            .insert(job.to_string(), states.into());
        self
    }

    pub fn databases(mut self, databases: Vec<DatabaseUsage>) -> Self {
        self.databases = databases;
        self
    }
}

#[derive(Default)]
pub struct FakeConnector {
    engines: HashMap<String, Arc<FakeEngine>>,
    log: CallLog,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine(mut self, name: &str, engine: FakeEngine) -> Self {
        self.engines.insert(name.to_string(), Arc::new(engine));
        self
    }

    pub fn log(&self) -> CallLog {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, target: &Target) -> EngineResult<Box<dyn EngineSession>> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} connect", target.hostname));
        let engine = self
            .engines
            .get(&target.hostname)
            .ok_or_else(|| EngineError(format!("{} unreachable", target.hostname)))?;
        if let Some(message) = &engine.refuse {
            return Err(EngineError(message.clone()));
        }
        Ok(Box::new(FakeSession {
            name: target.hostname.clone(),
            engine: Arc::clone(engine),
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSession {
    name: String,
    engine: Arc<FakeEngine>,
    log: CallLog,
}

impl FakeSession {
    fn record(&self, call: &str, arg: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {call} {arg}", self.name));
    }
}

#[async_trait]
impl EngineSession for FakeSession {
    async fn find_source(&self, name: &str) -> EngineResult<Option<String>> {
        self.record("find", name);
        Ok(self.engine.sources.get(name).cloned())
    }

    async fn invoke(&self, op: SourceOperation, reference: &str) -> EngineResult<Option<String>> {
        self.record(op.as_str(), reference);
        if let Some(message) = &self.engine.reject_invoke {
            return Err(EngineError(message.clone()));
        }
        Ok(self.engine.jobs.get(reference).cloned().flatten())
    }

    async fn job_state(&self, job: &str) -> EngineResult<JobState> {
        self.record("poll", job);
        let mut states = self.engine.states.lock().unwrap();
        let queue = states
            .get_mut(job)
            .ok_or_else(|| EngineError(format!("no such job {job}")))?;
        match queue.len() {
            0 => Err(EngineError(format!("no state scripted for {job}"))),
            1 => queue[0].clone(),
            _ => queue
                .pop_front()
                .unwrap_or_else(|| Err(EngineError("exhausted".into()))),
        }
    }

    async fn list_databases(&self) -> EngineResult<Vec<DatabaseUsage>> {
        self.record("list", "consumers");
        Ok(self.engine.databases.clone())
    }
}
