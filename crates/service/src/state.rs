use std::sync::Arc;

use crate::backend::{Backend, MemoryBackend};
use crate::config::Config;
use crate::policy::{AccessPolicy, PolicyError};
use crate::stats::StatsRecorder;

/// Main service state - everything the HTTP surface and engines share.
#[derive(Clone)]
pub struct ServiceState {
    backend: Arc<dyn Backend>,
    policy: Arc<AccessPolicy>,
    stats: Arc<StatsRecorder>,
}

impl ServiceState {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Resolve the persist directory for the policy logs
        let persist_path = match config.persist_path {
            Some(ref path) => path.clone(),
            None => tempfile::tempdir()
                .map_err(StateSetupError::PersistDir)?
                .into_path(),
        };
        tracing::info!(path = %persist_path.display(), "loading access policy");

        // 2. Replay the policy logs
        let policy = AccessPolicy::load(&persist_path)?;

        // 3. Wire the storage backend. The standalone portal runs over the
        //    in-memory backend; deployments embed their own `Backend`.
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());

        Ok(Self {
            backend,
            policy: Arc::new(policy),
            stats: Arc::new(StatsRecorder::new()),
        })
    }

    /// Assemble state from pre-built parts. Used by deployments that bring
    /// their own backend, and by the test harness.
    pub fn from_parts(backend: Arc<dyn Backend>, policy: AccessPolicy) -> Self {
        Self {
            backend,
            policy: Arc::new(policy),
            stats: Arc::new(StatsRecorder::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    /// Owned handle for tasks that outlive the request future.
    pub fn stats_arc(&self) -> Arc<StatsRecorder> {
        self.stats.clone()
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to create the persist directory: {0}")]
    PersistDir(std::io::Error),
    #[error("failed to load the access policy: {0}")]
    Policy(#[from] PolicyError),
}
