//! Controller configuration
//!
//! Built once at startup and shared as `Arc<ControllerConfig>`. Nothing in
//! the controller reads process-wide state.

use std::time::Duration;

use kube::ResourceExt;

use crate::crd::FlinkApplication;
use crate::{Error, Result};

/// Default job-manager REST port
pub const DEFAULT_JOBMANAGER_PORT: u16 = 8081;

/// Default age after which a task-manager heartbeat counts as stale
pub const DEFAULT_HEARTBEAT_STALENESS: Duration = Duration::from_secs(120);

/// Default time a recovered job stays Red after its last failure
pub const DEFAULT_FAILING_WINDOW: Duration = Duration::from_secs(60);

/// Default field manager for Kubernetes writes
pub const DEFAULT_FIELD_MANAGER: &str = "flinkop";

/// Tunables for the reconciliation core
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Job-manager REST port, also exposed on the versioned Service
    pub jobmanager_port: u16,
    /// Heartbeats older than this mark a task manager unhealthy
    pub heartbeat_staleness: Duration,
    /// A running job observed failing within this window is Red
    pub failing_window: Duration,
    /// Field manager name for object creation
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            jobmanager_port: DEFAULT_JOBMANAGER_PORT,
            heartbeat_staleness: DEFAULT_HEARTBEAT_STALENESS,
            failing_window: DEFAULT_FAILING_WINDOW,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Reject values that would make every task manager stale or disable
    /// the job-manager endpoint
    pub fn validate(&self) -> Result<()> {
        if self.jobmanager_port == 0 {
            return Err(Error::config("jobmanager port must be non-zero"));
        }
        if self.heartbeat_staleness.is_zero() {
            return Err(Error::config("heartbeat staleness must be positive"));
        }
        if self.field_manager.is_empty() {
            return Err(Error::config("field manager must not be empty"));
        }
        Ok(())
    }

    /// Base URL of the job manager serving `hash` of `app`.
    ///
    /// Points at the versioned Service so a replacement cluster is never
    /// confused with the one it replaces.
    pub fn jobmanager_url(&self, app: &FlinkApplication, hash: &str) -> String {
        format!(
            "http://{}-{}.{}:{}",
            app.name_any(),
            hash,
            app.namespace_or_default(),
            self.jobmanager_port
        )
    }
}
