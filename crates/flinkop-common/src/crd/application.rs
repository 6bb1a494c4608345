//! FlinkApplication CRD types
//!
//! A `FlinkApplication` declares one Flink job together with the session
//! cluster it runs on: image, runtime version, parallelism, per-component
//! resources and the jar entry point. Status carries the cluster and job
//! state observed on the last reconcile.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use flinkop_client::FlinkJobState;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Task slots per task manager when none are configured
pub const DEFAULT_TASK_SLOTS: i32 = 1;

/// Job-manager replicas when none are configured
pub const DEFAULT_JOB_MANAGER_REPLICAS: i32 = 1;

// =============================================================================
// Health
// =============================================================================

/// Derived health of a cluster or job
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum HealthStatus {
    /// Fully healthy
    Green,
    /// Degraded but serving
    Yellow,
    /// Unhealthy, or recovered too recently to trust
    Red,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Green => write!(f, "Green"),
            Self::Yellow => write!(f, "Yellow"),
            Self::Red => write!(f, "Red"),
        }
    }
}

// =============================================================================
// Job state
// =============================================================================

/// Job state as recorded in status
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum JobState {
    /// Submitted, not yet running
    Starting,
    /// Running normally
    Running,
    /// Failing or restarting after a failure
    Failing,
    /// Cancellation in progress
    Cancelling,
    /// Cancelled
    Cancelled,
    /// Finished successfully
    Finished,
    /// Failed terminally
    Failed,
    /// Not reported or not recognized
    #[default]
    Unknown,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Failing => write!(f, "Failing"),
            Self::Cancelling => write!(f, "Cancelling"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Finished => write!(f, "Finished"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<FlinkJobState> for JobState {
    fn from(state: FlinkJobState) -> Self {
        match state {
            FlinkJobState::Created | FlinkJobState::Initializing | FlinkJobState::Reconciling => {
                Self::Starting
            }
            FlinkJobState::Running => Self::Running,
            FlinkJobState::Failing | FlinkJobState::Restarting => Self::Failing,
            FlinkJobState::Cancelling => Self::Cancelling,
            FlinkJobState::Canceled => Self::Cancelled,
            FlinkJobState::Finished => Self::Finished,
            FlinkJobState::Failed => Self::Failed,
            FlinkJobState::Suspended | FlinkJobState::Unknown => Self::Unknown,
        }
    }
}

// =============================================================================
// Component config
// =============================================================================

/// CPU and memory for one component's container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// CPU quantity, e.g. `"500m"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory quantity, e.g. `"2Gi"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Job-manager settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobManagerConfig {
    /// Job-manager replicas (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Container resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSpec>,
    /// Extra environment variables
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Task-manager settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskManagerConfig {
    /// Task slots per task manager (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_slots: Option<i32>,
    /// Container resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSpec>,
    /// Extra environment variables
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Savepoint handoff between the cancel flow and the next submission
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SavepointInfo {
    /// Savepoint to restore from on the next submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savepoint_location: Option<String>,
    /// Trigger id of an in-flight savepoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
}

// =============================================================================
// CRD
// =============================================================================

/// A Flink job and the session cluster that runs it
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "flink.k8s.io",
    version = "v1alpha1",
    kind = "FlinkApplication",
    plural = "flinkapplications",
    shortname = "flinkapp",
    namespaced,
    status = "FlinkApplicationStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Hash","type":"string","jsonPath":".status.deployedHash"}"#,
    printcolumn = r#"{"name":"Job","type":"string","jsonPath":".status.jobStatus.state"}"#,
    printcolumn = r#"{"name":"Health","type":"string","jsonPath":".status.jobStatus.health"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FlinkApplicationSpec {
    /// Flink image for both components
    pub image: String,

    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Flink runtime version
    pub flink_version: String,

    /// Job parallelism
    pub parallelism: i32,

    /// Job-manager settings
    #[serde(default)]
    pub job_manager_config: JobManagerConfig,

    /// Task-manager settings
    #[serde(default)]
    pub task_manager_config: TaskManagerConfig,

    /// Extra `flink-conf.yaml` entries
    #[serde(default)]
    pub flink_config: BTreeMap<String, String>,

    /// Uploaded jar id to run
    pub jar_name: String,

    /// Main class, when the jar manifest does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_class: Option<String>,

    /// Arguments passed to the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_args: Option<String>,

    /// Savepoint handoff state
    #[serde(default)]
    pub savepoint_info: SavepointInfo,

    /// Changing this forces a full redeploy with no other edit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_nonce: Option<String>,
}

impl FlinkApplicationSpec {
    /// Task slots per task manager, defaulted and clamped to at least 1
    pub fn task_slots(&self) -> i32 {
        self.task_manager_config
            .task_slots
            .unwrap_or(DEFAULT_TASK_SLOTS)
            .max(1)
    }

    /// Job-manager replicas, defaulted
    pub fn job_manager_replicas(&self) -> i32 {
        self.job_manager_config
            .replicas
            .unwrap_or(DEFAULT_JOB_MANAGER_REPLICAS)
    }

    /// Task managers needed to provide `parallelism` slots (at least 1)
    pub fn task_manager_replicas(&self) -> i32 {
        let slots = self.task_slots();
        let parallelism = self.parallelism.max(1);
        ((parallelism + slots - 1) / slots).max(1)
    }

    /// Copy with defaults filled in, so that an unset field and its
    /// explicit default compare equal
    pub fn normalized(&self) -> Self {
        let mut spec = self.clone();
        spec.task_manager_config.task_slots = Some(self.task_slots());
        spec.job_manager_config.replicas = Some(self.job_manager_replicas());
        spec
    }
}

// =============================================================================
// Status
// =============================================================================

/// Observed cluster state
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Total task slots
    #[serde(default)]
    pub number_of_task_slots: i32,
    /// Free task slots
    #[serde(default)]
    pub available_task_slots: i32,
    /// Registered task managers
    #[serde(default)]
    pub number_of_task_managers: i32,
    /// Task managers with a recent heartbeat
    #[serde(default)]
    pub healthy_task_managers: i32,
    /// Derived health, unset until first computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
}

/// Observed job state
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Id of the submitted job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Last observed state
    #[serde(default)]
    pub state: JobState,
    /// When the job started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Acknowledgement time of the latest completed checkpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_time: Option<DateTime<Utc>>,
    /// When the job last restored from a checkpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_time: Option<DateTime<Utc>>,
    /// Checkpoint path the job last restored from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_path: Option<String>,
    /// Last time the job was observed failing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failing_time: Option<DateTime<Utc>>,
    /// Completed checkpoints
    #[serde(default)]
    pub completed_checkpoint_count: i32,
    /// Failed checkpoints
    #[serde(default)]
    pub failed_checkpoint_count: i32,
    /// Restores from checkpoint
    #[serde(default)]
    pub job_restart_count: i32,
    /// Derived health, unset until first computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
}

/// Status of a FlinkApplication
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FlinkApplicationStatus {
    /// Observed cluster state
    #[serde(default)]
    pub cluster_status: ClusterStatus,
    /// Observed job state
    #[serde(default)]
    pub job_status: JobStatus,
    /// Hash of the spec the running cluster was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_hash: Option<String>,
}

impl FlinkApplication {
    /// Namespace of the application, `default` when unset
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    /// Recorded job id, if any
    pub fn job_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.job_status.job_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(parallelism: i32, task_slots: Option<i32>) -> FlinkApplicationSpec {
        FlinkApplicationSpec {
            image: "flink:1.7".to_string(),
            flink_version: "1.7".to_string(),
            parallelism,
            task_manager_config: TaskManagerConfig {
                task_slots,
                ..Default::default()
            },
            jar_name: "wordcount.jar".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn task_manager_replicas_round_up() {
        assert_eq!(spec(8, Some(4)).task_manager_replicas(), 2);
        assert_eq!(spec(9, Some(4)).task_manager_replicas(), 3);
        assert_eq!(spec(5, None).task_manager_replicas(), 5);
        assert_eq!(spec(0, Some(4)).task_manager_replicas(), 1);
        assert_eq!(spec(3, Some(0)).task_manager_replicas(), 3);
    }

    #[test]
    fn normalized_fills_defaults() {
        let normalized = spec(2, None).normalized();
        assert_eq!(normalized.task_manager_config.task_slots, Some(1));
        assert_eq!(normalized.job_manager_config.replicas, Some(1));
        assert_eq!(normalized, spec(2, Some(1)).normalized());
    }

    #[test]
    fn spec_deserializes_from_camel_case_manifest() {
        let yaml = r#"
image: flink:1.7.2
flinkVersion: "1.7"
parallelism: 4
jarName: wordcount.jar
entryClass: org.example.WordCount
taskManagerConfig:
  taskSlots: 2
  resources:
    cpu: "1"
    memory: 2Gi
flinkConfig:
  state.backend: rocksdb
savepointInfo:
  savepointLocation: s3://bucket/savepoint-1
"#;
        let spec: FlinkApplicationSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.parallelism, 4);
        assert_eq!(spec.task_slots(), 2);
        assert_eq!(spec.entry_class.as_deref(), Some("org.example.WordCount"));
        assert_eq!(
            spec.savepoint_info.savepoint_location.as_deref(),
            Some("s3://bucket/savepoint-1")
        );
        assert_eq!(spec.flink_config["state.backend"], "rocksdb");
        assert!(spec.job_manager_config.environment.is_empty());
    }

    #[test]
    fn flink_states_map_to_recorded_states() {
        assert_eq!(JobState::from(FlinkJobState::Created), JobState::Starting);
        assert_eq!(JobState::from(FlinkJobState::Running), JobState::Running);
        assert_eq!(JobState::from(FlinkJobState::Restarting), JobState::Failing);
        assert_eq!(JobState::from(FlinkJobState::Canceled), JobState::Cancelled);
        assert_eq!(JobState::from(FlinkJobState::Finished), JobState::Finished);
        assert_eq!(JobState::from(FlinkJobState::Unknown), JobState::Unknown);
    }

    #[test]
    fn job_id_ignores_empty_values() {
        let mut app = FlinkApplication::new("wordcount", spec(1, None));
        assert_eq!(app.job_id(), None);

        app.status = Some(FlinkApplicationStatus {
            job_status: JobStatus {
                job_id: Some(String::new()),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(app.job_id(), None);

        app.status.as_mut().unwrap().job_status.job_id = Some("j1".to_string());
        assert_eq!(app.job_id(), Some("j1"));
    }

    #[test]
    fn status_omits_unset_health() {
        let json = serde_json::to_value(ClusterStatus::default()).unwrap();
        assert!(json.get("health").is_none());

        let status = ClusterStatus {
            health: Some(HealthStatus::Yellow),
            ..Default::default()
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["health"], "Yellow");
    }

    #[test]
    fn display_impls() {
        assert_eq!(HealthStatus::Red.to_string(), "Red");
        assert_eq!(JobState::Cancelled.to_string(), "Cancelled");
        assert_eq!(JobState::default().to_string(), "Unknown");
    }
}
