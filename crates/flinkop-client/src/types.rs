//! Wire types for the Flink job-manager REST API
//!
//! Field names follow the job manager's JSON exactly, which mixes
//! camelCase, kebab-case and snake_case depending on the endpoint.

use serde::{Deserialize, Serialize};

// =============================================================================
// Job submission
// =============================================================================

/// Body of `POST /jars/{jarid}/run`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    /// Savepoint or externalized checkpoint to restore from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savepoint_path: Option<String>,
    /// Job parallelism
    pub parallelism: i32,
    /// Program arguments passed to the job's main method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_args: Option<String>,
    /// Fully qualified main class, if the jar manifest does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_class: Option<String>,
    /// Skip savepoint state that cannot be mapped to the new program
    #[serde(default)]
    pub allow_non_restored_state: bool,
}

/// Response of `POST /jars/{jarid}/run`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    /// Identifier of the submitted job; empty when the job manager
    /// accepted the request without creating a job
    #[serde(rename = "jobid", default)]
    pub job_id: String,
}

// =============================================================================
// Savepoints
// =============================================================================

/// Body of `POST /jobs/{jobid}/savepoints`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavepointRequest {
    /// Cancel the job once the savepoint completes
    #[serde(rename = "cancel-job")]
    pub cancel_job: bool,
    /// Override for `state.savepoints.dir`
    #[serde(
        rename = "target-directory",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_directory: Option<String>,
}

/// Response of `POST /jobs/{jobid}/savepoints`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavepointTriggerResponse {
    /// Trigger id used to poll the asynchronous operation
    #[serde(rename = "request-id")]
    pub trigger_id: String,
}

/// Progress of an asynchronous savepoint operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SavepointState {
    /// Operation still running
    #[default]
    InProgress,
    /// Operation finished, successfully or not
    Completed,
}

/// `status` member of a savepoint status response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavepointStatusResponse {
    /// Operation progress
    pub id: SavepointState,
}

/// Failure details of a savepoint that completed unsuccessfully
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureCause {
    /// Java exception class
    #[serde(default)]
    pub class: Option<String>,
    /// Stack trace as rendered by the job manager
    #[serde(rename = "stack-trace", default)]
    pub stack_trace: Option<String>,
}

/// `operation` member of a completed savepoint status response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavepointOperation {
    /// Location of the written savepoint
    #[serde(default)]
    pub location: Option<String>,
    /// Set when the savepoint failed
    #[serde(rename = "failure-cause", default)]
    pub failure_cause: Option<FailureCause>,
}

/// Response of `GET /jobs/{jobid}/savepoints/{triggerid}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavepointResponse {
    /// Operation progress
    pub status: SavepointStatusResponse,
    /// Result, present once the operation completed
    #[serde(default)]
    pub operation: Option<SavepointOperation>,
}

/// Savepoint outcome as seen by the controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SavepointStatus {
    /// The savepoint is still being written
    InProgress,
    /// The savepoint was written to `location`
    Completed {
        /// Savepoint path to restore from
        location: String,
    },
    /// The savepoint failed
    Failed {
        /// Failure description from the job manager
        cause: String,
    },
}

impl SavepointResponse {
    /// Collapse the raw response into an outcome.
    ///
    /// A completed operation without a location counts as failed: there is
    /// nothing to restore from.
    pub fn outcome(&self) -> SavepointStatus {
        if self.status.id == SavepointState::InProgress {
            return SavepointStatus::InProgress;
        }

        let operation = self.operation.clone().unwrap_or_default();
        match (operation.location, operation.failure_cause) {
            (Some(location), None) => SavepointStatus::Completed { location },
            (_, Some(cause)) => SavepointStatus::Failed {
                cause: cause
                    .stack_trace
                    .or(cause.class)
                    .unwrap_or_else(|| "unknown failure".to_string()),
            },
            (None, None) => SavepointStatus::Failed {
                cause: "savepoint completed without a location".to_string(),
            },
        }
    }
}

// =============================================================================
// Cluster
// =============================================================================

/// Response of `GET /overview`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterOverviewResponse {
    /// Registered task managers
    #[serde(rename = "taskmanagers", default)]
    pub task_manager_count: i32,
    /// Total task slots across all task managers
    #[serde(rename = "slots-total", default)]
    pub number_of_task_slots: i32,
    /// Free task slots
    #[serde(rename = "slots-available", default)]
    pub slots_available: i32,
    /// Jobs currently running
    #[serde(rename = "jobs-running", default)]
    pub jobs_running: i32,
    /// Version reported by the job manager
    #[serde(rename = "flink-version", default)]
    pub flink_version: Option<String>,
}

/// One entry of `GET /taskmanagers`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskManagerStats {
    /// Task manager resource id
    #[serde(default)]
    pub id: String,
    /// Epoch millis of the last heartbeat. Despite the name the job manager
    /// reports an absolute timestamp, not a duration.
    #[serde(default)]
    pub time_since_last_heartbeat: i64,
    /// Total slots on this task manager
    #[serde(default)]
    pub slots_number: i32,
    /// Free slots on this task manager
    #[serde(default)]
    pub free_slots: i32,
}

/// Response of `GET /taskmanagers`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskManagersResponse {
    /// Registered task managers
    #[serde(rename = "taskmanagers", default)]
    pub task_managers: Vec<TaskManagerStats>,
}

// =============================================================================
// Jobs
// =============================================================================

/// Job state as reported by the job manager
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlinkJobState {
    /// Job accepted, not yet scheduled
    Created,
    /// Job is initializing
    Initializing,
    /// Job is running
    Running,
    /// Job failed and is recovering
    Failing,
    /// Job failed terminally
    Failed,
    /// Job is being cancelled
    Cancelling,
    /// Job was cancelled
    Canceled,
    /// Job finished
    Finished,
    /// Job is restarting after a failure
    Restarting,
    /// Job was suspended
    Suspended,
    /// Job is being reconciled after a job-manager failover
    Reconciling,
    /// Any state this client does not know about
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for FlinkJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Initializing => "INITIALIZING",
            Self::Running => "RUNNING",
            Self::Failing => "FAILING",
            Self::Failed => "FAILED",
            Self::Cancelling => "CANCELLING",
            Self::Canceled => "CANCELED",
            Self::Finished => "FINISHED",
            Self::Restarting => "RESTARTING",
            Self::Suspended => "SUSPENDED",
            Self::Reconciling => "RECONCILING",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One entry of `GET /jobs`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlinkJob {
    /// Job id
    #[serde(rename = "id")]
    pub job_id: String,
    /// Current state
    #[serde(default)]
    pub status: FlinkJobState,
}

/// Response of `GET /jobs`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetJobsResponse {
    /// All jobs known to the job manager
    #[serde(default)]
    pub jobs: Vec<FlinkJob>,
}

/// Response of `GET /jobs/{jobid}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlinkJobOverview {
    /// Job id
    #[serde(rename = "jid")]
    pub job_id: String,
    /// Job name
    #[serde(default)]
    pub name: Option<String>,
    /// Current state
    #[serde(default)]
    pub state: FlinkJobState,
    /// Epoch millis when the job started
    #[serde(rename = "start-time", default)]
    pub start_time: i64,
    /// Epoch millis when the job ended, -1 while running
    #[serde(rename = "end-time", default)]
    pub end_time: i64,
}

// =============================================================================
// Checkpoints
// =============================================================================

/// Statistics for a single checkpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointStatistics {
    /// Checkpoint id
    #[serde(default)]
    pub id: i64,
    /// Checkpoint status (`COMPLETED`, `IN_PROGRESS`, `FAILED`)
    #[serde(default)]
    pub status: String,
    /// Whether this checkpoint is a savepoint
    #[serde(default)]
    pub is_savepoint: bool,
    /// Epoch millis when the checkpoint was triggered
    #[serde(default)]
    pub trigger_timestamp: i64,
    /// Epoch millis of the last acknowledgement
    #[serde(default)]
    pub latest_ack_timestamp: i64,
    /// Epoch millis when the job was restored from this checkpoint
    #[serde(default)]
    pub restore_timestamp: i64,
    /// Path of the externalized checkpoint, if retained
    #[serde(default)]
    pub external_path: Option<String>,
}

/// Checkpoint counters of `GET /jobs/{jobid}/checkpoints`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointCounts {
    /// Times the job was restored from a checkpoint
    #[serde(default)]
    pub restored: i32,
    /// Checkpoints triggered
    #[serde(default)]
    pub total: i32,
    /// Checkpoints in progress
    #[serde(default)]
    pub in_progress: i32,
    /// Checkpoints completed
    #[serde(default)]
    pub completed: i32,
    /// Checkpoints failed
    #[serde(default)]
    pub failed: i32,
}

/// Most recent checkpoints of each kind
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestCheckpoints {
    /// Latest completed checkpoint
    #[serde(default)]
    pub completed: Option<CheckpointStatistics>,
    /// Latest savepoint
    #[serde(default)]
    pub savepoint: Option<CheckpointStatistics>,
    /// Latest failed checkpoint
    #[serde(default)]
    pub failed: Option<CheckpointStatistics>,
    /// Checkpoint the job was last restored from
    #[serde(default)]
    pub restored: Option<CheckpointStatistics>,
}

/// Response of `GET /jobs/{jobid}/checkpoints`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointResponse {
    /// Checkpoint counters
    #[serde(default)]
    pub counts: CheckpointCounts,
    /// Most recent checkpoints
    #[serde(default)]
    pub latest: LatestCheckpoints,
}
