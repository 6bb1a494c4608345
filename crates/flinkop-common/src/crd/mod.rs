//! Custom Resource Definitions for flinkop

mod application;

pub use application::{
    ClusterStatus, FlinkApplication, FlinkApplicationSpec, FlinkApplicationStatus, HealthStatus,
    JobManagerConfig, JobState, JobStatus, ResourceSpec, SavepointInfo, TaskManagerConfig,
    DEFAULT_JOB_MANAGER_REPLICAS, DEFAULT_TASK_SLOTS,
};
