//! Common types for flinkop: CRDs, errors, hashing and configuration

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod hash;
pub mod telemetry;

pub use config::ControllerConfig;
pub use error::Error;
pub use hash::{deterministic_hash, hash_for_application};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label holding the owning application's name
pub const FLINK_APP_LABEL: &str = "flink-app";

/// Label holding the spec hash a resource was built from
pub const FLINK_APP_HASH_LABEL: &str = "flink-app-hash";

/// Label distinguishing job-manager from task-manager Deployments
pub const FLINK_DEPLOYMENT_TYPE_LABEL: &str = "flink-deployment-type";

/// `flink-deployment-type` value for job-manager Deployments
pub const JOBMANAGER_DEPLOYMENT_TYPE: &str = "jobmanager";

/// `flink-deployment-type` value for task-manager Deployments
pub const TASKMANAGER_DEPLOYMENT_TYPE: &str = "taskmanager";

/// Annotation carrying the job-level settings a cluster was built for
pub const FLINK_JOB_PROPERTIES_ANNOTATION: &str = "flink-job-properties";

/// Standard Kubernetes managed-by label key
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value written to the managed-by label
pub const MANAGED_BY_VALUE: &str = "flinkop";
