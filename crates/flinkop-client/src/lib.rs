//! REST client for the Flink job manager
//!
//! The controller talks to each application's job manager through the
//! [`JobManagerClient`] trait. [`RestJobManagerClient`] implements it over
//! HTTP; tests substitute a mock.

#![deny(missing_docs)]

pub mod client;
pub mod error;
pub mod types;

pub use client::{JobManagerClient, RestJobManagerClient};
pub use error::ClientError;
pub use types::{
    CheckpointCounts, CheckpointResponse, CheckpointStatistics, ClusterOverviewResponse,
    FlinkJob, FlinkJobOverview, FlinkJobState, GetJobsResponse, SavepointResponse,
    SavepointStatus, SubmitJobRequest, SubmitJobResponse, TaskManagerStats,
    TaskManagersResponse,
};
