//! Reconciliation core for Flink applications on Kubernetes
//!
//! Detects drift between a `FlinkApplication` and its live Deployments,
//! creates and deletes cluster revisions, drives jobs through the
//! job-manager REST API and derives status and health.
//!
//! The outer reconcile loop and status persistence live outside this crate.

#![deny(missing_docs)]

pub mod cluster;
pub mod controller;
pub mod deployments;
pub mod job;
pub mod k8s;
pub mod resources;
pub mod status;

#[cfg(test)]
mod testing;

pub use cluster::{ClusterController, ComponentDeployer, JobManagerDeployer, TaskManagerDeployer};
pub use controller::FlinkController;
pub use deployments::{DeploymentComparator, DeploymentSet};
pub use job::{get_active_job, JobController};
pub use k8s::{K8sCluster, K8sObject, KubeCluster};
pub use status::StatusReconciler;
