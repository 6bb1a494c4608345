//! Entry point tying the lifecycle components together
//!
//! The outer reconcile loop drives an application through one
//! [`FlinkController`]; it owns no state of its own beyond shared handles.

use std::sync::Arc;

use kube::Client;

use flinkop_client::{FlinkJob, JobManagerClient, SavepointStatus};
use flinkop_common::crd::FlinkApplication;
use flinkop_common::{ControllerConfig, Result};

use crate::cluster::ClusterController;
use crate::deployments::{DeploymentComparator, DeploymentSet};
use crate::job::{self, JobController};
use crate::k8s::{K8sCluster, KubeCluster};
use crate::status::StatusReconciler;

/// Reconciliation core for `FlinkApplication`s
pub struct FlinkController {
    deployments: DeploymentComparator,
    cluster: ClusterController,
    jobs: JobController,
    status: StatusReconciler,
}

impl FlinkController {
    /// Create a controller over a live cluster
    pub fn new(
        client: Client,
        job_manager: Arc<dyn JobManagerClient>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        let k8s = Arc::new(KubeCluster::new(client, config.field_manager.clone()));
        Self::from_parts(k8s, job_manager, config)
    }

    /// Create a controller from its collaborators
    pub fn from_parts(
        k8s: Arc<dyn K8sCluster>,
        job_manager: Arc<dyn JobManagerClient>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            deployments: DeploymentComparator::new(k8s.clone()),
            cluster: ClusterController::new(k8s, job_manager.clone(), config.clone()),
            jobs: JobController::new(job_manager.clone(), config.clone()),
            status: StatusReconciler::new(job_manager, config),
        }
    }

    // =========================================================================
    // Deployments
    // =========================================================================

    /// See [`DeploymentComparator::get_current_and_stale_deployments`]
    pub async fn get_current_and_stale_deployments(
        &self,
        app: &FlinkApplication,
    ) -> Result<(Option<DeploymentSet>, Vec<DeploymentSet>)> {
        self.deployments.get_current_and_stale_deployments(app).await
    }

    // =========================================================================
    // Cluster
    // =========================================================================

    /// See [`ClusterController::create_cluster`]
    pub async fn create_cluster(&self, app: &FlinkApplication) -> Result<()> {
        self.cluster.create_cluster(app).await
    }

    /// See [`ClusterController::is_cluster_ready`]
    pub async fn is_cluster_ready(&self, app: &FlinkApplication) -> Result<bool> {
        self.cluster.is_cluster_ready(app).await
    }

    /// See [`ClusterController::delete_cluster`]
    pub async fn delete_cluster(&self, app: &FlinkApplication, hash: &str) -> Result<()> {
        self.cluster.delete_cluster(app, hash).await
    }

    /// See [`ClusterController::is_service_ready`]
    pub async fn is_service_ready(&self, app: &FlinkApplication, hash: &str) -> Result<bool> {
        self.cluster.is_service_ready(app, hash).await
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Submit the job described by the app's spec to revision `hash`
    pub async fn start_flink_job(&self, app: &FlinkApplication, hash: &str) -> Result<String> {
        let spec = &app.spec;
        self.jobs
            .start_flink_job(
                app,
                hash,
                &spec.jar_name,
                spec.parallelism,
                spec.entry_class.as_deref(),
                spec.program_args.as_deref(),
            )
            .await
    }

    /// See [`job::get_active_job`]
    pub fn get_active_job(&self, jobs: &[FlinkJob]) -> Result<Option<FlinkJob>> {
        job::get_active_job(jobs)
    }

    /// See [`JobController::get_jobs_for_application`]
    pub async fn get_jobs_for_application(
        &self,
        app: &FlinkApplication,
        hash: &str,
    ) -> Result<Vec<FlinkJob>> {
        self.jobs.get_jobs_for_application(app, hash).await
    }

    /// See [`JobController::cancel_with_savepoint`]
    pub async fn cancel_with_savepoint(&self, app: &FlinkApplication, hash: &str) -> Result<String> {
        self.jobs.cancel_with_savepoint(app, hash).await
    }

    /// See [`JobController::force_cancel`]
    pub async fn force_cancel(&self, app: &FlinkApplication, hash: &str) -> Result<()> {
        self.jobs.force_cancel(app, hash).await
    }

    /// See [`JobController::get_savepoint_status`]
    pub async fn get_savepoint_status(
        &self,
        app: &FlinkApplication,
        hash: &str,
    ) -> Result<SavepointStatus> {
        self.jobs.get_savepoint_status(app, hash).await
    }

    /// See [`JobController::find_externalized_checkpoint`]
    pub async fn find_externalized_checkpoint(
        &self,
        app: &FlinkApplication,
        hash: &str,
    ) -> Result<Option<String>> {
        self.jobs.find_externalized_checkpoint(app, hash).await
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// See [`StatusReconciler::compare_and_update_cluster_status`]
    pub async fn compare_and_update_cluster_status(
        &self,
        app: &mut FlinkApplication,
        hash: &str,
    ) -> Result<bool> {
        self.status.compare_and_update_cluster_status(app, hash).await
    }

    /// See [`StatusReconciler::compare_and_update_job_status`]
    pub async fn compare_and_update_job_status(
        &self,
        app: &mut FlinkApplication,
        hash: &str,
    ) -> Result<bool> {
        self.status.compare_and_update_job_status(app, hash).await
    }

    /// See [`StatusReconciler::update_status`]
    pub async fn update_status(&self, app: &mut FlinkApplication, hash: &str) -> Result<bool> {
        self.status.update_status(app, hash).await
    }
}
