//! Cluster lifecycle: create, readiness and delete
//!
//! A cluster revision is a job-manager Deployment behind a versioned Service
//! plus a task-manager Deployment, all named after the spec hash.

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use flinkop_client::JobManagerClient;
use flinkop_common::crd::FlinkApplication;
use flinkop_common::{hash_for_application, ControllerConfig, Result};

use crate::deployments::{
    group_deployments, is_deployment_set_ready, partition_deployment_sets, DeploymentComparator,
};
use crate::k8s::{K8sCluster, K8sObject};
use crate::resources::{
    build_job_manager_deployment, build_task_manager_deployment, build_versioned_service,
};

/// Creates the objects of one cluster component
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComponentDeployer: Send + Sync {
    /// Create the component for `hash` unless it exists.
    ///
    /// Returns `true` if at least one object was created.
    async fn create_if_not_exist(&self, app: &FlinkApplication, hash: &str) -> Result<bool>;
}

/// Job manager: versioned Service, then Deployment
pub struct JobManagerDeployer {
    k8s: Arc<dyn K8sCluster>,
    config: Arc<ControllerConfig>,
}

impl JobManagerDeployer {
    /// Create a deployer writing through `k8s`
    pub fn new(k8s: Arc<dyn K8sCluster>, config: Arc<ControllerConfig>) -> Self {
        Self { k8s, config }
    }
}

#[async_trait]
impl ComponentDeployer for JobManagerDeployer {
    async fn create_if_not_exist(&self, app: &FlinkApplication, hash: &str) -> Result<bool> {
        let service = build_versioned_service(app, hash, &self.config);
        let service_created = self
            .k8s
            .create_if_not_exist(K8sObject::Service(Box::new(service)))
            .await?;

        let deployment = build_job_manager_deployment(app, hash, &self.config);
        let deployment_created = self
            .k8s
            .create_if_not_exist(K8sObject::Deployment(Box::new(deployment)))
            .await?;

        Ok(service_created || deployment_created)
    }
}

/// Task manager: one Deployment
pub struct TaskManagerDeployer {
    k8s: Arc<dyn K8sCluster>,
    config: Arc<ControllerConfig>,
}

impl TaskManagerDeployer {
    /// Create a deployer writing through `k8s`
    pub fn new(k8s: Arc<dyn K8sCluster>, config: Arc<ControllerConfig>) -> Self {
        Self { k8s, config }
    }
}

#[async_trait]
impl ComponentDeployer for TaskManagerDeployer {
    async fn create_if_not_exist(&self, app: &FlinkApplication, hash: &str) -> Result<bool> {
        let deployment = build_task_manager_deployment(app, hash, &self.config);
        self.k8s
            .create_if_not_exist(K8sObject::Deployment(Box::new(deployment)))
            .await
    }
}

/// Creates, checks and deletes cluster revisions
pub struct ClusterController {
    k8s: Arc<dyn K8sCluster>,
    client: Arc<dyn JobManagerClient>,
    config: Arc<ControllerConfig>,
    deployments: DeploymentComparator,
    job_manager: Arc<dyn ComponentDeployer>,
    task_manager: Arc<dyn ComponentDeployer>,
}

impl ClusterController {
    /// Create a controller with the standard component deployers
    pub fn new(
        k8s: Arc<dyn K8sCluster>,
        client: Arc<dyn JobManagerClient>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        let job_manager = Arc::new(JobManagerDeployer::new(k8s.clone(), config.clone()));
        let task_manager = Arc::new(TaskManagerDeployer::new(k8s.clone(), config.clone()));
        Self::with_deployers(k8s, client, config, job_manager, task_manager)
    }

    /// Create a controller with custom component deployers
    pub fn with_deployers(
        k8s: Arc<dyn K8sCluster>,
        client: Arc<dyn JobManagerClient>,
        config: Arc<ControllerConfig>,
        job_manager: Arc<dyn ComponentDeployer>,
        task_manager: Arc<dyn ComponentDeployer>,
    ) -> Self {
        Self {
            deployments: DeploymentComparator::new(k8s.clone()),
            k8s,
            client,
            config,
            job_manager,
            task_manager,
        }
    }

    /// Create the cluster for the app's current spec.
    ///
    /// The job manager comes first; if it fails the task manager is not
    /// attempted. Existing objects are left as they are.
    pub async fn create_cluster(&self, app: &FlinkApplication) -> Result<()> {
        let hash = hash_for_application(app);
        let name = app.name_any();

        let jm_created = self.job_manager.create_if_not_exist(app, &hash).await?;
        let tm_created = self.task_manager.create_if_not_exist(app, &hash).await?;

        if jm_created || tm_created {
            info!(app = %name, hash = %hash, "created flink cluster");
        } else {
            debug!(app = %name, hash = %hash, "flink cluster already exists");
        }
        Ok(())
    }

    /// Whether the current cluster for the app's spec exists and every
    /// replica is available.
    ///
    /// A set whose task-manager replicas drifted from the spec is not
    /// current, so it is never ready.
    pub async fn is_cluster_ready(&self, app: &FlinkApplication) -> Result<bool> {
        let hash = hash_for_application(app);
        let deployments = self.deployments.get_deployments_with_hash(app, &hash).await?;
        let (current, _) = partition_deployment_sets(app, &hash, group_deployments(deployments));
        let ready = current.as_ref().map(is_deployment_set_ready).unwrap_or(false);
        debug!(app = %app.name_any(), hash = %hash, ready, "checked cluster readiness");
        Ok(ready)
    }

    /// Delete the cluster revision `hash`.
    ///
    /// Job-manager Deployment, task-manager Deployment and versioned Service
    /// are deleted in that order. Every deletion is attempted; the first
    /// failure is returned.
    pub async fn delete_cluster(&self, app: &FlinkApplication, hash: &str) -> Result<()> {
        let objects = [
            K8sObject::Deployment(Box::new(build_job_manager_deployment(
                app,
                hash,
                &self.config,
            ))),
            K8sObject::Deployment(Box::new(build_task_manager_deployment(
                app,
                hash,
                &self.config,
            ))),
            K8sObject::Service(Box::new(build_versioned_service(app, hash, &self.config))),
        ];

        let mut first_error = None;
        for object in objects {
            let kind = object.kind();
            let name = object.name();
            if let Err(e) = self.k8s.delete_object(object).await {
                warn!(app = %app.name_any(), kind, name = %name, error = %e, "failed to delete object");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(app = %app.name_any(), hash = %hash, "deleted flink cluster");
                Ok(())
            }
        }
    }

    /// Whether the job manager of revision `hash` answers on its REST API
    pub async fn is_service_ready(&self, app: &FlinkApplication, hash: &str) -> Result<bool> {
        let url = self.config.jobmanager_url(app, hash);
        self.client.get_cluster_overview(&url).await?;
        Ok(true)
    }
}
