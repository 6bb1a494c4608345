//! Deployment comparison
//!
//! Groups the live Deployments of an application by spec hash and decides
//! which set, if any, matches the desired spec.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use tracing::debug;

use flinkop_common::crd::FlinkApplication;
use flinkop_common::{
    hash_for_application, Result, FLINK_APP_HASH_LABEL, FLINK_DEPLOYMENT_TYPE_LABEL,
    JOBMANAGER_DEPLOYMENT_TYPE, TASKMANAGER_DEPLOYMENT_TYPE,
};

use crate::k8s::K8sCluster;
use crate::resources::{app_hash_labels, app_labels};

/// The Deployments making up one revision of a cluster
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeploymentSet {
    /// Spec hash shared by the members
    pub hash: String,
    /// Job-manager Deployment
    pub jobmanager: Option<Deployment>,
    /// Task-manager Deployment
    pub taskmanager: Option<Deployment>,
}

impl DeploymentSet {
    /// Both members are present
    pub fn is_complete(&self) -> bool {
        self.jobmanager.is_some() && self.taskmanager.is_some()
    }

    /// Whether this set is what `app` wants running under `hash`
    pub fn is_current(&self, app: &FlinkApplication, hash: &str) -> bool {
        let Some(taskmanager) = &self.taskmanager else {
            return false;
        };
        self.is_complete()
            && self.hash == hash
            && desired_replicas(taskmanager) == app.spec.task_manager_replicas()
    }
}

/// Replicas requested by a Deployment (1 when unset)
pub fn desired_replicas(deployment: &Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1)
}

/// Every requested replica is available
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    available == desired_replicas(deployment)
}

/// The set is complete and every member is ready
pub fn is_deployment_set_ready(set: &DeploymentSet) -> bool {
    match (&set.jobmanager, &set.taskmanager) {
        (Some(jm), Some(tm)) => is_deployment_ready(jm) && is_deployment_ready(tm),
        _ => false,
    }
}

/// Group Deployments by hash label, sorted by hash.
///
/// Deployments missing the hash or type label are not ours to compare and
/// are skipped.
pub fn group_deployments(deployments: Vec<Deployment>) -> Vec<DeploymentSet> {
    let mut sets: BTreeMap<String, DeploymentSet> = BTreeMap::new();

    for deployment in deployments {
        let labels = deployment.labels();
        let (Some(hash), Some(kind)) = (
            labels.get(FLINK_APP_HASH_LABEL).cloned(),
            labels.get(FLINK_DEPLOYMENT_TYPE_LABEL).cloned(),
        ) else {
            debug!(name = %deployment.name_any(), "skipping deployment without flink labels");
            continue;
        };

        let set = sets.entry(hash.clone()).or_insert_with(|| DeploymentSet {
            hash,
            ..Default::default()
        });
        match kind.as_str() {
            JOBMANAGER_DEPLOYMENT_TYPE => set.jobmanager = Some(deployment),
            TASKMANAGER_DEPLOYMENT_TYPE => set.taskmanager = Some(deployment),
            other => {
                debug!(name = %deployment.name_any(), kind = %other, "skipping unknown deployment type")
            }
        }
    }

    sets.into_values().collect()
}

/// Split sets into the one matching `hash` (if current) and the rest
pub fn partition_deployment_sets(
    app: &FlinkApplication,
    hash: &str,
    sets: Vec<DeploymentSet>,
) -> (Option<DeploymentSet>, Vec<DeploymentSet>) {
    let mut current = None;
    let mut stale = Vec::new();
    for set in sets {
        if current.is_none() && set.is_current(app, hash) {
            current = Some(set);
        } else {
            stale.push(set);
        }
    }
    (current, stale)
}

/// Label queries over an application's live Deployments
#[derive(Clone)]
pub struct DeploymentComparator {
    k8s: Arc<dyn K8sCluster>,
}

impl DeploymentComparator {
    /// Create a comparator over the given cluster
    pub fn new(k8s: Arc<dyn K8sCluster>) -> Self {
        Self { k8s }
    }

    /// Every Deployment of `app`, any revision
    pub async fn get_deployments_for_app(&self, app: &FlinkApplication) -> Result<Vec<Deployment>> {
        self.k8s
            .list_deployments(&app.namespace_or_default(), &app_labels(app))
            .await
    }

    /// Deployments of `app` built from `hash`
    pub async fn get_deployments_with_hash(
        &self,
        app: &FlinkApplication,
        hash: &str,
    ) -> Result<Vec<Deployment>> {
        self.k8s
            .list_deployments(&app.namespace_or_default(), &app_hash_labels(app, hash))
            .await
    }

    /// The set matching the desired spec, if one is running, and every
    /// other set of the application
    pub async fn get_current_and_stale_deployments(
        &self,
        app: &FlinkApplication,
    ) -> Result<(Option<DeploymentSet>, Vec<DeploymentSet>)> {
        let hash = hash_for_application(app);
        let deployments = self.get_deployments_for_app(app).await?;
        let sets = group_deployments(deployments);
        let (current, stale) = partition_deployment_sets(app, &hash, sets);
        debug!(
            app = %app.name_any(),
            hash = %hash,
            current = current.is_some(),
            stale = stale.len(),
            "compared deployments"
        );
        Ok((current, stale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::MockK8sCluster;
    use crate::resources::{build_job_manager_deployment, build_task_manager_deployment};
    use crate::testing::api_error;
    use flinkop_common::crd::{FlinkApplicationSpec, TaskManagerConfig};
    use flinkop_common::{ControllerConfig, Error, FLINK_APP_LABEL};
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    fn app(parallelism: i32) -> FlinkApplication {
        let mut app = FlinkApplication::new(
            "app-name",
            FlinkApplicationSpec {
                image: "flink:1.7.2".to_string(),
                flink_version: "1.7".to_string(),
                parallelism,
                jar_name: "job.jar".to_string(),
                task_manager_config: TaskManagerConfig {
                    task_slots: Some(2),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        app.metadata.namespace = Some("flink".to_string());
        app
    }

    fn cluster_for(app: &FlinkApplication, hash: &str) -> Vec<Deployment> {
        let config = ControllerConfig::default();
        vec![
            build_job_manager_deployment(app, hash, &config),
            build_task_manager_deployment(app, hash, &config),
        ]
    }

    fn with_available(mut deployment: Deployment, available: i32) -> Deployment {
        deployment.status = Some(DeploymentStatus {
            available_replicas: Some(available),
            ..Default::default()
        });
        deployment
    }

    fn comparator_returning(deployments: Vec<Deployment>) -> DeploymentComparator {
        let mut k8s = MockK8sCluster::new();
        k8s.expect_list_deployments()
            .withf(|namespace, labels| {
                namespace == "flink" && labels.len() == 1 && labels[FLINK_APP_LABEL] == "app-name"
            })
            .returning(move |_, _| Ok(deployments.clone()));
        DeploymentComparator::new(Arc::new(k8s))
    }

    #[tokio::test]
    async fn current_set_is_found() {
        let app = app(4);
        let hash = hash_for_application(&app);
        let comparator = comparator_returning(cluster_for(&app, &hash));

        let (current, stale) = comparator
            .get_current_and_stale_deployments(&app)
            .await
            .unwrap();
        let current = current.expect("current set should be found");
        assert_eq!(current.hash, hash);
        assert!(current.is_complete());
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn spec_changes_make_the_running_set_stale() {
        let running = app(4);
        let running_hash = hash_for_application(&running);

        let edits: [fn(&mut FlinkApplicationSpec); 4] = [
            |s: &mut FlinkApplicationSpec| s.parallelism = 8,
            |s: &mut FlinkApplicationSpec| s.jar_name = "other.jar".to_string(),
            |s: &mut FlinkApplicationSpec| s.program_args = Some("--fast".to_string()),
            |s: &mut FlinkApplicationSpec| s.entry_class = Some("org.example.Other".to_string()),
        ];
        for edit in edits {
            let mut desired = running.clone();
            edit(&mut desired.spec);
            let comparator = comparator_returning(cluster_for(&running, &running_hash));

            let (current, stale) = comparator
                .get_current_and_stale_deployments(&desired)
                .await
                .unwrap();
            assert!(current.is_none());
            assert_eq!(stale.len(), 1);
            assert_eq!(stale[0].hash, running_hash);
        }
    }

    #[tokio::test]
    async fn no_deployments_is_not_an_error() {
        let comparator = comparator_returning(vec![]);
        let (current, stale) = comparator
            .get_current_and_stale_deployments(&app(4))
            .await
            .unwrap();
        assert!(current.is_none());
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn query_errors_propagate() {
        let mut k8s = MockK8sCluster::new();
        k8s.expect_list_deployments()
            .returning(|_, _| Err(api_error(500, "list failed")));
        let comparator = DeploymentComparator::new(Arc::new(k8s));

        let err = comparator
            .get_current_and_stale_deployments(&app(4))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("list failed"));
        assert!(matches!(err, Error::Kube(_)));
    }

    #[tokio::test]
    async fn hash_query_uses_both_labels() {
        let app = app(4);
        let mut k8s = MockK8sCluster::new();
        k8s.expect_list_deployments()
            .withf(|_, labels| {
                labels[FLINK_APP_LABEL] == "app-name" && labels[FLINK_APP_HASH_LABEL] == "abcd1234"
            })
            .times(1)
            .returning(|_, _| Ok(vec![]));
        let comparator = DeploymentComparator::new(Arc::new(k8s));

        let deployments = comparator
            .get_deployments_with_hash(&app, "abcd1234")
            .await
            .unwrap();
        assert!(deployments.is_empty());
    }

    #[test]
    fn replica_mismatch_is_not_current() {
        let app = app(4);
        let hash = hash_for_application(&app);
        let mut sets = group_deployments(cluster_for(&app, &hash));
        // Scaled by hand away from ceil(4 / 2)
        if let Some(spec) = sets[0].taskmanager.as_mut().and_then(|d| d.spec.as_mut()) {
            spec.replicas = Some(5);
        }

        let (current, stale) = partition_deployment_sets(&app, &hash, sets);
        assert!(current.is_none());
        assert_eq!(stale.len(), 1);
    }

    #[test]
    fn incomplete_sets_are_stale() {
        let app = app(4);
        let hash = hash_for_application(&app);
        let mut deployments = cluster_for(&app, &hash);
        deployments.truncate(1);

        let sets = group_deployments(deployments);
        assert_eq!(sets.len(), 1);
        assert!(!sets[0].is_complete());

        let (current, stale) = partition_deployment_sets(&app, &hash, sets);
        assert!(current.is_none());
        assert_eq!(stale.len(), 1);
    }

    #[test]
    fn grouping_separates_revisions_and_skips_foreign_deployments() {
        let app = app(4);
        let mut deployments = cluster_for(&app, "aaaaaaaa");
        deployments.extend(cluster_for(&app, "bbbbbbbb"));
        deployments.push(Deployment::default());

        let sets = group_deployments(deployments);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].hash, "aaaaaaaa");
        assert_eq!(sets[1].hash, "bbbbbbbb");
        assert!(sets.iter().all(DeploymentSet::is_complete));
    }

    #[test]
    fn readiness_compares_available_to_desired() {
        let app = app(4);
        let hash = hash_for_application(&app);
        let [jm, tm]: [Deployment; 2] = cluster_for(&app, &hash).try_into().unwrap();

        assert!(!is_deployment_ready(&jm));
        assert!(is_deployment_ready(&with_available(jm.clone(), 1)));
        assert!(!is_deployment_ready(&with_available(tm.clone(), 1)));

        let ready = DeploymentSet {
            hash: hash.clone(),
            jobmanager: Some(with_available(jm.clone(), 1)),
            taskmanager: Some(with_available(tm, 2)),
        };
        assert!(is_deployment_set_ready(&ready));

        let partial = DeploymentSet {
            hash,
            jobmanager: Some(with_available(jm, 1)),
            taskmanager: None,
        };
        assert!(!is_deployment_set_ready(&partial));
    }
}
