//! Kubernetes access for the controller
//!
//! The controller only needs three operations on the cluster: list
//! Deployments by label, create an object unless it exists, and delete an
//! object. [`K8sCluster`] abstracts them so tests can run without an API
//! server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use flinkop_common::{Error, Result};

/// An object the controller creates or deletes
#[derive(Clone, Debug, PartialEq)]
pub enum K8sObject {
    /// A job-manager or task-manager Deployment
    Deployment(Box<Deployment>),
    /// The versioned job-manager Service
    Service(Box<Service>),
}

impl K8sObject {
    /// Object kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deployment(_) => "Deployment",
            Self::Service(_) => "Service",
        }
    }

    /// Object name
    pub fn name(&self) -> String {
        match self {
            Self::Deployment(d) => d.name_any(),
            Self::Service(s) => s.name_any(),
        }
    }

    /// Object namespace, `default` when unset
    pub fn namespace(&self) -> String {
        let namespace = match self {
            Self::Deployment(d) => d.namespace(),
            Self::Service(s) => s.namespace(),
        };
        namespace.unwrap_or_else(|| "default".to_string())
    }
}

/// Render a label map as an equality selector
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Cluster operations used by the controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait K8sCluster: Send + Sync {
    /// List Deployments in `namespace` carrying every label in `labels`
    async fn list_deployments(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Deployment>>;

    /// Create `object` unless it already exists.
    ///
    /// Returns `true` if the object was created, `false` if it existed.
    async fn create_if_not_exist(&self, object: K8sObject) -> Result<bool>;

    /// Delete `object`. Deleting an absent object succeeds.
    async fn delete_object(&self, object: K8sObject) -> Result<()>;
}

/// [`K8sCluster`] backed by a `kube::Client`
pub struct KubeCluster {
    client: Client,
    field_manager: String,
}

impl KubeCluster {
    /// Create a new KubeCluster wrapping the given kube Client
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl K8sCluster for KubeCluster {
    async fn list_deployments(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let selector = label_selector(labels);
        debug!(namespace = %namespace, selector = %selector, "listing deployments");
        let list = api.list(&ListParams::default().labels(&selector)).await?;
        Ok(list.items)
    }

    async fn create_if_not_exist(&self, object: K8sObject) -> Result<bool> {
        let kind = object.kind();
        let name = object.name();
        let namespace = object.namespace();
        let params = self.post_params();

        let created = match object {
            K8sObject::Deployment(deployment) => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
                api.create(&params, &deployment).await.map(|_| ())
            }
            K8sObject::Service(service) => {
                let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
                api.create(&params, &service).await.map(|_| ())
            }
        };

        match created.map_err(Error::from) {
            Ok(()) => {
                info!(kind, name = %name, namespace = %namespace, "created object");
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                debug!(kind, name = %name, namespace = %namespace, "object already exists");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_object(&self, object: K8sObject) -> Result<()> {
        let kind = object.kind();
        let name = object.name();
        let namespace = object.namespace();
        let params = DeleteParams::foreground();

        let deleted = match object {
            K8sObject::Deployment(_) => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
                api.delete(&name, &params).await.map(|_| ())
            }
            K8sObject::Service(_) => {
                let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
                api.delete(&name, &params).await.map(|_| ())
            }
        };

        match deleted.map_err(Error::from) {
            Ok(()) => {
                info!(kind, name = %name, namespace = %namespace, "deleted object");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(kind, name = %name, namespace = %namespace, "object already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
