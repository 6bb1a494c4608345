//! Kubernetes objects for one revision of a Flink cluster
//!
//! Every object is named and labelled with the application hash, so two
//! revisions of the same application can run side by side during a
//! replacement.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use flinkop_common::crd::{FlinkApplication, ResourceSpec};
use flinkop_common::{
    ControllerConfig, FLINK_APP_HASH_LABEL, FLINK_APP_LABEL, FLINK_DEPLOYMENT_TYPE_LABEL,
    FLINK_JOB_PROPERTIES_ANNOTATION, JOBMANAGER_DEPLOYMENT_TYPE, MANAGED_BY_LABEL,
    MANAGED_BY_VALUE, TASKMANAGER_DEPLOYMENT_TYPE,
};

/// Job-manager RPC port
pub const JOBMANAGER_RPC_PORT: i32 = 6123;
/// Job-manager blob server port
pub const JOBMANAGER_BLOB_PORT: i32 = 6124;
/// Queryable state port, on both components
pub const QUERY_PORT: i32 = 6125;
/// Task-manager data port
pub const TASKMANAGER_DATA_PORT: i32 = 6121;
/// Task-manager RPC port
pub const TASKMANAGER_RPC_PORT: i32 = 6122;

/// Environment variable the Flink image appends to `flink-conf.yaml`
pub const FLINK_PROPERTIES_ENV: &str = "FLINK_PROPERTIES";

// =============================================================================
// Names and labels
// =============================================================================

/// Name of the versioned job-manager Service
pub fn versioned_service_name(app: &FlinkApplication, hash: &str) -> String {
    format!("{}-{}", app.name_any(), hash)
}

/// Name of the job-manager Deployment
pub fn job_manager_deployment_name(app: &FlinkApplication, hash: &str) -> String {
    format!("{}-{}-jm", app.name_any(), hash)
}

/// Name of the task-manager Deployment
pub fn task_manager_deployment_name(app: &FlinkApplication, hash: &str) -> String {
    format!("{}-{}-tm", app.name_any(), hash)
}

/// Labels selecting every object of an application
pub fn app_labels(app: &FlinkApplication) -> BTreeMap<String, String> {
    BTreeMap::from([(FLINK_APP_LABEL.to_string(), app.name_any())])
}

/// Labels selecting every object of one revision
pub fn app_hash_labels(app: &FlinkApplication, hash: &str) -> BTreeMap<String, String> {
    let mut labels = app_labels(app);
    labels.insert(FLINK_APP_HASH_LABEL.to_string(), hash.to_string());
    labels
}

fn component_labels(
    app: &FlinkApplication,
    hash: &str,
    deployment_type: &str,
) -> BTreeMap<String, String> {
    let mut labels = app_hash_labels(app, hash);
    labels.insert(
        FLINK_DEPLOYMENT_TYPE_LABEL.to_string(),
        deployment_type.to_string(),
    );
    labels
}

fn object_labels(
    app: &FlinkApplication,
    hash: &str,
    deployment_type: &str,
) -> BTreeMap<String, String> {
    let mut labels = component_labels(app, hash, deployment_type);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels
}

/// Job-level settings the cluster was built for, as a JSON object
pub fn job_properties(app: &FlinkApplication) -> String {
    let spec = &app.spec;
    serde_json::json!({
        "jarName": spec.jar_name,
        "parallelism": spec.parallelism,
        "entryClass": spec.entry_class,
        "programArgs": spec.program_args,
    })
    .to_string()
}

fn object_meta(
    app: &FlinkApplication,
    name: String,
    labels: BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(app.namespace_or_default()),
        labels: Some(labels),
        annotations: Some(BTreeMap::from([(
            FLINK_JOB_PROPERTIES_ANNOTATION.to_string(),
            job_properties(app),
        )])),
        owner_references: owner_reference(app).map(|r| vec![r]),
        ..Default::default()
    }
}

/// Controller owner reference, present once the application has a uid
pub fn owner_reference(app: &FlinkApplication) -> Option<OwnerReference> {
    app.controller_owner_ref(&()).map(|mut r| {
        r.block_owner_deletion = Some(true);
        r
    })
}

// =============================================================================
// Container config
// =============================================================================

/// `flink-conf.yaml` entries for one revision.
///
/// User entries come first in key order; the cluster wiring
/// (RPC address, slots, ports) always wins.
pub fn flink_properties(app: &FlinkApplication, hash: &str, config: &ControllerConfig) -> String {
    let mut properties = app.spec.flink_config.clone();
    properties.insert(
        "jobmanager.rpc.address".to_string(),
        versioned_service_name(app, hash),
    );
    properties.insert(
        "jobmanager.rpc.port".to_string(),
        JOBMANAGER_RPC_PORT.to_string(),
    );
    properties.insert("rest.port".to_string(), config.jobmanager_port.to_string());
    properties.insert(
        "taskmanager.numberOfTaskSlots".to_string(),
        app.spec.task_slots().to_string(),
    );

    properties
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

fn env_vars(properties: String, environment: &BTreeMap<String, String>) -> Vec<EnvVar> {
    let mut env = vec![EnvVar {
        name: FLINK_PROPERTIES_ENV.to_string(),
        value: Some(properties),
        ..Default::default()
    }];
    env.extend(
        environment
            .iter()
            .filter(|(name, _)| name.as_str() != FLINK_PROPERTIES_ENV)
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            }),
    );
    env
}

fn resource_requirements(resources: Option<&ResourceSpec>) -> Option<ResourceRequirements> {
    let resources = resources?;
    let mut quantities = BTreeMap::new();
    if let Some(cpu) = &resources.cpu {
        quantities.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &resources.memory {
        quantities.insert("memory".to_string(), Quantity(memory.clone()));
    }
    if quantities.is_empty() {
        return None;
    }
    Some(ResourceRequirements {
        requests: Some(quantities.clone()),
        limits: Some(quantities),
        ..Default::default()
    })
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn deployment(
    meta: ObjectMeta,
    selector: BTreeMap<String, String>,
    replicas: i32,
    container: Container,
) -> Deployment {
    let pod_labels = meta.labels.clone();
    let pod_annotations = meta.annotations.clone();
    Deployment {
        metadata: meta,
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: pod_labels,
                    annotations: pod_annotations,
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Job-manager Deployment for one revision
pub fn build_job_manager_deployment(
    app: &FlinkApplication,
    hash: &str,
    config: &ControllerConfig,
) -> Deployment {
    let spec = &app.spec;
    let container = Container {
        name: "jobmanager".to_string(),
        image: Some(spec.image.clone()),
        image_pull_policy: spec.image_pull_policy.clone(),
        args: Some(vec!["jobmanager".to_string()]),
        ports: Some(vec![
            container_port("ui", i32::from(config.jobmanager_port)),
            container_port("rpc", JOBMANAGER_RPC_PORT),
            container_port("blob", JOBMANAGER_BLOB_PORT),
            container_port("query", QUERY_PORT),
        ]),
        env: Some(env_vars(
            flink_properties(app, hash, config),
            &spec.job_manager_config.environment,
        )),
        resources: resource_requirements(spec.job_manager_config.resources.as_ref()),
        ..Default::default()
    };

    deployment(
        object_meta(
            app,
            job_manager_deployment_name(app, hash),
            object_labels(app, hash, JOBMANAGER_DEPLOYMENT_TYPE),
        ),
        component_labels(app, hash, JOBMANAGER_DEPLOYMENT_TYPE),
        spec.job_manager_replicas(),
        container,
    )
}

/// Task-manager Deployment for one revision
pub fn build_task_manager_deployment(
    app: &FlinkApplication,
    hash: &str,
    config: &ControllerConfig,
) -> Deployment {
    let spec = &app.spec;
    let container = Container {
        name: "taskmanager".to_string(),
        image: Some(spec.image.clone()),
        image_pull_policy: spec.image_pull_policy.clone(),
        args: Some(vec!["taskmanager".to_string()]),
        ports: Some(vec![
            container_port("data", TASKMANAGER_DATA_PORT),
            container_port("rpc", TASKMANAGER_RPC_PORT),
            container_port("query", QUERY_PORT),
        ]),
        env: Some(env_vars(
            flink_properties(app, hash, config),
            &spec.task_manager_config.environment,
        )),
        resources: resource_requirements(spec.task_manager_config.resources.as_ref()),
        ..Default::default()
    };

    deployment(
        object_meta(
            app,
            task_manager_deployment_name(app, hash),
            object_labels(app, hash, TASKMANAGER_DEPLOYMENT_TYPE),
        ),
        component_labels(app, hash, TASKMANAGER_DEPLOYMENT_TYPE),
        spec.task_manager_replicas(),
        container,
    )
}

/// Versioned Service fronting the job manager of one revision
pub fn build_versioned_service(
    app: &FlinkApplication,
    hash: &str,
    config: &ControllerConfig,
) -> Service {
    let service_port = |name: &str, port: i32| ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    };

    Service {
        metadata: object_meta(
            app,
            versioned_service_name(app, hash),
            object_labels(app, hash, JOBMANAGER_DEPLOYMENT_TYPE),
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(component_labels(app, hash, JOBMANAGER_DEPLOYMENT_TYPE)),
            ports: Some(vec![
                service_port("ui", i32::from(config.jobmanager_port)),
                service_port("rpc", JOBMANAGER_RPC_PORT),
                service_port("blob", JOBMANAGER_BLOB_PORT),
                service_port("query", QUERY_PORT),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
