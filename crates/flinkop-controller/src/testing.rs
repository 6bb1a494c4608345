//! Shared test doubles and fixtures

use flinkop_client::{
    CheckpointResponse, CheckpointStatistics, ClientError, ClusterOverviewResponse,
    FlinkJobOverview, GetJobsResponse, JobManagerClient, SavepointResponse, SubmitJobRequest,
    SubmitJobResponse, TaskManagersResponse,
};
use flinkop_common::crd::{FlinkApplication, FlinkApplicationSpec, TaskManagerConfig};
use flinkop_common::Error;
use mockall::mock;

// The client crate does not export its mocks, so mirror the trait here
mock! {
    pub JobManager {}

    #[async_trait::async_trait]
    impl JobManagerClient for JobManager {
        async fn submit_job(
            &self,
            url: &str,
            jar_id: &str,
            request: &SubmitJobRequest,
        ) -> Result<SubmitJobResponse, ClientError>;
        async fn cancel_job_with_savepoint(&self, url: &str, job_id: &str)
            -> Result<String, ClientError>;
        async fn force_cancel_job(&self, url: &str, job_id: &str) -> Result<(), ClientError>;
        async fn check_savepoint_status(
            &self,
            url: &str,
            job_id: &str,
            trigger_id: &str,
        ) -> Result<SavepointResponse, ClientError>;
        async fn get_cluster_overview(&self, url: &str)
            -> Result<ClusterOverviewResponse, ClientError>;
        async fn get_task_managers(&self, url: &str) -> Result<TaskManagersResponse, ClientError>;
        async fn get_jobs(&self, url: &str) -> Result<GetJobsResponse, ClientError>;
        async fn get_job_overview(&self, url: &str, job_id: &str)
            -> Result<FlinkJobOverview, ClientError>;
        async fn get_checkpoint_counts(
            &self,
            url: &str,
            job_id: &str,
        ) -> Result<CheckpointResponse, ClientError>;
        async fn get_latest_checkpoint(
            &self,
            url: &str,
            job_id: &str,
        ) -> Result<Option<CheckpointStatistics>, ClientError>;
    }
}

/// Job-manager URL of [`sample_app`] for `hash`
pub fn sample_url(hash: &str) -> String {
    format!("http://app-name-{}.flink:8081", hash)
}

/// Application `app-name` in namespace `flink`
pub fn sample_app() -> FlinkApplication {
    let mut app = FlinkApplication::new(
        "app-name",
        FlinkApplicationSpec {
            image: "flink:1.7.2".to_string(),
            flink_version: "1.7".to_string(),
            parallelism: 4,
            jar_name: "job.jar".to_string(),
            entry_class: Some("org.example.Main".to_string()),
            program_args: Some("--input s3://in".to_string()),
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

/// A transport-level failure as the REST client reports it
pub fn status_error(status: u16) -> ClientError {
    ClientError::Status {
        endpoint: "http://app-name-0a1b2c3d.flink:8081/overview".to_string(),
        status,
        body: "service unavailable".to_string(),
    }
}

/// A Kubernetes API rejection with `code`
pub fn api_error(code: u16, message: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "Forbidden".to_string(),
        code,
    }))
}
