//! Job-manager client trait and its REST implementation

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use crate::error::ClientError;
use crate::types::{
    CheckpointResponse, CheckpointStatistics, ClusterOverviewResponse, FlinkJobOverview,
    GetJobsResponse, SavepointRequest, SavepointResponse, SavepointTriggerResponse,
    SubmitJobRequest, SubmitJobResponse, TaskManagersResponse,
};

/// Operations the controller performs against a job manager.
///
/// Every method takes the job manager's base URL so one client instance can
/// serve any number of applications. Calls are single-shot; retries are the
/// caller's concern.
#[async_trait]
pub trait JobManagerClient: Send + Sync {
    /// Submit a job from an uploaded jar
    async fn submit_job(
        &self,
        url: &str,
        jar_id: &str,
        request: &SubmitJobRequest,
    ) -> Result<SubmitJobResponse, ClientError>;

    /// Trigger a savepoint that cancels the job once written.
    ///
    /// Returns the trigger id to poll with [`Self::check_savepoint_status`].
    async fn cancel_job_with_savepoint(&self, url: &str, job_id: &str)
        -> Result<String, ClientError>;

    /// Cancel a job immediately, without a savepoint
    async fn force_cancel_job(&self, url: &str, job_id: &str) -> Result<(), ClientError>;

    /// Poll an asynchronous savepoint operation
    async fn check_savepoint_status(
        &self,
        url: &str,
        job_id: &str,
        trigger_id: &str,
    ) -> Result<SavepointResponse, ClientError>;

    /// Fetch the cluster-wide slot and task-manager counts
    async fn get_cluster_overview(&self, url: &str)
        -> Result<ClusterOverviewResponse, ClientError>;

    /// Fetch heartbeat and slot stats for every task manager
    async fn get_task_managers(&self, url: &str) -> Result<TaskManagersResponse, ClientError>;

    /// List all jobs known to the job manager
    async fn get_jobs(&self, url: &str) -> Result<GetJobsResponse, ClientError>;

    /// Fetch state and start time of one job
    async fn get_job_overview(&self, url: &str, job_id: &str)
        -> Result<FlinkJobOverview, ClientError>;

    /// Fetch checkpoint counters and the latest checkpoints of one job
    async fn get_checkpoint_counts(
        &self,
        url: &str,
        job_id: &str,
    ) -> Result<CheckpointResponse, ClientError>;

    /// Fetch the latest completed checkpoint of one job, if any
    async fn get_latest_checkpoint(
        &self,
        url: &str,
        job_id: &str,
    ) -> Result<Option<CheckpointStatistics>, ClientError>;
}

/// [`JobManagerClient`] backed by the job manager's REST API
#[derive(Clone, Debug)]
pub struct RestJobManagerClient {
    http: reqwest::Client,
}

impl RestJobManagerClient {
    /// Create a client with default HTTP settings.
    ///
    /// No request timeout is configured; callers bound each call.
    pub fn new() -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self { http })
    }

    /// Create a client around a preconfigured `reqwest::Client`
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// `base` with `segments` appended, each percent-encoded as one segment
    fn endpoint(base: &str, segments: &[&str]) -> Result<Url, ClientError> {
        let invalid = |source| ClientError::InvalidUrl {
            url: base.to_string(),
            source,
        };
        let mut url = Url::parse(base).map_err(invalid)?;
        url.path_segments_mut()
            .map_err(|()| invalid(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and return the raw body of a 2xx response
    async fn execute(&self, request: RequestBuilder, endpoint: &Url) -> Result<String, ClientError> {
        let response = request.send().await.map_err(|source| ClientError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ClientError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;

        trace!(endpoint = %endpoint, status = status.as_u16(), "job manager response");

        if !status.is_success() {
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    async fn request_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        base: &str,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let endpoint = Self::endpoint(base, segments)?;
        debug!(method = %method, endpoint = %endpoint, "calling job manager");

        let mut request = self.http.request(method, endpoint.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let text = self.execute(request, &endpoint).await?;
        serde_json::from_str(&text).map_err(|source| ClientError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        base: &str,
        segments: &[&str],
    ) -> Result<T, ClientError> {
        self.request_json(Method::GET, base, segments, None::<&()>)
            .await
    }
}

#[async_trait]
impl JobManagerClient for RestJobManagerClient {
    async fn submit_job(
        &self,
        url: &str,
        jar_id: &str,
        request: &SubmitJobRequest,
    ) -> Result<SubmitJobResponse, ClientError> {
        self.request_json(Method::POST, url, &["jars", jar_id, "run"], Some(request))
            .await
    }

    async fn cancel_job_with_savepoint(
        &self,
        url: &str,
        job_id: &str,
    ) -> Result<String, ClientError> {
        let body = SavepointRequest {
            cancel_job: true,
            target_directory: None,
        };
        let response: SavepointTriggerResponse = self
            .request_json(Method::POST, url, &["jobs", job_id, "savepoints"], Some(&body))
            .await?;
        Ok(response.trigger_id)
    }

    async fn force_cancel_job(&self, url: &str, job_id: &str) -> Result<(), ClientError> {
        let mut endpoint = Self::endpoint(url, &["jobs", job_id])?;
        endpoint.query_pairs_mut().append_pair("mode", "cancel");
        debug!(endpoint = %endpoint, "force-cancelling job");
        let request = self.http.patch(endpoint.clone());
        self.execute(request, &endpoint).await?;
        Ok(())
    }

    async fn check_savepoint_status(
        &self,
        url: &str,
        job_id: &str,
        trigger_id: &str,
    ) -> Result<SavepointResponse, ClientError> {
        self.get_json(url, &["jobs", job_id, "savepoints", trigger_id])
            .await
    }

    async fn get_cluster_overview(
        &self,
        url: &str,
    ) -> Result<ClusterOverviewResponse, ClientError> {
        self.get_json(url, &["overview"]).await
    }

    async fn get_task_managers(&self, url: &str) -> Result<TaskManagersResponse, ClientError> {
        self.get_json(url, &["taskmanagers"]).await
    }

    async fn get_jobs(&self, url: &str) -> Result<GetJobsResponse, ClientError> {
        self.get_json(url, &["jobs"]).await
    }

    async fn get_job_overview(
        &self,
        url: &str,
        job_id: &str,
    ) -> Result<FlinkJobOverview, ClientError> {
        self.get_json(url, &["jobs", job_id]).await
    }

    async fn get_checkpoint_counts(
        &self,
        url: &str,
        job_id: &str,
    ) -> Result<CheckpointResponse, ClientError> {
        self.get_json(url, &["jobs", job_id, "checkpoints"])
            .await
    }

    async fn get_latest_checkpoint(
        &self,
        url: &str,
        job_id: &str,
    ) -> Result<Option<CheckpointStatistics>, ClientError> {
        let response = self.get_checkpoint_counts(url, job_id).await?;
        Ok(response.latest.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlinkJobState, SavepointStatus};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> RestJobManagerClient {
        RestJobManagerClient::new().expect("http client should build")
    }

    #[tokio::test]
    async fn submit_job_posts_run_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jars/wordcount.jar/run"))
            .and(body_json(serde_json::json!({
                "savepointPath": "s3://sp/1",
                "parallelism": 4,
                "programArgs": "args",
                "entryClass": "class",
                "allowNonRestoredState": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"jobid": "j1"})))
            .expect(1)
            .mount(&server)
            .await;

        let request = SubmitJobRequest {
            savepoint_path: Some("s3://sp/1".to_string()),
            parallelism: 4,
            program_args: Some("args".to_string()),
            entry_class: Some("class".to_string()),
            allow_non_restored_state: false,
        };
        let response = client()
            .submit_job(&server.uri(), "wordcount.jar", &request)
            .await
            .expect("submit should succeed");
        assert_eq!(response.job_id, "j1");
    }

    #[tokio::test]
    async fn submit_job_without_job_id_decodes_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jars/app.jar/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let response = client()
            .submit_job(&server.uri(), "app.jar", &SubmitJobRequest::default())
            .await
            .expect("submit should succeed");
        assert!(response.job_id.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/overview"))
            .respond_with(
                ResponseTemplate::new(500).set_body_string(r#"{"errors":["internal"]}"#),
            )
            .mount(&server)
            .await;

        let err = client()
            .get_cluster_overview(&server.uri())
            .await
            .expect_err("500 should surface as an error");
        assert_eq!(err.status_code(), Some(500));
        assert!(err.to_string().contains("internal"));
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client()
            .get_jobs(&server.uri())
            .await
            .expect_err("garbage body should fail");
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[tokio::test]
    async fn cancel_with_savepoint_returns_trigger_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jobs/j1/savepoints"))
            .and(body_json(serde_json::json!({"cancel-job": true})))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(serde_json::json!({"request-id": "t1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let trigger = client()
            .cancel_job_with_savepoint(&server.uri(), "j1")
            .await
            .expect("cancel should succeed");
        assert_eq!(trigger, "t1");
    }

    #[tokio::test]
    async fn force_cancel_patches_job() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/jobs/j1"))
            .and(query_param("mode", "cancel"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        client()
            .force_cancel_job(&server.uri(), "j1")
            .await
            .expect("force cancel should succeed");
    }

    #[tokio::test]
    async fn savepoint_status_is_polled_by_trigger() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1/savepoints/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": {"id": "COMPLETED"},
                "operation": {"location": "s3://sp/savepoint-j1"}
            })))
            .mount(&server)
            .await;

        let response = client()
            .check_savepoint_status(&server.uri(), "j1", "t1")
            .await
            .expect("status should succeed");
        assert_eq!(
            response.outcome(),
            SavepointStatus::Completed {
                location: "s3://sp/savepoint-j1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn cluster_overview_and_task_managers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/overview"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "taskmanagers": 2, "slots-total": 8, "slots-available": 3,
                "jobs-running": 1, "flink-version": "1.7.2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/taskmanagers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "taskmanagers": [
                    {"id": "a", "timeSinceLastHeartbeat": 1000, "slotsNumber": 4, "freeSlots": 1},
                    {"id": "b", "timeSinceLastHeartbeat": 2000, "slotsNumber": 4, "freeSlots": 2}
                ]
            })))
            .mount(&server)
            .await;

        let client = client();
        let overview = client.get_cluster_overview(&server.uri()).await.unwrap();
        assert_eq!(overview.task_manager_count, 2);
        assert_eq!(overview.number_of_task_slots, 8);
        assert_eq!(overview.slots_available, 3);

        let tms = client.get_task_managers(&server.uri()).await.unwrap();
        assert_eq!(tms.task_managers.len(), 2);
        assert_eq!(tms.task_managers[1].free_slots, 2);
    }

    #[tokio::test]
    async fn job_overview_and_latest_checkpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jid": "j1", "state": "RUNNING", "start-time": 1_553_000_000_000_i64
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1/checkpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "counts": {"restored": 0, "completed": 2, "failed": 0},
                "latest": {"completed": {"id": 2, "trigger_timestamp": 5, "external_path": "/tmp/checkpoint"}}
            })))
            .mount(&server)
            .await;

        let client = client();
        let overview = client.get_job_overview(&server.uri(), "j1").await.unwrap();
        assert_eq!(overview.state, FlinkJobState::Running);

        let latest = client
            .get_latest_checkpoint(&server.uri(), "j1")
            .await
            .unwrap()
            .expect("a completed checkpoint exists");
        assert_eq!(latest.external_path.as_deref(), Some("/tmp/checkpoint"));
    }

    #[tokio::test]
    async fn latest_checkpoint_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/j1/checkpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "counts": {}, "latest": {"completed": null}
            })))
            .mount(&server)
            .await;

        let latest = client()
            .get_latest_checkpoint(&server.uri(), "j1")
            .await
            .unwrap();
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn unreachable_job_manager_is_http_error() {
        // Port 9 (discard) is not served by anything in the test environment
        let err = client()
            .get_cluster_overview("http://127.0.0.1:9")
            .await
            .expect_err("connection should be refused");
        assert!(matches!(err, ClientError::Http { .. }));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = RestJobManagerClient::endpoint("not a url", &["overview"]).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));

        let err = RestJobManagerClient::endpoint("mailto:ops@example.com", &["overview"])
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
    }

    #[test]
    fn ids_are_encoded_as_single_segments() {
        let url = RestJobManagerClient::endpoint(
            "http://wordcount-0a1b2c3d.flink:8081",
            &["jars", "word count?#x/y.jar", "run"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://wordcount-0a1b2c3d.flink:8081/jars/word%20count%3F%23x%2Fy.jar/run"
        );
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn segments_append_to_a_base_path() {
        let url = RestJobManagerClient::endpoint("http://proxy:8080/flink/", &["jobs", "j1"])
            .unwrap();
        assert_eq!(url.as_str(), "http://proxy:8080/flink/jobs/j1");
    }
}
