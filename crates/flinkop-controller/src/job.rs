//! Job lifecycle against the job-manager REST API
//!
//! Submission, cancel-with-savepoint, savepoint polling and recovery-point
//! discovery. Every call goes to the versioned Service of the given hash.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info};

use flinkop_client::{FlinkJob, FlinkJobState, JobManagerClient, SavepointStatus, SubmitJobRequest};
use flinkop_common::crd::FlinkApplication;
use flinkop_common::{ControllerConfig, Error, Result};

/// The single running or finished job, if any.
///
/// More than one such job means the cluster is not in a state this
/// controller created, and is reported as an error.
pub fn get_active_job(jobs: &[FlinkJob]) -> Result<Option<FlinkJob>> {
    let active: Vec<&FlinkJob> = jobs
        .iter()
        .filter(|job| matches!(job.status, FlinkJobState::Running | FlinkJobState::Finished))
        .collect();

    match active.as_slice() {
        [] => Ok(None),
        [job] => Ok(Some((*job).clone())),
        many => Err(Error::AmbiguousActiveJob {
            job_ids: many.iter().map(|job| job.job_id.clone()).collect(),
        }),
    }
}

/// Drives jobs on an application's job manager
pub struct JobController {
    client: Arc<dyn JobManagerClient>,
    config: Arc<ControllerConfig>,
}

impl JobController {
    /// Create a controller calling through `client`
    pub fn new(client: Arc<dyn JobManagerClient>, config: Arc<ControllerConfig>) -> Self {
        Self { client, config }
    }

    /// Submit the application's jar to the cluster of revision `hash`.
    ///
    /// Restores from `spec.savepointInfo.savepointLocation` when set.
    /// Returns the new job id.
    pub async fn start_flink_job(
        &self,
        app: &FlinkApplication,
        hash: &str,
        jar_name: &str,
        parallelism: i32,
        entry_class: Option<&str>,
        program_args: Option<&str>,
    ) -> Result<String> {
        let url = self.config.jobmanager_url(app, hash);
        let request = SubmitJobRequest {
            savepoint_path: app.spec.savepoint_info.savepoint_location.clone(),
            parallelism,
            program_args: program_args.map(str::to_string),
            entry_class: entry_class.map(str::to_string),
            allow_non_restored_state: false,
        };

        let response = self.client.submit_job(&url, jar_name, &request).await?;
        if response.job_id.is_empty() {
            return Err(Error::InvalidJobId);
        }

        info!(
            app = %app.name_any(),
            hash = %hash,
            job_id = %response.job_id,
            savepoint = ?request.savepoint_path,
            "submitted flink job"
        );
        Ok(response.job_id)
    }

    /// Every job known to the cluster of revision `hash`
    pub async fn get_jobs_for_application(
        &self,
        app: &FlinkApplication,
        hash: &str,
    ) -> Result<Vec<FlinkJob>> {
        let url = self.config.jobmanager_url(app, hash);
        let response = self.client.get_jobs(&url).await?;
        debug!(app = %app.name_any(), hash = %hash, jobs = response.jobs.len(), "listed jobs");
        Ok(response.jobs)
    }

    /// Savepoint the recorded job and cancel it. Returns the trigger id.
    pub async fn cancel_with_savepoint(&self, app: &FlinkApplication, hash: &str) -> Result<String> {
        let job_id = recorded_job_id(app)?;
        let url = self.config.jobmanager_url(app, hash);
        let trigger_id = self.client.cancel_job_with_savepoint(&url, job_id).await?;
        info!(
            app = %app.name_any(),
            job_id = %job_id,
            trigger_id = %trigger_id,
            "cancelling flink job with savepoint"
        );
        Ok(trigger_id)
    }

    /// Cancel the recorded job without a savepoint
    pub async fn force_cancel(&self, app: &FlinkApplication, hash: &str) -> Result<()> {
        let job_id = recorded_job_id(app)?;
        let url = self.config.jobmanager_url(app, hash);
        self.client.force_cancel_job(&url, job_id).await?;
        info!(app = %app.name_any(), job_id = %job_id, "force-cancelled flink job");
        Ok(())
    }

    /// Progress of the savepoint named by `spec.savepointInfo.triggerId`
    pub async fn get_savepoint_status(
        &self,
        app: &FlinkApplication,
        hash: &str,
    ) -> Result<SavepointStatus> {
        let job_id = recorded_job_id(app)?;
        let trigger_id = app
            .spec
            .savepoint_info
            .trigger_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::MissingSavepointTrigger {
                app: app.name_any(),
            })?;

        let url = self.config.jobmanager_url(app, hash);
        let response = self
            .client
            .check_savepoint_status(&url, job_id, trigger_id)
            .await?;
        let status = response.outcome();
        debug!(app = %app.name_any(), trigger_id = %trigger_id, status = ?status, "polled savepoint");
        Ok(status)
    }

    /// External path of the recorded job's latest completed checkpoint
    pub async fn find_externalized_checkpoint(
        &self,
        app: &FlinkApplication,
        hash: &str,
    ) -> Result<Option<String>> {
        let job_id = recorded_job_id(app)?;
        let url = self.config.jobmanager_url(app, hash);
        let checkpoint = self.client.get_latest_checkpoint(&url, job_id).await?;
        Ok(checkpoint.and_then(|c| c.external_path))
    }
}

fn recorded_job_id(app: &FlinkApplication) -> Result<&str> {
    app.job_id().ok_or_else(|| Error::MissingJobId {
        app: app.name_any(),
    })
}
