//! Status reconciliation
//!
//! Polls the job manager and folds what it reports into the application's
//! `ClusterStatus` and `JobStatus`, deriving health along the way. Every
//! fetch happens before status is touched, so a failed call never leaves a
//! half-updated status behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use kube::ResourceExt;
use tracing::debug;

use flinkop_client::{JobManagerClient, TaskManagerStats};
use flinkop_common::crd::{ClusterStatus, FlinkApplication, HealthStatus, JobState, JobStatus};
use flinkop_common::{ControllerConfig, Result};

/// Epoch millis to a second-precision timestamp; non-positive means unset
fn millis_to_time(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    DateTime::from_timestamp(millis / 1000, 0)
}

/// Task managers whose last heartbeat is younger than `staleness`
pub fn count_healthy_task_managers(
    task_managers: &[TaskManagerStats],
    now_millis: i64,
    staleness: Duration,
) -> i32 {
    let staleness = i64::try_from(staleness.as_millis()).unwrap_or(i64::MAX);
    task_managers
        .iter()
        .filter(|tm| now_millis.saturating_sub(tm.time_since_last_heartbeat) < staleness)
        .count() as i32
}

/// Whether `last_failing` falls within `window` before `now`.
///
/// A failing time in the future counts as recent.
pub fn failed_recently(
    last_failing: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    match last_failing {
        Some(at) => now
            .signed_duration_since(at)
            .to_std()
            .map(|elapsed| elapsed < window)
            .unwrap_or(true),
        None => false,
    }
}

/// Refreshes an application's status from its job manager
pub struct StatusReconciler {
    client: Arc<dyn JobManagerClient>,
    config: Arc<ControllerConfig>,
}

impl StatusReconciler {
    /// Create a reconciler polling through `client`
    pub fn new(client: Arc<dyn JobManagerClient>, config: Arc<ControllerConfig>) -> Self {
        Self { client, config }
    }

    /// Poll cluster state for revision `hash` and update
    /// `status.clusterStatus`. Returns whether it changed.
    ///
    /// Health is Green when every registered task manager has a fresh
    /// heartbeat and Yellow otherwise. A cluster with no registered task
    /// managers counts as Green; job health reports a job that cannot run.
    pub async fn compare_and_update_cluster_status(
        &self,
        app: &mut FlinkApplication,
        hash: &str,
    ) -> Result<bool> {
        let url = self.config.jobmanager_url(app, hash);
        let overview = self.client.get_cluster_overview(&url).await?;
        let task_managers = self.client.get_task_managers(&url).await?;

        let healthy = count_healthy_task_managers(
            &task_managers.task_managers,
            Utc::now().timestamp_millis(),
            self.config.heartbeat_staleness,
        );
        let health = if healthy == overview.task_manager_count {
            HealthStatus::Green
        } else {
            HealthStatus::Yellow
        };

        let observed = ClusterStatus {
            number_of_task_slots: overview.number_of_task_slots,
            available_task_slots: overview.slots_available,
            number_of_task_managers: overview.task_manager_count,
            healthy_task_managers: healthy,
            health: Some(health),
        };

        if app.status.as_ref().map(|s| &s.cluster_status) == Some(&observed) {
            return Ok(false);
        }

        debug!(
            app = %app.name_any(),
            hash = %hash,
            task_managers = observed.number_of_task_managers,
            healthy,
            health = %health,
            "cluster status changed"
        );
        app.status.get_or_insert_with(Default::default).cluster_status = observed;
        Ok(true)
    }

    /// Poll the recorded job and update `status.jobStatus`. Returns whether
    /// it changed.
    ///
    /// Without a recorded job id nothing is fetched. A running job stays Red
    /// for `failing_window` after it was last seen failing; states other
    /// than Running keep the previous health.
    pub async fn compare_and_update_job_status(
        &self,
        app: &mut FlinkApplication,
        hash: &str,
    ) -> Result<bool> {
        let Some(job_id) = app.job_id().map(str::to_string) else {
            return Ok(false);
        };

        let url = self.config.jobmanager_url(app, hash);
        let overview = self.client.get_job_overview(&url, &job_id).await?;
        let checkpoints = self.client.get_checkpoint_counts(&url, &job_id).await?;

        let now = Utc::now().trunc_subsecs(0);
        let previous = app
            .status
            .as_ref()
            .map(|s| s.job_status.clone())
            .unwrap_or_default();
        let mut observed = previous.clone();

        if !overview.job_id.is_empty() {
            observed.job_id = Some(overview.job_id);
        }
        observed.state = JobState::from(overview.state);
        observed.start_time = millis_to_time(overview.start_time);

        observed.job_restart_count = checkpoints.counts.restored;
        observed.completed_checkpoint_count = checkpoints.counts.completed;
        observed.failed_checkpoint_count = checkpoints.counts.failed;

        if let Some(restored) = checkpoints.latest.restored {
            observed.restore_time = millis_to_time(restored.restore_timestamp);
            observed.restore_path = restored.external_path;
        }
        if let Some(completed) = checkpoints.latest.completed {
            observed.last_checkpoint_time = millis_to_time(completed.latest_ack_timestamp);
        }

        if observed.state == JobState::Failing {
            observed.last_failing_time = Some(now);
        }
        if observed.state == JobState::Running {
            let recently_failed =
                failed_recently(observed.last_failing_time, now, self.config.failing_window);
            observed.health = Some(if recently_failed {
                HealthStatus::Red
            } else {
                HealthStatus::Green
            });
        }

        if observed == previous {
            return Ok(false);
        }

        debug!(
            app = %app.name_any(),
            job_id = %job_id,
            state = %observed.state,
            health = ?observed.health,
            "job status changed"
        );
        app.status.get_or_insert_with(Default::default).job_status = observed;
        Ok(true)
    }

    /// Refresh cluster and job status together.
    ///
    /// Both are computed on a copy and committed only if every fetch
    /// succeeded.
    pub async fn update_status(&self, app: &mut FlinkApplication, hash: &str) -> Result<bool> {
        let mut updated = app.clone();
        let cluster_changed = self
            .compare_and_update_cluster_status(&mut updated, hash)
            .await?;
        let job_changed = self
            .compare_and_update_job_status(&mut updated, hash)
            .await?;

        if cluster_changed || job_changed {
            app.status = updated.status;
        }
        Ok(cluster_changed || job_changed)
    }
}
