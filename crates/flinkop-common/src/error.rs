//! Error types for the flinkop controller
//!
//! Transport errors from the Kubernetes API and the job manager are wrapped
//! transparently so callers see the collaborator's message unchanged.
//! Protocol-contract violations get their own variants.

use flinkop_client::ClientError;
use thiserror::Error;

/// Main error type for flinkop operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error(transparent)]
    Kube(#[from] kube::Error),

    /// Job-manager REST error
    #[error(transparent)]
    JobManager(#[from] ClientError),

    /// The job manager accepted a submission but returned no job id
    #[error("unable to submit job: invalid job id")]
    InvalidJobId,

    /// More than one job on the cluster is running or finished
    #[error("found {} active jobs: {}", job_ids.len(), job_ids.join(", "))]
    AmbiguousActiveJob {
        /// Ids of every active job
        job_ids: Vec<String>,
    },

    /// An operation needs a job id but none is recorded in status
    #[error("no job id recorded for application {app}")]
    MissingJobId {
        /// Application name
        app: String,
    },

    /// A savepoint poll was requested without a trigger id
    #[error("no savepoint trigger id recorded for application {app}")]
    MissingSavepointTrigger {
        /// Application name
        app: String,
    },

    /// Invalid controller configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// Whether this error is a Kubernetes 409 (object already exists)
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(ae)) => Some(ae.code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn invalid_job_id_message_is_exact() {
        assert_eq!(
            Error::InvalidJobId.to_string(),
            "unable to submit job: invalid job id"
        );
    }

    #[test]
    fn transport_errors_keep_their_message() {
        let source = ClientError::Status {
            endpoint: "http://app-0a1b2c3d.flink:8081/overview".to_string(),
            status: 502,
            body: "bad gateway".to_string(),
        };
        let expected = source.to_string();
        let err: Error = source.into();
        assert_eq!(err.to_string(), expected);

        let kube_err = api_error(500, "etcd unavailable");
        let expected = kube_err.to_string();
        let err: Error = kube_err.into();
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn not_found_is_detected_only_for_404() {
        assert!(Error::from(api_error(404, "gone")).is_not_found());
        assert!(!Error::from(api_error(409, "exists")).is_not_found());
        assert!(!Error::InvalidJobId.is_not_found());
    }

    #[test]
    fn ambiguous_active_job_lists_ids() {
        let err = Error::AmbiguousActiveJob {
            job_ids: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "found 2 active jobs: a, b");
    }

    #[test]
    fn missing_ids_name_the_application() {
        let err = Error::MissingJobId {
            app: "wordcount".to_string(),
        };
        assert!(err.to_string().contains("wordcount"));

        let err = Error::MissingSavepointTrigger {
            app: "wordcount".to_string(),
        };
        assert!(err.to_string().contains("savepoint trigger"));
    }

    #[test]
    fn conflict_is_detected_only_for_409() {
        assert!(Error::from(api_error(409, "exists")).is_conflict());
        assert!(!Error::from(api_error(404, "gone")).is_conflict());
        assert!(!Error::config("bad").is_conflict());
    }

    #[test]
    fn config_error_message() {
        let err = Error::config("jobmanager port must be non-zero");
        assert_eq!(
            err.to_string(),
            "configuration error: jobmanager port must be non-zero"
        );
    }
}
