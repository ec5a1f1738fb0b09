//! Training job orchestrator
//!
//! Drives one submission end to end: validate the form selections, stream
//! the dataset into the caller's bucket, create the remote training job, and
//! hand the transaction to a detached poller. The caller gets an immediate
//! acknowledgement; everything after submission is reported by notification.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncBufRead;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::notify::Notifier;
use crate::storage::{strip_header_line, AwsCredentials, Storage, DEFAULT_REGION};
use crate::training::images::training_image;
use crate::training::params::{TrainingFormParams, TrainingParams, ValidationError};
use crate::training::poller;
use crate::training::submitter::{
    job_name, upload_key, ComputeBackend, SageMakerBackend, TrainingJobSpec,
};
use crate::training::types::JobTransaction;

/// Immediate acknowledgement for a submission request.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub message: String,
}

/// Per-request identity: caller credentials, the IAM role the training job
/// assumes, and where to send the terminal notification.
#[derive(Debug, Clone)]
pub struct RequestAuth {
    pub credentials: AwsCredentials,
    pub role_arn: String,
    pub recipient: String,
}

pub struct JobOrchestrator {
    poll_interval: Duration,
    s3_endpoint: Option<String>,
    notifier: Arc<dyn Notifier>,
}

impl JobOrchestrator {
    pub fn new(config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll.interval_secs),
            s3_endpoint: config.server.s3_endpoint.clone(),
            notifier,
        }
    }

    /// Run the submission pipeline.
    ///
    /// Upload happens before job creation, so a failed upload never leaves a
    /// remote job behind. Once `create_training_job` succeeds the poller owns
    /// the transaction and this method cannot fail anymore.
    #[instrument(skip(self, auth, form, dataset), fields(recipient = %auth.recipient))]
    pub async fn execute<R>(
        &self,
        auth: RequestAuth,
        form: TrainingFormParams,
        mut dataset: R,
    ) -> AppResult<ExecuteResponse>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let params = TrainingParams::validate(&form)?;

        // GetBucketLocation works from any region; the upload and the job
        // have to live where the bucket lives.
        let probe = Storage::for_request(
            &auth.credentials,
            DEFAULT_REGION,
            self.s3_endpoint.as_deref(),
        );
        let region = probe
            .bucket_region(&params.bucket)
            .await
            .map_err(|e| AppError::Upload(format!("cannot resolve bucket region: {e}")))?;

        // A region with no published image is a deployment problem, not an
        // upstream rejection.
        let image = training_image(&region).ok_or_else(|| {
            AppError::Config(format!(
                "linear-learner is not published in region {region}"
            ))
        })?;

        let name = job_name(&params.model_name, Utc::now());
        let key = upload_key(&name);

        let field_count = strip_header_line(&mut dataset)
            .await
            .map_err(|e| AppError::Upload(format!("cannot read dataset header: {e}")))?;
        if field_count < 2 {
            return Err(ValidationError::TooFewFields(field_count).into());
        }
        let feature_dim = field_count - 1;

        let storage = Storage::for_request(
            &auth.credentials,
            &region,
            self.s3_endpoint.as_deref(),
        );
        let bytes = storage
            .upload_stream(&params.bucket, &key, dataset)
            .await
            .map_err(|e| AppError::Upload(e.to_string()))?;

        info!(
            job_name = %name,
            bucket = %params.bucket,
            bytes,
            feature_dim,
            "Dataset uploaded"
        );

        let spec = TrainingJobSpec::build(
            &params,
            name.clone(),
            auth.role_arn.clone(),
            image,
            feature_dim,
        );
        let backend = SageMakerBackend::for_request(&auth.credentials, &region);
        backend
            .create_training_job(&spec)
            .await
            .map_err(|e| AppError::Submission(e.to_string()))?;

        info!(job_name = %name, region = %region, "Training job created");

        let transaction = JobTransaction {
            job_name: name.clone(),
            model_name: params.model_name.clone(),
            recipient: auth.recipient,
            max_runtime: Duration::from_secs(params.max_runtime_in_seconds()),
            poll_interval: self.poll_interval,
        };
        poller::spawn(transaction, Arc::new(backend), self.notifier.clone());

        Ok(ExecuteResponse {
            success: true,
            message: format!("Training job {name} submitted"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notification;
    use anyhow::Result;
    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, _notification: &Notification) -> Result<()> {
            Ok(())
        }
    }

    fn orchestrator() -> JobOrchestrator {
        JobOrchestrator::new(&Config::default(), Arc::new(NullNotifier))
    }

    fn auth() -> RequestAuth {
        RequestAuth {
            credentials: AwsCredentials {
                access_key_id: "AKIAEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
            },
            role_arn: "arn:aws:iam::123456789012:role/trainer".to_string(),
            recipient: "user@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_validation_failure_short_circuits() {
        // No bucket: rejected before any network client is exercised.
        let form = TrainingFormParams {
            model_name: Some("churn".to_string()),
            ..Default::default()
        };

        let err = orchestrator()
            .execute(auth(), form, "a,b\n1,2\n".as_bytes())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(ValidationError::Missing("bucket"))));
    }

    #[tokio::test]
    async fn test_missing_num_classes_for_multiclass_short_circuits() {
        let form = TrainingFormParams {
            model_name: Some("churn".to_string()),
            bucket: Some("models".to_string()),
            predictor_type: Some("multiclass_classifier".to_string()),
            ..Default::default()
        };

        let err = orchestrator()
            .execute(auth(), form, "a,b\n1,2\n".as_bytes())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Validation(ValidationError::Missing("numClasses"))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_bucket_region_is_config_error() {
        let server = MockServer::start().await;

        // GetBucketLocation against the endpoint override, path-style.
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <LocationConstraint xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                 mars-north-1</LocationConstraint>",
                "application/xml",
            ))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.server.s3_endpoint = Some(server.uri());
        let orchestrator = JobOrchestrator::new(&config, Arc::new(NullNotifier));

        let form = TrainingFormParams {
            model_name: Some("churn".to_string()),
            bucket: Some("models".to_string()),
            ..Default::default()
        };

        let err = orchestrator
            .execute(auth(), form, "a,b\n1,2\n".as_bytes())
            .await
            .unwrap_err();

        // No image is published for that region: a deployment problem, not
        // an upstream rejection.
        assert!(matches!(err, AppError::Config(_)));
    }
}
