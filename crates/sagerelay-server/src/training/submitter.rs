//! Job submission against the remote compute service
//!
//! [`ComputeBackend`] is the seam between the orchestrator/poller and the
//! provider API; the production implementation wraps the SageMaker client,
//! built per request from caller-supplied credentials.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_sagemaker::{
    config::{BehaviorVersion, Credentials, Region},
    types::{
        AlgorithmSpecification, Channel, DataSource, OutputDataConfig, ResourceConfig,
        S3DataSource, S3DataType, StoppingCondition, TrainingInputMode, TrainingJobStatus,
    },
    Client,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::storage::AwsCredentials;
use crate::training::types::{RemoteJobState, RemoteJobStatus};

/// Channel name for the training dataset, also the key suffix under the
/// job's S3 prefix.
pub const TRAIN_CHANNEL: &str = "train";

/// EBS volume attached to each training instance, in gigabytes.
const VOLUME_SIZE_GB: i32 = 10;

/// Unique job name: user-chosen model name plus a millisecond timestamp, so
/// repeated submissions of the same model never collide.
pub fn job_name(model_name: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", model_name, at.timestamp_millis())
}

/// S3 object key for a job's training channel.
pub fn upload_key(job_name: &str) -> String {
    format!("{}/{}", job_name, TRAIN_CHANNEL)
}

/// Everything the provider needs to create one training job.
#[derive(Debug, Clone)]
pub struct TrainingJobSpec {
    pub job_name: String,
    pub role_arn: String,
    pub training_image: String,
    pub input_path: String,
    pub output_path: String,
    pub instance_type: String,
    pub instance_count: u32,
    pub hyper_parameters: HashMap<String, String>,
    pub max_runtime_in_seconds: u64,
}

/// Remote compute service operations used by the orchestrator and poller.
#[async_trait]
pub trait ComputeBackend: Send + Sync + 'static {
    /// Create the remote training job. Rejection means no job exists.
    async fn create_training_job(&self, spec: &TrainingJobSpec) -> Result<()>;

    /// Query current status of a previously created job.
    async fn training_job_status(&self, job_name: &str) -> Result<RemoteJobStatus>;
}

/// SageMaker implementation of [`ComputeBackend`].
pub struct SageMakerBackend {
    client: Client,
}

impl SageMakerBackend {
    pub fn for_request(credentials: &AwsCredentials, region: &str) -> Self {
        let creds = Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            None,
            None,
            "sagerelay",
        );

        let config = aws_sdk_sagemaker::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(creds)
            .region(Region::new(region.to_string()))
            .build();

        Self {
            client: Client::from_conf(config),
        }
    }
}

#[async_trait]
impl ComputeBackend for SageMakerBackend {
    #[instrument(skip(self, spec), fields(job_name = %spec.job_name))]
    async fn create_training_job(&self, spec: &TrainingJobSpec) -> Result<()> {
        debug!(?spec, "Creating training job");

        let algorithm = AlgorithmSpecification::builder()
            .training_image(&spec.training_image)
            .training_input_mode(TrainingInputMode::File)
            .build();

        let channel = Channel::builder()
            .channel_name(TRAIN_CHANNEL)
            .data_source(
                DataSource::builder()
                    .s3_data_source(
                        S3DataSource::builder()
                            .s3_data_type(S3DataType::S3Prefix)
                            .s3_uri(&spec.input_path)
                            .build(),
                    )
                    .build(),
            )
            .content_type("text/csv")
            .build();

        let resources = ResourceConfig::builder()
            .instance_type(spec.instance_type.as_str().into())
            .instance_count(spec.instance_count as i32)
            .volume_size_in_gb(VOLUME_SIZE_GB)
            .build();

        let output = OutputDataConfig::builder()
            .s3_output_path(&spec.output_path)
            .build()
            .context("Invalid output config")?;

        self.client
            .create_training_job()
            .training_job_name(&spec.job_name)
            .role_arn(&spec.role_arn)
            .algorithm_specification(algorithm)
            .set_hyper_parameters(Some(spec.hyper_parameters.clone()))
            .input_data_config(channel)
            .output_data_config(output)
            .resource_config(resources)
            .stopping_condition(
                StoppingCondition::builder()
                    .max_runtime_in_seconds(spec.max_runtime_in_seconds as i32)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| anyhow!(e.into_service_error().to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn training_job_status(&self, job_name: &str) -> Result<RemoteJobStatus> {
        let response = self
            .client
            .describe_training_job()
            .training_job_name(job_name)
            .send()
            .await
            .map_err(|e| anyhow!(e.into_service_error().to_string()))?;

        let status = response
            .training_job_status()
            .ok_or_else(|| anyhow!("Describe response carried no job status"))?;

        let remote = match status {
            TrainingJobStatus::Completed => RemoteJobStatus {
                state: RemoteJobState::Completed,
                failure_reason: None,
            },
            TrainingJobStatus::Failed => RemoteJobStatus {
                state: RemoteJobState::Failed,
                failure_reason: response.failure_reason().map(str::to_string),
            },
            // A stopped job did not complete; report it as a failure carrying
            // the status name when no reason is given.
            TrainingJobStatus::Stopped | TrainingJobStatus::Stopping => RemoteJobStatus {
                state: RemoteJobState::Failed,
                failure_reason: Some(
                    response
                        .failure_reason()
                        .unwrap_or(status.as_str())
                        .to_string(),
                ),
            },
            TrainingJobStatus::InProgress => RemoteJobStatus {
                state: RemoteJobState::InProgress,
                failure_reason: None,
            },
            other => {
                return Err(anyhow!("Unrecognized training job status: {:?}", other));
            },
        };

        Ok(remote)
    }
}

impl TrainingJobSpec {
    /// Assemble the provider job spec from validated parameters.
    pub fn build(
        params: &crate::training::params::TrainingParams,
        job_name: String,
        role_arn: String,
        training_image: String,
        feature_dim: usize,
    ) -> Self {
        let input_path = format!("s3://{}/{}", params.bucket, upload_key(&job_name));
        let output_path = format!("s3://{}", params.bucket);

        TrainingJobSpec {
            hyper_parameters: params.hyper_parameters(feature_dim),
            job_name,
            role_arn,
            training_image,
            input_path,
            output_path,
            instance_type: params.instance_type.clone(),
            instance_count: params.num_instances,
            max_runtime_in_seconds: params.max_runtime_in_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::params::{TrainingFormParams, TrainingParams};
    use chrono::TimeZone;

    #[test]
    fn test_job_name_embeds_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        assert_eq!(job_name("churn", at), format!("churn-{}", at.timestamp_millis()));
    }

    #[test]
    fn test_job_names_never_collide_across_times() {
        let first = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        let second = first + chrono::Duration::milliseconds(1);
        assert_ne!(job_name("churn", first), job_name("churn", second));
    }

    #[test]
    fn test_upload_key() {
        assert_eq!(upload_key("churn-1724846400000"), "churn-1724846400000/train");
    }

    #[test]
    fn test_spec_paths() {
        let form = TrainingFormParams {
            model_name: Some("churn".to_string()),
            bucket: Some("b1".to_string()),
            ..Default::default()
        };
        let params = TrainingParams::validate(&form).unwrap();

        let spec = TrainingJobSpec::build(
            &params,
            "churn-123".to_string(),
            "arn:aws:iam::1:role/train".to_string(),
            "host/linear-learner:1".to_string(),
            9,
        );

        assert_eq!(spec.input_path, "s3://b1/churn-123/train");
        assert_eq!(spec.output_path, "s3://b1");
        assert_eq!(spec.hyper_parameters.get("feature_dim").unwrap(), "9");
        assert_eq!(spec.max_runtime_in_seconds, 12 * 3600);
    }
}
