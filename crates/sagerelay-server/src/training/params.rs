//! Form parameter validation
//!
//! Raw query parameters become a [`TrainingParams`] value or a
//! parameter-identifying [`ValidationError`]. Validation runs before any
//! side effect: on failure nothing has been uploaded or submitted.

use serde::Deserialize;
use std::collections::HashMap;

/// Instance types the remote compute service accepts for training.
pub const INSTANCE_TYPES: &[&str] = &[
    "ml.m4.xlarge",
    "ml.m4.2xlarge",
    "ml.m4.4xlarge",
    "ml.m4.10xlarge",
    "ml.m4.16xlarge",
    "ml.m5.large",
    "ml.m5.xlarge",
    "ml.m5.2xlarge",
    "ml.m5.4xlarge",
    "ml.m5.12xlarge",
    "ml.m5.24xlarge",
    "ml.c4.xlarge",
    "ml.c4.2xlarge",
    "ml.c4.4xlarge",
    "ml.c4.8xlarge",
    "ml.c5.xlarge",
    "ml.c5.2xlarge",
    "ml.c5.4xlarge",
    "ml.c5.9xlarge",
    "ml.c5.18xlarge",
    "ml.p2.xlarge",
    "ml.p2.8xlarge",
    "ml.p2.16xlarge",
    "ml.p3.2xlarge",
    "ml.p3.8xlarge",
    "ml.p3.16xlarge",
];

pub const NUM_CLASSES_RANGE: (u32, u32) = (3, 1_000_000);
pub const NUM_INSTANCES_RANGE: (u32, u32) = (1, 500);
pub const EPOCHS_RANGE: (u32, u32) = (1, 1_000_000);
pub const MAX_RUNTIME_HOURS_RANGE: (u32, u32) = (1, 72);

pub const DEFAULT_NUM_INSTANCES: u32 = 1;
pub const DEFAULT_EPOCHS: u32 = 15;
pub const DEFAULT_MAX_RUNTIME_HOURS: u32 = 12;
pub const DEFAULT_INSTANCE_TYPE: &str = "ml.m4.xlarge";

/// Raw form selections as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainingFormParams {
    #[serde(rename = "modelName")]
    pub model_name: Option<String>,
    pub bucket: Option<String>,
    #[serde(rename = "awsInstanceType")]
    pub aws_instance_type: Option<String>,
    #[serde(rename = "predictorType")]
    pub predictor_type: Option<String>,
    #[serde(rename = "numClasses")]
    pub num_classes: Option<String>,
    #[serde(rename = "numInstances")]
    pub num_instances: Option<String>,
    pub epochs: Option<String>,
    #[serde(rename = "maxRuntimeInHours")]
    pub max_runtime_in_hours: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required param: {0}")]
    Missing(&'static str),
    #[error("Param {param}: {value} is not a number")]
    NotNumeric { param: &'static str, value: String },
    #[error("Param {param}: {value} is out of range: {min} - {max}")]
    OutOfRange {
        param: &'static str,
        value: String,
        min: u32,
        max: u32,
    },
    #[error("Param awsInstanceType: {0} is not a supported instance type")]
    UnknownInstanceType(String),
    #[error("Param predictorType: {0} is not a supported predictor type")]
    UnknownPredictorType(String),
    #[error("Dataset header must declare at least 2 fields, found {0}")]
    TooFewFields(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorType {
    BinaryClassifier,
    MulticlassClassifier,
    Regressor,
}

impl PredictorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictorType::BinaryClassifier => "binary_classifier",
            PredictorType::MulticlassClassifier => "multiclass_classifier",
            PredictorType::Regressor => "regressor",
        }
    }
}

impl std::str::FromStr for PredictorType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary_classifier" => Ok(PredictorType::BinaryClassifier),
            "multiclass_classifier" => Ok(PredictorType::MulticlassClassifier),
            "regressor" => Ok(PredictorType::Regressor),
            other => Err(ValidationError::UnknownPredictorType(other.to_string())),
        }
    }
}

/// Fully validated parameter set for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingParams {
    pub model_name: String,
    pub bucket: String,
    pub instance_type: String,
    pub predictor_type: PredictorType,
    /// Present only when `predictor_type` is multiclass_classifier.
    pub num_classes: Option<u32>,
    pub num_instances: u32,
    pub epochs: u32,
    pub max_runtime_in_hours: u32,
}

impl TrainingParams {
    /// Validate raw form selections.
    pub fn validate(form: &TrainingFormParams) -> Result<Self, ValidationError> {
        let model_name = required_string(&form.model_name, "modelName")?;
        let bucket = required_string(&form.bucket, "bucket")?;

        let instance_type = match &form.aws_instance_type {
            Some(v) if !v.trim().is_empty() => v.clone(),
            _ => DEFAULT_INSTANCE_TYPE.to_string(),
        };
        if !INSTANCE_TYPES.contains(&instance_type.as_str()) {
            return Err(ValidationError::UnknownInstanceType(instance_type));
        }

        let predictor_type = match &form.predictor_type {
            Some(v) if !v.trim().is_empty() => v.parse()?,
            _ => PredictorType::BinaryClassifier,
        };

        // numClasses is required in the multiclass branch and never defaults;
        // for other predictor kinds it is ignored even if present.
        let num_classes = match predictor_type {
            PredictorType::MulticlassClassifier => Some(numeric_param(
                &form.num_classes,
                "numClasses",
                NUM_CLASSES_RANGE,
                None,
            )?),
            _ => None,
        };

        let num_instances = numeric_param(
            &form.num_instances,
            "numInstances",
            NUM_INSTANCES_RANGE,
            Some(DEFAULT_NUM_INSTANCES),
        )?;
        let epochs = numeric_param(&form.epochs, "epochs", EPOCHS_RANGE, Some(DEFAULT_EPOCHS))?;
        let max_runtime_in_hours = numeric_param(
            &form.max_runtime_in_hours,
            "maxRuntimeInHours",
            MAX_RUNTIME_HOURS_RANGE,
            Some(DEFAULT_MAX_RUNTIME_HOURS),
        )?;

        Ok(TrainingParams {
            model_name,
            bucket,
            instance_type,
            predictor_type,
            num_classes,
            num_instances,
            epochs,
            max_runtime_in_hours,
        })
    }

    pub fn max_runtime_in_seconds(&self) -> u64 {
        u64::from(self.max_runtime_in_hours) * 60 * 60
    }

    /// Algorithm hyperparameters for a dataset with `feature_dim` features.
    ///
    /// `num_classes` appears only for the multiclass predictor.
    pub fn hyper_parameters(&self, feature_dim: usize) -> HashMap<String, String> {
        let mut hp = HashMap::from([
            (
                "predictor_type".to_string(),
                self.predictor_type.as_str().to_string(),
            ),
            ("feature_dim".to_string(), feature_dim.to_string()),
            ("epochs".to_string(), self.epochs.to_string()),
        ]);

        if let Some(num_classes) = self.num_classes {
            hp.insert("num_classes".to_string(), num_classes.to_string());
        }

        hp
    }
}

fn required_string(
    value: &Option<String>,
    param: &'static str,
) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(ValidationError::Missing(param)),
    }
}

fn numeric_param(
    value: &Option<String>,
    param: &'static str,
    (min, max): (u32, u32),
    default: Option<u32>,
) -> Result<u32, ValidationError> {
    let raw = match value {
        Some(v) if !v.trim().is_empty() => v.trim(),
        _ => {
            return default.ok_or(ValidationError::Missing(param));
        },
    };

    let num: u32 = raw
        .parse()
        .map_err(|_| ValidationError::NotNumeric {
            param,
            value: raw.to_string(),
        })?;

    if num < min || num > max {
        return Err(ValidationError::OutOfRange {
            param,
            value: raw.to_string(),
            min,
            max,
        });
    }

    Ok(num)
}
