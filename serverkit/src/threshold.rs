use crate::{
    algorithm::{Algorithm, AlgorithmError},
    config::AlgorithmConfig,
    samples::{load_sample_images, SampleError},
    schema::{FieldError, ParamValues, ParameterSchema, ParameterSpec, ValidationError},
};
use ndarray::ArrayD;
use serverkit_proto::{AlgorithmResult, ResultKind};
use std::path::PathBuf;
use strum::{Display, EnumString, VariantNames};
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum ModelName {
    Model1,
    Model2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdParams {
    pub image: ArrayD<f32>,
    pub model_name: ModelName,
    pub threshold: f64,
}

/// Template algorithm: labels every pixel strictly above the threshold.
/// Replace [`Algorithm::run`] with real processing.
pub struct ThresholdAlgorithm {
    name: String,
    schema: ParameterSchema,
    sample_dir: PathBuf,
}

impl ThresholdAlgorithm {
    pub fn new(name: &str, sample_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            schema: threshold_schema(),
            sample_dir: sample_dir.into(),
        }
    }

    pub fn from_config(config: &AlgorithmConfig) -> Self {
        Self::new(&config.name, config.sample_dir.clone())
    }
}

fn threshold_schema() -> ParameterSchema {
    ParameterSchema::new("Parameters")
        .field(
            ParameterSpec::image("image")
                .title("Image")
                .description("Input image (2D, 3D)."),
        )
        .field(
            ParameterSpec::choice("model_name", ModelName::VARIANTS)
                .title("Model")
                .description("Model description.")
                .with_default(ModelName::Model1.to_string()),
        )
        .field(
            ParameterSpec::float("threshold", 0.0, 255.0)
                .title("Threshold")
                .step(1.0)
                .with_default(0.5),
        )
}

impl Algorithm for ThresholdAlgorithm {
    type Params = ThresholdParams;

    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    fn parse(&self, mut values: ParamValues) -> Result<ThresholdParams, ValidationError> {
        let image = values.take_image("image")?;
        let model_name = values
            .take_str("model_name")?
            .parse::<ModelName>()
            .map_err(|e| FieldError::new("model_name", e.to_string()))?;
        let threshold = values.take_float("threshold")?;

        Ok(ThresholdParams {
            image,
            model_name,
            threshold,
        })
    }

    #[instrument(skip(self, params), fields(model = %params.model_name, threshold = params.threshold))]
    fn run(&self, params: &ThresholdParams) -> Result<Vec<AlgorithmResult>, AlgorithmError> {
        let segmentation = params
            .image
            .mapv(|value| if f64::from(value) > params.threshold { 1.0f32 } else { 0.0 });

        tracing::debug!("Segmented image of shape {:?}", segmentation.shape());

        Ok(vec![AlgorithmResult::new(segmentation, ResultKind::Labels)
            .with_metadata("name", "Threshold result")])
    }

    fn load_samples(&self) -> Result<Vec<ArrayD<f32>>, SampleError> {
        load_sample_images(&self.sample_dir)
    }
}
