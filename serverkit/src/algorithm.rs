use crate::{
    samples::SampleError,
    schema::{ParamValues, ParameterSchema, ValidationError},
};
use ndarray::ArrayD;
use serde_json::Value;
use serverkit_proto::AlgorithmResult;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlgorithmError {
    #[error("Algorithm produced no results")]
    NoResults,
    #[error("Algorithm failed: {0}")]
    Failed(String),
}

/// An image-processing algorithm served by [`crate::server::AlgorithmServer`].
///
/// Implementations declare their inputs through [`Algorithm::schema`], turn
/// validated values into a typed parameter struct in [`Algorithm::parse`] and
/// do the actual work in [`Algorithm::run`], which must not keep state
/// between calls.
pub trait Algorithm: Send + Sync + 'static {
    type Params: Send + 'static;

    fn name(&self) -> &str;

    fn schema(&self) -> &ParameterSchema;

    fn parse(&self, values: ParamValues) -> Result<Self::Params, ValidationError>;

    fn run(&self, params: &Self::Params) -> Result<Vec<AlgorithmResult>, AlgorithmError>;

    fn load_samples(&self) -> Result<Vec<ArrayD<f32>>, SampleError>;

    fn validate(&self, raw: &Value) -> Result<Self::Params, ValidationError> {
        let values = self.schema().validate(raw)?;
        self.parse(values)
    }

    fn validate_values(&self, values: ParamValues) -> Result<Self::Params, ValidationError> {
        let values = self.schema().validate_values(values)?;
        self.parse(values)
    }
}

/// Runs the algorithm and enforces that it produced at least one result.
pub fn run_checked<A: Algorithm>(
    algorithm: &A,
    params: &A::Params,
) -> Result<Vec<AlgorithmResult>, AlgorithmError> {
    let results = algorithm.run(params)?;
    if results.is_empty() {
        tracing::error!("Algorithm {} returned no results", algorithm.name());
        return Err(AlgorithmError::NoResults);
    }
    Ok(results)
}
