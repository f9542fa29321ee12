//! Direct-versus-HTTP output comparison.

use crate::{
    algorithm::{run_checked, Algorithm, AlgorithmError},
    samples::SampleError,
    schema::{ParamKind, ParamValues, ParameterSchema, ValidationError},
};
use ndarray::{ArrayD, Dimension};
use serverkit_proto::{AlgorithmResult, ResultKind};
use thiserror::Error;

pub const DEFAULT_RTOL: f64 = 1e-5;
pub const DEFAULT_ATOL: f64 = 1e-8;

#[derive(Error, Debug)]
pub enum DirectRunError {
    #[error("Failed to load samples: {0}")]
    Samples(#[from] SampleError),
    #[error("No sample image available")]
    NoSamples,
    #[error("Values are missing for required parameters: {0:?}")]
    MissingValues(Vec<String>),
    #[error("Invalid parameters: {0}")]
    Validation(#[from] ValidationError),
    #[error("Algorithm error: {0}")]
    Algorithm(#[from] AlgorithmError),
}

#[derive(Error, Debug, PartialEq)]
pub enum ParityError {
    #[error("Result count differs: direct={direct}, remote={remote}")]
    CountMismatch { direct: usize, remote: usize },
    #[error("Result {index}: kind differs (direct={direct}, remote={remote})")]
    KindMismatch {
        index: usize,
        direct: ResultKind,
        remote: ResultKind,
    },
    #[error("Result {index}: data shape differs (direct={direct:?}, remote={remote:?})")]
    ShapeMismatch {
        index: usize,
        direct: Vec<usize>,
        remote: Vec<usize>,
    },
    #[error("Result {index}: data differs at {position:?} (direct={direct}, remote={remote})")]
    DataMismatch {
        index: usize,
        position: Vec<usize>,
        direct: f32,
        remote: f32,
    },
}

/// Schema defaults with `sample` substituted for every image field that has
/// no default of its own.
pub fn default_request(
    schema: &ParameterSchema,
    sample: &ArrayD<f32>,
) -> Result<ParamValues, DirectRunError> {
    let mut values = schema.default_values();
    for spec in schema.specs() {
        if matches!(spec.kind, ParamKind::Image { .. }) && !values.contains(&spec.name) {
            values.insert(&spec.name, sample.clone());
        }
    }

    let missing: Vec<String> = schema
        .specs()
        .iter()
        .filter(|spec| !values.contains(&spec.name))
        .map(|spec| spec.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(DirectRunError::MissingValues(missing));
    }

    Ok(values)
}

/// Runs the algorithm in-process on its first sample image with default
/// parameters.
pub fn direct_run<A: Algorithm>(algorithm: &A) -> Result<Vec<AlgorithmResult>, DirectRunError> {
    let sample = algorithm
        .load_samples()?
        .into_iter()
        .next()
        .ok_or(DirectRunError::NoSamples)?;

    let values = default_request(algorithm.schema(), &sample)?;
    let params = algorithm.validate_values(values)?;

    Ok(run_checked(algorithm, &params)?)
}

pub fn compare_outputs(
    direct: &[AlgorithmResult],
    remote: &[AlgorithmResult],
) -> Result<(), ParityError> {
    compare_outputs_with(direct, remote, DEFAULT_RTOL, DEFAULT_ATOL)
}

/// Kinds must match exactly; data must match element-wise within
/// `atol + rtol * |remote|`. NaN never matches.
pub fn compare_outputs_with(
    direct: &[AlgorithmResult],
    remote: &[AlgorithmResult],
    rtol: f64,
    atol: f64,
) -> Result<(), ParityError> {
    if direct.len() != remote.len() {
        return Err(ParityError::CountMismatch {
            direct: direct.len(),
            remote: remote.len(),
        });
    }

    for (index, (ours, theirs)) in direct.iter().zip(remote).enumerate() {
        if ours.kind != theirs.kind {
            return Err(ParityError::KindMismatch {
                index,
                direct: ours.kind,
                remote: theirs.kind,
            });
        }

        if ours.data.shape() != theirs.data.shape() {
            return Err(ParityError::ShapeMismatch {
                index,
                direct: ours.data.shape().to_vec(),
                remote: theirs.data.shape().to_vec(),
            });
        }

        let mismatch = ours
            .data
            .indexed_iter()
            .zip(theirs.data.iter())
            .find(|((_, a), b)| !is_close(**a, **b, rtol, atol));

        if let Some(((position, &a), &b)) = mismatch {
            return Err(ParityError::DataMismatch {
                index,
                position: position.slice().to_vec(),
                direct: a,
                remote: b,
            });
        }
    }

    Ok(())
}

fn is_close(a: f32, b: f32, rtol: f64, atol: f64) -> bool {
    let (a, b) = (f64::from(a), f64::from(b));
    (a - b).abs() <= atol + rtol * b.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::ThresholdAlgorithm;
    use image::{ImageBuffer, Luma};
    use ndarray::array;

    fn labels(data: ArrayD<f32>) -> AlgorithmResult {
        AlgorithmResult::new(data, ResultKind::Labels)
    }

    #[test]
    fn test_identical_outputs_match() {
        let outputs = vec![labels(array![[0.0f32, 1.0], [1.0, 0.0]].into_dyn())];
        assert_eq!(compare_outputs(&outputs, &outputs.clone()), Ok(()));
    }

    #[test]
    fn test_small_numeric_noise_is_tolerated() {
        let direct = vec![labels(array![[100.0f32, 1.0]].into_dyn())];
        let remote = vec![labels(array![[100.0005f32, 1.0]].into_dyn())];
        assert_eq!(compare_outputs(&direct, &remote), Ok(()));
    }

    #[test]
    fn test_kind_mismatch_names_field() {
        let direct = vec![labels(array![[0.0f32]].into_dyn())];
        let remote = vec![AlgorithmResult::new(
            array![[0.0f32]].into_dyn(),
            ResultKind::Mask,
        )];

        let err = compare_outputs(&direct, &remote).unwrap_err();

        assert_eq!(
            err,
            ParityError::KindMismatch {
                index: 0,
                direct: ResultKind::Labels,
                remote: ResultKind::Mask
            }
        );
        assert!(err.to_string().contains("kind differs"));
    }

    #[test]
    fn test_data_mismatch_reports_position() {
        let direct = vec![labels(array![[0.0f32, 1.0], [1.0, 0.0]].into_dyn())];
        let remote = vec![labels(array![[0.0f32, 1.0], [0.0, 0.0]].into_dyn())];

        assert_eq!(
            compare_outputs(&direct, &remote),
            Err(ParityError::DataMismatch {
                index: 0,
                position: vec![1, 0],
                direct: 1.0,
                remote: 0.0
            })
        );
    }

    #[test]
    fn test_shape_and_count_mismatch() {
        let direct = vec![labels(array![[0.0f32, 1.0]].into_dyn())];
        let remote = vec![labels(array![[0.0f32], [1.0]].into_dyn())];
        assert!(matches!(
            compare_outputs(&direct, &remote),
            Err(ParityError::ShapeMismatch { index: 0, .. })
        ));
        assert_eq!(
            compare_outputs(&direct, &[]),
            Err(ParityError::CountMismatch {
                direct: 1,
                remote: 0
            })
        );
    }

    #[test]
    fn test_direct_run_uses_first_sample_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        ImageBuffer::<Luma<u8>, Vec<u8>>::from_fn(6, 4, |x, _| Luma([x as u8]))
            .save(dir.path().join("a.png"))
            .unwrap();
        ImageBuffer::<Luma<u8>, Vec<u8>>::from_pixel(2, 2, Luma([0]))
            .save(dir.path().join("b.png"))
            .unwrap();

        let results = direct_run(&ThresholdAlgorithm::new("threshold", dir.path())).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].data.shape(), &[4, 6]);
        assert_eq!(results[0].data[[0, 0]], 0.0);
        assert_eq!(results[0].data[[0, 1]], 1.0);
    }

    #[test]
    fn test_direct_run_without_samples() {
        let dir = tempfile::tempdir().unwrap();
        let err = direct_run(&ThresholdAlgorithm::new("threshold", dir.path())).unwrap_err();
        assert!(matches!(err, DirectRunError::Samples(SampleError::Empty(_))));
    }
}
