//! Transport encoding for N-dimensional arrays.
//!
//! Arrays travel as base64 text. The payload is either a raw array frame
//! (`SKA1` magic, `u32` dimension count, `u64` dimensions, `f32` samples, all
//! little-endian, row-major) or the bytes of an image file, which is decoded
//! with the `image` crate.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageReader};
use ndarray::{ArrayD, IxDyn};
use std::io::Cursor;
use thiserror::Error;

const MAGIC: &[u8; 4] = b"SKA1";
const MAX_DIMENSIONS: usize = 32;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Truncated array header")]
    TruncatedHeader,
    #[error("Array has too many dimensions: {0}")]
    TooManyDimensions(usize),
    #[error("Array data holds {actual} bytes, shape {shape:?} needs {expected}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid array shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Failed to read image bytes: {0}")]
    Io(#[from] std::io::Error),
}

pub fn encode_array(array: &ArrayD<f32>) -> String {
    let mut frame = Vec::with_capacity(8 + array.ndim() * 8 + array.len() * 4);
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&(array.ndim() as u32).to_le_bytes());
    for &dim in array.shape() {
        frame.extend_from_slice(&(dim as u64).to_le_bytes());
    }
    for value in array.iter() {
        frame.extend_from_slice(&value.to_le_bytes());
    }
    STANDARD.encode(frame)
}

pub fn decode_array(encoded: &str) -> Result<ArrayD<f32>, CodecError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    match bytes.strip_prefix(MAGIC) {
        Some(frame) => decode_frame(frame),
        None => decode_image_bytes(&bytes),
    }
}

fn take<const N: usize>(bytes: &mut &[u8]) -> Result<[u8; N], CodecError> {
    let (head, tail) = bytes
        .split_first_chunk::<N>()
        .ok_or(CodecError::TruncatedHeader)?;
    *bytes = tail;
    Ok(*head)
}

fn decode_frame(mut frame: &[u8]) -> Result<ArrayD<f32>, CodecError> {
    let ndim = u32::from_le_bytes(take::<4>(&mut frame)?) as usize;
    if ndim > MAX_DIMENSIONS {
        return Err(CodecError::TooManyDimensions(ndim));
    }

    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        let dim = u64::from_le_bytes(take::<8>(&mut frame)?);
        shape.push(usize::try_from(dim).map_err(|_| CodecError::TruncatedHeader)?);
    }

    let expected = shape
        .iter()
        .try_fold(4usize, |acc, &dim| acc.checked_mul(dim));
    if expected != Some(frame.len()) {
        return Err(CodecError::LengthMismatch {
            shape,
            expected: expected.unwrap_or(usize::MAX),
            actual: frame.len(),
        });
    }

    let mut values = Vec::with_capacity(frame.len() / 4);
    values.extend(
        frame
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
    );

    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
}

fn decode_image_bytes(bytes: &[u8]) -> Result<ArrayD<f32>, CodecError> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    image_to_array(&image)
}

fn widen<T: Copy + Into<f32>>(samples: &[T]) -> Vec<f32> {
    samples.iter().map(|&sample| sample.into()).collect()
}

/// Converts a decoded image into an `(H, W)` array for single-channel images
/// and an `(H, W, C)` array otherwise. Sample values keep their native range.
pub fn image_to_array(image: &DynamicImage) -> Result<ArrayD<f32>, CodecError> {
    let (width, height) = (image.width() as usize, image.height() as usize);

    let (channels, samples) = match image {
        DynamicImage::ImageLuma8(buffer) => (1, widen(buffer.as_raw())),
        DynamicImage::ImageLumaA8(buffer) => (2, widen(buffer.as_raw())),
        DynamicImage::ImageRgb8(buffer) => (3, widen(buffer.as_raw())),
        DynamicImage::ImageRgba8(buffer) => (4, widen(buffer.as_raw())),
        DynamicImage::ImageLuma16(buffer) => (1, widen(buffer.as_raw())),
        DynamicImage::ImageLumaA16(buffer) => (2, widen(buffer.as_raw())),
        DynamicImage::ImageRgb16(buffer) => (3, widen(buffer.as_raw())),
        DynamicImage::ImageRgba16(buffer) => (4, widen(buffer.as_raw())),
        DynamicImage::ImageRgb32F(buffer) => (3, buffer.as_raw().clone()),
        DynamicImage::ImageRgba32F(buffer) => (4, buffer.as_raw().clone()),
        other => (4, other.to_rgba32f().into_raw()),
    };

    let shape = if channels == 1 {
        vec![height, width]
    } else {
        vec![height, width, channels]
    };

    Ok(ArrayD::from_shape_vec(IxDyn(&shape), samples)?)
}
