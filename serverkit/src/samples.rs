use image::ImageReader;
use ndarray::ArrayD;
use serverkit_proto::{image_to_array, CodecError};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Sample directory not found: {0:?}")]
    MissingDirectory(PathBuf),
    #[error("No sample images in {0:?}")]
    Empty(PathBuf),
    #[error("Failed to read samples: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode sample {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to convert sample: {0}")]
    Codec(#[from] CodecError),
}

/// Loads every image file of `dir`, ordered by file name. Hidden files are
/// skipped.
pub fn load_sample_images(dir: &Path) -> Result<Vec<ArrayD<f32>>, SampleError> {
    if !dir.is_dir() {
        return Err(SampleError::MissingDirectory(dir.to_path_buf()));
    }

    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|path| path.is_file() && !is_hidden(path));
    paths.sort();

    if paths.is_empty() {
        return Err(SampleError::Empty(dir.to_path_buf()));
    }

    paths
        .iter()
        .map(|path| -> Result<ArrayD<f32>, SampleError> {
            let image = ImageReader::open(path)?
                .with_guessed_format()?
                .decode()
                .map_err(|source| SampleError::Decode {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!("Loaded sample {:?} ({}x{})", path, image.width(), image.height());
            Ok(image_to_array(&image)?)
        })
        .collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}
