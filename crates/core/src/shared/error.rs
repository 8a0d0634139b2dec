use std::path::PathBuf;

use thiserror::Error;

/// Failures that end a processing run.
///
/// Per-frame refinement and remux failures are recovered where they happen
/// and never surface here.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("video not found: {0}")]
    InputNotFound(PathBuf),
    #[error("could not open video {path}: {message}")]
    DecodeOpen { path: PathBuf, message: String },
    #[error("could not create output {path}: {message}")]
    EncodeOpen { path: PathBuf, message: String },
    #[error("segmentation model unavailable: {0}")]
    Capability(String),
    #[error("frame {index}: {message}")]
    Frame { index: usize, message: String },
    #[error("write failed: {0}")]
    Write(String),
    #[error("pipeline error: {0}")]
    Pipeline(String),
}
