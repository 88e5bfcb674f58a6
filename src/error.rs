//! Errors for the I/O edges of the generator.
//!
//! Generation itself never fails with an error: a step that cannot produce
//! anything logs why and hands back `None` or an empty collection. This type
//! only covers loading configuration, persisting snapshots and exporting
//! images.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum WorldError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error in {path}: {message}")]
    Deserialization { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Image export error: {0}")]
    Image(#[from] image::ImageError),
}

impl WorldError {
    pub fn config<T: ToString>(msg: T) -> Self {
        WorldError::Config(msg.to_string())
    }

    pub fn serialization<T: ToString>(msg: T) -> Self {
        WorldError::Serialization(msg.to_string())
    }
}

pub type WorldResult<T> = Result<T, WorldError>;
