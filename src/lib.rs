//! Hierarchical hex-grid world generation library
//!
//! Re-exports modules for use by binaries and tools.

pub mod clusters;
pub mod config;
pub mod error;
pub mod export;
pub mod grid;
pub mod hex;
pub mod pipeline;
pub mod seeds;
pub mod storage;
pub mod streaming;
pub mod terrain;
pub mod verify;

pub use config::GenerationContext;
pub use error::{WorldError, WorldResult};
pub use pipeline::{generate_world, GeneratedWorld};
