//! Terrain vertex grid: fractal noise, terraform blending and chunking.

pub mod chunks;
pub mod generator;
pub mod noise;
pub mod vertex;

use serde::{Deserialize, Serialize};

pub use chunks::{partition_chunks, regenerate_chunk, ChunkIndex, TerrainChunk};
pub use generator::{generate_vertex_grid, smooth_blend_band, TerraformIndex, TerraformSite, SiteKind};
pub use noise::{noise_height, round_to_step, TerrainNoise};
pub use vertex::{TerrainBounds, TerrainVertex, VertexGrid, VertexKey, VertexType};

/// How terraform sites override raw noise near them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseBlendPolicy {
    /// Ignore terraform sites
    Raw,
    /// Flat plateau within one cell size, raw noise outside
    Plateau,
    /// Plateau plus a 50% blend band out to 1.75 cell sizes
    #[default]
    PlateauWithBand,
    /// Plateau plus a smoothstep falloff across the band
    SmoothFalloff,
}
