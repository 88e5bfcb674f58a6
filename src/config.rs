//! Tunable parameters for every generation step.
//!
//! A [`GenerationContext`] is built once (defaults, or a JSON file) and
//! passed by reference into each tier build, growth call and terrain pass.

use std::fs;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clusters::SearchPriority;
use crate::error::{WorldError, WorldResult};
use crate::grid::Tier;
use crate::terrain::NoiseBlendPolicy;

/// Circumradius of the hexagons at each tier, in world units.
///
/// Consecutive tiers should differ by an integer ratio so that parent
/// centers land on the child lattice. A ratio of 3 gives exactly seven
/// children per parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierSizes {
    pub region: f32,
    pub area: f32,
    pub worldspace: f32,
    pub sub_cell: f32,
    pub micro_cell: f32,
}

impl Default for TierSizes {
    fn default() -> Self {
        Self {
            region: 972.0,
            area: 324.0,
            worldspace: 108.0,
            sub_cell: 12.0,
            micro_cell: 4.0,
        }
    }
}

impl TierSizes {
    pub fn size_of(&self, tier: Tier) -> f32 {
        match tier {
            Tier::Region => self.region,
            Tier::Area => self.area,
            Tier::Worldspace => self.worldspace,
            Tier::SubCell => self.sub_cell,
            Tier::MicroCell => self.micro_cell,
        }
    }
}

/// Vertical stacking of sub-cells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerParams {
    /// Underground layers under each ground cell
    pub layers_below: u32,
    /// Above-ground layers over each ground cell
    pub layers_above: u32,
    /// Height of one layer in world units
    pub cell_layer_elevation: f32,
    /// Derive each column's ground layer from terrain noise instead of
    /// pinning every column to layer 0
    pub ground_from_elevation: bool,
    /// Clamp on |ground layer| when derived from elevation
    pub max_ground_layer: i32,
}

impl Default for LayerParams {
    fn default() -> Self {
        Self {
            layers_below: 2,
            layers_above: 1,
            cell_layer_elevation: 4.0,
            ground_from_elevation: false,
            max_ground_layer: 4,
        }
    }
}

/// Surface cluster growth (outposts, random clusters, paths).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Members per cluster, `[min, max)`
    pub member_count_min: usize,
    pub member_count_max: usize,
    /// Radius window for the expanding selection, `[min, max)`
    pub search_radius_min: f32,
    pub search_radius_max: f32,
    /// Upper bound on clusters per random pass
    pub cluster_count_max: usize,
    /// Keep clusters away from parent-boundary and frontier cells
    pub exclude_edge: bool,
    /// Path search refuses to step on edge cells
    pub path_ignores_edge_cells: bool,
    pub priority: SearchPriority,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            member_count_min: 4,
            member_count_max: 8,
            search_radius_min: 24.0,
            search_radius_max: 72.0,
            cluster_count_max: 4,
            exclude_edge: true,
            path_ignores_edge_cells: false,
            priority: SearchPriority::SideNeighbors,
        }
    }
}

impl ClusterParams {
    pub fn member_range(&self) -> Range<usize> {
        self.member_count_min..self.member_count_max
    }

    pub fn search_radius_range(&self) -> Range<f32> {
        self.search_radius_min..self.search_radius_max
    }
}

/// Underground tunnel growth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelParams {
    pub max_members: usize,
    pub priority: SearchPriority,
    /// Tunnels retrofitted under surface clusters per world
    pub tunnel_count: usize,
}

impl Default for TunnelParams {
    fn default() -> Self {
        Self {
            max_members: 8,
            priority: SearchPriority::SideNeighbors,
            tunnel_count: 2,
        }
    }
}

/// Fractal noise and vertex grid settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    /// World units between neighbouring vertices
    pub steps: u32,
    /// Number of noise octaves
    pub octaves: u32,
    /// Amplitude decay per octave (0.0-1.0)
    pub persistence: f64,
    /// Frequency multiplier per octave. Accepted but not applied: every
    /// octave samples at `frequency`.
    pub lacunarity: f64,
    /// Sampling frequency for noise coordinates
    pub frequency: f64,
    /// Amplitude of the first octave, in world units
    pub amplitude: f64,
    /// Elevation below which a ground column is underwater
    pub sea_level: f32,
    pub blend_policy: NoiseBlendPolicy,
    /// Edge length of a terrain chunk in world units
    pub chunk_size: f32,
    /// Smoothing passes over the soft terraform band
    pub smoothing_passes: u32,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            steps: 2,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            frequency: 0.013,
            amplitude: 24.0,
            sea_level: -12.0,
            blend_policy: NoiseBlendPolicy::PlateauWithBand,
            chunk_size: 108.0,
            smoothing_passes: 1,
        }
    }
}

/// Focus tracking for world streaming.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingParams {
    /// Displacement required before the active set is recomputed
    pub min_move_distance: f32,
    /// Worldspaces whose center is within this radius are active
    pub active_radius: f32,
}

impl Default for StreamingParams {
    fn default() -> Self {
        Self {
            min_move_distance: 24.0,
            active_radius: 240.0,
        }
    }
}

/// Every knob a generation run reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationContext {
    /// Master seed; per-system seeds are derived from it
    pub seed: u64,
    /// Rings of regions around the origin region
    pub region_rings: u32,
    /// Worldspaces that receive sub-cells during the bootstrap pass
    pub worldspace_fill_count: usize,
    pub tiers: TierSizes,
    pub layers: LayerParams,
    pub clusters: ClusterParams,
    pub tunnels: TunnelParams,
    pub terrain: TerrainParams,
    pub streaming: StreamingParams,
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self {
            seed: 42,
            region_rings: 0,
            worldspace_fill_count: 7,
            tiers: TierSizes::default(),
            layers: LayerParams::default(),
            clusters: ClusterParams::default(),
            tunnels: TunnelParams::default(),
            terrain: TerrainParams::default(),
            streaming: StreamingParams::default(),
        }
    }
}

impl GenerationContext {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn cell_size(&self, tier: Tier) -> f32 {
        self.tiers.size_of(tier)
    }

    /// Reject parameter combinations the generators cannot honour.
    pub fn validate(&self) -> WorldResult<()> {
        let mut previous: Option<(Tier, f32)> = None;
        for tier in Tier::ALL {
            let size = self.tiers.size_of(tier);
            if size <= 0.0 {
                return Err(WorldError::config(format!("{} size must be positive", tier)));
            }
            if let Some((parent, parent_size)) = previous {
                if size >= parent_size {
                    return Err(WorldError::config(format!(
                        "{} size {} must be smaller than {} size {}",
                        tier, size, parent, parent_size
                    )));
                }
            }
            previous = Some((tier, size));
        }
        if self.clusters.member_count_min >= self.clusters.member_count_max {
            return Err(WorldError::config("cluster member range is empty"));
        }
        if self.clusters.search_radius_min >= self.clusters.search_radius_max {
            return Err(WorldError::config("cluster search radius range is empty"));
        }
        if self.terrain.steps == 0 {
            return Err(WorldError::config("terrain steps must be at least 1"));
        }
        if self.terrain.chunk_size <= 0.0 {
            return Err(WorldError::config("terrain chunk size must be positive"));
        }
        if self.layers.cell_layer_elevation <= 0.0 {
            return Err(WorldError::config("cell layer elevation must be positive"));
        }
        Ok(())
    }

    /// Load a context from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> WorldResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let ctx: GenerationContext =
            serde_json::from_str(&text).map_err(|e| WorldError::Deserialization {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        ctx.validate()?;
        Ok(ctx)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> WorldResult<()> {
        let text = serde_json::to_string_pretty(self).map_err(WorldError::serialization)?;
        fs::write(path, text)?;
        Ok(())
    }
}
