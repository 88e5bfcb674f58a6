//! Elevation pass over the vertex grid.
//!
//! Raw fractal noise everywhere, overridden near terraform sites: the
//! ground sub-cells that clusters have claimed. Inside a site's radius the
//! terrain is a flat plateau at the site's noise height rounded to a whole
//! layer; in the band just outside it the plateau is blended into the raw
//! noise according to the configured [`NoiseBlendPolicy`].

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clusters::ClusterType;
use crate::config::GenerationContext;
use crate::grid::{CellStatus, WorldIndex};
use crate::hex::{self, Lookup};

use super::noise::TerrainNoise;
use super::vertex::{TerrainBounds, VertexGrid, VertexKey, VertexType};
use super::NoiseBlendPolicy;

/// Hard terraform radius, in site sizes.
const PLATEAU_RADIUS: f32 = 1.0;
/// Outer edge of the blend band, in site sizes.
const BAND_RADIUS: f32 = 1.75;
/// Blend weight of the plateau inside the band.
const BAND_BLEND: f32 = 0.5;
/// Movement, in worldspace sizes, before the nearby-site list is refreshed.
const CACHE_REFRESH_FRACTION: f32 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteKind {
    Plain,
    Road,
    TunnelEntry,
}

/// One claimed ground sub-cell the terrain flattens around.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerraformSite {
    pub center: Vec3,
    pub size: f32,
    /// Noise height at the center, rounded to a whole layer
    pub plateau: f32,
    pub kind: SiteKind,
}

/// Terraform sites grouped by the worldspace that owns them.
#[derive(Clone, Debug, Default)]
pub struct TerraformIndex {
    worldspace_size: f32,
    sites: Vec<TerraformSite>,
    by_world_space: BTreeMap<Lookup, Vec<usize>>,
}

impl TerraformIndex {
    pub fn new(worldspace_size: f32) -> Self {
        Self {
            worldspace_size,
            ..Default::default()
        }
    }

    /// Collect every active ground sub-cell that belongs to a non-edge
    /// cluster or opens into a tunnel.
    pub fn from_world(index: &WorldIndex, noise: &TerrainNoise, ctx: &GenerationContext) -> Self {
        let mut terraform = Self::new(ctx.tiers.worldspace);
        let step = ctx.layers.cell_layer_elevation;

        for cell in index.sub_cells.cells() {
            if !cell.is_active() || cell.status != CellStatus::Ground {
                continue;
            }
            let cluster = match cell.cluster_id.and_then(|id| index.clusters.get(id)) {
                Some(cluster) => cluster,
                None => continue,
            };
            // Edge rims stay natural terrain.
            if cluster.cluster_type == ClusterType::Edge && !cell.is_tunnel_ground_entry {
                continue;
            }
            let kind = if cell.is_tunnel_ground_entry {
                SiteKind::TunnelEntry
            } else if cluster.cluster_type == ClusterType::Path {
                SiteKind::Road
            } else {
                SiteKind::Plain
            };
            let world_space = cell
                .world_space_lookup
                .unwrap_or_else(|| hex::lookup_key(cell.center, ctx.tiers.worldspace));
            terraform.add(
                world_space,
                TerraformSite {
                    center: cell.center,
                    size: cell.size,
                    plateau: noise.plateau_height(cell.center, step),
                    kind,
                },
            );
        }

        info!(
            "Terraform index: {} sites in {} worldspaces",
            terraform.sites.len(),
            terraform.by_world_space.len()
        );
        terraform
    }

    pub fn add(&mut self, world_space: Lookup, site: TerraformSite) {
        self.by_world_space.entry(world_space).or_default().push(self.sites.len());
        self.sites.push(site);
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn sites(&self) -> &[TerraformSite] {
        &self.sites
    }

    pub fn sites_in(&self, world_space: &Lookup) -> Vec<&TerraformSite> {
        self.by_world_space
            .get(world_space)
            .map(|ids| ids.iter().map(|i| &self.sites[*i]).collect())
            .unwrap_or_default()
    }

    /// Sites of the worldspace containing `point` and of its six
    /// neighbours.
    fn sites_near(&self, point: Vec3) -> Vec<usize> {
        if self.worldspace_size <= 0.0 {
            return Vec::new();
        }
        let owner = hex::lookup_key(point, self.worldspace_size);
        let mut out: Vec<usize> = self.by_world_space.get(&owner).cloned().unwrap_or_default();
        for lookup in hex::neighbor_lookups(hex::nearest_center(point, self.worldspace_size), self.worldspace_size) {
            if let Some(ids) = self.by_world_space.get(&lookup) {
                out.extend(ids.iter().copied());
            }
        }
        out
    }
}

/// Nearby-site list, refreshed only once the sample point has moved a
/// fixed fraction of a worldspace. Buckets are laid on a fixed lattice so
/// any traversal order sees the same lists.
struct SiteCache {
    bucket_size: f32,
    bucket: Option<(i32, i32)>,
    sites: Vec<usize>,
}

impl SiteCache {
    fn new(worldspace_size: f32) -> Self {
        Self {
            bucket_size: (worldspace_size * CACHE_REFRESH_FRACTION).max(1.0),
            bucket: None,
            sites: Vec::new(),
        }
    }

    fn sites_for(&mut self, terraform: &TerraformIndex, x: f32, z: f32) -> &[usize] {
        let bucket = (
            (x / self.bucket_size).floor() as i32,
            (z / self.bucket_size).floor() as i32,
        );
        if self.bucket != Some(bucket) {
            let anchor = Vec3::new(
                (bucket.0 as f32 + 0.5) * self.bucket_size,
                0.0,
                (bucket.1 as f32 + 0.5) * self.bucket_size,
            );
            self.sites = terraform.sites_near(anchor);
            // A bucket can straddle worldspaces the anchor does not see.
            for corner in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
                let p = Vec3::new(
                    (bucket.0 as f32 + corner.0) * self.bucket_size,
                    0.0,
                    (bucket.1 as f32 + corner.1) * self.bucket_size,
                );
                self.sites.extend(terraform.sites_near(p));
            }
            self.sites.sort_unstable();
            self.sites.dedup();
            self.bucket = Some(bucket);
        }
        &self.sites
    }
}

/// Result of sampling one vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexSample {
    pub elevation: f32,
    pub vertex_type: VertexType,
    pub excluded: bool,
    pub inherit_tunnel: bool,
    pub in_blend_band: bool,
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Everything the elevation pass reads. Shared immutably across threads.
pub struct ElevationSampler<'a> {
    pub noise: &'a TerrainNoise,
    pub terraform: &'a TerraformIndex,
    pub policy: NoiseBlendPolicy,
}

impl<'a> ElevationSampler<'a> {
    pub fn new(noise: &'a TerrainNoise, terraform: &'a TerraformIndex, policy: NoiseBlendPolicy) -> Self {
        Self {
            noise,
            terraform,
            policy,
        }
    }

    fn sample_cached(&self, key: VertexKey, cache: &mut SiteCache) -> VertexSample {
        let (x, z) = (key.0 as f32, key.1 as f32);
        let raw = self.noise.height(key.0 as f64, key.1 as f64);
        let mut sample = VertexSample {
            elevation: raw,
            vertex_type: VertexType::Generic,
            excluded: false,
            inherit_tunnel: false,
            in_blend_band: false,
        };
        if self.policy == NoiseBlendPolicy::Raw || self.terraform.is_empty() {
            return sample;
        }

        let point = Vec3::new(x, 0.0, z);
        let nearest = cache
            .sites_for(self.terraform, x, z)
            .iter()
            .map(|i| {
                let site = &self.terraform.sites[*i];
                (hex::planar_distance(point, site.center) / site.size, site)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));
        let (ratio, site) = match nearest {
            Some(found) => found,
            None => return sample,
        };

        if ratio <= PLATEAU_RADIUS {
            sample.elevation = site.plateau;
            match site.kind {
                SiteKind::Plain => sample.vertex_type = VertexType::Cell,
                SiteKind::Road => sample.vertex_type = VertexType::Road,
                SiteKind::TunnelEntry => {
                    sample.vertex_type = VertexType::Tunnel;
                    sample.excluded = true;
                }
            }
            return sample;
        }
        if ratio > BAND_RADIUS || self.policy == NoiseBlendPolicy::Plateau {
            return sample;
        }

        let weight = match self.policy {
            NoiseBlendPolicy::SmoothFalloff => 1.0 - smoothstep(PLATEAU_RADIUS, BAND_RADIUS, ratio),
            _ => BAND_BLEND,
        };
        sample.elevation = raw + (site.plateau - raw) * weight;
        sample.in_blend_band = true;
        sample.inherit_tunnel = site.kind == SiteKind::TunnelEntry;
        sample
    }

    /// Sample a single vertex without any cache reuse.
    pub fn sample(&self, key: VertexKey) -> VertexSample {
        let mut cache = SiteCache::new(self.terraform.worldspace_size);
        self.sample_cached(key, &mut cache)
    }

    /// Recompute the vertices in `cols` x `rows` (grid indices) in place.
    /// Rows are sampled in parallel and written back afterwards.
    pub fn fill(&self, grid: &mut VertexGrid, cols: Range<usize>, rows: Range<usize>) {
        let cols = cols.start.min(grid.count_x)..cols.end.min(grid.count_x);
        let rows = rows.start.min(grid.count_z)..rows.end.min(grid.count_z);
        let keys = &grid.keys;
        let count_x = grid.count_x;

        let samples: Vec<(VertexKey, VertexSample)> = rows
            .into_par_iter()
            .flat_map_iter(|iz| {
                let mut cache = SiteCache::new(self.terraform.worldspace_size);
                cols.clone()
                    .map(|ix| {
                        let key = keys[iz * count_x + ix];
                        (key, self.sample_cached(key, &mut cache))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        for (key, s) in samples {
            if let Some(v) = grid.vertices.get_mut(&key) {
                v.position.y = s.elevation;
                v.vertex_type = s.vertex_type;
                v.excluded = s.excluded;
                v.inherit_tunnel = s.inherit_tunnel;
                v.in_blend_band = s.in_blend_band;
            }
        }
    }
}

/// Build and fill a vertex grid over `bounds`, then smooth its blend band.
pub fn generate_vertex_grid(
    bounds: &TerrainBounds,
    ctx: &GenerationContext,
    noise: &TerrainNoise,
    terraform: &TerraformIndex,
) -> VertexGrid {
    let mut grid = VertexGrid::covering(bounds, ctx.terrain.steps);
    let sampler = ElevationSampler::new(noise, terraform, ctx.terrain.blend_policy);
    let (cols, rows) = (grid.count_x, grid.count_z);
    sampler.fill(&mut grid, 0..cols, 0..rows);
    smooth_blend_band(&mut grid, ctx.terrain.smoothing_passes);

    let flattened = grid
        .vertices
        .values()
        .filter(|v| v.vertex_type != VertexType::Generic)
        .count();
    info!(
        "Vertex grid: {}x{} ({} vertices, {} terraformed) with step {}",
        grid.count_x,
        grid.count_z,
        grid.len(),
        flattened,
        grid.steps
    );
    grid
}

/// Average each blend-band vertex with its 4-neighbourhood, `passes` times.
pub fn smooth_blend_band(grid: &mut VertexGrid, passes: u32) {
    let (cols, rows) = (grid.count_x, grid.count_z);
    smooth_region(grid, 0..cols, 0..rows, passes);
}

pub(crate) fn smooth_region(grid: &mut VertexGrid, cols: Range<usize>, rows: Range<usize>, passes: u32) {
    for pass in 0..passes {
        let mut updates: HashMap<VertexKey, f32> = HashMap::new();
        for iz in rows.clone() {
            for ix in cols.clone() {
                let key = match grid.key_at(ix, iz) {
                    Some(k) => k,
                    None => continue,
                };
                let vertex = match grid.get(&key) {
                    Some(v) if v.in_blend_band => v,
                    _ => continue,
                };
                let mut sum = vertex.elevation();
                let mut n = 1.0;
                let around = [
                    (ix.wrapping_sub(1), iz),
                    (ix + 1, iz),
                    (ix, iz.wrapping_sub(1)),
                    (ix, iz + 1),
                ];
                for (nx, nz) in around {
                    if let Some(v) = grid.vertex_at(nx, nz) {
                        sum += v.elevation();
                        n += 1.0;
                    }
                }
                updates.insert(key, sum / n);
            }
        }
        debug!("Smoothing pass {}: {} band vertices", pass + 1, updates.len());
        for (key, elevation) in updates {
            if let Some(v) = grid.get_mut(&key) {
                v.position.y = elevation;
            }
        }
    }
}
