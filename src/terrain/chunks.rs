//! Partition the vertex grid into streamable chunks.
//!
//! Chunks tile the grid with a one-vertex overlap: the last column of a
//! chunk is the first column of the next, so seams stitch without gaps.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GenerationContext;
use crate::hex::Lookup;

use super::generator::{smooth_region, ElevationSampler, TerraformIndex};
use super::noise::TerrainNoise;
use super::vertex::{TerrainVertex, VertexGrid, VertexKey};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainChunk {
    pub key: Lookup,
    pub center: Vec3,
    /// Inclusive grid-index ranges
    pub ix_start: usize,
    pub ix_end: usize,
    pub iz_start: usize,
    pub iz_end: usize,
    pub count_x: usize,
    pub count_z: usize,
    /// Row-major
    pub keys: Vec<VertexKey>,
}

impl TerrainChunk {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains_index(&self, ix: usize, iz: usize) -> bool {
        (self.ix_start..=self.ix_end).contains(&ix) && (self.iz_start..=self.iz_end).contains(&iz)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkIndex {
    pub chunk_size: f32,
    #[serde(with = "chunk_map")]
    pub chunks: BTreeMap<Lookup, TerrainChunk>,
}

impl ChunkIndex {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, key: &Lookup) -> Option<&TerrainChunk> {
        self.chunks.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TerrainChunk> {
        self.chunks.values()
    }

    /// Chunks whose center lies within `radius` of `point`.
    pub fn within(&self, point: Vec3, radius: f32) -> Vec<Lookup> {
        self.chunks
            .values()
            .filter(|c| crate::hex::planar_distance(c.center, point) <= radius)
            .map(|c| c.key)
            .collect()
    }
}

/// Split `0..n` vertices into `parts` inclusive spans sharing endpoints.
fn spans(n: usize, parts: usize) -> Vec<(usize, usize)> {
    if n <= 1 {
        return vec![(0, 0)];
    }
    let last = n - 1;
    let parts = parts.clamp(1, last);
    let bounds: Vec<usize> = (0..=parts)
        .map(|i| ((i * last) as f64 / parts as f64).round() as usize)
        .collect();
    bounds.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Cut `grid` into roughly `chunk_size`-wide chunks.
pub fn partition_chunks(grid: &VertexGrid, chunk_size: f32) -> ChunkIndex {
    let mut index = ChunkIndex {
        chunk_size,
        chunks: BTreeMap::new(),
    };
    if grid.is_empty() {
        return index;
    }
    if chunk_size <= 0.0 {
        warn!("Chunk size {} is not positive; using one chunk", chunk_size);
    }

    let bounds = grid.bounds();
    let parts_for = |extent: f32| -> usize {
        if chunk_size <= 0.0 {
            1
        } else {
            ((extent / chunk_size).floor() as usize).max(1)
        }
    };
    let x_spans = spans(grid.count_x, parts_for(bounds.width()));
    let z_spans = spans(grid.count_z, parts_for(bounds.depth()));
    let step = grid.steps as f32;

    for &(iz_start, iz_end) in &z_spans {
        for &(ix_start, ix_end) in &x_spans {
            let mut keys = Vec::with_capacity((ix_end - ix_start + 1) * (iz_end - iz_start + 1));
            for iz in iz_start..=iz_end {
                for ix in ix_start..=ix_end {
                    if let Some(k) = grid.key_at(ix, iz) {
                        keys.push(k);
                    }
                }
            }
            let center = Vec3::new(
                grid.origin.0 as f32 + step * (ix_start + ix_end) as f32 * 0.5,
                0.0,
                grid.origin.1 as f32 + step * (iz_start + iz_end) as f32 * 0.5,
            );
            let key = Lookup::new(center.x.round() as i32, center.z.round() as i32, chunk_size.round() as i32);
            index.chunks.insert(
                key,
                TerrainChunk {
                    key,
                    center,
                    ix_start,
                    ix_end,
                    iz_start,
                    iz_end,
                    count_x: ix_end - ix_start + 1,
                    count_z: iz_end - iz_start + 1,
                    keys,
                },
            );
        }
    }

    debug!(
        "Partitioned {}x{} grid into {} chunks ({}x{})",
        grid.count_x,
        grid.count_z,
        index.len(),
        x_spans.len(),
        z_spans.len()
    );
    index
}

/// Recompute the vertices of one chunk in place.
///
/// Smoothing reads neighbours, so the chunk is resampled with a halo as
/// wide as the pass count and smoothed over the whole halo. Halo vertices
/// are put back afterwards; only the chunk's own vertices change.
pub fn regenerate_chunk(
    grid: &mut VertexGrid,
    chunk: &TerrainChunk,
    ctx: &GenerationContext,
    noise: &TerrainNoise,
    terraform: &TerraformIndex,
) {
    let passes = ctx.terrain.smoothing_passes;
    let halo = passes as usize;
    let cols = chunk.ix_start.saturating_sub(halo)..(chunk.ix_end + 1 + halo).min(grid.count_x);
    let rows = chunk.iz_start.saturating_sub(halo)..(chunk.iz_end + 1 + halo).min(grid.count_z);

    let mut saved: Vec<TerrainVertex> = Vec::new();
    for iz in rows.clone() {
        for ix in cols.clone() {
            if chunk.contains_index(ix, iz) {
                continue;
            }
            if let Some(v) = grid.vertex_at(ix, iz) {
                saved.push(v.clone());
            }
        }
    }

    ElevationSampler::new(noise, terraform, ctx.terrain.blend_policy).fill(grid, cols.clone(), rows.clone());
    smooth_region(grid, cols, rows, passes);

    for vertex in saved {
        if let Some(v) = grid.get_mut(&vertex.noise_coordinate) {
            *v = vertex;
        }
    }
    debug!("Regenerated chunk {} ({} vertices)", chunk.key, chunk.len());
}

/// Lookup keys cannot be JSON object keys; the map travels as a list.
mod chunk_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::TerrainChunk;
    use crate::hex::Lookup;

    pub fn serialize<S: Serializer>(map: &BTreeMap<Lookup, TerrainChunk>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(map.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<Lookup, TerrainChunk>, D::Error> {
        let list = Vec::<TerrainChunk>::deserialize(d)?;
        Ok(list.into_iter().map(|c| (c.key, c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex;
    use crate::terrain::{generate_vertex_grid, SiteKind, TerrainBounds, TerraformSite};
    use std::collections::BTreeSet;

    fn grid() -> VertexGrid {
        VertexGrid::covering(&TerrainBounds::new(0.0, 0.0, 250.0, 130.0), 2)
    }

    #[test]
    fn test_chunks_cover_grid() {
        let grid = grid();
        let index = partition_chunks(&grid, 108.0);
        assert_eq!(index.len(), 2);
        let covered: BTreeSet<VertexKey> = index.iter().flat_map(|c| c.keys.iter().copied()).collect();
        let all: BTreeSet<VertexKey> = grid.keys.iter().copied().collect();
        assert_eq!(covered, all);
    }

    #[test]
    fn test_adjacent_chunks_share_a_column() {
        let grid = grid();
        let index = partition_chunks(&grid, 60.0);
        let chunks: Vec<&TerrainChunk> = index.iter().filter(|c| c.iz_start == 0).collect();
        assert!(chunks.len() > 1);
        let mut ends: Vec<(usize, usize)> = chunks.iter().map(|c| (c.ix_start, c.ix_end)).collect();
        ends.sort();
        for pair in ends.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        let first = chunks[0];
        assert!(first.contains_index(first.ix_end, first.iz_start));
        assert!(!first.contains_index(first.ix_end + 1, first.iz_start));
    }

    #[test]
    fn test_tiny_grid_is_one_chunk() {
        let grid = VertexGrid::covering(&TerrainBounds::new(0.0, 0.0, 4.0, 4.0), 2);
        let index = partition_chunks(&grid, 108.0);
        assert_eq!(index.len(), 1);
        assert_eq!(index.iter().next().unwrap().len(), grid.len());
    }

    #[test]
    fn test_regenerate_matches_full_pass() {
        let mut ctx = GenerationContext::default();
        ctx.terrain.smoothing_passes = 0;
        let noise = TerrainNoise::new(5, &ctx.terrain);
        let terraform = TerraformIndex::new(ctx.tiers.worldspace);
        let bounds = TerrainBounds::new(0.0, 0.0, 120.0, 60.0);
        let full = generate_vertex_grid(&bounds, &ctx, &noise, &terraform);

        let mut blank = VertexGrid::covering(&bounds, ctx.terrain.steps);
        let index = partition_chunks(&blank, 50.0);
        for chunk in index.iter() {
            regenerate_chunk(&mut blank, chunk, &ctx, &noise, &terraform);
        }
        assert_eq!(blank, full);
    }

    #[test]
    fn test_regenerate_with_smoothing_matches_full_pass() {
        let mut ctx = GenerationContext::default();
        ctx.terrain.smoothing_passes = 2;
        let noise = TerrainNoise::new(5, &ctx.terrain);
        let mut terraform = TerraformIndex::new(ctx.tiers.worldspace);
        // A site on the seam between two chunks, so its band crosses it.
        let center = Vec3::new(60.0, 0.0, 30.0);
        terraform.add(
            hex::lookup_key(center, ctx.tiers.worldspace),
            TerraformSite {
                center,
                size: 12.0,
                plateau: noise.plateau_height(center, ctx.layers.cell_layer_elevation),
                kind: SiteKind::Plain,
            },
        );
        let bounds = TerrainBounds::new(0.0, 0.0, 120.0, 60.0);
        let full = generate_vertex_grid(&bounds, &ctx, &noise, &terraform);
        assert!(full.vertices.values().any(|v| v.in_blend_band));

        let mut blank = VertexGrid::covering(&bounds, ctx.terrain.steps);
        let index = partition_chunks(&blank, 50.0);
        assert!(index.len() > 1);
        for chunk in index.iter() {
            regenerate_chunk(&mut blank, chunk, &ctx, &noise, &terraform);
        }
        for key in &full.keys {
            let (a, b) = (full.get(key).unwrap(), blank.get(key).unwrap());
            assert!((a.elevation() - b.elevation()).abs() < 1e-4, "{:?}", key);
        }

        // Regenerating one chunk of a finished grid leaves it unchanged.
        let mut again = full.clone();
        let chunk = index.iter().next().unwrap();
        regenerate_chunk(&mut again, chunk, &ctx, &noise, &terraform);
        assert_eq!(again, full);
    }

    #[test]
    fn test_chunk_index_json() {
        let index = partition_chunks(&grid(), 108.0);
        let text = serde_json::to_string(&index).unwrap();
        let back: ChunkIndex = serde_json::from_str(&text).unwrap();
        assert_eq!(back, index);
    }
}
