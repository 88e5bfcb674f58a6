//! World persistence.
//!
//! A snapshot holds every tier's cells, the registered clusters and the
//! terrain chunk index. Neighbour and layer links are not written: loading
//! rebuilds them with [`rehydrate`].
//!
//! Snapshots are stored per seed: `{base_dir}/world_{seed}/world.json`.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clusters::ClusterRegistry;
use crate::config::GenerationContext;
use crate::error::{WorldError, WorldResult};
use crate::grid::{rehydrate, CellPrototype, RehydrateReport, Tier, WorldIndex};
use crate::terrain::ChunkIndex;

/// Cells of one tier, in key order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TierSnapshot {
    pub tier: Tier,
    pub cell_size: f32,
    pub cells: Vec<CellPrototype>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub seed: u64,
    /// RFC 3339 local time of the capture
    pub generated_at: String,
    pub context: GenerationContext,
    pub tiers: Vec<TierSnapshot>,
    pub clusters: ClusterRegistry,
    #[serde(default)]
    pub chunks: Option<ChunkIndex>,
}

impl WorldSnapshot {
    pub fn capture(index: &WorldIndex, ctx: &GenerationContext, chunks: Option<&ChunkIndex>) -> Self {
        let tiers = Tier::ALL
            .iter()
            .map(|t| {
                let grid = index.tier(*t);
                TierSnapshot {
                    tier: *t,
                    cell_size: grid.cell_size,
                    cells: grid.cells().cloned().collect(),
                }
            })
            .collect();
        Self {
            seed: ctx.seed,
            generated_at: Local::now().to_rfc3339(),
            context: ctx.clone(),
            tiers,
            clusters: index.clusters.clone(),
            chunks: chunks.cloned(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.tiers.iter().map(|t| t.cells.len()).sum()
    }

    /// Rebuild a live index: reinsert every cell, then restore links.
    pub fn restore(self) -> (WorldIndex, RehydrateReport) {
        let mut index = WorldIndex::new(&self.context.tiers);
        for snapshot in self.tiers {
            let grid = index.tier_mut(snapshot.tier);
            if (grid.cell_size - snapshot.cell_size).abs() > f32::EPSILON {
                warn!(
                    "{} tier saved with cell size {} but configured for {}",
                    snapshot.tier, snapshot.cell_size, grid.cell_size
                );
                grid.cell_size = snapshot.cell_size;
            }
            for cell in snapshot.cells {
                if let Err(dup) = grid.insert(cell) {
                    warn!("Duplicate {} cell {} in snapshot; skipped", snapshot.tier, dup.key());
                }
            }
        }
        index.clusters = self.clusters;
        let report = rehydrate(&mut index);
        (index, report)
    }
}

/// Storage manager for world snapshots of one seed.
pub struct WorldStorage {
    base_dir: PathBuf,
    seed: u64,
}

impl WorldStorage {
    pub fn new<P: AsRef<Path>>(base_dir: P, seed: u64) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            seed,
        }
    }

    pub fn world_dir(&self) -> PathBuf {
        self.base_dir.join(format!("world_{}", self.seed))
    }

    fn snapshot_path(&self) -> PathBuf {
        self.world_dir().join("world.json")
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path().exists()
    }

    pub fn save(&self, snapshot: &WorldSnapshot) -> WorldResult<PathBuf> {
        fs::create_dir_all(self.world_dir())?;
        let path = self.snapshot_path();
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(writer, snapshot).map_err(WorldError::serialization)?;
        info!("Saved {} cells to {}", snapshot.cell_count(), path.display());
        Ok(path)
    }

    /// Returns `None` if nothing was saved for this seed.
    pub fn load(&self) -> WorldResult<Option<WorldSnapshot>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&path)?);
        let snapshot: WorldSnapshot = serde_json::from_reader(reader).map_err(|e| WorldError::Deserialization {
            path: path.clone(),
            message: e.to_string(),
        })?;
        if snapshot.seed != self.seed {
            warn!(
                "{} holds seed {} but was opened for seed {}",
                path.display(),
                snapshot.seed,
                self.seed
            );
        }
        info!("Loaded {} cells from {}", snapshot.cell_count(), path.display());
        Ok(Some(snapshot))
    }

    /// Load and restore a live index in one step.
    pub fn load_world(&self) -> WorldResult<Option<(WorldIndex, GenerationContext, Option<ChunkIndex>)>> {
        Ok(self.load()?.map(|snapshot| {
            let ctx = snapshot.context.clone();
            let chunks = snapshot.chunks.clone();
            let (index, _) = snapshot.restore();
            (index, ctx, chunks)
        }))
    }

    pub fn clear(&self) -> std::io::Result<()> {
        let dir = self.world_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::{Cluster, ClusterType};
    use crate::grid;
    use glam::Vec3;
    use tempfile::tempdir;

    fn small_world() -> (WorldIndex, GenerationContext) {
        let ctx = GenerationContext::default();
        let mut index = WorldIndex::new(&ctx.tiers);
        let regions = grid::build_region_tier(&mut index, &ctx, Vec3::ZERO, 0);
        let areas = grid::build_area_tier(&mut index, &ctx, &regions);
        let worldspaces = grid::build_worldspace_tier(&mut index, &ctx, &areas);
        grid::build_sub_cell_tier(&mut index, &ctx, &worldspaces[..1]);
        (index, ctx)
    }

    #[test]
    fn test_save_and_load_restores_links() {
        let dir = tempdir().unwrap();
        let (mut index, ctx) = small_world();
        let seed_key = index
            .sub_cells
            .cells()
            .find(|c| c.neighbor_count() == 6)
            .map(|c| c.key())
            .unwrap();
        let mut members = vec![seed_key];
        members.extend(index.sub_cells.get(&seed_key).unwrap().neighbors.iter().take(2).copied());
        let cluster = Cluster::new(ClusterType::Path, Tier::SubCell, members.clone()).unwrap();
        index.register_cluster(cluster).unwrap();

        let storage = WorldStorage::new(dir.path(), ctx.seed);
        assert!(!storage.exists());
        storage.save(&WorldSnapshot::capture(&index, &ctx, None)).unwrap();
        assert!(storage.exists());

        let (loaded, loaded_ctx, chunks) = storage.load_world().unwrap().unwrap();
        assert_eq!(loaded_ctx, ctx);
        assert!(chunks.is_none());
        assert_eq!(loaded.summary(), index.summary());
        for cell in index.sub_cells.cells() {
            let back = loaded.sub_cells.get(&cell.key()).unwrap();
            assert_eq!(back.neighbors, cell.neighbors);
            assert_eq!(back.status, cell.status);
        }
        assert!(loaded.clusters.owner_of(Tier::SubCell, &members[1]).is_some());
        assert!(loaded.sub_cells.get(&members[1]).unwrap().is_pre_assigned);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempdir().unwrap();
        let storage = WorldStorage::new(dir.path(), 7);
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let storage = WorldStorage::new(dir.path(), 7);
        fs::create_dir_all(storage.world_dir()).unwrap();
        fs::write(storage.world_dir().join("world.json"), "{ not json").unwrap();
        assert!(matches!(storage.load(), Err(WorldError::Deserialization { .. })));
    }

    #[test]
    fn test_clear_removes_world() {
        let dir = tempdir().unwrap();
        let (index, ctx) = small_world();
        let storage = WorldStorage::new(dir.path(), ctx.seed);
        storage.save(&WorldSnapshot::capture(&index, &ctx, None)).unwrap();
        storage.clear().unwrap();
        assert!(!storage.exists());
    }
}
