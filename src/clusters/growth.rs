//! Seeded random-walk cluster growth over the neighbour graph.
//!
//! The walk always extends from the most recently added cell when it can,
//! and falls back to any visited cell once that one is boxed in. Among the
//! candidates it prefers the best-connected cell, with ties broken by a
//! shuffle drawn from the caller's rng.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::ops::Range;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grid::{CellKey, CellStatus, TierGrid};

use super::types::{Cluster, ClusterType};

/// Which links a growth walk may follow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPriority {
    /// Same-layer side neighbours only
    #[default]
    SideNeighbors,
    /// Side neighbours plus the layer neighbours of the cell and of its
    /// side neighbours
    SideAndSideLayerNeighbors,
}

/// Which cells a walk may step onto.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GrowthFilter {
    pub exclude_statuses: Vec<CellStatus>,
    /// Skip cells flagged as edges of their parent grid
    pub exclude_parent_grid_edge: bool,
    /// Skip cells already claimed by an exclusive cluster
    pub exclude_pre_assigned: bool,
    /// When set, only cells with exactly this status qualify
    pub required_status: Option<CellStatus>,
    /// When set, the column's ground elevation must fall inside this range
    pub elevation: Option<Range<f32>>,
    /// When set, only cells on this layer qualify
    pub layer: Option<i32>,
}

impl GrowthFilter {
    pub fn surface() -> Self {
        Self {
            exclude_statuses: vec![
                CellStatus::UnderGround,
                CellStatus::AboveGround,
                CellStatus::Underwater,
            ],
            exclude_parent_grid_edge: true,
            exclude_pre_assigned: true,
            required_status: None,
            elevation: None,
            layer: None,
        }
    }

    pub fn underground() -> Self {
        Self {
            exclude_statuses: Vec::new(),
            exclude_parent_grid_edge: false,
            exclude_pre_assigned: true,
            required_status: Some(CellStatus::UnderGround),
            elevation: None,
            layer: None,
        }
    }

    /// Restrict the filter to one layer.
    pub fn on_layer(mut self, layer: i32) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn accepts(&self, grid: &TierGrid, key: &CellKey) -> bool {
        let cell = match grid.get(key) {
            Some(cell) => cell,
            None => return false,
        };
        if cell.is_removed() || self.exclude_statuses.contains(&cell.status) {
            return false;
        }
        if let Some(required) = self.required_status {
            if cell.status != required {
                return false;
            }
        }
        if self.layer.is_some_and(|layer| layer != key.layer) {
            return false;
        }
        if self.exclude_parent_grid_edge && cell.is_edge {
            return false;
        }
        if self.exclude_pre_assigned && cell.is_pre_assigned {
            return false;
        }
        if let Some(range) = &self.elevation {
            let elevation = cell.ground_elevation.unwrap_or(cell.center.y);
            if !range.contains(&elevation) {
                return false;
            }
        }
        true
    }
}

/// Parameters of one [`grow_cluster`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct GrowthOptions {
    pub cluster_type: ClusterType,
    /// Member count range `[min, max)`; the concrete target is drawn once
    pub target: Range<usize>,
    pub priority: SearchPriority,
    pub filter: GrowthFilter,
}

impl GrowthOptions {
    pub fn new(cluster_type: ClusterType, target: Range<usize>) -> Self {
        Self {
            cluster_type,
            target,
            priority: SearchPriority::SideNeighbors,
            filter: GrowthFilter::surface(),
        }
    }

    pub fn with_priority(mut self, priority: SearchPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_filter(mut self, filter: GrowthFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Cells reachable from `key` in one step under `priority`.
pub fn linked_cells(grid: &TierGrid, key: &CellKey, priority: SearchPriority) -> Vec<CellKey> {
    let cell = match grid.get(key) {
        Some(cell) => cell,
        None => return Vec::new(),
    };
    let mut out: Vec<CellKey> = cell.neighbors.clone();
    if priority == SearchPriority::SideAndSideLayerNeighbors {
        out.extend(cell.below());
        out.extend(cell.above());
        for n in &cell.neighbors {
            if let Some(side) = grid.get(n) {
                out.extend(side.below());
                out.extend(side.above());
            }
        }
        out.sort();
        out.dedup();
    }
    out
}

/// Number of eligible cells one step away from `key`.
pub fn eligible_degree(grid: &TierGrid, key: &CellKey, priority: SearchPriority, filter: &GrowthFilter) -> usize {
    linked_cells(grid, key, priority)
        .iter()
        .filter(|k| filter.accepts(grid, k))
        .count()
}

/// Walk from `seed` until `target_len` cells are collected or no eligible
/// cell remains. The seed itself must pass the filter; otherwise the walk is
/// empty.
pub fn random_walk(
    grid: &TierGrid,
    seed: CellKey,
    target_len: usize,
    priority: SearchPriority,
    filter: &GrowthFilter,
    rng: &mut ChaCha8Rng,
) -> Vec<CellKey> {
    if target_len == 0 || !filter.accepts(grid, &seed) {
        return Vec::new();
    }

    let mut visited = vec![seed];
    let mut seen: BTreeSet<CellKey> = BTreeSet::from([seed]);

    while visited.len() < target_len {
        let last = visited[visited.len() - 1];
        let mut candidates = unvisited_eligible(grid, &last, priority, filter, &seen);

        if candidates.is_empty() {
            for key in &visited {
                candidates.extend(unvisited_eligible(grid, key, priority, filter, &seen));
            }
            candidates.sort();
            candidates.dedup();
        }
        if candidates.is_empty() {
            break;
        }

        candidates.shuffle(rng);
        candidates.sort_by_key(|k| Reverse(eligible_degree(grid, k, priority, filter)));

        let next = candidates[0];
        seen.insert(next);
        visited.push(next);
    }

    visited
}

fn unvisited_eligible(
    grid: &TierGrid,
    key: &CellKey,
    priority: SearchPriority,
    filter: &GrowthFilter,
    seen: &BTreeSet<CellKey>,
) -> Vec<CellKey> {
    linked_cells(grid, key, priority)
        .into_iter()
        .filter(|k| !seen.contains(k) && filter.accepts(grid, k))
        .collect()
}

/// Grow a cluster from `seed`.
///
/// Returns `None` when the target range is empty, the seed is not eligible,
/// or the walk collected fewer than `max(target.start, 2)` cells.
pub fn grow_cluster(
    grid: &TierGrid,
    seed: CellKey,
    options: &GrowthOptions,
    rng: &mut ChaCha8Rng,
) -> Option<Cluster> {
    if options.target.is_empty() {
        warn!("Empty member range {:?} for {}", options.target, seed);
        return None;
    }
    if !options.filter.accepts(grid, &seed) {
        debug!("Seed {} rejected by growth filter", seed);
        return None;
    }

    let target_len = rng.gen_range(options.target.clone());
    let members = random_walk(grid, seed, target_len, options.priority, &options.filter, rng);

    let minimum = options.target.start.max(2);
    if members.len() < minimum {
        debug!(
            "Growth from {} stopped at {} cells (needed {})",
            seed,
            members.len(),
            minimum
        );
        return None;
    }

    Cluster::new(options.cluster_type, grid.tier, members)
}
