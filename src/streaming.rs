//! Focus tracking: which worldspaces and terrain chunks are active around a
//! moving point.
//!
//! Nothing is generated here. The tracker only recomputes the active set
//! once the focus has moved far enough, and reports the difference.

use std::collections::BTreeSet;

use glam::Vec3;
use tracing::debug;

use crate::config::StreamingParams;
use crate::grid::TierGrid;
use crate::hex::{self, Lookup};
use crate::terrain::ChunkIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkSignal {
    Load(Lookup),
    Unload(Lookup),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamingUpdate {
    pub focus: Vec3,
    /// Every worldspace active after this update
    pub active_worldspaces: Vec<Lookup>,
    pub activated: Vec<Lookup>,
    pub deactivated: Vec<Lookup>,
    pub chunk_signals: Vec<ChunkSignal>,
}

impl StreamingUpdate {
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.deactivated.is_empty() && self.chunk_signals.is_empty()
    }
}

pub struct WorldPositionTracker {
    params: StreamingParams,
    last_focus: Option<Vec3>,
    active_worldspaces: BTreeSet<Lookup>,
    active_chunks: BTreeSet<Lookup>,
}

impl WorldPositionTracker {
    pub fn new(params: &StreamingParams) -> Self {
        Self {
            params: params.clone(),
            last_focus: None,
            active_worldspaces: BTreeSet::new(),
            active_chunks: BTreeSet::new(),
        }
    }

    pub fn last_focus(&self) -> Option<Vec3> {
        self.last_focus
    }

    pub fn active_worldspaces(&self) -> Vec<Lookup> {
        self.active_worldspaces.iter().copied().collect()
    }

    pub fn is_chunk_active(&self, key: &Lookup) -> bool {
        self.active_chunks.contains(key)
    }

    /// Recompute the active set around `focus`. Returns `None` while the
    /// focus stays within `min_move_distance` of the last recompute.
    pub fn update(&mut self, focus: Vec3, worldspaces: &TierGrid, chunks: Option<&ChunkIndex>) -> Option<StreamingUpdate> {
        if let Some(last) = self.last_focus {
            if hex::planar_distance(last, focus) < self.params.min_move_distance {
                return None;
            }
        }
        self.last_focus = Some(focus);

        let radius = self.params.active_radius;
        let worldspace_set: BTreeSet<Lookup> = worldspaces
            .cells()
            .filter(|c| c.is_active() && hex::planar_distance(c.center, focus) <= radius)
            .map(|c| c.lookup)
            .collect();
        let chunk_set: BTreeSet<Lookup> = chunks
            .map(|index| index.within(focus, radius).into_iter().collect())
            .unwrap_or_default();

        let mut update = StreamingUpdate {
            focus,
            active_worldspaces: worldspace_set.iter().copied().collect(),
            activated: worldspace_set.difference(&self.active_worldspaces).copied().collect(),
            deactivated: self.active_worldspaces.difference(&worldspace_set).copied().collect(),
            chunk_signals: Vec::new(),
        };
        update
            .chunk_signals
            .extend(chunk_set.difference(&self.active_chunks).map(|k| ChunkSignal::Load(*k)));
        update
            .chunk_signals
            .extend(self.active_chunks.difference(&chunk_set).map(|k| ChunkSignal::Unload(*k)));

        debug!(
            "Focus ({:.1}, {:.1}): {} worldspaces active, +{} -{}, {} chunk signals",
            focus.x,
            focus.z,
            worldspace_set.len(),
            update.activated.len(),
            update.deactivated.len(),
            update.chunk_signals.len()
        );

        self.active_worldspaces = worldspace_set;
        self.active_chunks = chunk_set;
        Some(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationContext;
    use crate::grid::{self, WorldIndex};
    use crate::terrain::{partition_chunks, TerrainBounds, VertexGrid};

    fn world() -> (WorldIndex, GenerationContext) {
        let ctx = GenerationContext::default();
        let mut index = WorldIndex::new(&ctx.tiers);
        let regions = grid::build_region_tier(&mut index, &ctx, Vec3::ZERO, 0);
        let areas = grid::build_area_tier(&mut index, &ctx, &regions);
        grid::build_worldspace_tier(&mut index, &ctx, &areas);
        (index, ctx)
    }

    #[test]
    fn test_first_update_activates_nearby() {
        let (index, ctx) = world();
        let mut tracker = WorldPositionTracker::new(&ctx.streaming);
        let update = tracker.update(Vec3::ZERO, &index.worldspaces, None).unwrap();
        assert!(!update.activated.is_empty());
        assert!(update.deactivated.is_empty());
        assert_eq!(update.activated, update.active_worldspaces);
        assert!(update
            .active_worldspaces
            .contains(&hex::lookup_key(Vec3::ZERO, ctx.tiers.worldspace)));
    }

    #[test]
    fn test_small_moves_are_ignored() {
        let (index, ctx) = world();
        let mut tracker = WorldPositionTracker::new(&ctx.streaming);
        tracker.update(Vec3::ZERO, &index.worldspaces, None).unwrap();
        let nudge = Vec3::new(ctx.streaming.min_move_distance * 0.5, 0.0, 0.0);
        assert!(tracker.update(nudge, &index.worldspaces, None).is_none());
        assert_eq!(tracker.last_focus(), Some(Vec3::ZERO));
    }

    #[test]
    fn test_moving_away_deactivates() {
        let (index, ctx) = world();
        let mut tracker = WorldPositionTracker::new(&ctx.streaming);
        let first = tracker.update(Vec3::ZERO, &index.worldspaces, None).unwrap();
        let far = Vec3::new(5000.0, 0.0, 0.0);
        let second = tracker.update(far, &index.worldspaces, None).unwrap();
        assert!(second.active_worldspaces.is_empty());
        assert_eq!(second.deactivated, first.active_worldspaces);
    }

    #[test]
    fn test_chunk_signals() {
        let (index, ctx) = world();
        let grid = VertexGrid::covering(&TerrainBounds::around(Vec3::ZERO, 400.0), 8);
        let chunks = partition_chunks(&grid, 108.0);
        let mut tracker = WorldPositionTracker::new(&ctx.streaming);

        let first = tracker.update(Vec3::ZERO, &index.worldspaces, Some(&chunks)).unwrap();
        let loaded: Vec<Lookup> = first
            .chunk_signals
            .iter()
            .filter_map(|s| match s {
                ChunkSignal::Load(k) => Some(*k),
                ChunkSignal::Unload(_) => None,
            })
            .collect();
        assert!(!loaded.is_empty());
        assert!(loaded.iter().all(|k| tracker.is_chunk_active(k)));

        let second = tracker
            .update(Vec3::new(300.0, 0.0, 0.0), &index.worldspaces, Some(&chunks))
            .unwrap();
        assert!(second
            .chunk_signals
            .iter()
            .any(|s| matches!(s, ChunkSignal::Unload(_))));
    }
}
