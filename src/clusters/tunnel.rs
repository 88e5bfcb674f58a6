//! Underground tunnels with a single ground entry.

use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::grid::{CellKey, CellKind, CellStatus, TierGrid};

use super::growth::{random_walk, GrowthFilter, SearchPriority};
use super::types::{Cluster, ClusterType};

/// A grown tunnel: the ground cell it opens into, the underground cell
/// directly below it, and the cluster holding both plus the rest of the
/// tunnel.
#[derive(Clone, Debug, PartialEq)]
pub struct TunnelResult {
    pub entry: CellKey,
    pub start: CellKey,
    pub cluster: Cluster,
}

impl TunnelResult {
    /// Underground members, starting with the tunnel start.
    pub fn path(&self) -> &[CellKey] {
        &self.cluster.members[1..]
    }
}

fn is_free_underground(grid: &TierGrid, key: &CellKey) -> bool {
    grid.get(key)
        .map(|c| c.status == CellStatus::UnderGround && !c.is_pre_assigned)
        .unwrap_or(false)
}

/// Number of free underground side neighbours of `key`.
fn underground_degree(grid: &TierGrid, key: &CellKey) -> usize {
    grid.get(key)
        .map(|c| c.neighbors.iter().filter(|n| is_free_underground(grid, n)).count())
        .unwrap_or(0)
}

/// Ground cell directly above `key`, if it can serve as an entry: ground,
/// not claimed, and with no claimed neighbour.
fn entry_above(grid: &TierGrid, key: &CellKey) -> Option<CellKey> {
    let above = grid.get(key)?.above()?;
    let cell = grid.get(&above)?;
    if cell.status != CellStatus::Ground || cell.is_pre_assigned {
        return None;
    }
    let crowded = cell
        .neighbors
        .iter()
        .any(|n| grid.get(n).map(|c| c.is_pre_assigned).unwrap_or(false));
    if crowded {
        None
    } else {
        Some(above)
    }
}

/// Viable tunnel starts among `candidates`, best first.
///
/// A start is a free underground cell with a usable entry above it and more
/// than one free underground neighbour. Candidates are ordered by that
/// neighbour count, highest first.
pub fn tunnel_candidates(grid: &TierGrid, candidates: &[CellKey]) -> Vec<(CellKey, CellKey)> {
    let mut viable: Vec<(usize, CellKey, CellKey)> = candidates
        .iter()
        .filter(|k| is_free_underground(grid, k))
        .filter_map(|k| {
            let entry = entry_above(grid, k)?;
            let degree = underground_degree(grid, k);
            (degree > 1).then_some((degree, *k, entry))
        })
        .collect();
    viable.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    viable.dedup_by(|a, b| a.1 == b.1);
    viable.into_iter().map(|(_, start, entry)| (start, entry)).collect()
}

/// Grow a tunnel of at most `max_members` underground cells from the best
/// viable candidate.
///
/// On success the start is flagged `is_tunnel_start`, the entry is flagged
/// `is_tunnel_ground_entry` and typed [`CellKind::Basement`], and the other
/// underground members are typed [`CellKind::Tunnel`]. Registering the
/// returned cluster is left to the caller.
///
/// The walk never leaves the start's layer, so every member stays
/// reachable from the start over side links. Under
/// [`SearchPriority::SideAndSideLayerNeighbors`] the vertical links are
/// still looked at but never taken.
pub fn grow_tunnel(
    grid: &mut TierGrid,
    candidates: &[CellKey],
    max_members: usize,
    priority: SearchPriority,
    rng: &mut ChaCha8Rng,
) -> Option<TunnelResult> {
    if max_members == 0 {
        warn!("Tunnel requested with zero members");
        return None;
    }
    let viable = tunnel_candidates(grid, candidates);
    if viable.is_empty() {
        warn!("No viable tunnel start among {} candidates", candidates.len());
        return None;
    }

    for (start, entry) in viable {
        let filter = GrowthFilter::underground().on_layer(start.layer);
        let path = random_walk(grid, start, max_members, priority, &filter, rng);
        if path.is_empty() {
            debug!("Tunnel walk from {} came back empty", start);
            continue;
        }

        for key in &path {
            if let Some(cell) = grid.get_mut(key) {
                cell.cell_kind = CellKind::Tunnel;
            }
        }
        if let Some(cell) = grid.get_mut(&start) {
            cell.is_tunnel_start = true;
        }
        if let Some(cell) = grid.get_mut(&entry) {
            cell.is_tunnel_ground_entry = true;
            cell.cell_kind = CellKind::Basement;
        }

        let mut members = Vec::with_capacity(path.len() + 1);
        members.push(entry);
        members.extend(path);
        let mut cluster = Cluster::new(ClusterType::Tunnel, grid.tier, members)?;
        cluster.seed = start;

        info!(
            "Tunnel: entry {} -> start {} ({} underground cells)",
            entry,
            start,
            cluster.len() - 1
        );
        return Some(TunnelResult { entry, start, cluster });
    }

    warn!("Every viable tunnel start failed to grow");
    None
}

/// Grow a tunnel under the ground members of an existing cluster.
pub fn grow_tunnel_under_cluster(
    grid: &mut TierGrid,
    cluster: &Cluster,
    max_members: usize,
    priority: SearchPriority,
    rng: &mut ChaCha8Rng,
) -> Option<TunnelResult> {
    let candidates: Vec<CellKey> = cluster
        .ground_members(grid)
        .iter()
        .filter_map(|k| grid.get(k).and_then(|c| c.below()))
        .collect();
    if candidates.is_empty() {
        warn!("Cluster seeded at {} has nothing underground", cluster.seed);
        return None;
    }
    grow_tunnel(grid, &candidates, max_members, priority, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationContext;
    use crate::grid::{self, Tier, WorldIndex};
    use crate::hex;
    use glam::Vec3;
    use rand::SeedableRng;

    /// One worldspace of stacked sub-cells.
    fn stacked_world() -> (WorldIndex, Vec<CellKey>) {
        let ctx = GenerationContext::default();
        let mut index = WorldIndex::new(&ctx.tiers);
        let regions = grid::build_region_tier(&mut index, &ctx, Vec3::ZERO, 0);
        let areas = grid::build_area_tier(&mut index, &ctx, &regions);
        let center_area = CellKey::new(hex::lookup_key(Vec3::ZERO, ctx.tiers.area), 0);
        assert!(areas.contains(&center_area));
        let worldspaces = grid::build_worldspace_tier(&mut index, &ctx, &[center_area]);
        let center_ws = CellKey::new(hex::lookup_key(Vec3::ZERO, ctx.tiers.worldspace), 0);
        assert!(worldspaces.contains(&center_ws));
        let subs = grid::build_sub_cell_tier(&mut index, &ctx, &[center_ws]);
        grid::build_layer_stacks(&mut index, &ctx, None, &subs);
        (index, subs)
    }

    #[test]
    fn test_tunnel_has_one_linked_entry() {
        let (mut index, subs) = stacked_world();
        let candidates: Vec<CellKey> = subs.iter().map(|k| k.at_layer(-1)).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let result = grow_tunnel(&mut index.sub_cells, &candidates, 6, SearchPriority::SideNeighbors, &mut rng)
            .unwrap();
        let grid = &index.sub_cells;

        let entries: Vec<&CellKey> = result
            .cluster
            .members
            .iter()
            .filter(|k| grid.get(k).unwrap().is_tunnel_ground_entry)
            .collect();
        assert_eq!(entries, vec![&result.entry]);
        assert_eq!(grid.get(&result.entry).unwrap().below(), Some(result.start));
        assert_eq!(grid.get(&result.entry).unwrap().cell_kind, CellKind::Basement);
        assert!(grid.get(&result.start).unwrap().is_tunnel_start);

        let path = result.path();
        assert_eq!(path[0], result.start);
        assert!(path.len() <= 6);
        for key in path {
            let cell = grid.get(key).unwrap();
            assert_eq!(cell.status, CellStatus::UnderGround);
            assert_eq!(key.layer, result.start.layer);
        }

        // Every underground member is reachable from the start.
        let mut reached = vec![result.start];
        let mut i = 0;
        while i < reached.len() {
            let here = reached[i];
            for n in &grid.get(&here).unwrap().neighbors {
                if path.contains(n) && !reached.contains(n) {
                    reached.push(*n);
                }
            }
            i += 1;
        }
        assert_eq!(reached.len(), path.len());
    }

    #[test]
    fn test_layer_priority_tunnel_stays_on_start_layer() {
        for seed in 0..20 {
            let (mut index, subs) = stacked_world();
            let candidates: Vec<CellKey> = subs.iter().map(|k| k.at_layer(-1)).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let result = grow_tunnel(
                &mut index.sub_cells,
                &candidates,
                12,
                SearchPriority::SideAndSideLayerNeighbors,
                &mut rng,
            )
            .unwrap();
            assert!(result.path().iter().all(|k| k.layer == result.start.layer));

            assert!(index.register_cluster(result.cluster).is_some());
            let report = crate::verify::verify_world(&index, seed);
            assert!(report.passed(), "seed {}: {}", seed, report.format());
        }
    }

    #[test]
    fn test_no_candidates_returns_none() {
        let (mut index, subs) = stacked_world();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        // Ground cells are never tunnel starts.
        assert!(grow_tunnel(&mut index.sub_cells, &subs, 6, SearchPriority::SideNeighbors, &mut rng).is_none());
        assert!(grow_tunnel(&mut index.sub_cells, &[], 6, SearchPriority::SideNeighbors, &mut rng).is_none());
    }

    #[test]
    fn test_candidates_skip_claimed_entries() {
        let (mut index, subs) = stacked_world();
        let grid = &mut index.sub_cells;
        let target = subs
            .iter()
            .find(|k| grid.get(k).unwrap().neighbor_count() == 6)
            .copied()
            .unwrap();
        // A claimed neighbour next to the entry disqualifies the start below.
        let neighbor = grid.get(&target).unwrap().neighbors[0];
        grid.get_mut(&neighbor).unwrap().is_pre_assigned = true;

        let viable = tunnel_candidates(grid, &[target.at_layer(-1)]);
        assert!(viable.is_empty());
    }

    #[test]
    fn test_candidates_ordered_by_degree() {
        let (index, subs) = stacked_world();
        let grid = &index.sub_cells;
        let candidates: Vec<CellKey> = subs.iter().map(|k| k.at_layer(-1)).collect();
        let viable = tunnel_candidates(grid, &candidates);
        assert!(!viable.is_empty());
        let degrees: Vec<usize> = viable.iter().map(|(s, _)| underground_degree(grid, s)).collect();
        assert!(degrees.windows(2).all(|w| w[0] >= w[1]));
        for (start, entry) in &viable {
            assert_eq!(grid.get(start).unwrap().above(), Some(*entry));
        }
    }

    #[test]
    fn test_tunnel_under_cluster() {
        let (mut index, subs) = stacked_world();
        let interior: Vec<CellKey> = subs
            .iter()
            .filter(|k| index.sub_cells.get(k).unwrap().neighbor_count() == 6)
            .take(4)
            .copied()
            .collect();
        let outpost = Cluster::new(ClusterType::Outpost, Tier::SubCell, interior.clone()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let result = grow_tunnel_under_cluster(
            &mut index.sub_cells,
            &outpost,
            5,
            SearchPriority::SideNeighbors,
            &mut rng,
        )
        .unwrap();
        assert!(interior.contains(&result.entry));
    }
}
