//! Shortest-hop paths between clusters using A* over the same-layer
//! neighbour graph.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use tracing::{debug, info, warn};

use crate::grid::{CellKey, CellPrototype, TierGrid};
use crate::hex;

use super::types::{Cluster, ClusterType};

/// Node for the A* priority queue
#[derive(Clone, Copy, PartialEq, Eq)]
struct PathNode {
    key: CellKey,
    /// hops so far + heuristic
    estimate: u32,
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; key order keeps pops deterministic
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.key.cmp(&self.key))
    }
}

fn hop_distance(grid: &TierGrid, a: &CellPrototype, b: &CellPrototype) -> u32 {
    let size = grid.cell_size;
    hex::axial_distance(hex::axial_of(a.center, size), hex::axial_of(b.center, size)) as u32
}

/// Shortest path from `start` to `goal`, both included, stepping only on
/// cells for which `passable` holds. Start and goal are always passable.
pub fn find_cell_path<F>(grid: &TierGrid, start: CellKey, goal: CellKey, passable: F) -> Option<Vec<CellKey>>
where
    F: Fn(&CellKey, &CellPrototype) -> bool,
{
    let goal_cell = grid.get(&goal)?;
    let start_cell = grid.get(&start)?;
    if start.layer != goal.layer {
        return None;
    }

    let mut open = BinaryHeap::new();
    let mut came_from: BTreeMap<CellKey, CellKey> = BTreeMap::new();
    let mut g_score: BTreeMap<CellKey, u32> = BTreeMap::new();
    let mut closed: BTreeSet<CellKey> = BTreeSet::new();

    g_score.insert(start, 0);
    open.push(PathNode {
        key: start,
        estimate: hop_distance(grid, start_cell, goal_cell),
    });

    while let Some(PathNode { key: current, .. }) = open.pop() {
        if current == goal {
            let mut path = vec![current];
            let mut cursor = current;
            while let Some(prev) = came_from.get(&cursor) {
                cursor = *prev;
                path.push(cursor);
            }
            path.reverse();
            return Some(path);
        }
        if !closed.insert(current) {
            continue;
        }

        let g = g_score.get(&current).copied().unwrap_or(u32::MAX);
        let neighbors = match grid.get(&current) {
            Some(cell) => cell.neighbors.clone(),
            None => continue,
        };

        for next in neighbors {
            if closed.contains(&next) {
                continue;
            }
            let cell = match grid.get(&next) {
                Some(cell) => cell,
                None => continue,
            };
            if next != goal && !passable(&next, cell) {
                continue;
            }
            let tentative = g + 1;
            if tentative < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, current);
                g_score.insert(next, tentative);
                open.push(PathNode {
                    key: next,
                    estimate: tentative + hop_distance(grid, cell, goal_cell),
                });
            }
        }
    }
    None
}

/// Member of `cluster` that is on its rim (has a neighbour outside the
/// cluster) and closest to `target`. Falls back to any member when the
/// cluster has no rim.
fn facing_edge_cell(grid: &TierGrid, cluster: &Cluster, target: glam::Vec3) -> Option<CellKey> {
    let members: BTreeSet<CellKey> = cluster.members.iter().copied().collect();
    let distance = |k: &CellKey| {
        grid.get(k)
            .map(|c| hex::planar_distance(c.center, target))
            .unwrap_or(f32::MAX)
    };
    let rim: Vec<CellKey> = cluster
        .members
        .iter()
        .filter(|k| {
            grid.get(k)
                .map(|c| c.neighbors.iter().any(|n| !members.contains(n)))
                .unwrap_or(false)
        })
        .copied()
        .collect();
    let pool = if rim.is_empty() { &cluster.members } else { &rim };
    pool.iter().copied().min_by(|a, b| distance(a).total_cmp(&distance(b)))
}

fn centroid(grid: &TierGrid, cluster: &Cluster) -> Option<glam::Vec3> {
    let centers: Vec<glam::Vec3> = cluster
        .members
        .iter()
        .filter_map(|k| grid.get(k).map(|c| c.center))
        .collect();
    if centers.is_empty() {
        return None;
    }
    Some(centers.iter().copied().sum::<glam::Vec3>() / centers.len() as f32)
}

/// Connect `clusters` in sequence with shortest-hop paths and return the
/// connecting cells as a Path cluster.
///
/// Removed cells and cells held by another exclusive cluster are never
/// stepped on; with `ignore_edge_cells` edge cells are avoided too. The
/// members of the connected clusters themselves are walkable but are left
/// out of the result.
pub fn connect_clusters(grid: &TierGrid, clusters: &[&Cluster], ignore_edge_cells: bool) -> Option<Cluster> {
    let endpoints: Vec<&Cluster> = clusters
        .iter()
        .copied()
        .filter(|c| c.cluster_type != ClusterType::Path && c.tier == grid.tier && !c.is_empty())
        .collect();
    if endpoints.len() < 2 {
        warn!("Need at least 2 non-path clusters to connect, got {}", endpoints.len());
        return None;
    }

    let own: BTreeSet<CellKey> = endpoints.iter().flat_map(|c| c.members.iter().copied()).collect();
    let passable = |key: &CellKey, cell: &CellPrototype| {
        if cell.is_removed() {
            return false;
        }
        if own.contains(key) {
            return true;
        }
        if cell.is_pre_assigned {
            return false;
        }
        !(ignore_edge_cells && cell.is_edge)
    };

    let mut path_cells: Vec<CellKey> = Vec::new();
    for pair in endpoints.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (ca, cb) = match (centroid(grid, a), centroid(grid, b)) {
            (Some(ca), Some(cb)) => (ca, cb),
            _ => continue,
        };
        let (start, goal) = match (facing_edge_cell(grid, a, cb), facing_edge_cell(grid, b, ca)) {
            (Some(s), Some(g)) => (s, g),
            _ => continue,
        };

        match find_cell_path(grid, start, goal, &passable) {
            Some(path) => {
                debug!("Path {} -> {}: {} hops", start, goal, path.len().saturating_sub(1));
                path_cells.extend(path.into_iter().filter(|k| !own.contains(k)));
            }
            None => warn!("No path between {} and {}", start, goal),
        }
    }

    let mut seen = BTreeSet::new();
    path_cells.retain(|k| seen.insert(*k));
    if path_cells.is_empty() {
        warn!("Connecting {} clusters produced no path cells", endpoints.len());
        return None;
    }

    info!("Path cluster with {} cells joins {} clusters", path_cells.len(), endpoints.len());
    Cluster::new(ClusterType::Path, grid.tier, path_cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{resolve_neighbors, CellStatus, Tier};
    use glam::Vec3;

    fn patch(rings: u32) -> TierGrid {
        let mut grid = TierGrid::new(Tier::SubCell, 12.0);
        let mut keys = Vec::new();
        for (i, p) in hex::spiral_centers(Vec3::ZERO, 12.0, rings).into_iter().enumerate() {
            let mut cell = CellPrototype::new(i as u64 + 1, Tier::SubCell, p, 12.0, 0);
            cell.status = CellStatus::Ground;
            keys.push(grid.insert(cell).unwrap());
        }
        resolve_neighbors(&mut grid, &keys);
        grid
    }

    fn key_at(grid: &TierGrid, q: i32, r: i32) -> CellKey {
        let p = hex::axial_to_point(q, r, grid.cell_size);
        CellKey::new(hex::lookup_key(Vec3::new(p.x, 0.0, p.y), grid.cell_size), 0)
    }

    #[test]
    fn test_path_is_shortest() {
        let grid = patch(4);
        let start = key_at(&grid, -3, 0);
        let goal = key_at(&grid, 3, 0);
        let path = find_cell_path(&grid, start, goal, |_, _| true).unwrap();
        assert_eq!(path.len(), 7);
        assert_eq!(path[0], start);
        assert_eq!(path[6], goal);
        for pair in path.windows(2) {
            assert!(grid.get(&pair[0]).unwrap().has_neighbor(&pair[1]));
        }
    }

    #[test]
    fn test_path_avoids_removed() {
        let mut grid = patch(4);
        let start = key_at(&grid, -3, 0);
        let goal = key_at(&grid, 3, 0);
        let wall = key_at(&grid, 0, 0);
        grid.get_mut(&wall).unwrap().status = CellStatus::Removed;

        let path = find_cell_path(&grid, start, goal, |_, c| !c.is_removed()).unwrap();
        assert!(!path.contains(&wall));
        assert!(path.len() > 7);
    }

    #[test]
    fn test_connect_needs_two_clusters() {
        let grid = patch(2);
        let one = Cluster::new(ClusterType::Outpost, Tier::SubCell, vec![key_at(&grid, 0, 0)]).unwrap();
        assert!(connect_clusters(&grid, &[&one], false).is_none());
    }

    #[test]
    fn test_connect_clusters_builds_path() {
        let grid = patch(5);
        let west = Cluster::new(
            ClusterType::Outpost,
            Tier::SubCell,
            vec![key_at(&grid, -4, 0), key_at(&grid, -4, 1)],
        )
        .unwrap();
        let east = Cluster::new(
            ClusterType::Outpost,
            Tier::SubCell,
            vec![key_at(&grid, 4, 0), key_at(&grid, 4, -1)],
        )
        .unwrap();

        let path = connect_clusters(&grid, &[&west, &east], false).unwrap();
        assert_eq!(path.cluster_type, ClusterType::Path);
        assert!(path.members.iter().all(|k| !west.contains(k) && !east.contains(k)));
        assert!(path.len() >= 6);
    }
}
