//! Constraint-driven outposts and the summary handed to placement code.

use std::collections::BTreeSet;
use std::ops::Range;

use glam::Vec3;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grid::{CellKey, CellKind, TierGrid};
use crate::hex;

use super::growth::{grow_cluster, GrowthFilter, GrowthOptions, SearchPriority};
use super::types::{Cluster, ClusterType, GroundLayerRule};

/// Numeric constraints a location places on the cluster grown for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationConstraints {
    pub member_count: Range<usize>,
    /// Accepted ground elevation of every member
    pub elevation: Option<Range<f32>>,
    pub priority: SearchPriority,
    pub exclude_edge: bool,
    /// Flatten member columns onto one ground layer after growth
    pub normalize_ground: bool,
}

impl Default for LocationConstraints {
    fn default() -> Self {
        Self {
            member_count: 4..8,
            elevation: None,
            priority: SearchPriority::SideNeighbors,
            exclude_edge: true,
            normalize_ground: false,
        }
    }
}

impl LocationConstraints {
    fn growth_options(&self) -> GrowthOptions {
        let filter = GrowthFilter {
            exclude_parent_grid_edge: self.exclude_edge,
            elevation: self.elevation.clone(),
            ..GrowthFilter::surface()
        };
        GrowthOptions::new(ClusterType::Outpost, self.member_count.clone())
            .with_priority(self.priority)
            .with_filter(filter)
    }
}

/// Grow an outpost from the first of `seeds` (tried in shuffled order) that
/// yields a cluster meeting `constraints`.
pub fn grow_location(
    grid: &TierGrid,
    seeds: &[CellKey],
    constraints: &LocationConstraints,
    rng: &mut ChaCha8Rng,
) -> Option<Cluster> {
    let options = constraints.growth_options();
    let mut order: Vec<CellKey> = seeds
        .iter()
        .filter(|k| options.filter.accepts(grid, k))
        .copied()
        .collect();
    if order.is_empty() {
        warn!("No seed among {} meets the location constraints", seeds.len());
        return None;
    }
    order.shuffle(rng);

    for seed in order {
        if let Some(cluster) = grow_cluster(grid, seed, &options, rng) {
            let rule = if constraints.normalize_ground {
                GroundLayerRule::NormalizeLayerDifference
            } else {
                GroundLayerRule::Unset
            };
            return Some(cluster.with_rule(rule));
        }
        debug!("Location growth from {} fell short", seed);
    }
    warn!("No location could be grown from {} seeds", seeds.len());
    None
}

/// Footprint of a grown location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub cluster_type: ClusterType,
    pub center: Vec3,
    /// Distance from `center` to the farthest member corner
    pub radius: f32,
    /// Side midpoints where a member borders a walkable non-member: free
    /// ground or a road that was routed up to the location
    pub entry_points: Vec<Vec3>,
    pub member_count: usize,
}

impl LocationData {
    pub fn from_cluster(cluster: &Cluster, grid: &TierGrid) -> Option<Self> {
        let cells: Vec<_> = cluster.members.iter().filter_map(|k| grid.get(k)).collect();
        if cells.is_empty() {
            return None;
        }
        let center = cells.iter().map(|c| c.center).sum::<Vec3>() / cells.len() as f32;
        let radius = cells
            .iter()
            .map(|c| hex::planar_distance(c.center, center) + c.size)
            .fold(0.0, f32::max);

        let members: BTreeSet<CellKey> = cluster.members.iter().copied().collect();
        let mut entry_points = Vec::new();
        for cell in &cells {
            let lookups = hex::neighbor_lookups(cell.center, cell.size);
            for (side, lookup) in lookups.iter().enumerate() {
                let key = CellKey::new(*lookup, cell.layer);
                if members.contains(&key) {
                    continue;
                }
                let walkable = grid
                    .get(&key)
                    .map(|n| {
                        n.is_active() && n.status.is_ground() && (!n.is_pre_assigned || n.cell_kind == CellKind::Road)
                    })
                    .unwrap_or(false);
                if walkable {
                    entry_points.push(cell.side_points[side]);
                }
            }
        }

        Some(Self {
            cluster_type: cluster.cluster_type,
            center,
            radius,
            entry_points,
            member_count: cluster.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{resolve_neighbors, CellPrototype, CellStatus, Tier};
    use rand::SeedableRng;

    fn patch(rings: u32) -> (TierGrid, Vec<CellKey>) {
        let mut grid = TierGrid::new(Tier::SubCell, 12.0);
        let mut keys = Vec::new();
        for (i, p) in hex::spiral_centers(Vec3::ZERO, 12.0, rings).into_iter().enumerate() {
            let mut cell = CellPrototype::new(i as u64 + 1, Tier::SubCell, p, 12.0, 0);
            cell.status = CellStatus::Ground;
            // Elevation rises with distance from the origin.
            cell.ground_elevation = Some(hex::planar_distance(p, Vec3::ZERO));
            keys.push(grid.insert(cell).unwrap());
        }
        resolve_neighbors(&mut grid, &keys);
        (grid, keys)
    }

    #[test]
    fn test_location_respects_elevation() {
        let (grid, keys) = patch(4);
        let constraints = LocationConstraints {
            member_count: 3..6,
            elevation: Some(0.0..40.0),
            exclude_edge: false,
            ..LocationConstraints::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let cluster = grow_location(&grid, &keys, &constraints, &mut rng).unwrap();
        assert_eq!(cluster.cluster_type, ClusterType::Outpost);
        assert!((3..6).contains(&cluster.len()));
        for k in &cluster.members {
            assert!(grid.get(k).unwrap().ground_elevation.unwrap() < 40.0);
        }
    }

    #[test]
    fn test_unreachable_elevation_gives_none() {
        let (grid, keys) = patch(2);
        let constraints = LocationConstraints {
            elevation: Some(500.0..600.0),
            ..LocationConstraints::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(grow_location(&grid, &keys, &constraints, &mut rng).is_none());
    }

    #[test]
    fn test_normalize_rule_is_set() {
        let (grid, keys) = patch(3);
        let constraints = LocationConstraints {
            exclude_edge: false,
            normalize_ground: true,
            ..LocationConstraints::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let cluster = grow_location(&grid, &keys, &constraints, &mut rng).unwrap();
        assert_eq!(cluster.ground_layer_rule, GroundLayerRule::NormalizeLayerDifference);
    }

    #[test]
    fn test_location_data_single_cell() {
        let (grid, keys) = patch(1);
        let cluster = Cluster::new(ClusterType::Outpost, Tier::SubCell, vec![keys[0]]).unwrap();
        let data = LocationData::from_cluster(&cluster, &grid).unwrap();
        assert!(hex::planar_distance(data.center, Vec3::ZERO) < 1e-3);
        assert!((data.radius - 12.0).abs() < 1e-3);
        // Surrounded on all six sides by walkable ground.
        assert_eq!(data.entry_points.len(), 6);
        for p in &data.entry_points {
            assert!((hex::planar_distance(*p, Vec3::ZERO) - 12.0 * hex::SQRT_3 * 0.5).abs() < 1e-3);
        }
    }

    #[test]
    fn test_roads_count_as_entries() {
        let (mut grid, keys) = patch(1);
        let around = grid.get(&keys[0]).unwrap().neighbors.clone();
        let road = grid.get_mut(&around[0]).unwrap();
        road.is_pre_assigned = true;
        road.cell_kind = CellKind::Road;
        // A claimed rim cell stays closed.
        grid.get_mut(&around[1]).unwrap().is_pre_assigned = true;

        let cluster = Cluster::new(ClusterType::Outpost, Tier::SubCell, vec![keys[0]]).unwrap();
        let data = LocationData::from_cluster(&cluster, &grid).unwrap();
        assert_eq!(data.entry_points.len(), 5);
    }
}
