//! Cluster aggregates and the registry that finalizes them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grid::{CellKey, CellStatus, TierGrid, Tier};

/// Handle of a registered cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClusterType {
    Path,
    Edge,
    Outpost,
    Tunnel,
    Other,
}

impl ClusterType {
    /// A cell may belong to at most one cluster of an exclusive type.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, ClusterType::Path | ClusterType::Edge | ClusterType::Tunnel)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroundLayerRule {
    #[default]
    Unset,
    /// Force every ground member onto the same baseline layer
    NormalizeLayerDifference,
}

/// A group of connected cells grown for one purpose.
///
/// Members are keys into the tier map named by `tier`; the cluster never
/// owns the cells themselves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_type: ClusterType,
    pub ground_layer_rule: GroundLayerRule,
    pub tier: Tier,
    /// Cell the growth started from
    pub seed: CellKey,
    pub members: Vec<CellKey>,
}

impl Cluster {
    /// Returns `None` for an empty member list.
    pub fn new(cluster_type: ClusterType, tier: Tier, members: Vec<CellKey>) -> Option<Self> {
        let seed = *members.first()?;
        Some(Self {
            cluster_type,
            ground_layer_rule: GroundLayerRule::Unset,
            tier,
            seed,
            members,
        })
    }

    pub fn with_rule(mut self, rule: GroundLayerRule) -> Self {
        self.ground_layer_rule = rule;
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.members.contains(key)
    }

    /// Members whose cell is ground in `grid`.
    pub fn ground_members(&self, grid: &TierGrid) -> Vec<CellKey> {
        self.members
            .iter()
            .filter(|k| grid.get(k).map(|c| c.status.is_ground()).unwrap_or(false))
            .copied()
            .collect()
    }

    /// Apply [`GroundLayerRule::NormalizeLayerDifference`]: the lowest
    /// ground layer among members becomes the ground layer of every member
    /// column, and the column is re-stamped around it.
    ///
    /// Returns the number of cells whose status changed. Does nothing for
    /// other rules.
    pub fn normalize_ground_layers(&mut self, grid: &mut TierGrid) -> usize {
        if self.ground_layer_rule != GroundLayerRule::NormalizeLayerDifference {
            return 0;
        }
        let ground = self.ground_members(grid);
        let baseline = match ground.iter().map(|k| k.layer).min() {
            Some(layer) => layer,
            None => return 0,
        };

        let mut lookups: Vec<_> = self.members.iter().map(|k| k.lookup).collect();
        lookups.sort();
        lookups.dedup();

        let mut changed = 0;
        for lookup in lookups {
            for key in grid.column(&lookup) {
                if let Some(cell) = grid.get_mut(&key) {
                    if cell.is_removed() {
                        continue;
                    }
                    let status = match key.layer.cmp(&baseline) {
                        std::cmp::Ordering::Less => CellStatus::UnderGround,
                        std::cmp::Ordering::Equal => CellStatus::Ground,
                        std::cmp::Ordering::Greater => CellStatus::AboveGround,
                    };
                    if cell.status != status {
                        cell.status = status;
                        changed += 1;
                    }
                }
            }
        }

        // Members follow their column down to the baseline.
        for member in self.members.iter_mut() {
            if ground.contains(member) && member.layer != baseline {
                let moved = member.at_layer(baseline);
                if grid.contains(&moved) {
                    *member = moved;
                }
            }
        }
        let mut seen = BTreeSet::new();
        self.members.retain(|k| seen.insert(*k));
        if !self.members.contains(&self.seed) {
            if let Some(first) = self.members.first() {
                self.seed = *first;
            }
        }

        debug!("Normalized {} cells to ground layer {}", changed, baseline);
        changed
    }
}

/// Finalized clusters and the exclusive ownership they hold.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClusterRegistry {
    clusters: BTreeMap<ClusterId, Cluster>,
    /// (tier, cell) -> owner, for exclusive cluster types only
    #[serde(skip)]
    owners: BTreeMap<(Tier, CellKey), ClusterId>,
    next_id: u32,
}

impl ClusterRegistry {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClusterId, &Cluster)> {
        self.clusters.iter()
    }

    pub fn by_type(&self, cluster_type: ClusterType) -> Vec<(ClusterId, &Cluster)> {
        self.clusters
            .iter()
            .filter(|(_, c)| c.cluster_type == cluster_type)
            .map(|(id, c)| (*id, c))
            .collect()
    }

    /// Exclusive owner of a cell, if any.
    pub fn owner_of(&self, tier: Tier, key: &CellKey) -> Option<ClusterId> {
        self.owners.get(&(tier, *key)).copied()
    }

    /// Record `cluster` and stamp its members in `grid` (which must be the
    /// map of `cluster.tier`).
    ///
    /// An exclusive cluster that touches a cell already owned by another
    /// exclusive cluster is refused, as is any cluster with a member that no
    /// longer exists or was removed.
    pub fn register(&mut self, cluster: Cluster, grid: &mut TierGrid) -> Option<ClusterId> {
        if cluster.is_empty() || grid.tier != cluster.tier {
            return None;
        }
        for key in &cluster.members {
            match grid.get(key) {
                Some(cell) if cell.is_active() => {}
                _ => {
                    warn!("Cluster member {} is missing or removed", key);
                    return None;
                }
            }
            if cluster.cluster_type.is_exclusive() {
                if let Some(owner) = self.owner_of(cluster.tier, key) {
                    warn!(
                        "{:?} cluster overlaps {} at {}",
                        cluster.cluster_type, owner, key
                    );
                    return None;
                }
            }
        }

        let id = ClusterId(self.next_id);
        self.next_id += 1;

        for key in &cluster.members {
            if cluster.cluster_type.is_exclusive() {
                self.owners.insert((cluster.tier, *key), id);
                if let Some(cell) = grid.get_mut(key) {
                    cell.is_pre_assigned = true;
                }
            }
            if let Some(cell) = grid.get_mut(key) {
                cell.cluster_id.get_or_insert(id);
            }
        }

        debug!(
            "Registered {} ({:?}, {} members)",
            id,
            cluster.cluster_type,
            cluster.len()
        );
        self.clusters.insert(id, cluster);
        Some(id)
    }

    /// Rebuild the ownership table from the stored clusters (after load).
    pub(crate) fn rebuild_owners(&mut self) {
        self.owners.clear();
        for (id, cluster) in &self.clusters {
            if cluster.cluster_type.is_exclusive() {
                for key in &cluster.members {
                    self.owners.insert((cluster.tier, *key), *id);
                }
            }
        }
    }

    /// Rewrite member keys after a rehydrate re-keyed cells.
    pub(crate) fn remap_members(&mut self, tier: Tier, remap: &BTreeMap<CellKey, CellKey>) {
        if remap.is_empty() {
            return;
        }
        for cluster in self.clusters.values_mut().filter(|c| c.tier == tier) {
            for member in cluster.members.iter_mut() {
                if let Some(new_key) = remap.get(member) {
                    *member = *new_key;
                }
            }
            if let Some(new_key) = remap.get(&cluster.seed) {
                cluster.seed = *new_key;
            }
        }
        self.rebuild_owners();
    }
}

/// Drop members shared between clusters so that each cell appears once.
///
/// Earlier clusters keep contested cells. Clusters left with fewer than
/// `min_members` cells are discarded.
pub fn dedup_clusters(clusters: Vec<Cluster>, min_members: usize) -> Vec<Cluster> {
    let mut claimed: BTreeSet<CellKey> = BTreeSet::new();
    let mut kept = Vec::with_capacity(clusters.len());

    for mut cluster in clusters {
        cluster.members.retain(|k| claimed.insert(*k));
        if cluster.members.len() < min_members.max(1) {
            debug!("Dropping {:?} cluster after dedup", cluster.cluster_type);
            continue;
        }
        if !cluster.members.contains(&cluster.seed) {
            cluster.seed = cluster.members[0];
        }
        kept.push(cluster);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellPrototype;
    use crate::hex;
    use glam::Vec3;

    fn line_grid(n: usize) -> (TierGrid, Vec<CellKey>) {
        let mut grid = TierGrid::new(Tier::SubCell, 12.0);
        let mut keys = Vec::new();
        let mut center = Vec3::ZERO;
        for i in 0..n {
            let mut cell = CellPrototype::new(i as u64 + 1, Tier::SubCell, center, 12.0, 0);
            cell.status = CellStatus::Ground;
            keys.push(grid.insert(cell).unwrap());
            center = hex::neighbor_centers(center, 12.0)[0];
        }
        (grid, keys)
    }

    #[test]
    fn test_empty_cluster_is_none() {
        assert!(Cluster::new(ClusterType::Other, Tier::SubCell, vec![]).is_none());
    }

    #[test]
    fn test_exclusive_overlap_refused() {
        let (mut grid, keys) = line_grid(4);
        let mut registry = ClusterRegistry::default();

        let path = Cluster::new(ClusterType::Path, Tier::SubCell, keys[..3].to_vec()).unwrap();
        let id = registry.register(path, &mut grid).unwrap();
        assert!(grid.get(&keys[0]).unwrap().is_pre_assigned);
        assert_eq!(grid.get(&keys[0]).unwrap().cluster_id, Some(id));
        assert_eq!(registry.owner_of(Tier::SubCell, &keys[2]), Some(id));

        let tunnel = Cluster::new(ClusterType::Tunnel, Tier::SubCell, keys[2..].to_vec()).unwrap();
        assert!(registry.register(tunnel, &mut grid).is_none());
        assert_eq!(registry.len(), 1);

        // Non-exclusive clusters may share cells.
        let other = Cluster::new(ClusterType::Other, Tier::SubCell, keys[1..].to_vec()).unwrap();
        assert!(registry.register(other, &mut grid).is_some());
        assert!(!grid.get(&keys[3]).unwrap().is_pre_assigned);
    }

    #[test]
    fn test_by_type_filters() {
        let (mut grid, keys) = line_grid(4);
        let mut registry = ClusterRegistry::default();
        let path = Cluster::new(ClusterType::Path, Tier::SubCell, keys[..2].to_vec()).unwrap();
        let other = Cluster::new(ClusterType::Other, Tier::SubCell, keys[2..].to_vec()).unwrap();
        let path_id = registry.register(path, &mut grid).unwrap();
        registry.register(other, &mut grid).unwrap();

        let paths = registry.by_type(ClusterType::Path);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].0, path_id);
        assert!(registry.by_type(ClusterType::Tunnel).is_empty());
    }

    #[test]
    fn test_register_refuses_removed_member() {
        let (mut grid, keys) = line_grid(3);
        grid.get_mut(&keys[1]).unwrap().status = CellStatus::Removed;
        let mut registry = ClusterRegistry::default();
        let edge = Cluster::new(ClusterType::Edge, Tier::SubCell, keys.clone()).unwrap();
        assert!(registry.register(edge, &mut grid).is_none());
    }

    #[test]
    fn test_dedup_keeps_first_owner() {
        let (_, keys) = line_grid(5);
        let a = Cluster::new(ClusterType::Other, Tier::SubCell, keys[..3].to_vec()).unwrap();
        let b = Cluster::new(ClusterType::Other, Tier::SubCell, keys[2..].to_vec()).unwrap();
        let c = Cluster::new(ClusterType::Other, Tier::SubCell, keys[..2].to_vec()).unwrap();

        let kept = dedup_clusters(vec![a, b, c], 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].members, keys[..3].to_vec());
        assert_eq!(kept[1].members, keys[3..].to_vec());
        assert_eq!(kept[1].seed, keys[3]);
    }

    #[test]
    fn test_normalize_drops_scattered_duplicates() {
        let (mut grid, keys) = line_grid(2);
        // Column 0: layer 0 turned underground, its ground raised to layer 1.
        grid.get_mut(&keys[0]).unwrap().status = CellStatus::UnderGround;
        let c0 = grid.get(&keys[0]).unwrap().center;
        let mut raised = CellPrototype::new(20, Tier::SubCell, c0 + Vec3::Y * 4.0, 12.0, 1);
        raised.status = CellStatus::Ground;
        let raised_key = grid.insert(raised).unwrap();

        let mut cluster = Cluster::new(ClusterType::Outpost, Tier::SubCell, vec![keys[0], keys[1], raised_key])
            .unwrap()
            .with_rule(GroundLayerRule::NormalizeLayerDifference);
        cluster.normalize_ground_layers(&mut grid);

        assert_eq!(cluster.members, vec![keys[0], keys[1]]);
        assert_eq!(grid.get(&keys[0]).unwrap().status, CellStatus::Ground);
    }

    #[test]
    fn test_normalize_ground_layers() {
        let (mut grid, keys) = line_grid(2);
        // Column 0 gets a stack: UnderGround at -1, Ground at 0.
        // Column 1's ground is pushed up to layer 1.
        let mut lower = CellPrototype::new(10, Tier::SubCell, Vec3::new(0.0, -4.0, 0.0), 12.0, -1);
        lower.status = CellStatus::UnderGround;
        grid.insert(lower).unwrap();

        let c1 = grid.get(&keys[1]).unwrap().center;
        let mut raised = CellPrototype::new(11, Tier::SubCell, c1 + Vec3::Y * 4.0, 12.0, 1);
        raised.status = CellStatus::Ground;
        let raised_key = grid.insert(raised).unwrap();
        grid.get_mut(&keys[1]).unwrap().status = CellStatus::UnderGround;

        let mut cluster = Cluster::new(ClusterType::Outpost, Tier::SubCell, vec![keys[0], raised_key])
            .unwrap()
            .with_rule(GroundLayerRule::NormalizeLayerDifference);
        let changed = cluster.normalize_ground_layers(&mut grid);

        assert_eq!(changed, 2);
        assert_eq!(grid.get(&keys[1]).unwrap().status, CellStatus::Ground);
        assert_eq!(grid.get(&raised_key).unwrap().status, CellStatus::AboveGround);
        assert_eq!(cluster.members, vec![keys[0], keys[1]]);
    }
}
