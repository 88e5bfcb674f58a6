//! Per-tier cell maps and the world index that owns them.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec3;
use tracing::warn;

use crate::clusters::{Cluster, ClusterId, ClusterRegistry};
use crate::config::TierSizes;
use crate::hex::{self, Lookup};

use super::cell::{CellKey, CellPrototype, Tier};

/// One tier's cells, keyed by lookup and layer.
///
/// Ordered maps keep iteration (and therefore every seeded growth pass)
/// reproducible.
#[derive(Clone, Debug)]
pub struct TierGrid {
    pub tier: Tier,
    pub cell_size: f32,
    cells: BTreeMap<CellKey, CellPrototype>,
    /// Parent lookup -> children built under it, every layer
    children: BTreeMap<Lookup, BTreeSet<CellKey>>,
}

impl TierGrid {
    pub fn new(tier: Tier, cell_size: f32) -> Self {
        Self {
            tier,
            cell_size,
            cells: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, key: &CellKey) -> Option<&CellPrototype> {
        self.cells.get(key)
    }

    pub fn get_mut(&mut self, key: &CellKey) -> Option<&mut CellPrototype> {
        self.cells.get_mut(key)
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.cells.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &CellKey> {
        self.cells.keys()
    }

    pub fn cells(&self) -> impl Iterator<Item = &CellPrototype> {
        self.cells.values()
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut CellPrototype> {
        self.cells.values_mut()
    }

    /// Cell containing `point` on `layer`, if built.
    pub fn cell_at(&self, point: Vec3, layer: i32) -> Option<&CellPrototype> {
        let lookup = hex::lookup_key(point, self.cell_size);
        self.cells.get(&CellKey::new(lookup, layer))
    }

    /// Insert a new cell. A key that is already taken keeps its owner and the
    /// newcomer is handed back.
    pub fn insert(&mut self, cell: CellPrototype) -> Result<CellKey, CellPrototype> {
        let key = cell.key();
        if self.cells.contains_key(&key) {
            return Err(cell);
        }
        if let Some(parent) = cell.parent_lookup {
            self.children.entry(parent).or_default().insert(key);
        }
        self.cells.insert(key, cell);
        Ok(key)
    }

    /// Drop a cell and every link pointing at it.
    pub fn remove(&mut self, key: &CellKey) -> Option<CellPrototype> {
        let cell = self.cells.remove(key)?;
        for n in &cell.neighbors {
            if let Some(other) = self.cells.get_mut(n) {
                other.remove_neighbor(key);
            }
        }
        if let Some(below) = cell.below() {
            if let Some(other) = self.cells.get_mut(&below) {
                other.set_above(None);
            }
        }
        if let Some(above) = cell.above() {
            if let Some(other) = self.cells.get_mut(&above) {
                other.set_below(None);
            }
        }
        if let Some(parent) = cell.parent_lookup {
            if let Some(set) = self.children.get_mut(&parent) {
                set.remove(key);
            }
        }
        Some(cell)
    }

    /// Children recorded under `parent`, across all layers.
    pub fn children_of(&self, parent: &Lookup) -> Vec<CellKey> {
        self.children
            .get(parent)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Link two same-layer cells both ways. Nothing changes unless both ends
    /// exist, share a layer and still have room for another neighbour.
    pub fn link_neighbors(&mut self, a: CellKey, b: CellKey) -> bool {
        if a == b || a.layer != b.layer {
            return false;
        }
        let room = |grid: &Self, k: &CellKey, other: &CellKey| {
            grid.cells
                .get(k)
                .map(|c| c.has_neighbor(other) || c.neighbor_count() < super::cell::MAX_NEIGHBORS)
                .unwrap_or(false)
        };
        if !room(self, &a, &b) || !room(self, &b, &a) {
            return false;
        }
        let mut changed = false;
        if let Some(cell) = self.cells.get_mut(&a) {
            changed |= cell.add_neighbor(b);
        }
        if let Some(cell) = self.cells.get_mut(&b) {
            changed |= cell.add_neighbor(a);
        }
        changed
    }

    /// Stack `upper` directly on top of `lower`.
    pub fn link_layers(&mut self, lower: CellKey, upper: CellKey) -> bool {
        if lower.lookup != upper.lookup || upper.layer != lower.layer + 1 {
            return false;
        }
        if !self.cells.contains_key(&lower) || !self.cells.contains_key(&upper) {
            return false;
        }
        if let Some(cell) = self.cells.get_mut(&lower) {
            cell.set_above(Some(upper));
        }
        if let Some(cell) = self.cells.get_mut(&upper) {
            cell.set_below(Some(lower));
        }
        true
    }

    pub(crate) fn clear_links(&mut self) {
        for cell in self.cells.values_mut() {
            cell.neighbors.clear();
            cell.set_below(None);
            cell.set_above(None);
        }
    }

    pub(crate) fn rebuild_children(&mut self) {
        self.children.clear();
        for (key, cell) in &self.cells {
            if let Some(parent) = cell.parent_lookup {
                self.children.entry(parent).or_default().insert(*key);
            }
        }
    }

    /// All layers stacked at one lookup, lowest first.
    pub fn column(&self, lookup: &Lookup) -> Vec<CellKey> {
        let lo = CellKey::new(*lookup, i32::MIN);
        let hi = CellKey::new(*lookup, i32::MAX);
        self.cells.range(lo..=hi).map(|(k, _)| *k).collect()
    }
}

/// Every tier map of one world plus the clusters grown on it.
#[derive(Clone, Debug)]
pub struct WorldIndex {
    pub regions: TierGrid,
    pub areas: TierGrid,
    pub worldspaces: TierGrid,
    pub sub_cells: TierGrid,
    pub micro_cells: TierGrid,
    pub clusters: ClusterRegistry,
    next_uid: u64,
}

impl WorldIndex {
    pub fn new(sizes: &TierSizes) -> Self {
        Self {
            regions: TierGrid::new(Tier::Region, sizes.region),
            areas: TierGrid::new(Tier::Area, sizes.area),
            worldspaces: TierGrid::new(Tier::Worldspace, sizes.worldspace),
            sub_cells: TierGrid::new(Tier::SubCell, sizes.sub_cell),
            micro_cells: TierGrid::new(Tier::MicroCell, sizes.micro_cell),
            clusters: ClusterRegistry::default(),
            next_uid: 1,
        }
    }

    pub fn tier(&self, tier: Tier) -> &TierGrid {
        match tier {
            Tier::Region => &self.regions,
            Tier::Area => &self.areas,
            Tier::Worldspace => &self.worldspaces,
            Tier::SubCell => &self.sub_cells,
            Tier::MicroCell => &self.micro_cells,
        }
    }

    pub fn tier_mut(&mut self, tier: Tier) -> &mut TierGrid {
        match tier {
            Tier::Region => &mut self.regions,
            Tier::Area => &mut self.areas,
            Tier::Worldspace => &mut self.worldspaces,
            Tier::SubCell => &mut self.sub_cells,
            Tier::MicroCell => &mut self.micro_cells,
        }
    }

    pub fn cell(&self, tier: Tier, key: &CellKey) -> Option<&CellPrototype> {
        self.tier(tier).get(key)
    }

    pub(crate) fn next_uid(&mut self) -> u64 {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    /// Keep uids unique after cells were loaded from elsewhere.
    pub(crate) fn resync_uids(&mut self) {
        let max = Tier::ALL
            .iter()
            .flat_map(|t| self.tier(*t).cells().map(|c| c.uid))
            .max()
            .unwrap_or(0);
        self.next_uid = max + 1;
    }

    /// Mark a cell removed. It stays in the map (so its lookup stays
    /// claimed) but growth and terrain passes skip it.
    pub fn remove_cell(&mut self, tier: Tier, key: &CellKey) -> bool {
        match self.tier_mut(tier).get_mut(key) {
            Some(cell) => {
                cell.status = super::CellStatus::Removed;
                true
            }
            None => false,
        }
    }

    /// Finalize a cluster: record ownership and stamp its members.
    pub fn register_cluster(&mut self, cluster: Cluster) -> Option<ClusterId> {
        let tier = cluster.tier;
        let grid = match tier {
            Tier::Region => &mut self.regions,
            Tier::Area => &mut self.areas,
            Tier::Worldspace => &mut self.worldspaces,
            Tier::SubCell => &mut self.sub_cells,
            Tier::MicroCell => &mut self.micro_cells,
        };
        let id = self.clusters.register(cluster, grid);
        if id.is_none() {
            warn!("Cluster registration refused on {} tier", tier);
        }
        id
    }

    pub fn summary(&self) -> String {
        format!(
            "regions: {} | areas: {} | worldspaces: {} | sub-cells: {} | micro-cells: {} | clusters: {}",
            self.regions.len(),
            self.areas.len(),
            self.worldspaces.len(),
            self.sub_cells.len(),
            self.micro_cells.len(),
            self.clusters.len(),
        )
    }
}
