//! Cell prototypes: one candidate hexagon at a tier, size and layer.

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::clusters::ClusterId;
use crate::hex::{self, Lookup};

/// Spatial tiers of the hierarchy, coarsest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Region,
    Area,
    Worldspace,
    SubCell,
    MicroCell,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Region,
        Tier::Area,
        Tier::Worldspace,
        Tier::SubCell,
        Tier::MicroCell,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Region => "Region",
            Tier::Area => "Area",
            Tier::Worldspace => "Worldspace",
            Tier::SubCell => "SubCell",
            Tier::MicroCell => "MicroCell",
        }
    }

    fn short_name(&self) -> &'static str {
        match self {
            Tier::Region => "R",
            Tier::Area => "A",
            Tier::Worldspace => "W",
            Tier::SubCell => "S",
            Tier::MicroCell => "M",
        }
    }

    pub fn parent(&self) -> Option<Tier> {
        match self {
            Tier::Region => None,
            Tier::Area => Some(Tier::Region),
            Tier::Worldspace => Some(Tier::Area),
            Tier::SubCell => Some(Tier::Worldspace),
            Tier::MicroCell => Some(Tier::SubCell),
        }
    }

    pub fn child(&self) -> Option<Tier> {
        match self {
            Tier::Region => Some(Tier::Area),
            Tier::Area => Some(Tier::Worldspace),
            Tier::Worldspace => Some(Tier::SubCell),
            Tier::SubCell => Some(Tier::MicroCell),
            Tier::MicroCell => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Key of a cell inside its tier map. Stacked cells share a lookup and
/// differ only by layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub lookup: Lookup,
    pub layer: i32,
}

impl CellKey {
    pub fn new(lookup: Lookup, layer: i32) -> Self {
        Self { lookup, layer }
    }

    /// Same column, different layer.
    pub fn at_layer(&self, layer: i32) -> Self {
        Self { lookup: self.lookup, layer }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:L{}", self.lookup, self.layer)
    }
}

/// Classification of a cell within its layer stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CellStatus {
    /// Not yet classified (fresh from the tier builder)
    #[default]
    Unassigned,
    /// Walkable surface cell
    Ground,
    /// Surface-level cell of a coarse tier (regions, areas, worldspaces)
    GenericGround,
    /// Below the ground layer of its column
    UnderGround,
    /// Taken out of generation entirely
    Removed,
    /// Ground layer sitting below sea level
    Underwater,
    /// Above the ground layer of its column
    AboveGround,
}

impl CellStatus {
    pub fn is_ground(&self) -> bool {
        matches!(self, CellStatus::Ground | CellStatus::GenericGround)
    }
}

/// Why (or whether) a cell sits on an edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeCellType {
    /// Not evaluated yet
    #[default]
    Default,
    /// Interior cell: six neighbours, all under the same parent
    None,
    /// Has a neighbour owned by a different parent
    ParentBoundary,
    /// Fewer than six resolved neighbours
    GridFrontier,
}

impl EdgeCellType {
    pub fn is_edge(&self) -> bool {
        matches!(self, EdgeCellType::ParentBoundary | EdgeCellType::GridFrontier)
    }
}

/// What a cell has been dedicated to by cluster post-processing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    #[default]
    Generic,
    /// Ground cell sitting on top of a tunnel start
    Basement,
    Road,
    Outpost,
    Tunnel,
}

/// A candidate hexagonal cell.
///
/// The tier map that holds a prototype owns it. `neighbors` and
/// `layer_neighbors` are keys into sibling entries of the same map and are
/// rebuilt by [`super::rehydrate`] rather than persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellPrototype {
    pub uid: u64,
    pub id: String,
    pub tier: Tier,
    pub lookup: Lookup,

    pub center: Vec3,
    pub size: f32,
    pub corner_points: [Vec3; 6],
    pub side_points: [Vec3; 6],

    pub parent_lookup: Option<Lookup>,
    pub world_space_lookup: Option<Lookup>,
    pub layer: i32,
    /// [below, above]
    #[serde(skip)]
    pub layer_neighbors: [Option<CellKey>; 2],
    #[serde(skip)]
    pub neighbors: Vec<CellKey>,

    pub status: CellStatus,
    pub edge_cell_type: EdgeCellType,
    pub cell_kind: CellKind,
    pub is_edge: bool,
    pub is_grid_host: bool,
    pub is_tunnel_start: bool,
    pub is_tunnel_ground_entry: bool,
    pub is_location_marker: bool,
    pub is_pre_assigned: bool,

    pub cluster_id: Option<ClusterId>,
    /// Surface elevation of the column this cell belongs to, once known.
    pub ground_elevation: Option<f32>,
}

pub const MAX_NEIGHBORS: usize = 6;
const BELOW: usize = 0;
const ABOVE: usize = 1;

impl CellPrototype {
    pub fn new(uid: u64, tier: Tier, center: Vec3, size: f32, layer: i32) -> Self {
        let lookup = hex::lookup_key(center, size);
        Self {
            uid,
            id: format!("{}{}:L{}", tier.short_name(), lookup, layer),
            tier,
            lookup,
            center,
            size,
            corner_points: hex::hex_corners(center, size),
            side_points: hex::hex_side_points(center, size),
            parent_lookup: None,
            world_space_lookup: None,
            layer,
            layer_neighbors: [None, None],
            neighbors: Vec::with_capacity(MAX_NEIGHBORS),
            status: CellStatus::Unassigned,
            edge_cell_type: EdgeCellType::Default,
            cell_kind: CellKind::Generic,
            is_edge: false,
            is_grid_host: false,
            is_tunnel_start: false,
            is_tunnel_ground_entry: false,
            is_location_marker: false,
            is_pre_assigned: false,
            cluster_id: None,
            ground_elevation: None,
        }
    }

    pub fn key(&self) -> CellKey {
        CellKey::new(self.lookup, self.layer)
    }

    /// Recompute the lookup from the center. Returns the stale lookup when
    /// it differed.
    pub(crate) fn refresh_lookup(&mut self) -> Option<Lookup> {
        let computed = hex::lookup_key(self.center, self.size);
        if computed == self.lookup {
            return None;
        }
        let stale = self.lookup;
        self.lookup = computed;
        self.id = format!("{}{}:L{}", self.tier.short_name(), computed, self.layer);
        Some(stale)
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn has_neighbor(&self, key: &CellKey) -> bool {
        self.neighbors.contains(key)
    }

    /// Record a same-layer neighbour. Refuses self links, duplicates and a
    /// seventh entry.
    pub(crate) fn add_neighbor(&mut self, key: CellKey) -> bool {
        if key == self.key() || self.has_neighbor(&key) || self.neighbors.len() >= MAX_NEIGHBORS {
            return false;
        }
        self.neighbors.push(key);
        self.neighbors.sort();
        true
    }

    pub(crate) fn remove_neighbor(&mut self, key: &CellKey) {
        self.neighbors.retain(|k| k != key);
    }

    pub fn below(&self) -> Option<CellKey> {
        self.layer_neighbors[BELOW]
    }

    pub fn above(&self) -> Option<CellKey> {
        self.layer_neighbors[ABOVE]
    }

    pub(crate) fn set_below(&mut self, key: Option<CellKey>) {
        self.layer_neighbors[BELOW] = key;
    }

    pub(crate) fn set_above(&mut self, key: Option<CellKey>) {
        self.layer_neighbors[ABOVE] = key;
    }

    pub fn is_removed(&self) -> bool {
        self.status == CellStatus::Removed
    }

    /// Cells with a `Removed` status never take part in growth or terrain.
    pub fn is_active(&self) -> bool {
        !self.is_removed()
    }
}
