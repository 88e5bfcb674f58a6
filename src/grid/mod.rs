//! The hierarchical hex grid: cell prototypes, per-tier maps and the
//! passes that build, stack, expand and rehydrate them.

pub mod builder;
pub mod cell;
pub mod expand;
pub mod index;
pub mod layers;

pub use builder::{
    build_area_tier, build_child_tier, build_micro_cell_tier, build_region_tier,
    build_sub_cell_tier, build_worldspace_tier, classify_edges, resolve_neighbors,
};
pub use cell::{CellKey, CellKind, CellPrototype, CellStatus, EdgeCellType, Tier, MAX_NEIGHBORS};
pub use expand::{expand_from, rehydrate, ExpansionResult, RehydrateReport};
pub use index::{TierGrid, WorldIndex};
pub use layers::{build_layer_stacks, ground_layer_of, LayerStackSummary};
