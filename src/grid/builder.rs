//! Tier construction: radiate candidate centers under each parent, keep the
//! ones the parent actually covers, then stitch neighbours across the whole
//! tier.
//!
//! Candidate points come from the global lattice of the child size, so two
//! parents that both reach a border point compute the same lookup for it.
//! Whichever parent is processed first owns it; the other sees the key taken
//! and skips it.

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::config::GenerationContext;
use crate::hex::{self, Lookup};

use super::cell::{CellKey, CellPrototype, CellStatus, EdgeCellType, Tier};
use super::index::{TierGrid, WorldIndex};

/// Extra lattice rings searched beyond the parent's radius.
const CANDIDATE_PADDING_RINGS: u32 = 3;

/// Fraction of the parent size inside which a candidate is accepted even
/// when it falls outside the parent polygon.
const PARENT_DISC_FRACTION: f32 = 0.95;

/// Snapshot of the parent fields a child build needs, taken before the
/// child tier is borrowed mutably.
struct ParentInfo {
    key: CellKey,
    tier: Tier,
    lookup: Lookup,
    center: Vec3,
    size: f32,
    world_space_lookup: Option<Lookup>,
    status: CellStatus,
}

/// Build (or extend) the root tier: `rings` rings of regions around the
/// region containing `origin`.
pub fn build_region_tier(
    index: &mut WorldIndex,
    ctx: &GenerationContext,
    origin: Vec3,
    rings: u32,
) -> Vec<CellKey> {
    let size = ctx.cell_size(Tier::Region);
    let mut created = Vec::new();

    for point in hex::spiral_centers(Vec3::new(origin.x, 0.0, origin.z), size, rings) {
        if let Some(key) = create_root_cell(index, point, size) {
            created.push(key);
        }
    }

    let links = resolve_neighbors(&mut index.regions, &created);
    classify_edges(&mut index.regions, &created);
    info!(
        "Region tier: {} new regions, {} neighbour links (total {})",
        created.len(),
        links,
        index.regions.len()
    );
    created
}

/// Create any missing regions around `key` so the root tier can keep
/// growing outward. Returns the regions that were created.
pub(crate) fn ensure_region_neighbors(
    index: &mut WorldIndex,
    ctx: &GenerationContext,
    key: &CellKey,
) -> Vec<CellKey> {
    let size = ctx.cell_size(Tier::Region);
    let center = match index.regions.get(key) {
        Some(cell) => cell.center,
        None => return Vec::new(),
    };

    let mut created = Vec::new();
    for point in hex::neighbor_centers(center, size) {
        if let Some(k) = create_root_cell(index, point, size) {
            created.push(k);
        }
    }

    if !created.is_empty() {
        let mut touched = created.clone();
        touched.push(*key);
        resolve_neighbors(&mut index.regions, &touched);
        classify_edges(&mut index.regions, &touched);
        debug!("Grew {} regions around {}", created.len(), key);
    }
    created
}

fn create_root_cell(index: &mut WorldIndex, point: Vec3, size: f32) -> Option<CellKey> {
    let key = CellKey::new(hex::lookup_key(point, size), 0);
    if index.regions.contains(&key) {
        return None;
    }
    let uid = index.next_uid();
    let mut cell = CellPrototype::new(uid, Tier::Region, point, size, 0);
    cell.status = CellStatus::GenericGround;
    index.regions.insert(cell).ok()
}

pub fn build_area_tier(index: &mut WorldIndex, ctx: &GenerationContext, regions: &[CellKey]) -> Vec<CellKey> {
    build_child_tier(index, ctx, Tier::Area, regions)
}

pub fn build_worldspace_tier(index: &mut WorldIndex, ctx: &GenerationContext, areas: &[CellKey]) -> Vec<CellKey> {
    build_child_tier(index, ctx, Tier::Worldspace, areas)
}

pub fn build_sub_cell_tier(
    index: &mut WorldIndex,
    ctx: &GenerationContext,
    worldspaces: &[CellKey],
) -> Vec<CellKey> {
    build_child_tier(index, ctx, Tier::SubCell, worldspaces)
}

pub fn build_micro_cell_tier(
    index: &mut WorldIndex,
    ctx: &GenerationContext,
    sub_cells: &[CellKey],
) -> Vec<CellKey> {
    build_child_tier(index, ctx, Tier::MicroCell, sub_cells)
}

/// Build the cells of `tier` under each of `parents` (keys in the parent
/// tier), then resolve neighbours for everything that was created.
///
/// Parents that already host a grid are skipped, so calling this twice for
/// the same parent is harmless.
pub fn build_child_tier(
    index: &mut WorldIndex,
    ctx: &GenerationContext,
    tier: Tier,
    parents: &[CellKey],
) -> Vec<CellKey> {
    let parent_tier = match tier.parent() {
        Some(t) => t,
        None => {
            warn!("{} has no parent tier; use build_region_tier", tier);
            return Vec::new();
        }
    };
    let child_size = ctx.cell_size(tier);

    let mut hosts = Vec::with_capacity(parents.len());
    {
        let parent_grid = index.tier(parent_tier);
        for key in parents {
            match parent_grid.get(key) {
                Some(p) if p.is_removed() => {
                    debug!("Skipping removed parent {}", key);
                }
                Some(p) if p.is_grid_host => {
                    debug!("Parent {} already hosts a {} grid", key, tier);
                }
                Some(p) => hosts.push(ParentInfo {
                    key: *key,
                    tier: p.tier,
                    lookup: p.lookup,
                    center: p.center,
                    size: p.size,
                    world_space_lookup: p.world_space_lookup,
                    status: p.status,
                }),
                None => warn!("Parent {} not found in {} tier", key, parent_tier),
            }
        }
    }

    let mut created = Vec::new();
    for parent in &hosts {
        let before = created.len();
        let rings = hex::covering_rings(parent.size, child_size, CANDIDATE_PADDING_RINGS);
        let origin = Vec3::new(parent.center.x, 0.0, parent.center.z);

        for point in hex::spiral_centers(origin, child_size, rings) {
            let lookup = hex::lookup_key(point, child_size);
            let key = CellKey::new(lookup, parent.key.layer);

            // Border points may already belong to a neighbouring parent.
            if index.tier(tier).contains(&key) {
                continue;
            }

            let covered = hex::point_in_hex(point, parent.center, parent.size)
                || hex::planar_distance(point, parent.center) <= parent.size * PARENT_DISC_FRACTION;
            if !covered {
                continue;
            }

            let uid = index.next_uid();
            let mut cell = CellPrototype::new(uid, tier, point, child_size, parent.key.layer);
            cell.parent_lookup = Some(parent.lookup);
            cell.world_space_lookup = match (tier, parent.tier) {
                (Tier::Worldspace, _) => Some(lookup),
                (_, Tier::Worldspace) => Some(parent.lookup),
                _ => parent.world_space_lookup,
            };
            cell.status = match tier {
                Tier::SubCell => CellStatus::Ground,
                Tier::MicroCell => parent.status,
                _ => CellStatus::GenericGround,
            };

            if let Ok(k) = index.tier_mut(tier).insert(cell) {
                created.push(k);
            }
        }

        if let Some(p) = index.tier_mut(parent_tier).get_mut(&parent.key) {
            p.is_grid_host = true;
        }
        debug!(
            "{} {} -> {} {} cells",
            parent_tier,
            parent.lookup,
            created.len() - before,
            tier
        );
    }

    let grid = index.tier_mut(tier);
    let links = resolve_neighbors(grid, &created);
    classify_edges(grid, &created);

    info!(
        "{} tier: {} parents -> {} new cells, {} neighbour links (total {})",
        tier,
        hosts.len(),
        created.len(),
        links,
        grid.len()
    );
    created
}

/// Link each of `keys` to its six theoretical neighbours wherever those
/// exist on the same layer. A neighbour may live under a different parent;
/// the tier map is shared, so no parent boundary stops the lookup.
///
/// Returns the number of new links.
pub fn resolve_neighbors(grid: &mut TierGrid, keys: &[CellKey]) -> usize {
    let size = grid.cell_size;
    let mut links = 0;
    let mut cross_parent = 0;

    for key in keys {
        let (center, parent) = match grid.get(key) {
            Some(cell) => (cell.center, cell.parent_lookup),
            None => continue,
        };

        for lookup in hex::neighbor_lookups(center, size) {
            let other = CellKey::new(lookup, key.layer);
            let other_parent = match grid.get(&other) {
                Some(cell) => cell.parent_lookup,
                None => continue,
            };
            if grid.link_neighbors(*key, other) {
                links += 1;
                if other_parent != parent {
                    cross_parent += 1;
                }
            }
        }
    }

    if cross_parent > 0 {
        debug!("{} tier: {} links cross a parent boundary", grid.tier, cross_parent);
    }
    links
}

/// Work out the edge type of `keys` and of every neighbour they touch.
pub fn classify_edges(grid: &mut TierGrid, keys: &[CellKey]) {
    let mut affected: Vec<CellKey> = Vec::with_capacity(keys.len() * 2);
    for key in keys {
        affected.push(*key);
        if let Some(cell) = grid.get(key) {
            affected.extend(cell.neighbors.iter().copied());
        }
    }
    affected.sort();
    affected.dedup();

    for key in affected {
        let edge_type = match grid.get(&key) {
            Some(cell) => edge_type_of(grid, cell),
            None => continue,
        };
        if let Some(cell) = grid.get_mut(&key) {
            cell.edge_cell_type = edge_type;
            cell.is_edge = edge_type.is_edge();
        }
    }
}

fn edge_type_of(grid: &TierGrid, cell: &CellPrototype) -> EdgeCellType {
    if cell.neighbor_count() < super::cell::MAX_NEIGHBORS {
        return EdgeCellType::GridFrontier;
    }
    let crosses = cell.neighbors.iter().any(|k| {
        grid.get(k)
            .map(|n| n.parent_lookup != cell.parent_lookup)
            .unwrap_or(false)
    });
    if crosses {
        EdgeCellType::ParentBoundary
    } else {
        EdgeCellType::None
    }
}
