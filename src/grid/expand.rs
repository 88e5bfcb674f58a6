//! Incremental "fill N more" expansion and link rehydration after a load.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, info, warn};

use crate::config::GenerationContext;
use crate::hex::Lookup;

use super::builder::{build_child_tier, classify_edges, ensure_region_neighbors, resolve_neighbors};
use super::cell::{CellKey, Tier};
use super::index::{TierGrid, WorldIndex};

/// Cells selected by one expansion and the children built under them.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpansionResult {
    pub tier: Tier,
    pub hosts: Vec<CellKey>,
    pub children: Vec<CellKey>,
}

impl ExpansionResult {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Make sure `key` has its links, resolving them again if the map lost
/// them. Regions also grow their missing neighbours.
fn ensure_links(index: &mut WorldIndex, ctx: &GenerationContext, tier: Tier, key: &CellKey) -> usize {
    if tier == Tier::Region {
        ensure_region_neighbors(index, ctx, key);
    }
    let grid = index.tier_mut(tier);
    let count = grid.get(key).map(|c| c.neighbor_count()).unwrap_or(0);
    if count > 0 {
        return count;
    }
    resolve_neighbors(grid, &[*key]);
    grid.get(key).map(|c| c.neighbor_count()).unwrap_or(0)
}

/// Pick up to `count` cells of `tier` around `start` that do not host a
/// child grid yet, then build the child tier under them.
///
/// The walk is breadth-first over the neighbour graph, but always takes
/// the frontier cell with the most resolved neighbours next. A start cell
/// with no resolvable neighbour aborts the expansion and yields an empty
/// result.
pub fn expand_from(
    index: &mut WorldIndex,
    ctx: &GenerationContext,
    tier: Tier,
    start: CellKey,
    count: usize,
) -> ExpansionResult {
    let mut result = ExpansionResult {
        tier,
        hosts: Vec::new(),
        children: Vec::new(),
    };
    if count == 0 {
        return result;
    }
    if !index.tier(tier).contains(&start) {
        warn!("Expansion start {} is not a {} cell", start, tier);
        return result;
    }
    if ensure_links(index, ctx, tier, &start) == 0 {
        warn!("{} {} has no resolvable neighbours; expansion aborted", tier, start);
        return result;
    }

    let mut visited: BTreeSet<CellKey> = BTreeSet::from([start]);
    let mut frontier: BTreeSet<CellKey> = BTreeSet::from([start]);

    while result.hosts.len() < count {
        // Most-connected frontier cell first; key order breaks ties.
        let next = {
            let grid = index.tier(tier);
            frontier
                .iter()
                .max_by(|a, b| {
                    let na = grid.get(a).map(|c| c.neighbor_count()).unwrap_or(0);
                    let nb = grid.get(b).map(|c| c.neighbor_count()).unwrap_or(0);
                    na.cmp(&nb).then_with(|| b.cmp(a))
                })
                .copied()
        };
        let current = match next {
            Some(k) => k,
            None => break,
        };
        frontier.remove(&current);
        ensure_links(index, ctx, tier, &current);

        let grid = index.tier(tier);
        let cell = match grid.get(&current) {
            Some(cell) => cell,
            None => continue,
        };
        if cell.is_active() && !cell.is_grid_host {
            result.hosts.push(current);
        }
        for n in &cell.neighbors {
            if visited.insert(*n) {
                frontier.insert(*n);
            }
        }
    }

    if result.hosts.len() < count {
        debug!(
            "Expansion from {} found {} of {} requested {} cells",
            start,
            result.hosts.len(),
            count,
            tier
        );
    }

    if let Some(child) = tier.child() {
        result.children = build_child_tier(index, ctx, child, &result.hosts);
    }
    info!(
        "Expanded {} {} hosts from {} -> {} {} cells",
        result.hosts.len(),
        tier,
        start,
        result.children.len(),
        tier.child().map(|t| t.name()).unwrap_or("no")
    );
    result
}

/// What [`rehydrate`] repaired.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RehydrateReport {
    pub rekeyed: usize,
    pub dropped: usize,
    pub neighbor_links: usize,
    pub layer_links: usize,
}

/// Recompute every lookup from its cell center and re-key stale entries.
/// Returns old key -> new key, and old lookup -> new lookup.
fn rekey_tier(grid: &mut TierGrid, report: &mut RehydrateReport) -> (BTreeMap<CellKey, CellKey>, BTreeMap<Lookup, Lookup>) {
    let stale: Vec<CellKey> = grid
        .cells()
        .filter(|c| crate::hex::lookup_key(c.center, c.size) != c.lookup)
        .map(|c| c.key())
        .collect();

    let mut keys = BTreeMap::new();
    let mut lookups = BTreeMap::new();
    for old in stale {
        let mut cell = match grid.remove(&old) {
            Some(cell) => cell,
            None => continue,
        };
        if let Some(previous) = cell.refresh_lookup() {
            error!(
                "{} cell {} stored lookup {} but its center maps to {}",
                grid.tier, cell.uid, previous, cell.lookup
            );
            lookups.insert(previous, cell.lookup);
        }
        match grid.insert(cell) {
            Ok(new_key) => {
                keys.insert(old, new_key);
                report.rekeyed += 1;
            }
            Err(cell) => {
                error!("Re-keyed {} collides with an existing cell; dropped", cell.key());
                report.dropped += 1;
            }
        }
    }
    (keys, lookups)
}

/// Rebuild every link the map does not persist: same-layer neighbours,
/// layer stacks, the parent -> children index, edge flags and cluster
/// ownership.
///
/// A cell whose stored lookup no longer matches its center is logged as an
/// error and re-keyed under the recomputed lookup.
pub fn rehydrate(index: &mut WorldIndex) -> RehydrateReport {
    let mut report = RehydrateReport::default();

    for tier in Tier::ALL {
        let (key_map, lookup_map) = rekey_tier(index.tier_mut(tier), &mut report);

        if !lookup_map.is_empty() {
            if let Some(child) = tier.child() {
                for cell in index.tier_mut(child).cells_mut() {
                    if let Some(new) = cell.parent_lookup.and_then(|p| lookup_map.get(&p)) {
                        cell.parent_lookup = Some(*new);
                    }
                }
            }
            if tier == Tier::Worldspace {
                for t in [Tier::Worldspace, Tier::SubCell, Tier::MicroCell] {
                    for cell in index.tier_mut(t).cells_mut() {
                        if let Some(new) = cell.world_space_lookup.and_then(|w| lookup_map.get(&w)) {
                            cell.world_space_lookup = Some(*new);
                        }
                    }
                }
            }
        }
        index.clusters.remap_members(tier, &key_map);
    }

    for tier in Tier::ALL {
        let grid = index.tier_mut(tier);
        grid.clear_links();
        grid.rebuild_children();

        let keys: Vec<CellKey> = grid.keys().copied().collect();
        report.neighbor_links += resolve_neighbors(grid, &keys);
        for pair in keys.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if lower.lookup == upper.lookup && grid.link_layers(lower, upper) {
                report.layer_links += 1;
            }
        }
        classify_edges(grid, &keys);
    }

    index.clusters.rebuild_owners();
    index.resync_uids();

    info!(
        "Rehydrated: {} neighbour links, {} layer links, {} re-keyed, {} dropped",
        report.neighbor_links, report.layer_links, report.rekeyed, report.dropped
    );
    report
}
