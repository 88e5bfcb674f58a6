//! Scatter several non-overlapping clusters over a pool of cells.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::ClusterParams;
use crate::grid::{CellKey, TierGrid};
use crate::hex;

/// Radius growth per step, in cell sizes.
const RADIUS_STEP_FACTOR: f32 = 1.2;

#[derive(Clone, Debug, PartialEq)]
pub struct RandomClusterRequest {
    /// Largest selection radius, drawn per cluster from this range
    pub search_radius: Range<f32>,
    pub cluster_count_max: usize,
    pub member_count: Range<usize>,
    pub exclude_edge: bool,
}

impl From<&ClusterParams> for RandomClusterRequest {
    fn from(params: &ClusterParams) -> Self {
        Self {
            search_radius: params.search_radius_range(),
            cluster_count_max: params.cluster_count_max,
            member_count: params.member_range(),
            exclude_edge: params.exclude_edge,
        }
    }
}

/// Pick up to `desired` cells around `seed`, nearest first.
///
/// The acceptance radius starts at `radius.start` and widens by
/// `cell_size * 1.2` until enough cells fall inside it or it reaches
/// `radius.end`. Cells in `claimed` are skipped. The seed is always the
/// first member.
pub fn select_cells_within_radius_expanding(
    grid: &TierGrid,
    seed: CellKey,
    candidates: &[CellKey],
    desired: usize,
    radius: Range<f32>,
    claimed: &BTreeSet<CellKey>,
) -> Vec<CellKey> {
    let origin = match grid.get(&seed) {
        Some(cell) => cell.center,
        None => return Vec::new(),
    };

    let mut by_distance: Vec<(f32, CellKey)> = candidates
        .iter()
        .filter(|k| **k != seed && !claimed.contains(k))
        .filter_map(|k| grid.get(k).map(|c| (hex::planar_distance(origin, c.center), *k)))
        .collect();
    by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let step = grid.cell_size * RADIUS_STEP_FACTOR;
    if !(step > 0.0 && step.is_finite()) {
        warn!("Cannot widen a selection radius on a {} grid of cell size {}", grid.tier, grid.cell_size);
        return vec![seed];
    }
    // An unbounded radius stops once every candidate is inside.
    let farthest = by_distance.last().map(|(d, _)| *d).unwrap_or(0.0);
    let end = if radius.end.is_finite() { radius.end } else { farthest };
    let mut current = radius.start.max(0.0);
    loop {
        let inside = by_distance.iter().take_while(|(d, _)| *d <= current).count();
        if inside + 1 >= desired || current >= end {
            let mut members = vec![seed];
            members.extend(
                by_distance
                    .iter()
                    .take(inside.min(desired.saturating_sub(1)))
                    .map(|(_, k)| *k),
            );
            return members;
        }
        current = (current + step).min(end);
    }
}

/// Grow up to `request.cluster_count_max` clusters from random seeds in
/// `pool`. Clusters never share cells. Keyed by seed.
pub fn get_random_clusters(
    grid: &TierGrid,
    pool: &[CellKey],
    request: &RandomClusterRequest,
    rng: &mut ChaCha8Rng,
) -> BTreeMap<CellKey, Vec<CellKey>> {
    let mut result = BTreeMap::new();
    if request.member_count.is_empty() || request.search_radius.is_empty() {
        warn!("Random cluster request has an empty range");
        return result;
    }

    let eligible: Vec<CellKey> = pool
        .iter()
        .filter(|k| match grid.get(k) {
            Some(cell) => {
                cell.is_active() && !cell.is_pre_assigned && !(request.exclude_edge && cell.is_edge)
            }
            None => false,
        })
        .copied()
        .collect();
    if eligible.is_empty() {
        warn!("No eligible cells in a pool of {}", pool.len());
        return result;
    }

    let mut order = eligible.clone();
    order.shuffle(rng);
    let mut claimed: BTreeSet<CellKey> = BTreeSet::new();

    for seed in order {
        if result.len() >= request.cluster_count_max {
            break;
        }
        if claimed.contains(&seed) {
            continue;
        }

        let desired = rng.gen_range(request.member_count.clone());
        let radius_max = rng.gen_range(request.search_radius.clone());
        let members = select_cells_within_radius_expanding(
            grid,
            seed,
            &eligible,
            desired,
            request.search_radius.start..radius_max.max(request.search_radius.start),
            &claimed,
        );

        if members.len() < request.member_count.start {
            debug!("Seed {} found only {} cells", seed, members.len());
            continue;
        }
        claimed.extend(members.iter().copied());
        result.insert(seed, members);
    }

    info!(
        "Random clusters: {} grown from {} eligible cells",
        result.len(),
        eligible.len()
    );
    result
}
