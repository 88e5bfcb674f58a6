//! Structural verification of a generated world.
//!
//! # Verification Categories
//!
//! - **Lookup Consistency**: every stored lookup matches its center and no
//!   two cells of a tier snap to the same key and layer
//! - **Neighbor Symmetry**: A lists B exactly when B lists A
//! - **Degree Bound**: at most six side neighbours per cell
//! - **Layer Links**: below/above links are mutual and one layer apart
//! - **Cluster Exclusivity**: no cell owned by two Path/Edge/Tunnel clusters,
//!   no member removed
//! - **Tunnel Shape**: one ground entry over one start, the rest reachable
//!   underground

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::clusters::{Cluster, ClusterId, ClusterType};
use crate::grid::{CellKey, CellStatus, Tier, TierGrid, WorldIndex, MAX_NEIGHBORS};
use crate::hex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VerifyCategory {
    LookupConsistency,
    NeighborSymmetry,
    DegreeBound,
    LayerLinks,
    ClusterExclusivity,
    TunnelShape,
}

impl VerifyCategory {
    pub const ALL: [VerifyCategory; 6] = [
        VerifyCategory::LookupConsistency,
        VerifyCategory::NeighborSymmetry,
        VerifyCategory::DegreeBound,
        VerifyCategory::LayerLinks,
        VerifyCategory::ClusterExclusivity,
        VerifyCategory::TunnelShape,
    ];
}

impl fmt::Display for VerifyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyCategory::LookupConsistency => write!(f, "Lookup Consistency"),
            VerifyCategory::NeighborSymmetry => write!(f, "Neighbor Symmetry"),
            VerifyCategory::DegreeBound => write!(f, "Degree Bound"),
            VerifyCategory::LayerLinks => write!(f, "Layer Links"),
            VerifyCategory::ClusterExclusivity => write!(f, "Cluster Exclusivity"),
            VerifyCategory::TunnelShape => write!(f, "Tunnel Shape"),
        }
    }
}

/// Result of a single verification check
#[derive(Clone, Debug)]
pub struct VerifyResult {
    pub passed: bool,
    pub category: VerifyCategory,
    pub message: String,
    pub location: Option<(Tier, CellKey)>,
    pub severity: Severity,
}

impl VerifyResult {
    pub fn pass(category: VerifyCategory, message: impl Into<String>) -> Self {
        Self {
            passed: true,
            category,
            message: message.into(),
            location: None,
            severity: Severity::Low,
        }
    }

    pub fn fail(category: VerifyCategory, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            passed: false,
            category,
            message: message.into(),
            location: None,
            severity,
        }
    }

    pub fn at(mut self, tier: Tier, key: CellKey) -> Self {
        self.location = Some((tier, key));
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationStatus {
    Passed,
    /// Only low/medium severity issues
    PartialPass,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct CategoryStats {
    pub checks: usize,
    pub passed: usize,
    pub failed: usize,
}

impl CategoryStats {
    fn record(&mut self, passed: bool) {
        self.checks += 1;
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerificationReport {
    pub seed: u64,
    pub cells_verified: usize,
    pub clusters_verified: usize,
    pub status: VerificationStatus,
    /// Failures only
    pub issues: Vec<VerifyResult>,
    pub category_stats: BTreeMap<VerifyCategory, CategoryStats>,
}

impl VerificationReport {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            cells_verified: 0,
            clusters_verified: 0,
            status: VerificationStatus::Passed,
            issues: Vec::new(),
            category_stats: VerifyCategory::ALL
                .iter()
                .map(|c| (*c, CategoryStats::default()))
                .collect(),
        }
    }

    pub fn add_result(&mut self, result: VerifyResult) {
        if let Some(stats) = self.category_stats.get_mut(&result.category) {
            stats.record(result.passed);
        }
        if !result.passed {
            match result.severity {
                Severity::High | Severity::Critical => self.status = VerificationStatus::Failed,
                Severity::Medium | Severity::Low => {
                    if self.status == VerificationStatus::Passed {
                        self.status = VerificationStatus::PartialPass;
                    }
                }
            }
            self.issues.push(result);
        }
    }

    pub fn passed(&self) -> bool {
        self.status == VerificationStatus::Passed
    }

    pub fn issues_in(&self, category: VerifyCategory) -> Vec<&VerifyResult> {
        self.issues.iter().filter(|r| r.category == category).collect()
    }

    pub fn issues_by_severity(&self, min_severity: Severity) -> Vec<&VerifyResult> {
        self.issues.iter().filter(|r| r.severity >= min_severity).collect()
    }

    pub fn format(&self) -> String {
        let mut output = String::new();

        output.push_str("═══════════════════════════════════════════\n");
        output.push_str("          WORLD VERIFICATION REPORT\n");
        output.push_str("═══════════════════════════════════════════\n\n");

        output.push_str(&format!("Seed: {}\n", self.seed));
        output.push_str(&format!("Cells Verified: {}\n", self.cells_verified));
        output.push_str(&format!("Clusters Verified: {}\n\n", self.clusters_verified));

        output.push_str("SUMMARY:\n");
        for (category, stats) in &self.category_stats {
            let mark = if stats.failed == 0 { "✓" } else { "✗" };
            output.push_str(&format!(
                "  {} {}: {}/{} passed\n",
                mark, category, stats.passed, stats.checks
            ));
        }
        output.push('\n');

        if !self.issues.is_empty() {
            output.push_str(&format!("ISSUES ({}):\n", self.issues.len()));
            for issue in &self.issues {
                let loc = issue
                    .location
                    .map(|(tier, key)| format!(" at {} {}", tier, key))
                    .unwrap_or_default();
                output.push_str(&format!("  [{}] {}{}\n", issue.severity, issue.message, loc));
            }
            output.push('\n');
        }

        let status = match self.status {
            VerificationStatus::Passed => "PASSED",
            VerificationStatus::PartialPass => "PARTIAL PASS (minor issues only)",
            VerificationStatus::Failed => "FAILED",
        };
        output.push_str(&format!("STATUS: {}\n", status));
        output.push_str("═══════════════════════════════════════════\n");
        output
    }
}

fn verify_lookups(grid: &TierGrid, report: &mut VerificationReport) {
    let mut seen: BTreeMap<CellKey, CellKey> = BTreeMap::new();
    for cell in grid.cells() {
        let snapped = CellKey::new(hex::lookup_key(cell.center, cell.size), cell.layer);
        let result = if snapped != cell.key() {
            VerifyResult::fail(
                VerifyCategory::LookupConsistency,
                format!("stored lookup {} but center maps to {}", cell.lookup, snapped.lookup),
                Severity::High,
            )
            .at(grid.tier, cell.key())
        } else if let Some(other) = seen.insert(snapped, cell.key()) {
            VerifyResult::fail(
                VerifyCategory::LookupConsistency,
                format!("shares key {} with {}", snapped, other),
                Severity::Critical,
            )
            .at(grid.tier, cell.key())
        } else {
            VerifyResult::pass(VerifyCategory::LookupConsistency, "lookup matches center")
        };
        report.add_result(result);
    }
}

fn verify_links(grid: &TierGrid, report: &mut VerificationReport) {
    for cell in grid.cells() {
        let key = cell.key();

        let degree = if cell.neighbor_count() > MAX_NEIGHBORS {
            VerifyResult::fail(
                VerifyCategory::DegreeBound,
                format!("{} side neighbours", cell.neighbor_count()),
                Severity::High,
            )
            .at(grid.tier, key)
        } else {
            VerifyResult::pass(VerifyCategory::DegreeBound, "degree within bound")
        };
        report.add_result(degree);

        for n in &cell.neighbors {
            let mutual = grid.get(n).map(|other| other.has_neighbor(&key)).unwrap_or(false);
            let result = if !mutual {
                VerifyResult::fail(
                    VerifyCategory::NeighborSymmetry,
                    format!("links {} without a link back", n),
                    Severity::High,
                )
                .at(grid.tier, key)
            } else if n.layer != key.layer {
                VerifyResult::fail(
                    VerifyCategory::NeighborSymmetry,
                    format!("side neighbour {} is on another layer", n),
                    Severity::Medium,
                )
                .at(grid.tier, key)
            } else {
                VerifyResult::pass(VerifyCategory::NeighborSymmetry, "mutual")
            };
            report.add_result(result);
        }

        let links = [(cell.below(), -1), (cell.above(), 1)];
        for (link, offset) in links {
            let other_key = match link {
                Some(k) => k,
                None => continue,
            };
            let back = grid.get(&other_key).and_then(|o| if offset < 0 { o.above() } else { o.below() });
            let result = if back != Some(key) {
                VerifyResult::fail(
                    VerifyCategory::LayerLinks,
                    format!("layer link to {} is not returned", other_key),
                    Severity::High,
                )
                .at(grid.tier, key)
            } else if other_key.lookup != key.lookup || other_key.layer != key.layer + offset {
                VerifyResult::fail(
                    VerifyCategory::LayerLinks,
                    format!("layer link to {} skips or leaves the column", other_key),
                    Severity::Medium,
                )
                .at(grid.tier, key)
            } else {
                VerifyResult::pass(VerifyCategory::LayerLinks, "mutual layer link")
            };
            report.add_result(result);
        }
    }
}

fn verify_clusters(index: &WorldIndex, report: &mut VerificationReport) {
    let mut owners: BTreeMap<(Tier, CellKey), ClusterId> = BTreeMap::new();
    for (id, cluster) in index.clusters.iter() {
        report.clusters_verified += 1;
        let grid = index.tier(cluster.tier);
        for key in &cluster.members {
            let result = match grid.get(key) {
                None => VerifyResult::fail(
                    VerifyCategory::ClusterExclusivity,
                    format!("cluster {} lists missing cell", id),
                    Severity::High,
                )
                .at(cluster.tier, *key),
                Some(cell) if cell.is_removed() => VerifyResult::fail(
                    VerifyCategory::ClusterExclusivity,
                    format!("cluster {} holds a removed cell", id),
                    Severity::High,
                )
                .at(cluster.tier, *key),
                Some(_) if cluster.cluster_type.is_exclusive() => match owners.insert((cluster.tier, *key), *id) {
                    Some(other) => VerifyResult::fail(
                        VerifyCategory::ClusterExclusivity,
                        format!("claimed by both {} and {}", other, id),
                        Severity::Critical,
                    )
                    .at(cluster.tier, *key),
                    None => VerifyResult::pass(VerifyCategory::ClusterExclusivity, "exclusive"),
                },
                Some(_) => VerifyResult::pass(VerifyCategory::ClusterExclusivity, "member present"),
            };
            report.add_result(result);
        }
        if cluster.cluster_type == ClusterType::Tunnel {
            report.add_result(check_tunnel(*id, cluster, grid));
        }
    }
}

/// One ground entry, layer-linked to one start; every other member
/// reachable from the start through same-layer underground links.
fn check_tunnel(id: ClusterId, cluster: &Cluster, grid: &TierGrid) -> VerifyResult {
    let fail = |msg: String| VerifyResult::fail(VerifyCategory::TunnelShape, msg, Severity::High).at(grid.tier, cluster.seed);

    let entries: Vec<CellKey> = cluster
        .members
        .iter()
        .filter(|k| grid.get(k).map(|c| c.is_tunnel_ground_entry).unwrap_or(false))
        .copied()
        .collect();
    let starts: Vec<CellKey> = cluster
        .members
        .iter()
        .filter(|k| grid.get(k).map(|c| c.is_tunnel_start).unwrap_or(false))
        .copied()
        .collect();
    if entries.len() != 1 || starts.len() != 1 {
        return fail(format!(
            "tunnel {} has {} entries and {} starts",
            id,
            entries.len(),
            starts.len()
        ));
    }
    let (entry, start) = (entries[0], starts[0]);
    if grid.get(&entry).and_then(|c| c.below()) != Some(start) {
        return fail(format!("tunnel {} entry {} is not above start {}", id, entry, start));
    }

    let members: BTreeSet<CellKey> = cluster.members.iter().copied().collect();
    let mut reached = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        let cell = match grid.get(&current) {
            Some(c) => c,
            None => continue,
        };
        for n in &cell.neighbors {
            let underground = grid.get(n).map(|c| c.status == CellStatus::UnderGround).unwrap_or(false);
            if underground && members.contains(n) && reached.insert(*n) {
                queue.push_back(*n);
            }
        }
    }
    let unreached = members.len() - 1 - reached.len();
    if unreached > 0 {
        return fail(format!("tunnel {}: {} members unreachable from the start", id, unreached));
    }
    VerifyResult::pass(VerifyCategory::TunnelShape, format!("tunnel {} connected", id))
}

/// Run every structural check over `index`.
pub fn verify_world(index: &WorldIndex, seed: u64) -> VerificationReport {
    let mut report = VerificationReport::new(seed);
    for tier in Tier::ALL {
        let grid = index.tier(tier);
        report.cells_verified += grid.len();
        verify_lookups(grid, &mut report);
        verify_links(grid, &mut report);
    }
    verify_clusters(index, &mut report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationContext;
    use crate::grid;
    use glam::Vec3;

    fn world() -> (WorldIndex, GenerationContext) {
        let ctx = GenerationContext::default();
        let mut index = WorldIndex::new(&ctx.tiers);
        let regions = grid::build_region_tier(&mut index, &ctx, Vec3::ZERO, 0);
        let areas = grid::build_area_tier(&mut index, &ctx, &regions);
        let worldspaces = grid::build_worldspace_tier(&mut index, &ctx, &areas);
        let subs = grid::build_sub_cell_tier(&mut index, &ctx, &worldspaces[..2]);
        grid::build_layer_stacks(&mut index, &ctx, None, &subs);
        (index, ctx)
    }

    #[test]
    fn test_generated_world_passes() {
        let (index, ctx) = world();
        let report = verify_world(&index, ctx.seed);
        assert!(report.passed(), "{}", report.format());
        assert!(report.category_stats[&VerifyCategory::LayerLinks].checks > 0);
    }

    #[test]
    fn test_one_sided_link_is_caught() {
        let (mut index, ctx) = world();
        let (a, b) = {
            let cell = index.sub_cells.cells().find(|c| c.neighbor_count() > 0).unwrap();
            (cell.key(), cell.neighbors[0])
        };
        index.sub_cells.get_mut(&b).unwrap().neighbors.retain(|k| *k != a);
        let report = verify_world(&index, ctx.seed);
        assert_eq!(report.status, VerificationStatus::Failed);
        assert_eq!(report.issues_in(VerifyCategory::NeighborSymmetry).len(), 1);
        let serious = report.issues_by_severity(Severity::High);
        assert!(!serious.is_empty());
        assert!(serious.iter().all(|r| r.severity >= Severity::High));
    }

    #[test]
    fn test_shared_exclusive_member_is_caught() {
        let (mut index, ctx) = world();
        let key = index.sub_cells.cells().find(|c| c.neighbor_count() == 6).unwrap().key();
        // Registration refuses overlaps, so forge the registry from JSON.
        let first = Cluster::new(ClusterType::Path, Tier::SubCell, vec![key]).unwrap();
        let second = Cluster::new(ClusterType::Edge, Tier::SubCell, vec![key]).unwrap();
        let forged = serde_json::json!({
            "clusters": { "0": first, "1": second },
            "next_id": 2,
        });
        index.clusters = serde_json::from_value(forged).unwrap();

        let report = verify_world(&index, ctx.seed);
        assert_eq!(report.clusters_verified, 2);
        assert_eq!(report.issues_in(VerifyCategory::ClusterExclusivity).len(), 1);
        assert_eq!(report.status, VerificationStatus::Failed);
    }

    #[test]
    fn test_format_lists_categories() {
        let (index, ctx) = world();
        let text = verify_world(&index, ctx.seed).format();
        for category in VerifyCategory::ALL {
            assert!(text.contains(&category.to_string()));
        }
        assert!(text.contains("STATUS: PASSED"));
    }
}
