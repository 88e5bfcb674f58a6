//! Edge clusters along the rim of a worldspace.

use tracing::debug;

use crate::grid::{CellKey, EdgeCellType, TierGrid};
use crate::hex::Lookup;

use super::types::{Cluster, ClusterType};

/// Gather the free ground cells of `world_space` that border a different
/// parent into one Edge cluster. `None` if there are none.
pub fn collect_edge_cluster(grid: &TierGrid, world_space: Lookup) -> Option<Cluster> {
    let members: Vec<CellKey> = grid
        .cells()
        .filter(|c| {
            c.world_space_lookup == Some(world_space)
                && c.is_active()
                && c.status.is_ground()
                && c.edge_cell_type == EdgeCellType::ParentBoundary
                && !c.is_pre_assigned
        })
        .map(|c| c.key())
        .collect();

    debug!("Worldspace {}: {} boundary cells", world_space, members.len());
    Cluster::new(ClusterType::Edge, grid.tier, members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationContext;
    use crate::grid::{self, WorldIndex};
    use crate::hex;
    use glam::Vec3;

    #[test]
    fn test_edge_cluster_is_boundary_ring() {
        let ctx = GenerationContext::default();
        let mut index = WorldIndex::new(&ctx.tiers);
        let regions = grid::build_region_tier(&mut index, &ctx, Vec3::ZERO, 0);
        let areas = grid::build_area_tier(&mut index, &ctx, &regions);
        let worldspaces = grid::build_worldspace_tier(&mut index, &ctx, &areas);

        let center_ws = CellKey::new(hex::lookup_key(Vec3::ZERO, ctx.tiers.worldspace), 0);
        let ring: Vec<CellKey> = index.worldspaces.get(&center_ws).unwrap().neighbors.clone();
        let mut hosts = vec![center_ws];
        hosts.extend(ring);
        grid::build_sub_cell_tier(&mut index, &ctx, &hosts);
        assert!(worldspaces.len() >= hosts.len());

        let cluster = collect_edge_cluster(&index.sub_cells, center_ws.lookup).unwrap();
        assert_eq!(cluster.cluster_type, ClusterType::Edge);
        for key in &cluster.members {
            let cell = index.sub_cells.get(key).unwrap();
            assert_eq!(cell.world_space_lookup, Some(center_ws.lookup));
            assert!(cell
                .neighbors
                .iter()
                .any(|n| index.sub_cells.get(n).unwrap().world_space_lookup != Some(center_ws.lookup)));
        }
    }

    #[test]
    fn test_unknown_worldspace_is_none() {
        let grid = TierGrid::new(crate::grid::Tier::SubCell, 12.0);
        assert!(collect_edge_cluster(&grid, Lookup::new(0, 0, 108)).is_none());
    }
}
