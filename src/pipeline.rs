//! The full generation pass, in order:
//!
//! 1. region, area and worldspace tiers around the origin
//! 2. sub-cells under the most connected worldspaces near the origin
//! 3. layer stacks for every sub-cell column
//! 4. outposts, the paths between them and tunnels under them
//! 5. edge clusters along worldspace rims, then scattered clusters
//! 6. micro-cells under outpost members
//! 7. terrain vertex grid and chunk index

use glam::Vec3;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::clusters::{
    collect_edge_cluster, connect_clusters, dedup_clusters, get_random_clusters, grow_location,
    grow_tunnel_under_cluster, Cluster, ClusterId, ClusterType, GroundLayerRule, LocationConstraints,
    LocationData, RandomClusterRequest,
};
use crate::config::GenerationContext;
use crate::error::WorldResult;
use crate::grid::{
    self, expand_from, CellKey, CellKind, CellStatus, ExpansionResult, LayerStackSummary, Tier, WorldIndex,
};
use crate::hex;
use crate::seeds::GenerationSeeds;
use crate::terrain::{
    generate_vertex_grid, partition_chunks, ChunkIndex, TerrainBounds, TerraformIndex, TerrainNoise, VertexGrid,
};

/// Terrain derived from a finished index.
pub struct TerrainOutput {
    pub noise: TerrainNoise,
    pub terraform: TerraformIndex,
    pub vertex_grid: VertexGrid,
    pub chunks: ChunkIndex,
}

/// Clusters registered by one pass, by role.
#[derive(Clone, Debug, Default)]
pub struct ClusterSummary {
    pub outposts: Vec<ClusterId>,
    pub paths: Vec<ClusterId>,
    pub tunnels: Vec<ClusterId>,
    pub edges: Vec<ClusterId>,
    pub scattered: Vec<ClusterId>,
}

pub struct GeneratedWorld {
    pub ctx: GenerationContext,
    pub seeds: GenerationSeeds,
    pub index: WorldIndex,
    pub expansion: ExpansionResult,
    pub layers: LayerStackSummary,
    pub clusters: ClusterSummary,
    pub terrain: TerrainOutput,
}

impl GeneratedWorld {
    pub fn locations(&self) -> Vec<LocationData> {
        self.clusters
            .outposts
            .iter()
            .filter_map(|id| self.index.clusters.get(*id))
            .filter_map(|c| LocationData::from_cluster(c, &self.index.sub_cells))
            .collect()
    }
}

/// Build the region/area/worldspace hierarchy around the origin. Returns
/// the worldspace the sub-cell expansion starts from.
pub fn build_hierarchy(index: &mut WorldIndex, ctx: &GenerationContext) -> Option<CellKey> {
    let regions = grid::build_region_tier(index, ctx, Vec3::ZERO, ctx.region_rings);
    let areas = grid::build_area_tier(index, ctx, &regions);
    let worldspaces = grid::build_worldspace_tier(index, ctx, &areas);
    info!(
        "Hierarchy: {} regions, {} areas, {} worldspaces",
        regions.len(),
        areas.len(),
        worldspaces.len()
    );
    let origin = CellKey::new(hex::lookup_key(Vec3::ZERO, ctx.tiers.worldspace), 0);
    if index.worldspaces.contains(&origin) {
        Some(origin)
    } else {
        warn!("No worldspace at the origin");
        worldspaces.first().copied()
    }
}

fn surface_cells_of(index: &WorldIndex, world_space: &CellKey) -> Vec<CellKey> {
    index
        .sub_cells
        .cells()
        .filter(|c| c.world_space_lookup == Some(world_space.lookup) && c.status == CellStatus::Ground)
        .map(|c| c.key())
        .collect()
}

fn stamp_kind(index: &mut WorldIndex, members: &[CellKey], kind: CellKind) {
    for key in members {
        if let Some(cell) = index.sub_cells.get_mut(key) {
            if cell.cell_kind == CellKind::Generic {
                cell.cell_kind = kind;
            }
        }
    }
}

/// Grow and register every cluster kind over the sub-cells of `hosts`.
pub fn populate_clusters(
    index: &mut WorldIndex,
    ctx: &GenerationContext,
    seeds: &GenerationSeeds,
    hosts: &[CellKey],
) -> ClusterSummary {
    let mut summary = ClusterSummary::default();
    let mut rng = seeds.cluster_rng();

    // Outposts, one attempt per host worldspace.
    let constraints = LocationConstraints {
        member_count: ctx.clusters.member_range(),
        priority: ctx.clusters.priority,
        exclude_edge: ctx.clusters.exclude_edge,
        normalize_ground: ctx.layers.ground_from_elevation,
        ..LocationConstraints::default()
    };
    let mut grown: Vec<Cluster> = Vec::new();
    for host in hosts {
        let pool = surface_cells_of(index, host);
        if let Some(cluster) = grow_location(&index.sub_cells, &pool, &constraints, &mut rng) {
            grown.push(cluster);
        }
    }
    for mut cluster in dedup_clusters(grown, ctx.clusters.member_count_min) {
        if cluster.ground_layer_rule == GroundLayerRule::NormalizeLayerDifference {
            cluster.normalize_ground_layers(&mut index.sub_cells);
        }
        let members = cluster.members.clone();
        if let Some(id) = index.register_cluster(cluster) {
            stamp_kind(index, &members, CellKind::Outpost);
            summary.outposts.push(id);
        }
    }

    // Paths between consecutive outposts of a shuffled route.
    let outposts: Vec<Cluster> = summary
        .outposts
        .iter()
        .filter_map(|id| index.clusters.get(*id).cloned())
        .collect();
    let mut route = outposts.clone();
    route.shuffle(&mut seeds.path_rng());
    for pair in route.windows(2) {
        let refs = [&pair[0], &pair[1]];
        match connect_clusters(&index.sub_cells, &refs, ctx.clusters.path_ignores_edge_cells) {
            Some(path) => {
                let members = path.members.clone();
                if let Some(id) = index.register_cluster(path) {
                    stamp_kind(index, &members, CellKind::Road);
                    summary.paths.push(id);
                }
            }
            None => debug!("No path between outposts seeded at {} and {}", pair[0].seed, pair[1].seed),
        }
    }

    // Tunnels under the first outposts.
    let mut tunnel_rng = seeds.tunnel_rng();
    for outpost in outposts.iter().take(ctx.tunnels.tunnel_count) {
        let tunnel = grow_tunnel_under_cluster(
            &mut index.sub_cells,
            outpost,
            ctx.tunnels.max_members,
            ctx.tunnels.priority,
            &mut tunnel_rng,
        );
        if let Some(result) = tunnel {
            if let Some(id) = index.register_cluster(result.cluster) {
                summary.tunnels.push(id);
            }
        }
    }

    // Worldspace rims.
    for host in hosts {
        if let Some(edge) = collect_edge_cluster(&index.sub_cells, host.lookup) {
            if let Some(id) = index.register_cluster(edge) {
                summary.edges.push(id);
            }
        }
    }

    // Scattered clusters over whatever ground is still free.
    let pool: Vec<CellKey> = index
        .sub_cells
        .cells()
        .filter(|c| c.status == CellStatus::Ground && c.cluster_id.is_none())
        .map(|c| c.key())
        .collect();
    let request = RandomClusterRequest::from(&ctx.clusters);
    let scattered = get_random_clusters(&index.sub_cells, &pool, &request, &mut rng);
    for members in scattered.into_values() {
        if let Some(cluster) = Cluster::new(ClusterType::Other, Tier::SubCell, members) {
            if let Some(id) = index.register_cluster(cluster) {
                summary.scattered.push(id);
            }
        }
    }

    info!(
        "Clusters: {} outposts, {} paths, {} tunnels, {} edges, {} scattered",
        summary.outposts.len(),
        summary.paths.len(),
        summary.tunnels.len(),
        summary.edges.len(),
        summary.scattered.len()
    );
    summary
}

/// Bounds of every worldspace that hosts sub-cells, padded by one
/// worldspace.
pub fn terrain_bounds(index: &WorldIndex) -> Option<TerrainBounds> {
    let size = index.worldspaces.cell_size;
    let hosts = index.worldspaces.cells().filter(|c| c.is_grid_host).map(|c| c.center);
    let b = TerrainBounds::enclosing(hosts)?;
    Some(TerrainBounds::new(b.min_x - size, b.min_z - size, b.max_x + size, b.max_z + size))
}

/// Terraform index, vertex grid and chunks for a finished index.
pub fn build_terrain(index: &WorldIndex, ctx: &GenerationContext, seeds: &GenerationSeeds) -> TerrainOutput {
    let noise = TerrainNoise::new(seeds.terrain, &ctx.terrain);
    let terraform = TerraformIndex::from_world(index, &noise, ctx);
    let bounds = terrain_bounds(index).unwrap_or_else(|| {
        warn!("No worldspace hosts sub-cells; terrain covers one worldspace");
        TerrainBounds::around(Vec3::ZERO, ctx.tiers.worldspace)
    });
    let vertex_grid = generate_vertex_grid(&bounds, ctx, &noise, &terraform);
    let chunks = partition_chunks(&vertex_grid, ctx.terrain.chunk_size);
    info!("Terrain: {} chunks of {}", chunks.len(), ctx.terrain.chunk_size);
    TerrainOutput {
        noise,
        terraform,
        vertex_grid,
        chunks,
    }
}

/// Run every generation step for `ctx`.
pub fn generate_world(ctx: &GenerationContext) -> WorldResult<GeneratedWorld> {
    ctx.validate()?;
    let seeds = GenerationSeeds::from_master(ctx.seed);
    info!("Generating world with {}", seeds);

    let mut index = WorldIndex::new(&ctx.tiers);
    let start = build_hierarchy(&mut index, ctx);
    let expansion = match start {
        Some(start) => expand_from(&mut index, ctx, Tier::Worldspace, start, ctx.worldspace_fill_count),
        None => ExpansionResult {
            tier: Tier::Worldspace,
            hosts: Vec::new(),
            children: Vec::new(),
        },
    };

    let noise = TerrainNoise::new(seeds.terrain, &ctx.terrain);
    let layers = grid::build_layer_stacks(&mut index, ctx, Some(&noise), &expansion.children);
    let clusters = populate_clusters(&mut index, ctx, &seeds, &expansion.hosts);

    let detail: Vec<CellKey> = clusters
        .outposts
        .iter()
        .filter_map(|id| index.clusters.get(*id))
        .flat_map(|c| c.members.iter().copied())
        .collect();
    let micro = grid::build_micro_cell_tier(&mut index, ctx, &detail);
    debug!("{} micro-cells under {} outpost cells", micro.len(), detail.len());

    let terrain = build_terrain(&index, ctx, &seeds);

    info!("World ready: {}", index.summary());
    Ok(GeneratedWorld {
        ctx: ctx.clone(),
        seeds,
        index,
        expansion,
        layers,
        clusters,
        terrain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::{grow_cluster, GrowthOptions};
    use crate::verify::verify_world;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::{BTreeSet, VecDeque};

    #[test]
    fn test_one_region_hierarchy_counts() {
        let ctx = GenerationContext::default();
        let mut index = WorldIndex::new(&ctx.tiers);
        let start = build_hierarchy(&mut index, &ctx).unwrap();
        assert_eq!(index.regions.len(), 1);
        assert_eq!(index.areas.len(), 7);
        assert_eq!(index.worldspaces.len(), 49);
        assert_eq!(start.lookup, hex::lookup_key(Vec3::ZERO, ctx.tiers.worldspace));
    }

    #[test]
    fn test_grow_cluster_in_origin_worldspace() {
        let ctx = GenerationContext::default();
        let mut index = WorldIndex::new(&ctx.tiers);
        let start = build_hierarchy(&mut index, &ctx).unwrap();
        grid::build_sub_cell_tier(&mut index, &ctx, &[start]);

        let seed = CellKey::new(hex::lookup_key(Vec3::ZERO, ctx.tiers.sub_cell), 0);
        assert_eq!(index.sub_cells.get(&seed).unwrap().status, CellStatus::Ground);

        let options = GrowthOptions::new(ClusterType::Outpost, 4..6);
        let mut rng = ChaCha8Rng::seed_from_u64(ctx.seed);
        let cluster = grow_cluster(&index.sub_cells, seed, &options, &mut rng).unwrap();
        assert!(cluster.len() == 4 || cluster.len() == 5);

        // Members are connected through the neighbour graph without
        // touching a removed cell.
        let members: BTreeSet<CellKey> = cluster.members.iter().copied().collect();
        let mut reached = BTreeSet::from([cluster.members[0]]);
        let mut queue = VecDeque::from([cluster.members[0]]);
        while let Some(current) = queue.pop_front() {
            let cell = index.sub_cells.get(&current).unwrap();
            assert_ne!(cell.status, CellStatus::Removed);
            for n in &cell.neighbors {
                if members.contains(n) && reached.insert(*n) {
                    queue.push_back(*n);
                }
            }
        }
        assert_eq!(reached, members);
    }

    #[test]
    fn test_generate_world_is_consistent() {
        let ctx = GenerationContext::default();
        let world = generate_world(&ctx).unwrap();

        assert_eq!(world.expansion.hosts.len(), ctx.worldspace_fill_count);
        assert!(world.layers.columns > 0);
        assert!(!world.terrain.vertex_grid.is_empty());
        assert!(!world.terrain.chunks.is_empty());
        assert!(!world.clusters.edges.is_empty());
        if !world.clusters.outposts.is_empty() {
            assert!(!world.index.micro_cells.is_empty());
        }

        let report = verify_world(&world.index, ctx.seed);
        assert!(report.passed(), "{}", report.format());
    }

    #[test]
    fn test_generate_world_is_deterministic() {
        let ctx = GenerationContext::with_seed(99);
        let a = generate_world(&ctx).unwrap();
        let b = generate_world(&ctx).unwrap();
        assert_eq!(a.index.summary(), b.index.summary());
        assert_eq!(a.terrain.vertex_grid, b.terrain.vertex_grid);
        let members = |w: &GeneratedWorld| -> Vec<Vec<CellKey>> {
            w.index.clusters.iter().map(|(_, c)| c.members.clone()).collect()
        };
        assert_eq!(members(&a), members(&b));
    }

    #[test]
    fn test_invalid_context_is_rejected() {
        let mut ctx = GenerationContext::default();
        ctx.tiers.sub_cell = 0.0;
        assert!(generate_world(&ctx).is_err());
    }
}
