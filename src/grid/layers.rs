//! Vertical layer stacks over sub-cell columns.
//!
//! Every column keeps its base cell at layer 0. Cells are added below and
//! above so that the column spans its ground layer plus the configured
//! underground and above-ground layers, then each layer is linked to the
//! one directly above it.

use glam::Vec3;
use tracing::{debug, info};

use crate::config::{GenerationContext, LayerParams};
use crate::terrain::TerrainNoise;

use super::builder::{classify_edges, resolve_neighbors};
use super::cell::{CellKey, CellPrototype, CellStatus, Tier};
use super::index::WorldIndex;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerStackSummary {
    pub columns: usize,
    pub created: Vec<CellKey>,
    pub underwater: usize,
    pub min_ground_layer: i32,
    pub max_ground_layer: i32,
}

/// Ground layer for a column whose surface sits at `elevation`.
pub fn ground_layer_of(elevation: f32, params: &LayerParams) -> i32 {
    if !params.ground_from_elevation {
        return 0;
    }
    let layer = (elevation / params.cell_layer_elevation).round() as i32;
    layer.clamp(-params.max_ground_layer, params.max_ground_layer)
}

/// Status of `layer` in a column whose ground layer is `ground`.
fn status_for(layer: i32, ground: i32, underwater: bool) -> CellStatus {
    match layer.cmp(&ground) {
        std::cmp::Ordering::Less => CellStatus::UnderGround,
        std::cmp::Ordering::Equal if underwater => CellStatus::Underwater,
        std::cmp::Ordering::Equal => CellStatus::Ground,
        std::cmp::Ordering::Greater => CellStatus::AboveGround,
    }
}

/// Stack layers over the given base sub-cells (layer-0 keys).
///
/// Columns that are removed or already stacked are left alone. When a
/// noise source is supplied each column records its surface elevation, and
/// a column whose surface lies below sea level gets an underwater ground
/// cell.
pub fn build_layer_stacks(
    index: &mut WorldIndex,
    ctx: &GenerationContext,
    noise: Option<&TerrainNoise>,
    columns: &[CellKey],
) -> LayerStackSummary {
    let params = &ctx.layers;
    let sea_level = ctx.terrain.sea_level;
    let mut summary = LayerStackSummary::default();
    let mut touched: Vec<CellKey> = Vec::new();

    for base_key in columns {
        let grid = index.tier(Tier::SubCell);
        let base = match grid.get(base_key) {
            Some(cell) if cell.is_active() && base_key.layer == 0 => cell,
            _ => continue,
        };
        if grid.column(&base_key.lookup).len() > 1 {
            debug!("Column {} already stacked", base_key.lookup);
            continue;
        }

        let elevation = noise.map(|n| n.height_at(base.center));
        let ground = ground_layer_of(elevation.unwrap_or(0.0), params);
        let underwater = elevation.map(|e| e < sea_level).unwrap_or(false);

        let lowest = (ground - params.layers_below as i32).min(0);
        let highest = (ground + params.layers_above as i32).max(0);

        let center = base.center;
        let size = base.size;
        let parent_lookup = base.parent_lookup;
        let world_space_lookup = base.world_space_lookup;

        for layer in lowest..=highest {
            let status = status_for(layer, ground, underwater);
            if layer == 0 {
                if let Some(cell) = index.sub_cells.get_mut(base_key) {
                    cell.status = status;
                    cell.ground_elevation = elevation;
                }
                continue;
            }

            let uid = index.next_uid();
            let point = Vec3::new(center.x, layer as f32 * params.cell_layer_elevation, center.z);
            let mut cell = CellPrototype::new(uid, Tier::SubCell, point, size, layer);
            cell.parent_lookup = parent_lookup;
            cell.world_space_lookup = world_space_lookup;
            cell.status = status;
            cell.ground_elevation = elevation;
            if let Ok(key) = index.sub_cells.insert(cell) {
                summary.created.push(key);
            }
        }

        for layer in lowest..highest {
            index
                .sub_cells
                .link_layers(base_key.at_layer(layer), base_key.at_layer(layer + 1));
        }

        if summary.columns == 0 {
            summary.min_ground_layer = ground;
            summary.max_ground_layer = ground;
        } else {
            summary.min_ground_layer = summary.min_ground_layer.min(ground);
            summary.max_ground_layer = summary.max_ground_layer.max(ground);
        }
        summary.columns += 1;
        if underwater {
            summary.underwater += 1;
        }
        touched.push(*base_key);
    }

    touched.extend(summary.created.iter().copied());
    let links = resolve_neighbors(&mut index.sub_cells, &summary.created);
    classify_edges(&mut index.sub_cells, &touched);

    info!(
        "Layer stacks: {} columns, {} stacked cells, {} same-layer links, {} underwater",
        summary.columns,
        summary.created.len(),
        links,
        summary.underwater
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::builder::{build_area_tier, build_region_tier, build_sub_cell_tier, build_worldspace_tier};

    fn world_with_sub_cells(ctx: &GenerationContext) -> (WorldIndex, Vec<CellKey>) {
        let mut index = WorldIndex::new(&ctx.tiers);
        let regions = build_region_tier(&mut index, ctx, Vec3::ZERO, 0);
        let areas = build_area_tier(&mut index, ctx, &regions);
        let worldspaces = build_worldspace_tier(&mut index, ctx, &areas[..1]);
        let subs = build_sub_cell_tier(&mut index, ctx, &worldspaces[..1]);
        (index, subs)
    }

    #[test]
    fn test_ground_layer_pinned_without_elevation() {
        let params = LayerParams::default();
        assert_eq!(ground_layer_of(37.0, &params), 0);
    }

    #[test]
    fn test_ground_layer_from_elevation_is_clamped() {
        let params = LayerParams {
            ground_from_elevation: true,
            ..LayerParams::default()
        };
        assert_eq!(ground_layer_of(9.0, &params), 2);
        assert_eq!(ground_layer_of(-9.0, &params), -2);
        assert_eq!(ground_layer_of(400.0, &params), params.max_ground_layer);
    }

    #[test]
    fn test_stack_statuses_and_links() {
        let ctx = GenerationContext::default();
        let (mut index, subs) = world_with_sub_cells(&ctx);
        let summary = build_layer_stacks(&mut index, &ctx, None, &subs);

        let per_column = (ctx.layers.layers_below + ctx.layers.layers_above) as usize;
        assert_eq!(summary.columns, subs.len());
        assert_eq!(summary.created.len(), subs.len() * per_column);

        let column = index.sub_cells.column(&subs[0].lookup);
        let layers: Vec<i32> = column.iter().map(|k| k.layer).collect();
        assert_eq!(layers, vec![-2, -1, 0, 1]);

        let status = |k: &CellKey| index.sub_cells.get(k).unwrap().status;
        assert_eq!(status(&column[0]), CellStatus::UnderGround);
        assert_eq!(status(&column[1]), CellStatus::UnderGround);
        assert_eq!(status(&column[2]), CellStatus::Ground);
        assert_eq!(status(&column[3]), CellStatus::AboveGround);

        for pair in column.windows(2) {
            let lower = index.sub_cells.get(&pair[0]).unwrap();
            let upper = index.sub_cells.get(&pair[1]).unwrap();
            assert_eq!(lower.above(), Some(pair[1]));
            assert_eq!(upper.below(), Some(pair[0]));
        }
        assert_eq!(index.sub_cells.get(&column[0]).unwrap().below(), None);
        assert_eq!(index.sub_cells.get(&column[3]).unwrap().above(), None);
    }

    #[test]
    fn test_underground_layers_get_neighbors() {
        let ctx = GenerationContext::default();
        let (mut index, subs) = world_with_sub_cells(&ctx);
        build_layer_stacks(&mut index, &ctx, None, &subs);

        let interior = subs
            .iter()
            .find(|k| index.sub_cells.get(k).unwrap().neighbor_count() == 6)
            .copied()
            .unwrap();
        let below = index.sub_cells.get(&interior.at_layer(-1)).unwrap();
        assert_eq!(below.neighbor_count(), 6);
        assert!(below.neighbors.iter().all(|k| k.layer == -1));
    }

    #[test]
    fn test_restacking_is_noop() {
        let ctx = GenerationContext::default();
        let (mut index, subs) = world_with_sub_cells(&ctx);
        build_layer_stacks(&mut index, &ctx, None, &subs);
        let before = index.sub_cells.len();
        let again = build_layer_stacks(&mut index, &ctx, None, &subs);
        assert_eq!(again.columns, 0);
        assert_eq!(index.sub_cells.len(), before);
    }

    #[test]
    fn test_underwater_ground_below_sea_level() {
        let mut ctx = GenerationContext::default();
        // Sea level far above any noise sample.
        ctx.terrain.sea_level = 1.0e6;
        let (mut index, subs) = world_with_sub_cells(&ctx);
        let noise = TerrainNoise::new(7, &ctx.terrain);
        let summary = build_layer_stacks(&mut index, &ctx, Some(&noise), &subs);
        assert_eq!(summary.underwater, subs.len());
        let base = index.sub_cells.get(&subs[0]).unwrap();
        assert_eq!(base.status, CellStatus::Underwater);
        assert!(base.ground_elevation.is_some());
    }
}
