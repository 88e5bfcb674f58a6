use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use tracing::{info, warn};

use crate::error::WorldResult;
use crate::grid::{CellKind, CellPrototype, CellStatus, TierGrid};
use crate::hex;
use crate::terrain::{TerrainBounds, VertexGrid, VertexType};

/// One pixel per vertex; elevation normalized over the grid's own range.
fn normalized_elevations(grid: &VertexGrid) -> Vec<f32> {
    let (lo, hi) = grid.elevation_range().unwrap_or((0.0, 0.0));
    let span = (hi - lo).max(f32::EPSILON);
    grid.keys
        .iter()
        .map(|k| grid.get(k).map(|v| (v.elevation() - lo) / span).unwrap_or(0.0))
        .collect()
}

/// Export the vertex grid using the spectral colormap.
pub fn export_heightmap(grid: &VertexGrid, path: &Path) -> WorldResult<()> {
    let mut img: RgbImage = ImageBuffer::new(grid.count_x as u32, grid.count_z as u32);
    for (i, t) in normalized_elevations(grid).into_iter().enumerate() {
        let (x, z) = (i % grid.count_x, i / grid.count_x);
        img.put_pixel(x as u32, z as u32, Rgb(spectral_colormap(t.clamp(0.0, 1.0))));
    }
    img.save(path)?;
    info!("Heightmap written to {}", path.display());
    Ok(())
}

/// Export the vertex grid as 8-bit grayscale (low = black).
pub fn export_grayscale(grid: &VertexGrid, path: &Path) -> WorldResult<()> {
    let mut img: GrayImage = ImageBuffer::new(grid.count_x as u32, grid.count_z as u32);
    for (i, t) in normalized_elevations(grid).into_iter().enumerate() {
        let (x, z) = (i % grid.count_x, i / grid.count_x);
        img.put_pixel(x as u32, z as u32, Luma([(t.clamp(0.0, 1.0) * 255.0) as u8]));
    }
    img.save(path)?;
    info!("Grayscale heightmap written to {}", path.display());
    Ok(())
}

/// Heightmap with terraformed vertices tinted by type.
pub fn export_terraform_overlay(grid: &VertexGrid, path: &Path) -> WorldResult<()> {
    let mut img: RgbImage = ImageBuffer::new(grid.count_x as u32, grid.count_z as u32);
    let shades = normalized_elevations(grid);
    for (i, key) in grid.keys.iter().enumerate() {
        let (x, z) = (i % grid.count_x, i / grid.count_x);
        let shade = (shades[i].clamp(0.0, 1.0) * 200.0) as u8 + 30;
        let color = match grid.get(key) {
            Some(v) if v.excluded => [0, 0, 0],
            Some(v) => match v.vertex_type {
                VertexType::Generic if v.in_blend_band => [shade, shade, shade / 2],
                VertexType::Generic => [shade, shade, shade],
                VertexType::Cell => [shade / 3, shade, shade / 3],
                VertexType::Road => [shade, shade / 2, shade / 4],
                VertexType::Tunnel => [shade / 2, shade / 4, shade],
            },
            None => [0, 0, 0],
        };
        img.put_pixel(x as u32, z as u32, Rgb(color));
    }
    img.save(path)?;
    info!("Terraform overlay written to {}", path.display());
    Ok(())
}

/// Spectral colormap (matplotlib style): dark blue -> cyan -> green -> yellow -> orange -> red
fn spectral_colormap(t: f32) -> [u8; 3] {
    let colors: [[f32; 3]; 11] = [
        [0.37, 0.31, 0.64],
        [0.20, 0.53, 0.74],
        [0.40, 0.76, 0.65],
        [0.67, 0.87, 0.64],
        [0.90, 0.96, 0.60],
        [1.00, 1.00, 0.75],
        [1.00, 0.88, 0.55],
        [0.99, 0.68, 0.38],
        [0.96, 0.43, 0.26],
        [0.84, 0.24, 0.31],
        [0.62, 0.00, 0.26],
    ];

    let t_scaled = t * 10.0;
    let idx = (t_scaled as usize).min(9);
    let frac = t_scaled - idx as f32;

    let c1 = colors[idx];
    let c2 = colors[idx + 1];

    [
        ((c1[0] + (c2[0] - c1[0]) * frac) * 255.0) as u8,
        ((c1[1] + (c2[1] - c1[1]) * frac) * 255.0) as u8,
        ((c1[2] + (c2[2] - c1[2]) * frac) * 255.0) as u8,
    ]
}

fn status_color(cell: &CellPrototype) -> [u8; 3] {
    if cell.is_tunnel_ground_entry {
        return [140, 60, 200];
    }
    match cell.cell_kind {
        CellKind::Road => return [200, 140, 60],
        CellKind::Outpost => return [220, 60, 60],
        _ => {}
    }
    if cell.is_pre_assigned {
        return [200, 140, 60];
    }
    match cell.status {
        CellStatus::Ground if cell.cluster_id.is_some() => [230, 200, 90],
        CellStatus::Ground => [110, 160, 80],
        CellStatus::GenericGround => [150, 170, 110],
        CellStatus::UnderGround => [90, 70, 50],
        CellStatus::AboveGround => [170, 200, 230],
        CellStatus::Underwater => [40, 90, 170],
        CellStatus::Removed => [20, 20, 20],
        CellStatus::Unassigned => [60, 60, 60],
    }
}

/// The surface cell of a column: its ground (or underwater) layer if
/// stacked, layer 0 otherwise.
fn surface_cell<'a>(grid: &'a TierGrid, lookup: &hex::Lookup) -> Option<&'a CellPrototype> {
    let column = grid.column(lookup);
    column
        .iter()
        .filter_map(|k| grid.get(k))
        .find(|c| matches!(c.status, CellStatus::Ground | CellStatus::Underwater))
        .or_else(|| column.iter().filter_map(|k| grid.get(k)).find(|c| c.layer == 0))
}

/// Rasterize the surface of a tier map: one pixel per `units_per_pixel`
/// world units, colored by status and cluster role. Parent boundaries are
/// darkened.
pub fn export_cell_map(grid: &TierGrid, bounds: &TerrainBounds, units_per_pixel: f32, path: &Path) -> WorldResult<()> {
    let step = if units_per_pixel > 0.0 {
        units_per_pixel
    } else {
        warn!("Non-positive pixel size {}; using 1", units_per_pixel);
        1.0
    };
    let width = ((bounds.width() / step).ceil() as u32).max(1);
    let height = ((bounds.depth() / step).ceil() as u32).max(1);
    let mut img: RgbImage = ImageBuffer::new(width, height);

    for py in 0..height {
        for px in 0..width {
            let point = glam::Vec3::new(
                bounds.min_x + (px as f32 + 0.5) * step,
                0.0,
                bounds.min_z + (py as f32 + 0.5) * step,
            );
            let lookup = hex::lookup_key(point, grid.cell_size);
            let color = match surface_cell(grid, &lookup) {
                Some(cell) if cell.edge_cell_type == crate::grid::EdgeCellType::ParentBoundary => {
                    let c = status_color(cell);
                    [c[0] / 2 + 20, c[1] / 2 + 20, c[2] / 2 + 20]
                }
                Some(cell) => status_color(cell),
                None => [0, 0, 0],
            };
            img.put_pixel(px, py, Rgb(color));
        }
    }

    img.save(path)?;
    info!("{} cell map ({}x{}) written to {}", grid.tier, width, height, path.display());
    Ok(())
}
