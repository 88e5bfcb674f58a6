//! Hexagon geometry on the XZ plane.
//!
//! All grids in the hierarchy are flat-top hexagons: corner 0 points along +X
//! and the remaining corners follow at 60° increments. Elevation lives on Y and
//! is never touched by the snapping math here.
//!
//! Every tier shares one global lattice per cell size, so snapping a point with
//! [`nearest_center`] gives the same answer no matter which parent asked. That
//! is what lets neighbouring parents agree on the cells along their shared
//! border.

use std::fmt;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

pub const SQRT_3: f32 = 1.732_050_8;

/// Axial neighbour offsets, ordered to match [`hex_side_points`].
pub const AXIAL_DIRECTIONS: [(i32, i32); 6] = [
    (1, 0),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (0, -1),
    (1, -1),
];

/// Dictionary key for a cell: its snapped center rounded to whole units,
/// plus the rounded cell size so keys from different tiers never collide.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lookup {
    pub x: i32,
    pub z: i32,
    pub size: i32,
}

impl Lookup {
    pub fn new(x: i32, z: i32, size: i32) -> Self {
        Self { x, z, size }
    }

    /// Center point this key was rounded from (on the ground plane).
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x as f32, 0.0, self.z as f32)
    }

    /// Planar distance between two keys.
    pub fn distance(&self, other: &Lookup) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dz = (self.z - other.z) as f32;
        (dx * dx + dz * dz).sqrt()
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})@{}", self.x, self.z, self.size)
    }
}

/// The six corners of a hexagon of circumradius `size`.
pub fn hex_corners(center: Vec3, size: f32) -> [Vec3; 6] {
    let mut corners = [Vec3::ZERO; 6];
    for (i, corner) in corners.iter_mut().enumerate() {
        let angle = (60.0 * i as f32).to_radians();
        *corner = Vec3::new(
            center.x + size * angle.cos(),
            center.y,
            center.z + size * angle.sin(),
        );
    }
    corners
}

/// Midpoints of each pair of adjacent corners. Side `i` sits between
/// corner `i` and corner `i + 1`.
pub fn hex_side_points(center: Vec3, size: f32) -> [Vec3; 6] {
    let corners = hex_corners(center, size);
    let mut sides = [Vec3::ZERO; 6];
    for i in 0..6 {
        sides[i] = (corners[i] + corners[(i + 1) % 6]) * 0.5;
    }
    sides
}

/// Fractional axial coordinates of a planar point.
pub fn point_to_axial(point: Vec2, size: f32) -> (f32, f32) {
    let q = (2.0 / 3.0 * point.x) / size;
    let r = (-1.0 / 3.0 * point.x + SQRT_3 / 3.0 * point.y) / size;
    (q, r)
}

/// Planar center of the hex at axial `(q, r)`.
pub fn axial_to_point(q: i32, r: i32, size: f32) -> Vec2 {
    let x = size * 1.5 * q as f32;
    let z = size * (SQRT_3 * 0.5 * q as f32 + SQRT_3 * r as f32);
    Vec2::new(x, z)
}

/// Cube rounding of fractional axial coordinates.
pub fn axial_round(q: f32, r: f32) -> (i32, i32) {
    let s = -q - r;
    let mut rq = q.round();
    let mut rr = r.round();
    let rs = s.round();

    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();

    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }

    (rq as i32, rr as i32)
}

/// Axial coordinates of the hex containing `point`.
pub fn axial_of(point: Vec3, size: f32) -> (i32, i32) {
    let (q, r) = point_to_axial(Vec2::new(point.x, point.z), size);
    axial_round(q, r)
}

/// Snap an arbitrary point to the center of the hex of `size` containing it.
/// The Y component is carried through unchanged.
pub fn nearest_center(point: Vec3, size: f32) -> Vec3 {
    let (q, r) = axial_of(point, size);
    let center = axial_to_point(q, r, size);
    Vec3::new(center.x, point.y, center.y)
}

/// Key of the hex of `size` containing `point`.
pub fn lookup_key(point: Vec3, size: f32) -> Lookup {
    let center = nearest_center(point, size);
    Lookup::new(center.x.round() as i32, center.z.round() as i32, size.round() as i32)
}

/// Centers of the six theoretical neighbours of the hex containing `center`.
pub fn neighbor_centers(center: Vec3, size: f32) -> [Vec3; 6] {
    let (q, r) = axial_of(center, size);
    let mut out = [Vec3::ZERO; 6];
    for (i, (dq, dr)) in AXIAL_DIRECTIONS.iter().enumerate() {
        let p = axial_to_point(q + dq, r + dr, size);
        out[i] = Vec3::new(p.x, center.y, p.y);
    }
    out
}

/// Keys of the six theoretical neighbours.
pub fn neighbor_lookups(center: Vec3, size: f32) -> [Lookup; 6] {
    let centers = neighbor_centers(center, size);
    let mut out = [Lookup::default(); 6];
    for (i, c) in centers.iter().enumerate() {
        out[i] = lookup_key(*c, size);
    }
    out
}

/// Hex-grid distance in steps between two axial coordinates.
pub fn axial_distance(a: (i32, i32), b: (i32, i32)) -> i32 {
    let dq = a.0 - b.0;
    let dr = a.1 - b.1;
    (dq.abs() + dr.abs() + (dq + dr).abs()) / 2
}

/// Lattice centers of `size` radiating outward from the hex containing
/// `origin`, ring by ring, up to and including ring `rings`.
pub fn spiral_centers(origin: Vec3, size: f32, rings: u32) -> Vec<Vec3> {
    let (cq, cr) = axial_of(origin, size);
    let rings = rings as i32;
    let mut points = Vec::with_capacity((3 * rings * (rings + 1) + 1) as usize);

    let center = axial_to_point(cq, cr, size);
    points.push(Vec3::new(center.x, origin.y, center.y));

    for ring in 1..=rings {
        // Start at the ring's corner in direction 4 and walk each side.
        let mut q = cq + AXIAL_DIRECTIONS[4].0 * ring;
        let mut r = cr + AXIAL_DIRECTIONS[4].1 * ring;
        for (dq, dr) in AXIAL_DIRECTIONS.iter() {
            for _ in 0..ring {
                let p = axial_to_point(q, r, size);
                points.push(Vec3::new(p.x, origin.y, p.y));
                q += dq;
                r += dr;
            }
        }
    }

    points
}

/// Number of lattice rings of `child_size` needed to cover a parent hex of
/// `parent_size`, padded by `padding` extra rings.
pub fn covering_rings(parent_size: f32, child_size: f32, padding: u32) -> u32 {
    let spacing = SQRT_3 * child_size;
    (parent_size / spacing).ceil() as u32 + padding
}

/// Strict inside test for a flat-top hexagon. Points on the border (shared
/// with neighbouring hexes) are outside.
pub fn point_in_hex(point: Vec3, center: Vec3, size: f32) -> bool {
    let dx = (point.x - center.x).abs();
    let dz = (point.z - center.z).abs();
    let inradius = SQRT_3 * 0.5 * size;
    let eps = size * 1e-4;
    dz < inradius - eps && (SQRT_3 * 0.5 * dx + 0.5 * dz) < inradius - eps
}

/// Planar distance, ignoring elevation.
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    Vec2::new(a.x - b.x, a.z - b.z).length()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_lie_on_circumradius() {
        let center = Vec3::new(10.0, 5.0, -4.0);
        for corner in hex_corners(center, 12.0) {
            assert!((planar_distance(corner, center) - 12.0).abs() < 1e-3);
            assert_eq!(corner.y, 5.0);
        }
    }

    #[test]
    fn test_side_points_lie_on_inradius() {
        let center = Vec3::ZERO;
        let inradius = SQRT_3 * 0.5 * 12.0;
        for side in hex_side_points(center, 12.0) {
            assert!((planar_distance(side, center) - inradius).abs() < 1e-3);
        }
    }

    #[test]
    fn test_nearest_center_snaps_inside_points() {
        let size = 12.0;
        for &(q, r) in &[(0, 0), (3, -2), (-5, 7), (10, 10)] {
            let c = axial_to_point(q, r, size);
            let center = Vec3::new(c.x, 0.0, c.y);
            // Anything well inside the hex snaps back to its center.
            let probe = center + Vec3::new(size * 0.4, 0.0, -size * 0.3);
            let snapped = nearest_center(probe, size);
            assert!(planar_distance(snapped, center) < 1e-3);
        }
    }

    #[test]
    fn test_lookup_key_is_deterministic() {
        let p = Vec3::new(123.4, 0.0, -987.6);
        assert_eq!(lookup_key(p, 12.0), lookup_key(p, 12.0));
        assert_eq!(lookup_key(p, 12.0).size, 12);
    }

    #[test]
    fn test_lookup_keys_unique_over_spiral() {
        let points = spiral_centers(Vec3::ZERO, 4.0, 12);
        let mut keys: Vec<Lookup> = points.iter().map(|p| lookup_key(*p, 4.0)).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_spiral_ring_counts() {
        assert_eq!(spiral_centers(Vec3::ZERO, 10.0, 0).len(), 1);
        assert_eq!(spiral_centers(Vec3::ZERO, 10.0, 1).len(), 7);
        assert_eq!(spiral_centers(Vec3::ZERO, 10.0, 2).len(), 19);
    }

    #[test]
    fn test_neighbors_are_one_step_away() {
        let center = Vec3::ZERO;
        let origin = axial_of(center, 12.0);
        for n in neighbor_centers(center, 12.0) {
            assert!((planar_distance(n, center) - SQRT_3 * 12.0).abs() < 1e-3);
            assert_eq!(axial_distance(origin, axial_of(n, 12.0)), 1);
        }
    }

    #[test]
    fn test_point_in_hex_excludes_corners() {
        let center = Vec3::ZERO;
        assert!(point_in_hex(Vec3::new(1.0, 0.0, 1.0), center, 12.0));
        for corner in hex_corners(center, 12.0) {
            assert!(!point_in_hex(corner, center, 12.0));
        }
    }

    #[test]
    fn test_ratio_three_children_inside_parent() {
        // A parent of size 3s strictly contains exactly the 7-hex flower of size s.
        let parent = 36.0;
        let child = 12.0;
        let rings = covering_rings(parent, child, 3);
        let inside = spiral_centers(Vec3::ZERO, child, rings)
            .into_iter()
            .filter(|p| point_in_hex(*p, Vec3::ZERO, parent) || planar_distance(*p, Vec3::ZERO) <= parent * 0.95)
            .count();
        assert_eq!(inside, 7);
    }
}
