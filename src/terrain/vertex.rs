//! The stepped vertex grid shared by every terrain chunk.

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Integer world coordinate of a vertex; also its noise input.
pub type VertexKey = (i32, i32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexType {
    #[default]
    Generic,
    /// Flattened by a terraform site
    Cell,
    /// Inside a path cluster cell
    Road,
    /// Over a tunnel entry
    Tunnel,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainVertex {
    pub noise_coordinate: VertexKey,
    /// y is the computed elevation
    pub position: Vec3,
    pub index_x: usize,
    pub index_z: usize,
    pub vertex_type: VertexType,
    /// Left out of the surface mesh (inside a tunnel entry)
    pub excluded: bool,
    /// In the blend band of a tunnel entry
    pub inherit_tunnel: bool,
    /// Softly terraformed; the smoothing pass only touches these
    pub in_blend_band: bool,
}

impl TerrainVertex {
    pub fn new(noise_coordinate: VertexKey, index_x: usize, index_z: usize) -> Self {
        Self {
            noise_coordinate,
            position: Vec3::new(noise_coordinate.0 as f32, 0.0, noise_coordinate.1 as f32),
            index_x,
            index_z,
            vertex_type: VertexType::Generic,
            excluded: false,
            inherit_tunnel: false,
            in_blend_band: false,
        }
    }

    pub fn elevation(&self) -> f32 {
        self.position.y
    }
}

/// Axis-aligned rectangle on the XZ plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainBounds {
    pub min_x: f32,
    pub min_z: f32,
    pub max_x: f32,
    pub max_z: f32,
}

impl TerrainBounds {
    pub fn new(min_x: f32, min_z: f32, max_x: f32, max_z: f32) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_z: min_z.min(max_z),
            max_x: min_x.max(max_x),
            max_z: min_z.max(max_z),
        }
    }

    /// Square bounds of half-width `radius` around `center`.
    pub fn around(center: Vec3, radius: f32) -> Self {
        Self::new(center.x - radius, center.z - radius, center.x + radius, center.z + radius)
    }

    /// Smallest bounds containing every point.
    pub fn enclosing(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::new(first.x, first.z, first.x, first.z);
        for p in iter {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.min_z = bounds.min_z.min(p.z);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.max_z = bounds.max_z.max(p.z);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn depth(&self) -> f32 {
        self.max_z - self.min_z
    }

    pub fn contains(&self, x: f32, z: f32) -> bool {
        x >= self.min_x && x <= self.max_x && z >= self.min_z && z <= self.max_z
    }
}

/// Snap `value` down to a multiple of `step`.
pub fn snap_down(value: f32, step: u32) -> i32 {
    let step = step.max(1) as f32;
    ((value / step).floor() * step) as i32
}

/// Vertices on a regular lattice with spacing `steps`, keyed by their
/// integer world coordinate. `keys` holds the same keys row-major
/// (`z` outer, `x` inner).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexGrid {
    pub origin: VertexKey,
    pub steps: u32,
    pub count_x: usize,
    pub count_z: usize,
    #[serde(with = "vertex_map")]
    pub vertices: HashMap<VertexKey, TerrainVertex>,
    pub keys: Vec<VertexKey>,
}

impl VertexGrid {
    /// Lay out a flat grid covering `bounds`. The origin snaps down to a
    /// multiple of `steps`; the far edge is covered inclusively.
    pub fn covering(bounds: &TerrainBounds, steps: u32) -> Self {
        let steps = steps.max(1);
        let origin = (snap_down(bounds.min_x, steps), snap_down(bounds.min_z, steps));
        let span_x = (bounds.max_x - origin.0 as f32).max(0.0);
        let span_z = (bounds.max_z - origin.1 as f32).max(0.0);
        let count_x = (span_x / steps as f32).ceil() as usize + 1;
        let count_z = (span_z / steps as f32).ceil() as usize + 1;

        let mut vertices = HashMap::with_capacity(count_x * count_z);
        let mut keys = Vec::with_capacity(count_x * count_z);
        for iz in 0..count_z {
            for ix in 0..count_x {
                let key = (
                    origin.0 + (ix as u32 * steps) as i32,
                    origin.1 + (iz as u32 * steps) as i32,
                );
                vertices.insert(key, TerrainVertex::new(key, ix, iz));
                keys.push(key);
            }
        }

        Self {
            origin,
            steps,
            count_x,
            count_z,
            vertices,
            keys,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_at(&self, ix: usize, iz: usize) -> Option<VertexKey> {
        if ix >= self.count_x || iz >= self.count_z {
            return None;
        }
        Some(self.keys[iz * self.count_x + ix])
    }

    pub fn get(&self, key: &VertexKey) -> Option<&TerrainVertex> {
        self.vertices.get(key)
    }

    pub fn get_mut(&mut self, key: &VertexKey) -> Option<&mut TerrainVertex> {
        self.vertices.get_mut(key)
    }

    pub fn vertex_at(&self, ix: usize, iz: usize) -> Option<&TerrainVertex> {
        self.key_at(ix, iz).and_then(|k| self.vertices.get(&k))
    }

    pub fn bounds(&self) -> TerrainBounds {
        let step = self.steps as f32;
        TerrainBounds::new(
            self.origin.0 as f32,
            self.origin.1 as f32,
            self.origin.0 as f32 + step * self.count_x.saturating_sub(1) as f32,
            self.origin.1 as f32 + step * self.count_z.saturating_sub(1) as f32,
        )
    }

    /// (min, max) elevation over the grid.
    pub fn elevation_range(&self) -> Option<(f32, f32)> {
        let mut iter = self.vertices.values().map(|v| v.elevation());
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), e| (lo.min(e), hi.max(e))))
    }
}

/// JSON object keys must be strings, so the vertex map travels as a list.
mod vertex_map {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{TerrainVertex, VertexKey};

    pub fn serialize<S: Serializer>(map: &HashMap<VertexKey, TerrainVertex>, s: S) -> Result<S::Ok, S::Error> {
        let mut list: Vec<&TerrainVertex> = map.values().collect();
        list.sort_by_key(|v| (v.index_z, v.index_x));
        s.collect_seq(list)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<HashMap<VertexKey, TerrainVertex>, D::Error> {
        let list = Vec::<TerrainVertex>::deserialize(d)?;
        Ok(list.into_iter().map(|v| (v.noise_coordinate, v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_snaps_below_min() {
        let bounds = TerrainBounds::new(-7.0, 3.0, 10.0, 9.0);
        let grid = VertexGrid::covering(&bounds, 4);
        assert_eq!(grid.origin, (-8, 0));
        assert!(grid.bounds().max_x >= 10.0);
        assert!(grid.bounds().max_z >= 9.0);
        assert_eq!(grid.len(), grid.count_x * grid.count_z);
    }

    #[test]
    fn test_keys_are_row_major() {
        let grid = VertexGrid::covering(&TerrainBounds::new(0.0, 0.0, 8.0, 4.0), 2);
        assert_eq!(grid.count_x, 5);
        assert_eq!(grid.count_z, 3);
        assert_eq!(grid.key_at(0, 0), Some((0, 0)));
        assert_eq!(grid.key_at(4, 0), Some((8, 0)));
        assert_eq!(grid.key_at(0, 1), Some((0, 2)));
        assert_eq!(grid.key_at(5, 0), None);
        let v = grid.vertex_at(3, 2).unwrap();
        assert_eq!((v.index_x, v.index_z), (3, 2));
        assert_eq!(v.noise_coordinate, (6, 4));
    }

    #[test]
    fn test_vertex_grid_json() {
        let mut grid = VertexGrid::covering(&TerrainBounds::new(0.0, 0.0, 4.0, 4.0), 2);
        grid.get_mut(&(2, 2)).unwrap().position.y = 7.5;
        let text = serde_json::to_string(&grid).unwrap();
        let back: VertexGrid = serde_json::from_str(&text).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn test_enclosing_bounds() {
        let b = TerrainBounds::enclosing([Vec3::new(1.0, 0.0, -2.0), Vec3::new(-3.0, 5.0, 4.0)]).unwrap();
        assert_eq!(b, TerrainBounds::new(-3.0, -2.0, 1.0, 4.0));
        assert!(TerrainBounds::enclosing(Vec::new()).is_none());
    }
}
