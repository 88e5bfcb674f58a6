//! Layered fractal noise used for every terrain elevation sample.

use glam::Vec3;
use noise::{NoiseFn, Perlin, Seedable};

use crate::config::TerrainParams;

/// Sum `octaves` Perlin samples at `(x, z)`.
///
/// The first octave has weight `amplitude`; each later one is multiplied by
/// `persistence`. Every octave samples at the same `frequency`: `lacunarity`
/// is carried in the parameters but not applied.
pub fn noise_height(perlin: &Perlin, x: f64, z: f64, params: &TerrainParams) -> f32 {
    let mut total = 0.0;
    let mut amplitude = params.amplitude;
    let frequency = params.frequency;

    for _ in 0..params.octaves {
        total += perlin.get([x * frequency, z * frequency]) * amplitude;
        amplitude *= params.persistence;
    }

    total as f32
}

/// A seeded noise source bound to one set of terrain parameters.
#[derive(Clone, Debug)]
pub struct TerrainNoise {
    perlin: Perlin,
    params: TerrainParams,
}

impl TerrainNoise {
    pub fn new(seed: u64, params: &TerrainParams) -> Self {
        Self {
            perlin: Perlin::new(1).set_seed(seed as u32),
            params: params.clone(),
        }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    pub fn height(&self, x: f64, z: f64) -> f32 {
        noise_height(&self.perlin, x, z, &self.params)
    }

    /// Height at the XZ projection of `point`.
    pub fn height_at(&self, point: Vec3) -> f32 {
        self.height(point.x as f64, point.z as f64)
    }

    /// Height rounded to the nearest multiple of `step`.
    pub fn plateau_height(&self, point: Vec3, step: f32) -> f32 {
        round_to_step(self.height_at(point), step)
    }
}

pub fn round_to_step(value: f32, step: f32) -> f32 {
    if step <= 0.0 {
        return value;
    }
    (value / step).round() * step
}
