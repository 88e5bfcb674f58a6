//! Seed management for world generation
//!
//! Every generation system draws from its own RNG stream, derived from the
//! master seed, so changing how many clusters are grown never reshuffles the
//! terrain noise.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Seeds for all world generation systems.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationSeeds {
    /// Master seed (used for display/reference)
    pub master: u64,
    /// Random clusters and outposts
    pub clusters: u64,
    /// Tunnel growth
    pub tunnels: u64,
    /// Order in which paths chain the outposts
    pub paths: u64,
    /// Terrain noise permutation
    pub terrain: u64,
}

impl GenerationSeeds {
    /// Create seeds from a master seed, deriving all sub-seeds deterministically.
    pub fn from_master(master: u64) -> Self {
        Self {
            master,
            clusters: derive_seed(master, "clusters"),
            tunnels: derive_seed(master, "tunnels"),
            paths: derive_seed(master, "paths"),
            terrain: derive_seed(master, "terrain"),
        }
    }

    pub fn builder(master: u64) -> GenerationSeedsBuilder {
        GenerationSeedsBuilder::new(master)
    }

    pub fn cluster_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.clusters)
    }

    pub fn tunnel_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.tunnels)
    }

    pub fn path_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.paths)
    }
}

/// Builder for overriding individual seeds while deriving others from master
pub struct GenerationSeedsBuilder {
    seeds: GenerationSeeds,
}

impl GenerationSeedsBuilder {
    pub fn new(master: u64) -> Self {
        Self {
            seeds: GenerationSeeds::from_master(master),
        }
    }

    pub fn clusters(mut self, seed: u64) -> Self {
        self.seeds.clusters = seed;
        self
    }

    pub fn tunnels(mut self, seed: u64) -> Self {
        self.seeds.tunnels = seed;
        self
    }

    pub fn paths(mut self, seed: u64) -> Self {
        self.seeds.paths = seed;
        self
    }

    pub fn terrain(mut self, seed: u64) -> Self {
        self.seeds.terrain = seed;
        self
    }

    pub fn build(self) -> GenerationSeeds {
        self.seeds
    }
}

/// Derive a sub-seed from a master seed and a system name.
fn derive_seed(master: u64, system: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    master.hash(&mut hasher);
    system.hash(&mut hasher);
    hasher.finish()
}

impl std::fmt::Display for GenerationSeeds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GenerationSeeds {{ master: {}, clusters: {}, tunnels: {}, paths: {}, terrain: {} }}",
            self.master, self.clusters, self.tunnels, self.paths, self.terrain,
        )
    }
}
