//! Cluster growth on top of the cell graph: random walks, scattered
//! clusters, paths between them, tunnels and locations.

pub mod edge;
pub mod growth;
pub mod location;
pub mod paths;
pub mod random;
pub mod tunnel;
pub mod types;

pub use edge::collect_edge_cluster;
pub use growth::{grow_cluster, linked_cells, random_walk, GrowthFilter, GrowthOptions, SearchPriority};
pub use location::{grow_location, LocationConstraints, LocationData};
pub use paths::{connect_clusters, find_cell_path};
pub use random::{get_random_clusters, select_cells_within_radius_expanding, RandomClusterRequest};
pub use tunnel::{grow_tunnel, grow_tunnel_under_cluster, tunnel_candidates, TunnelResult};
pub use types::{dedup_clusters, Cluster, ClusterId, ClusterRegistry, ClusterType, GroundLayerRule};
