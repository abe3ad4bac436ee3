#![warn(missing_docs)]
//! The HTTP client side of RDB: a single-node client over `reqwest`
//! (`NodeClient`) and a weighted multi-node sharding client (`Cluster`)
//! that dispatches bulk requests across nodes in parallel.

mod cluster;
mod node;

pub use cluster::{Cluster, DEFAULT_PER_NODE_CONCURRENCY};
pub use node::{DEFAULT_PORT, NodeClient};
