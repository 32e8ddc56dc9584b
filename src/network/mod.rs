//! Host port pool for instance upstreams.

pub mod port_pool;

pub use port_pool::{PortAllocator, PortPoolStats};
