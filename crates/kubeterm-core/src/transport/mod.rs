//! Transport implementations that live alongside the bridge.

mod memory;

pub use memory::{MemoryConnection, MemoryPeer};
