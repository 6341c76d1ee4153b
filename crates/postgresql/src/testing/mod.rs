//! Test support: an in-memory destination with failure injection and a
//! Docker-managed PostgreSQL container.

pub mod container;
mod memory;

pub use memory::{MemoryDestination, MemoryRelation};
