//! # Shared Types
//!
//! Value types used across the container reader, note extractor, registry
//! and resolver.

pub mod address;
pub mod build_id;

pub use address::{Address, AddressRange};
pub use build_id::BuildId;
