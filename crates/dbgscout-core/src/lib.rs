//! # dbgscout-core
//!
//! Module discovery and debug-file resolution for ELF images and core dumps.
//!
//! This crate provides the engine behind `dbgscout`:
//! - Bounds-checked ELF container reading (headers, segments, sections)
//! - Note extraction (build ids, `NT_FILE` mapping tables, auxiliary vectors)
//! - A module registry that merges duplicate reports
//! - Pluggable resolvers that locate main images and separate debug files
//! - A session state machine tying it all together
//!
//! ## Inputs are untrusted
//!
//! Core dumps come from crashed processes and are often cut short or
//! corrupted. Every structure is bound-checked, and a bad note or mapping
//! costs only that entry, never the session.
//!
//! ## Why unsafe code is needed
//!
//! Files are memory-mapped read-only with `memmap2`, which is an `unsafe`
//! call. It is the only one in the crate.

#![allow(unsafe_code)] // Required for read-only file mappings

pub mod container;
pub mod core_image;
pub mod dwarf;
pub mod error;
pub mod notes;
pub mod prelude;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod types;

pub use container::Container;
pub use core_image::CoreImage;
// Re-export commonly used types
pub use error::{Result, ScoutError};
pub use registry::{Module, ModuleId, ModuleReport, ResolutionState};
pub use resolver::{Resolver, SearchConfig, Strategy};
pub use session::{ModuleSummary, Phase, Session};
pub use types::{Address, AddressRange, BuildId};
