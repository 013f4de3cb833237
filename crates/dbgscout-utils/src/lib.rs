//! # dbgscout Utilities
//!
//! Shared utilities, logging, and helpers for dbgscout.
//!
//! The library crate never installs a subscriber itself; binaries call one of
//! the `init_logging*` functions here once at startup.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_to_dir, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
