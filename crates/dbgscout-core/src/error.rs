//! # Error Types
//!
//! General error handling for module discovery and resolution.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! ## Containment
//!
//! Most variants describe bad *input* and are contained to the smallest unit
//! that produced them (one note, one module, one container). Only
//! [`ScoutError::SessionState`] always reaches the caller, because it means the
//! session API was driven out of order.

use thiserror::Error;

use crate::registry::ModuleId;
use crate::session::{Operation, Phase};

/// Which half of module resolution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage
{
    /// Locating the module's main image.
    Main,
    /// Locating the module's separate debug information.
    Debug,
}

impl std::fmt::Display for Stage
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self {
            Stage::Main => write!(f, "main image"),
            Stage::Debug => write!(f, "debug file"),
        }
    }
}

/// Main error type for discovery and resolution operations
///
/// ## Error Categories
///
/// 1. **Container errors**: InvalidFormat, Truncated, OutOfBounds
/// 2. **Note errors**: MalformedNote
/// 3. **Protocol errors**: SessionState, UnknownModule
/// 4. **Resolution errors**: ResolutionFailed
/// 5. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum ScoutError
{
    /// The container header is nonsensical
    ///
    /// Raised for empty input, a wrong magic number, or an unknown class or
    /// byte order. Fatal to that container only.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A structure declares more bytes than are available
    ///
    /// Processing of the structure is cut at `available` and continues with
    /// whatever was readable.
    #[error("Truncated {what}: needed {needed} bytes, {available} available")]
    Truncated
    {
        /// Structure being read
        what: &'static str,
        /// Declared size
        needed: u64,
        /// Bytes actually present
        available: u64,
    },

    /// An offset/length pair points outside the container
    #[error("Out of bounds read: offset 0x{offset:x} + {len} exceeds size {size}")]
    OutOfBounds
    {
        /// Requested offset
        offset: u64,
        /// Requested length
        len: u64,
        /// Size of the underlying byte source
        size: u64,
    },

    /// A single note entry is corrupt
    #[error("Malformed note at offset 0x{offset:x}: {reason}")]
    MalformedNote
    {
        /// Offset of the note header within the container
        offset: u64,
        /// What was wrong with it
        reason: String,
    },

    /// Session operation invoked in the wrong phase
    ///
    /// This is always a caller bug and is never retried.
    #[error("Cannot {operation} while session is {phase}")]
    SessionState
    {
        /// Operation that was attempted
        operation: Operation,
        /// Phase the session was in
        phase: Phase,
    },

    /// No module with this handle exists in the session
    #[error("Unknown module handle {0}")]
    UnknownModule(ModuleId),

    /// A module's main image or debug file could not be located
    ///
    /// Recorded per module; never aborts the session.
    #[error("Could not locate {stage} for module {module}")]
    ResolutionFailed
    {
        /// Name of the module
        module: String,
        /// Which stage failed
        stage: Stage,
    },

    /// I/O error while opening or mapping a file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoutError
{
    /// Whether this error means the session was driven out of order.
    #[must_use]
    pub fn is_session_state(&self) -> bool
    {
        matches!(self, ScoutError::SessionState { .. })
    }

    pub(crate) fn out_of_bounds(offset: u64, len: u64, size: usize) -> Self
    {
        ScoutError::OutOfBounds {
            offset,
            len,
            size: size as u64,
        }
    }
}

/// Convenience type alias for `Result<T, ScoutError>`
///
/// ```rust
/// use dbgscout_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, ScoutError>;
