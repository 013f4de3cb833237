//! Common module for library exports

pub use crate::container::Container;
pub use crate::error::{Result, ScoutError, Stage};
pub use crate::registry::{Module, ModuleId, ModuleInfo, ModuleReport, ResolutionState};
pub use crate::resolver::{DebugImage, MainImage, Resolved, Resolver, SearchConfig, Strategy};
pub use crate::session::{ModuleSummary, Operation, Phase, Session};
pub use crate::types::{Address, AddressRange, BuildId};
