//! # Resolver Protocol
//!
//! A session asks its [`Resolver`] for two files per module: the main image
//! and the separate debug file. Resolvers are pure lookups; the session owns
//! the caching and calls each stage at most once per module.
//!
//! | Strategy | Build-id index | Recorded path | Debuglink candidates |
//! |---|---|---|---|
//! | [`Strategy::BuildIdSearch`] | yes | yes | yes |
//! | [`Strategy::LiteralPath`] | no | yes | yes |
//! | [`Strategy::Offline`] | no | no | no |

pub mod config;
pub mod search;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use self::config::{DebugDir, SearchConfig, Strategy};
pub use self::search::{OfflineResolver, SearchResolver};
use crate::container::Container;
use crate::registry::ModuleInfo;

/// A file located by a resolver, already opened and verified.
#[derive(Debug)]
pub struct Resolved
{
    pub path: PathBuf,
    pub container: Container,
}

/// The main image of a module.
#[derive(Debug)]
pub struct MainImage
{
    path: Option<PathBuf>,
    container: Container,
}

impl MainImage
{
    /// An image opened from a file.
    pub fn from_file(resolved: Resolved) -> Self
    {
        Self {
            path: Some(resolved.path),
            container: resolved.container,
        }
    }

    /// An image with no backing file, e.g. rebuilt from core memory.
    pub fn detached(container: Container) -> Self
    {
        Self { path: None, container }
    }

    pub fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    pub fn container(&self) -> &Container
    {
        &self.container
    }
}

/// The debug information of a module.
#[derive(Debug)]
pub struct DebugImage
{
    path: Option<PathBuf>,
    /// `None` when the main image carries its own DWARF
    container: Option<Container>,
}

impl DebugImage
{
    /// Debug information found inside the main image at `path`.
    pub fn in_main(path: Option<PathBuf>) -> Self
    {
        Self { path, container: None }
    }

    /// A separate debug file.
    pub fn separate(resolved: Resolved) -> Self
    {
        Self {
            path: Some(resolved.path),
            container: Some(resolved.container),
        }
    }

    pub fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    /// The separate debug container, if the information lives in one
    pub fn container(&self) -> Option<&Container>
    {
        self.container.as_ref()
    }

    pub fn is_in_main(&self) -> bool
    {
        self.container.is_none()
    }
}

/// File lookup for module resolution.
///
/// Implementations must be deterministic for a given file system state and
/// must drop any candidate container they reject.
pub trait Resolver: Send + Sync
{
    /// Locate the main image of `module`.
    fn find_main(&self, module: &ModuleInfo<'_>) -> Option<Resolved>;

    /// Locate a separate debug file for `module`. `main` is the module's main
    /// image when one was found.
    fn find_debug(&self, module: &ModuleInfo<'_>, main: Option<&MainImage>) -> Option<Resolved>;
}

/// Resolver implementing `config.strategy`.
pub fn for_config(config: Arc<SearchConfig>) -> Box<dyn Resolver>
{
    match config.strategy {
        Strategy::BuildIdSearch => Box::new(SearchResolver::new(config)),
        Strategy::LiteralPath => Box::new(SearchResolver::literal(config)),
        Strategy::Offline => Box::new(OfflineResolver),
    }
}
