//! Search configuration shared by resolvers.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

/// Environment variable overriding [`SearchConfig::debuginfo_path`]
pub const DEBUGINFO_PATH_ENV: &str = "DBGSCOUT_DEBUGINFO_PATH";
/// Environment variable listing build-id roots, colon-separated
pub const BUILD_ID_ROOTS_ENV: &str = "DBGSCOUT_BUILD_ID_ROOTS";

/// Conventional debuginfo search path: next to the main file, in its
/// `.debug` subdirectory, then under the global debug root.
pub const DEFAULT_DEBUGINFO_PATH: &str = ":.debug:/usr/lib/debug";
pub const DEFAULT_BUILD_ID_ROOT: &str = "/usr/lib/debug";

/// How a session looks for module files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy
{
    /// Build-id index first, then recorded paths and debuglink candidates
    #[default]
    BuildIdSearch,
    /// Recorded paths and debuglink candidates only
    LiteralPath,
    /// Never search; only images supplied at report time
    Offline,
}

impl fmt::Display for Strategy
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            Strategy::BuildIdSearch => "build-id",
            Strategy::LiteralPath => "literal",
            Strategy::Offline => "offline",
        };
        f.write_str(name)
    }
}

impl FromStr for Strategy
{
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err>
    {
        match value {
            "build-id" | "buildid" => Ok(Strategy::BuildIdSearch),
            "literal" | "path" => Ok(Strategy::LiteralPath),
            "offline" | "none" => Ok(Strategy::Offline),
            other => Err(format!("unknown resolver strategy '{other}'")),
        }
    }
}

/// One entry of the debuginfo search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugDir
{
    /// The directory holding the main file
    NextToMain,
    /// A subdirectory of the main file's directory
    Relative(PathBuf),
    /// A global root mirroring the file system layout
    Global(PathBuf),
}

/// Where resolvers look for files.
///
/// Built once and shared between sessions behind an `Arc`; nothing mutates
/// it after a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig
{
    pub strategy: Strategy,
    /// Roots holding a `.build-id/` index, tried in order
    pub build_id_roots: Vec<PathBuf>,
    /// Colon-separated debuginfo path (`""` entry = next to the main file)
    pub debuginfo_path: String,
    /// When set, debug lookups use only this root
    pub override_root: Option<PathBuf>,
}

impl Default for SearchConfig
{
    fn default() -> Self
    {
        Self {
            strategy: Strategy::default(),
            build_id_roots: vec![PathBuf::from(DEFAULT_BUILD_ID_ROOT)],
            debuginfo_path: DEFAULT_DEBUGINFO_PATH.to_string(),
            override_root: None,
        }
    }
}

impl SearchConfig
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Defaults overridden by `DBGSCOUT_DEBUGINFO_PATH` and
    /// `DBGSCOUT_BUILD_ID_ROOTS` when they are set.
    #[must_use]
    pub fn from_env() -> Self
    {
        let mut config = Self::default();
        if let Ok(path) = env::var(DEBUGINFO_PATH_ENV) {
            debug!(%path, "debuginfo path from environment");
            config.debuginfo_path = path;
        }
        if let Ok(roots) = env::var(BUILD_ID_ROOTS_ENV) {
            debug!(%roots, "build-id roots from environment");
            config.build_id_roots = split_roots(&roots);
        }
        config
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self
    {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_build_id_roots(mut self, roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self
    {
        self.build_id_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_debuginfo_path(mut self, path: impl Into<String>) -> Self
    {
        self.debuginfo_path = path.into();
        self
    }

    #[must_use]
    pub fn with_override_root(mut self, root: impl Into<PathBuf>) -> Self
    {
        self.override_root = Some(root.into());
        self
    }

    /// The debuginfo path split into entries, in lookup order.
    ///
    /// Leading `+`/`-` markers (checksum hints in the conventional syntax)
    /// are accepted and ignored. An override root replaces the whole list.
    pub fn debug_dirs(&self) -> Vec<DebugDir>
    {
        if let Some(root) = &self.override_root {
            return vec![DebugDir::Global(root.clone())];
        }
        let mut dirs: Vec<DebugDir> = Vec::new();
        for entry in self.debuginfo_path.split(':') {
            let entry = entry.trim_start_matches(['+', '-']);
            let dir = if entry.is_empty() {
                DebugDir::NextToMain
            } else if Path::new(entry).is_absolute() {
                DebugDir::Global(PathBuf::from(entry))
            } else {
                DebugDir::Relative(PathBuf::from(entry))
            };
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}

fn split_roots(value: &str) -> Vec<PathBuf>
{
    value
        .split(':')
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .collect()
}
