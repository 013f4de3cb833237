//! File system resolvers.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use super::{DebugDir, MainImage, Resolved, Resolver, SearchConfig};
use crate::container::{Container, ImageKind};
use crate::notes::extract_build_id;
use crate::registry::ModuleInfo;
use crate::types::BuildId;

/// Suffix of separate debug files in a `.build-id` index
const DEBUG_SUFFIX: &str = ".debug";

/// Resolver backed by the file system, driven by a [`SearchConfig`].
///
/// Lookup order for the main image:
/// 1. `<root>/.build-id/xx/rest` for every build-id root (index strategy only)
/// 2. the path recorded for the module
///
/// Lookup order for the debug file:
/// 1. `<root>/.build-id/xx/rest.debug` for every build-id root (index strategy only)
/// 2. the debuglink name under every entry of the debuginfo path
///
/// Whenever the module has a build id, a candidate is accepted only if its
/// own build id matches.
#[derive(Debug, Clone)]
pub struct SearchResolver
{
    config: Arc<SearchConfig>,
    use_index: bool,
}

impl SearchResolver
{
    /// Build-id index, then literal paths.
    pub fn new(config: Arc<SearchConfig>) -> Self
    {
        Self {
            config,
            use_index: true,
        }
    }

    /// Literal paths and debuglink candidates only.
    pub fn literal(config: Arc<SearchConfig>) -> Self
    {
        Self {
            config,
            use_index: false,
        }
    }

    pub fn config(&self) -> &SearchConfig
    {
        &self.config
    }

    fn index_candidates(&self, build_id: Option<&BuildId>, suffix: &str) -> Vec<PathBuf>
    {
        if !self.use_index {
            return Vec::new();
        }
        let Some(relative) = build_id.and_then(|id| id.index_path(suffix)) else {
            return Vec::new();
        };
        self.config
            .build_id_roots
            .iter()
            .map(|root| root.join(&relative))
            .collect()
    }

    /// Debug file candidates for a main file at `main_path` whose debuglink
    /// names `link`, in lookup order.
    pub fn debuglink_candidates(&self, main_path: &Path, link: &str) -> Vec<PathBuf>
    {
        let Some(link) = Path::new(link).file_name() else {
            return Vec::new();
        };
        let dir = match main_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut candidates = Vec::new();
        for entry in self.config.debug_dirs() {
            let candidate = match entry {
                DebugDir::NextToMain => dir.join(link),
                DebugDir::Relative(sub) => dir.join(sub).join(link),
                DebugDir::Global(root) => root.join(without_root(dir)).join(link),
            };
            if candidate != main_path && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}

/// `dir` with its root and prefix components removed, for nesting under a
/// global debug root.
fn without_root(dir: &Path) -> PathBuf
{
    dir.components()
        .filter(|component| !matches!(component, Component::RootDir | Component::Prefix(_)))
        .collect()
}

/// Open `path` and keep it only if it is a usable image whose build id
/// matches `expected` (when given).
fn open_verified(path: &Path, expected: Option<&BuildId>) -> Option<Container>
{
    if !path.is_file() {
        trace!(path = %path.display(), "no such file");
        return None;
    }
    let container = match Container::open(path) {
        Ok(container) => container,
        Err(error) => {
            debug!(path = %path.display(), %error, "candidate rejected");
            return None;
        }
    };
    if container.kind() == ImageKind::Core {
        debug!(path = %path.display(), "candidate is a core image");
        return None;
    }
    if let Some(expected) = expected {
        let found = extract_build_id(&container);
        if !found.as_ref().is_some_and(|found| expected.matches(found)) {
            debug!(
                path = %path.display(),
                expected = %expected,
                found = ?found,
                "candidate build id does not match"
            );
            return None;
        }
    }
    debug!(path = %path.display(), "candidate accepted");
    Some(container)
}

fn first_verified(candidates: impl IntoIterator<Item = PathBuf>, expected: Option<&BuildId>) -> Option<Resolved>
{
    candidates.into_iter().find_map(|path| {
        let container = open_verified(&path, expected)?;
        Some(Resolved { path, container })
    })
}

impl Resolver for SearchResolver
{
    fn find_main(&self, module: &ModuleInfo<'_>) -> Option<Resolved>
    {
        let indexed = self.index_candidates(module.build_id, "");
        let literal = module.path.map(Path::to_path_buf);
        first_verified(indexed.into_iter().chain(literal), module.build_id)
    }

    fn find_debug(&self, module: &ModuleInfo<'_>, main: Option<&MainImage>) -> Option<Resolved>
    {
        let indexed = self.index_candidates(module.build_id, DEBUG_SUFFIX);
        if let Some(found) = first_verified(indexed, module.build_id) {
            return Some(found);
        }

        let main_path = main.and_then(MainImage::path).or(module.path)?;
        let link = main
            .and_then(|image| image.container().debuglink())
            .or_else(|| {
                let name = main_path.file_name()?.to_string_lossy();
                Some(format!("{name}{DEBUG_SUFFIX}"))
            })?;
        trace!(module = module.name, %link, "probing debuglink candidates");
        first_verified(self.debuglink_candidates(main_path, &link), module.build_id)
    }
}

/// Resolver that never touches the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineResolver;

impl Resolver for OfflineResolver
{
    fn find_main(&self, _module: &ModuleInfo<'_>) -> Option<Resolved>
    {
        None
    }

    fn find_debug(&self, _module: &ModuleInfo<'_>, _main: Option<&MainImage>) -> Option<Resolved>
    {
        None
    }
}
