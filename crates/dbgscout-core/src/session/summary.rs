//! Printable module enumeration.

use std::fmt;
use std::path::PathBuf;

use crate::registry::{Module, ResolutionState};
use crate::types::{Address, BuildId};

/// Snapshot of one module for output.
///
/// `main_loaded` and `debug_loaded` tell "resolved without a file" (path
/// `None`, printed as `-`) apart from "not resolved" (not printed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSummary
{
    pub name: String,
    pub start: Address,
    pub end: Address,
    pub build_id: Option<BuildId>,
    pub main_loaded: bool,
    pub main_path: Option<PathBuf>,
    pub debug_loaded: bool,
    pub debug_path: Option<PathBuf>,
    pub state: ResolutionState,
}

impl ModuleSummary
{
    pub fn from_module(module: &Module) -> Self
    {
        let main = module.main_image();
        let debug = module.debug_image();
        Self {
            name: module.name().to_string(),
            start: module.start(),
            end: module.end(),
            build_id: module.build_id().cloned(),
            main_loaded: main.is_some(),
            main_path: main.and_then(|image| image.path()).map(Into::into),
            debug_loaded: debug.is_some(),
            debug_path: debug.and_then(|image| image.path()).map(Into::into),
            state: module.state(),
        }
    }
}

impl fmt::Display for ModuleSummary
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        writeln!(f, "{} {:#x}..{:#x}", self.name, self.start.value(), self.end.value())?;
        if let Some(build_id) = &self.build_id {
            writeln!(f, "  [{build_id}]")?;
        }
        let stages = [
            (self.main_loaded, &self.main_path),
            (self.debug_loaded, &self.debug_path),
        ];
        for (loaded, path) in stages {
            if !loaded {
                continue;
            }
            match path {
                Some(path) => writeln!(f, "  {}", path.display())?,
                None => writeln!(f, "  -")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn summary() -> ModuleSummary
    {
        ModuleSummary {
            name: "/lib/libc.so.6".into(),
            start: Address::new(0x7f00_0000),
            end: Address::new(0x7f20_0000),
            build_id: Some(BuildId::from(&[0xaa, 0xbb, 0xcc][..])),
            main_loaded: false,
            main_path: None,
            debug_loaded: false,
            debug_path: None,
            state: ResolutionState::Unresolved,
        }
    }

    #[test]
    fn test_unresolved_stages_not_printed()
    {
        assert_eq!(summary().to_string(), "/lib/libc.so.6 0x7f000000..0x7f200000\n  [aabbcc]\n");
    }

    #[test]
    fn test_loaded_without_path_prints_dash()
    {
        let mut summary = summary();
        summary.build_id = None;
        summary.main_loaded = true;
        summary.debug_loaded = true;
        summary.debug_path = Some(PathBuf::from("/dbg/libc.debug"));
        assert_eq!(summary.to_string(), "/lib/libc.so.6 0x7f000000..0x7f200000\n  -\n  /dbg/libc.debug\n");
    }
}
