//! # Module Registry
//!
//! Arena of the modules a session knows about.
//!
//! Modules are created by [`Registry::report`] while a round is open and are
//! only merged when the round closes ([`Registry::end_round`]). A module is
//! addressed by its [`ModuleId`], an index into the arena that stays valid
//! for the life of the registry: handles of modules merged into another one
//! forward to the survivor, and handles of discarded modules stop resolving.
//!
//! ## Rounds
//!
//! ```text
//! begin_round ─► report* ─► end_round
//!                              │  dedup pending candidates
//!                              │  discard stale modules of the previous round
//!                              ▼
//!                         finalized set (insertion order)
//! ```
//!
//! Reporting a candidate identical to a module finalized in an earlier round
//! reuses that module, handle and cached resolution included.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{ScoutError, Stage};
use crate::resolver::{DebugImage, MainImage};
use crate::types::{Address, AddressRange, BuildId};

/// Stable handle for a module within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(usize);

impl ModuleId
{
    #[must_use]
    pub const fn from_raw(value: usize) -> Self
    {
        Self(value)
    }

    #[must_use]
    pub const fn raw(self) -> usize
    {
        self.0
    }
}

impl fmt::Display for ModuleId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

/// A module candidate as reported by a caller or by core discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReport
{
    /// Module name; an empty name is replaced by `module@<start-hex>`
    pub name: String,
    pub range: AddressRange,
    pub build_id: Option<BuildId>,
    /// Path recorded by the source of the report, if any
    pub path: Option<PathBuf>,
}

impl ModuleReport
{
    pub fn new(name: impl Into<String>, range: AddressRange) -> Self
    {
        Self {
            name: name.into(),
            range,
            build_id: None,
            path: None,
        }
    }

    #[must_use]
    pub fn with_build_id(mut self, build_id: BuildId) -> Self
    {
        self.build_id = Some(build_id).filter(|id| !id.is_empty());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.path = Some(path.into());
        self
    }
}

/// Name used for a module reported without one.
pub fn synthesized_name(start: Address) -> String
{
    format!("module@{start:x}")
}

/// Where a module stands in resolution.
///
/// Only ever advances: `Unresolved` → `MainResolved`/`Failed` →
/// `DebugResolved`/`Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionState
{
    Unresolved,
    MainResolved,
    DebugResolved,
    Failed,
}

impl fmt::Display for ResolutionState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            ResolutionState::Unresolved => "unresolved",
            ResolutionState::MainResolved => "main resolved",
            ResolutionState::DebugResolved => "debug resolved",
            ResolutionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of one resolution stage, attempted at most once.
#[derive(Debug, Default)]
pub enum Outcome<T>
{
    #[default]
    Pending,
    Found(T),
    Missing,
}

impl<T> Outcome<T>
{
    pub fn is_pending(&self) -> bool
    {
        matches!(self, Outcome::Pending)
    }

    pub fn found(&self) -> Option<&T>
    {
        match self {
            Outcome::Found(value) => Some(value),
            _ => None,
        }
    }

    fn from_option(value: Option<T>) -> Self
    {
        value.map_or(Outcome::Missing, Outcome::Found)
    }
}

/// Borrowed identity of a module, handed to resolvers.
#[derive(Debug, Clone, Copy)]
pub struct ModuleInfo<'a>
{
    pub name: &'a str,
    pub range: AddressRange,
    pub build_id: Option<&'a BuildId>,
    pub path: Option<&'a Path>,
}

/// One loaded code unit.
#[derive(Debug)]
pub struct Module
{
    id: ModuleId,
    name: String,
    range: AddressRange,
    build_id: Option<BuildId>,
    path: Option<PathBuf>,
    main: Outcome<MainImage>,
    debug: Outcome<DebugImage>,
}

impl Module
{
    fn new(id: ModuleId, report: ModuleReport) -> Self
    {
        let name = if report.name.is_empty() {
            synthesized_name(report.range.start)
        } else {
            report.name
        };
        Self {
            id,
            name,
            range: report.range,
            build_id: report.build_id.filter(|id| !id.is_empty()),
            path: report.path,
            main: Outcome::Pending,
            debug: Outcome::Pending,
        }
    }

    pub fn id(&self) -> ModuleId
    {
        self.id
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn range(&self) -> AddressRange
    {
        self.range
    }

    pub fn start(&self) -> Address
    {
        self.range.start
    }

    pub fn end(&self) -> Address
    {
        self.range.end
    }

    pub fn build_id(&self) -> Option<&BuildId>
    {
        self.build_id.as_ref()
    }

    /// Path recorded when the module was reported
    pub fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    pub fn info(&self) -> ModuleInfo<'_>
    {
        ModuleInfo {
            name: &self.name,
            range: self.range,
            build_id: self.build_id.as_ref(),
            path: self.path.as_deref(),
        }
    }

    pub fn main(&self) -> &Outcome<MainImage>
    {
        &self.main
    }

    pub fn debug(&self) -> &Outcome<DebugImage>
    {
        &self.debug
    }

    pub fn main_image(&self) -> Option<&MainImage>
    {
        self.main.found()
    }

    pub fn debug_image(&self) -> Option<&DebugImage>
    {
        self.debug.found()
    }

    /// The resolution failure recorded for this module, if any.
    pub fn failure(&self) -> Option<ScoutError>
    {
        let stage = if matches!(self.main, Outcome::Missing) && !matches!(self.debug, Outcome::Found(_)) {
            Stage::Main
        } else if matches!(self.debug, Outcome::Missing) {
            Stage::Debug
        } else {
            return None;
        };
        Some(ScoutError::ResolutionFailed {
            module: self.name.clone(),
            stage,
        })
    }

    pub fn state(&self) -> ResolutionState
    {
        match (&self.main, &self.debug) {
            (_, Outcome::Found(_)) => ResolutionState::DebugResolved,
            (_, Outcome::Missing) => ResolutionState::Failed,
            (Outcome::Pending, Outcome::Pending) => ResolutionState::Unresolved,
            (Outcome::Found(_), Outcome::Pending) => ResolutionState::MainResolved,
            (Outcome::Missing, Outcome::Pending) => ResolutionState::Failed,
        }
    }

    /// Record the main stage. Ignored once the stage has been decided.
    pub(crate) fn settle_main(&mut self, image: Option<MainImage>)
    {
        if self.main.is_pending() {
            self.main = Outcome::from_option(image);
        }
    }

    /// Record the debug stage. Ignored once the stage has been decided.
    pub(crate) fn settle_debug(&mut self, image: Option<DebugImage>)
    {
        if self.debug.is_pending() {
            self.debug = Outcome::from_option(image);
        }
    }

    fn is_identical(&self, report: &ModuleReport) -> bool
    {
        let name_matches = if report.name.is_empty() {
            self.name == synthesized_name(report.range.start)
        } else {
            self.name == report.name
        };
        let ours = self.build_id.as_ref().map(BuildId::as_bytes);
        let theirs = report.build_id.as_ref().map(BuildId::as_bytes).filter(|bytes| !bytes.is_empty());
        name_matches && self.range == report.range && ours == theirs
    }

    /// Whether `other` describes the same module.
    ///
    /// A shared non-empty build id decides when both sides carry one;
    /// otherwise the modules need the same name and overlapping ranges.
    fn same_module(&self, other: &Module) -> bool
    {
        match (&self.build_id, &other.build_id) {
            (Some(ours), Some(theirs)) => ours.matches(theirs),
            _ => self.name == other.name && self.range.overlaps(&other.range),
        }
    }

    /// Fold a later duplicate into this module.
    ///
    /// The merged range covers both; name and path come from the later
    /// report, the build id too when this module had none. A stage that is
    /// already decided stays as it is; pending stages take the duplicate's.
    fn absorb(&mut self, later: Module)
    {
        self.range = AddressRange {
            start: self.range.start.min(later.range.start),
            end: self.range.end.max(later.range.end),
        };
        self.name = later.name;
        self.path = later.path.or(self.path.take());
        if self.build_id.is_none() {
            self.build_id = later.build_id;
        }
        if self.main.is_pending() {
            self.main = later.main;
        }
        if self.debug.is_pending() {
            self.debug = later.debug;
        }
    }
}

#[derive(Debug)]
enum Slot
{
    Live(Module),
    /// Merged into another module during dedup
    Forwarded(ModuleId),
    /// Dropped as stale
    Vacant,
}

/// Arena of modules with round bookkeeping.
#[derive(Debug, Default)]
pub struct Registry
{
    slots: Vec<Slot>,
    /// Finalized modules in enumeration order
    finalized: Vec<ModuleId>,
    /// Modules reported in the open round, in report order
    pending: Vec<ModuleId>,
}

impl Registry
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Open a new reporting round.
    pub fn begin_round(&mut self)
    {
        self.pending.clear();
    }

    /// Add a candidate to the open round.
    pub fn report(&mut self, report: ModuleReport) -> ModuleId
    {
        let reusable = self.finalized.iter().copied().find(|id| {
            !self.pending.contains(id) && self.get(*id).is_some_and(|module| module.is_identical(&report))
        });
        if let Some(id) = reusable {
            trace!(%id, name = %report.name, "reusing module from previous round");
            self.pending.push(id);
            return id;
        }

        let id = ModuleId(self.slots.len());
        let module = Module::new(id, report);
        trace!(%id, name = %module.name, range = %module.range, "module reported");
        self.slots.push(Slot::Live(module));
        self.pending.push(id);
        id
    }

    /// Close the round: merge duplicates and drop stale modules.
    ///
    /// Returns the number of finalized modules.
    pub fn end_round(&mut self) -> usize
    {
        let pending = std::mem::take(&mut self.pending);
        let mut survivors: Vec<ModuleId> = Vec::with_capacity(pending.len());

        for id in pending {
            if self.live(id).is_none() {
                continue;
            }
            let position = survivors.len();
            survivors.push(id);
            self.fold_duplicates(&mut survivors, position);
        }

        for stale in self.finalized.iter().filter(|id| !survivors.contains(id)) {
            // Modules merged this round keep forwarding to their survivor.
            let Some(slot) = self.slots.get_mut(stale.0) else {
                continue;
            };
            if let Slot::Live(module) = slot {
                trace!(id = %stale, name = %module.name, "discarding stale module");
                *slot = Slot::Vacant;
            }
        }

        self.finalized = survivors;
        self.finalized.len()
    }

    /// Merge the survivor at `position` with every survivor it matches.
    ///
    /// The earlier of two matching survivors keeps its handle. A merged
    /// module grows and may then match others, so this repeats until no two
    /// survivors are the same module.
    fn fold_duplicates(&mut self, survivors: &mut Vec<ModuleId>, mut position: usize)
    {
        loop {
            let current = survivors[position];
            let other = survivors.iter().enumerate().position(|(index, id)| {
                index != position
                    && match (self.live(current), self.live(*id)) {
                        (Some(a), Some(b)) => a.same_module(b),
                        _ => false,
                    }
            });
            let Some(other) = other else {
                return;
            };
            let (keep, drop) = if other < position { (other, position) } else { (position, other) };
            self.merge(survivors[keep], survivors[drop]);
            survivors.remove(drop);
            position = keep;
        }
    }

    fn merge(&mut self, survivor: ModuleId, id: ModuleId)
    {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return;
        };
        let Slot::Live(duplicate) = std::mem::replace(slot, Slot::Forwarded(survivor)) else {
            return;
        };
        debug!(%id, %survivor, name = %duplicate.name, "merging duplicate module report");
        if let Some(Slot::Live(kept)) = self.slots.get_mut(survivor.0) {
            kept.absorb(duplicate);
        }
    }

    fn live(&self, id: ModuleId) -> Option<&Module>
    {
        match self.slots.get(id.0)? {
            Slot::Live(module) => Some(module),
            _ => None,
        }
    }

    /// Follow forwarding to the module a handle currently denotes.
    pub fn canonical(&self, id: ModuleId) -> Option<ModuleId>
    {
        let mut current = id;
        // Forwarded slots never become live again, so chains are acyclic
        // and no longer than the arena.
        for _ in 0..=self.slots.len() {
            match self.slots.get(current.0)? {
                Slot::Live(_) => return Some(current),
                Slot::Forwarded(next) => current = *next,
                Slot::Vacant => return None,
            }
        }
        None
    }

    pub fn get(&self, id: ModuleId) -> Option<&Module>
    {
        self.live(self.canonical(id)?)
    }

    pub fn get_mut(&mut self, id: ModuleId) -> Option<&mut Module>
    {
        let id = self.canonical(id)?;
        match self.slots.get_mut(id.0)? {
            Slot::Live(module) => Some(module),
            _ => None,
        }
    }

    /// Finalized modules in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Module>
    {
        self.finalized.iter().filter_map(|id| self.live(*id))
    }

    pub fn ids(&self) -> &[ModuleId]
    {
        &self.finalized
    }

    /// Number of finalized modules
    pub fn len(&self) -> usize
    {
        self.finalized.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.finalized.is_empty()
    }

    /// Number of candidates reported in the open round
    pub fn pending_len(&self) -> usize
    {
        self.pending.len()
    }
}
