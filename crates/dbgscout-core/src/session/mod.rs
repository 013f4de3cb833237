//! # Session State Machine
//!
//! A [`Session`] owns the modules of one inspected image and drives them
//! through reporting, finalization and resolution.
//!
//! ## Lifecycle
//!
//! 1. Create a session: `Session::new(config)`
//! 2. Report modules: `report_offline`, `report_core` or `report_module`
//!    (the first report opens a round implicitly, `begin` opens one explicitly)
//! 3. Finalize: `end` merges duplicate reports and drops stale modules
//! 4. Optionally `attach_core` to serve memory reads from the reported core
//! 5. Query: `modules`, `resolve_main`, `resolve_debug`, `summaries`
//!
//! Every operation is checked against [`Phase::apply`]; calling one out of
//! order fails with [`ScoutError::SessionState`] and leaves the session as it
//! was.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dbgscout_core::resolver::SearchConfig;
//! use dbgscout_core::session::Session;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let mut session = Session::new(Arc::new(SearchConfig::from_env()));
//!     session.report_offline("/usr/bin/true")?;
//!     session.end()?;
//!     session.resolve_all()?;
//!     for summary in session.summaries()? {
//!         print!("{summary}");
//!     }
//!     Ok(())
//! }
//! ```

mod phase;
mod summary;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

pub use self::phase::{Operation, Phase};
pub use self::summary::ModuleSummary;
use crate::container::Container;
use crate::core_image::CoreImage;
use crate::dwarf;
use crate::error::{Result, ScoutError, Stage};
use crate::notes::extract_build_id;
use crate::registry::{Module, ModuleId, ModuleReport, Registry};
use crate::resolver::{self, DebugImage, MainImage, Resolved, Resolver, SearchConfig};
use crate::types::{Address, AddressRange};

/// One debug-module resolution session.
pub struct Session
{
    phase: Phase,
    config: Arc<SearchConfig>,
    resolver: Box<dyn Resolver>,
    registry: Registry,
    /// Core reported in the current round
    core: Option<CoreImage>,
}

impl Session
{
    /// Session using the resolver named by `config.strategy`.
    pub fn new(config: Arc<SearchConfig>) -> Self
    {
        let resolver = resolver::for_config(Arc::clone(&config));
        Self::with_resolver(resolver, config)
    }

    /// Session with a caller-supplied resolver.
    pub fn with_resolver(resolver: Box<dyn Resolver>, config: Arc<SearchConfig>) -> Self
    {
        Self {
            phase: Phase::Created,
            config,
            resolver,
            registry: Registry::new(),
            core: None,
        }
    }

    pub fn phase(&self) -> Phase
    {
        self.phase
    }

    pub fn config(&self) -> &SearchConfig
    {
        &self.config
    }

    /// The core reported in the current round
    pub fn core(&self) -> Option<&CoreImage>
    {
        self.core.as_ref()
    }

    fn check(&self, operation: Operation) -> Result<Phase>
    {
        self.phase.apply(operation)
    }

    fn enter(&mut self, next: Phase)
    {
        if next != self.phase {
            trace!(from = %self.phase, to = %next, "session phase change");
            self.phase = next;
        }
    }

    /// Open a new reporting round.
    ///
    /// Modules of the previous round stay valid until `end`; those not
    /// reported again are then discarded. Any attached core is detached.
    pub fn begin(&mut self) -> Result<()>
    {
        let next = self.check(Operation::Begin)?;
        self.open_round();
        self.enter(next);
        Ok(())
    }

    fn open_round(&mut self)
    {
        self.registry.begin_round();
        if self.core.take().is_some() {
            debug!("core detached for new round");
        }
    }

    /// Check that a report is allowed, opening a round if none is open.
    fn prepare_report(&mut self) -> Result<()>
    {
        let next = self.check(Operation::Report)?;
        if self.phase == Phase::Created {
            self.open_round();
        }
        self.enter(next);
        Ok(())
    }

    /// Finalize the module set.
    pub fn end(&mut self) -> Result<usize>
    {
        let next = self.check(Operation::End)?;
        if self.phase == Phase::Created {
            self.open_round();
        }
        let count = self.registry.end_round();
        debug!(modules = count, "reporting round ended");
        self.enter(next);
        Ok(count)
    }

    /// Report one module explicitly.
    pub fn report_module(&mut self, report: ModuleReport) -> Result<ModuleId>
    {
        self.prepare_report()?;
        Ok(self.registry.report(report))
    }

    /// Report a standalone image file as exactly one module.
    ///
    /// The module is named after `path`, spans the image's loadable
    /// segments (a placeholder at address 0 when it has none) and has its
    /// main image attached right away.
    ///
    /// ## Errors
    ///
    /// Whatever opening the container fails with; nothing is reported then.
    pub fn report_offline(&mut self, path: impl AsRef<Path>) -> Result<ModuleId>
    {
        self.check(Operation::Report)?;
        let path = path.as_ref();
        let container = Container::open(path)?;
        self.report_offline_container(container, path.to_path_buf())
    }

    /// Report an already opened standalone image, recorded under `path`.
    pub fn report_offline_container(&mut self, container: Container, path: PathBuf) -> Result<ModuleId>
    {
        self.prepare_report()?;

        let range = container
            .load_range()
            .unwrap_or_else(|| AddressRange::placeholder(Address::ZERO));
        let mut report = ModuleReport::new(path.to_string_lossy(), range).with_path(&path);
        if let Some(build_id) = extract_build_id(&container) {
            report = report.with_build_id(build_id);
        }

        let id = self.registry.report(report);
        if let Some(module) = self.registry.get_mut(id) {
            module.settle_main(Some(MainImage::from_file(Resolved { path, container })));
        }
        Ok(id)
    }

    /// Report every module a core image describes.
    ///
    /// Returns how many candidates were reported. The core is kept for
    /// [`Session::attach_core`].
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` if `container` is not a core image; nothing is
    /// reported then.
    pub fn report_core(&mut self, container: Container) -> Result<usize>
    {
        self.check(Operation::Report)?;
        let core = CoreImage::new(container)?;
        self.prepare_report()?;

        let reports = core.discover();
        let count = reports.len();
        for report in reports {
            self.registry.report(report);
        }
        debug!(modules = count, "core modules reported");
        self.core = Some(core);
        Ok(count)
    }

    /// Attach the reported core's memory to the finalized module set.
    ///
    /// ## Errors
    ///
    /// `SessionState` unless the session is `Ended`; `InvalidFormat` when no
    /// core was reported in this round.
    pub fn attach_core(&mut self) -> Result<()>
    {
        let next = self.check(Operation::Attach)?;
        if self.core.is_none() {
            return Err(ScoutError::InvalidFormat("no core image was reported in this round".into()));
        }
        self.enter(next);
        Ok(())
    }

    /// Exactly `len` bytes of process memory from the attached core.
    pub fn read_memory(&self, address: Address, len: u64) -> Result<&[u8]>
    {
        self.check(Operation::ReadMemory)?;
        match &self.core {
            Some(core) => core.read(address, len),
            None => Err(ScoutError::out_of_bounds(address.value(), len, 0)),
        }
    }

    /// Finalized modules in report order.
    pub fn modules(&self) -> Result<impl Iterator<Item = &Module>>
    {
        self.check(Operation::Query)?;
        Ok(self.registry.iter())
    }

    /// Number of finalized modules.
    pub fn module_count(&self) -> Result<usize>
    {
        self.check(Operation::Query)?;
        Ok(self.registry.len())
    }

    pub fn module(&self, id: ModuleId) -> Result<&Module>
    {
        self.check(Operation::Query)?;
        self.registry.get(id).ok_or(ScoutError::UnknownModule(id))
    }

    fn canonical(&self, id: ModuleId) -> Result<ModuleId>
    {
        self.registry.canonical(id).ok_or(ScoutError::UnknownModule(id))
    }

    /// Locate the main image of a module. The outcome is cached.
    pub fn resolve_main(&mut self, id: ModuleId) -> Result<Option<&MainImage>>
    {
        self.check(Operation::Query)?;
        let id = self.canonical(id)?;
        let module = self.registry.get(id).ok_or(ScoutError::UnknownModule(id))?;

        if module.main().is_pending() {
            let mut found = self.resolver.find_main(&module.info()).map(MainImage::from_file);
            if found.is_none() && self.phase == Phase::Attached {
                found = image_from_core(self.core.as_ref(), module.range());
                if found.is_some() {
                    debug!(module = module.name(), "main image rebuilt from core memory");
                }
            }
            if found.is_none() {
                let error = ScoutError::ResolutionFailed {
                    module: module.name().to_string(),
                    stage: Stage::Main,
                };
                debug!(%error);
            }
            if let Some(module) = self.registry.get_mut(id) {
                module.settle_main(found);
            }
        }

        Ok(self.registry.get(id).and_then(Module::main_image))
    }

    /// Locate the debug information of a module. The outcome is cached.
    ///
    /// The main image is resolved first; when it carries DWARF itself the
    /// resolver is not asked for a separate file.
    pub fn resolve_debug(&mut self, id: ModuleId) -> Result<Option<&DebugImage>>
    {
        self.check(Operation::Query)?;
        let id = self.canonical(id)?;
        self.resolve_main(id)?;
        let module = self.registry.get(id).ok_or(ScoutError::UnknownModule(id))?;

        if module.debug().is_pending() {
            let main = module.main_image();
            let found = match main {
                Some(image) if dwarf::has_dwarf(image.container()) => {
                    Some(DebugImage::in_main(image.path().map(Path::to_path_buf)))
                }
                _ => self
                    .resolver
                    .find_debug(&module.info(), main)
                    .map(DebugImage::separate),
            };
            if found.is_none() {
                let error = ScoutError::ResolutionFailed {
                    module: module.name().to_string(),
                    stage: Stage::Debug,
                };
                debug!(%error);
            }
            if let Some(module) = self.registry.get_mut(id) {
                module.settle_debug(found);
            }
        }

        Ok(self.registry.get(id).and_then(Module::debug_image))
    }

    /// Resolve both stages of every module.
    ///
    /// Returns how many modules ended up with debug information.
    pub fn resolve_all(&mut self) -> Result<usize>
    {
        self.check(Operation::Query)?;
        let ids = self.registry.ids().to_vec();
        let mut resolved = 0;
        for id in ids {
            if self.resolve_debug(id)?.is_some() {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Printable description of every finalized module.
    pub fn summaries(&self) -> Result<Vec<ModuleSummary>>
    {
        Ok(self.modules()?.map(ModuleSummary::from_module).collect())
    }
}

impl std::fmt::Debug for Session
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("core", &self.core.as_ref().map(CoreImage::container))
            .finish_non_exhaustive()
    }
}

/// Rebuild a module's main image from dumped core memory.
fn image_from_core(core: Option<&CoreImage>, range: AddressRange) -> Option<MainImage>
{
    let bytes = core?.image_bytes(range)?;
    let container = Container::from_bytes(bytes).ok()?;
    Some(MainImage::detached(container))
}
