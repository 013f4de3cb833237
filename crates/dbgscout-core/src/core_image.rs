//! # Core Images
//!
//! A [`CoreImage`] wraps an `ET_CORE` container together with its notes and an
//! index of the process memory it captured (`PT_LOAD` segments).
//!
//! It does two jobs:
//!
//! - **Discovery**: synthesize one module candidate per mapped object from
//!   the `NT_FILE` table (plus the vDSO named by the auxiliary vector), reading
//!   build ids straight out of dumped memory when the pages are present.
//! - **Memory reads**: once a session is attached, serve process memory from
//!   the dumped segments so modules whose files are missing can still be
//!   inspected.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::container::{elf, Container, Segment};
use crate::error::{Result, ScoutError};
use crate::notes::{self, extract_notes, NoteSet};
use crate::registry::ModuleReport;
use crate::types::{Address, AddressRange, BuildId};

/// Name given to the kernel-provided vDSO module.
pub const VDSO_NAME: &str = "[vdso]";

/// One dumped memory segment of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySegment
{
    /// Process addresses covered (`p_vaddr .. p_vaddr + p_memsz`)
    pub range: AddressRange,
    pub file_offset: u64,
    /// Bytes actually present in the core, counted from `range.start`
    pub file_size: u64,
}

impl MemorySegment
{
    fn from_segment(segment: &Segment) -> Option<Self>
    {
        let end = segment.vaddr.checked_add(segment.mem_size)?;
        Some(Self {
            range: AddressRange::new(Address::new(segment.vaddr), Address::new(end))?,
            file_offset: segment.offset,
            file_size: segment.file_size.min(segment.mem_size),
        })
    }

    fn dumped_contains(&self, address: Address) -> bool
    {
        address
            .offset_from(self.range.start)
            .is_some_and(|delta| delta < self.file_size)
    }
}

/// A core dump opened for module discovery.
#[derive(Debug)]
pub struct CoreImage
{
    container: Container,
    notes: NoteSet,
    memory: Vec<MemorySegment>,
}

impl CoreImage
{
    /// Index a core container.
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` if the container is not an `ET_CORE` image. An
    /// unreadable program header table is not an error: the core simply has
    /// no notes and no memory.
    pub fn new(container: Container) -> Result<Self>
    {
        if !container.is_core() {
            return Err(ScoutError::InvalidFormat(format!(
                "expected a core image, found {:?}",
                container.kind()
            )));
        }
        let notes = extract_notes(&container);
        let memory = container
            .segments()
            .map(|segments| {
                segments
                    .iter()
                    .filter(|segment| segment.is_load())
                    .filter_map(MemorySegment::from_segment)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            container,
            notes,
            memory,
        })
    }

    pub fn container(&self) -> &Container
    {
        &self.container
    }

    pub fn notes(&self) -> &NoteSet
    {
        &self.notes
    }

    pub fn memory_segments(&self) -> &[MemorySegment]
    {
        &self.memory
    }

    fn segment_for(&self, address: Address) -> Option<&MemorySegment>
    {
        self.memory.iter().find(|segment| segment.dumped_contains(address))
    }

    /// Dumped bytes from `address` to the end of its segment.
    ///
    /// `None` when the page was not captured or the core file is cut short
    /// before it.
    pub fn tail(&self, address: Address) -> Option<&[u8]>
    {
        let segment = self.segment_for(address)?;
        let delta = address.offset_from(segment.range.start)?;
        let offset = segment.file_offset.checked_add(delta)?;
        let (bytes, _) = self
            .container
            .bytes_truncated(offset, segment.file_size - delta)
            .ok()?;
        (!bytes.is_empty()).then_some(bytes)
    }

    /// Exactly `len` bytes of process memory at `address`.
    ///
    /// The range must lie within one dumped segment.
    pub fn read(&self, address: Address, len: u64) -> Result<&[u8]>
    {
        let out_of_bounds = || ScoutError::OutOfBounds {
            offset: address.value(),
            len,
            size: 0,
        };
        let segment = self.segment_for(address).ok_or_else(out_of_bounds)?;
        let delta = address.offset_from(segment.range.start).ok_or_else(out_of_bounds)?;
        if len > segment.file_size - delta {
            return Err(out_of_bounds());
        }
        let offset = segment.file_offset.checked_add(delta).ok_or_else(out_of_bounds)?;
        self.container.bytes(offset, len)
    }

    /// Whether dumped memory at `address` starts with an ELF header.
    ///
    /// `None` when the page is not in the core at all.
    pub fn has_elf_header_at(&self, address: Address) -> Option<bool>
    {
        let bytes = self.tail(address)?;
        Some(bytes.starts_with(&object::elf::ELFMAG))
    }

    /// Look for an in-memory ELF image at `start` and return its loaded
    /// range and build id.
    fn memory_image(&self, start: Address) -> Option<(Option<AddressRange>, Option<BuildId>)>
    {
        let header = self.tail(start)?;
        let ident = elf::read_ident(header).ok()?;
        let segments = elf::read_segments(header, &ident).ok()?;
        let first_load = segments.iter().find(|segment| segment.is_load())?;
        let bias = start
            .value()
            .wrapping_sub(Address::new(first_load.vaddr).align_down(first_load.align).value());

        let range = elf::load_bounds(&segments, bias);
        let build_id = segments.iter().filter(|segment| segment.is_note()).find_map(|segment| {
            let address = Address::new(segment.vaddr.wrapping_add(bias));
            let bytes = self.read(address, segment.file_size).ok()?;
            notes::build_id_in(bytes, ident.class, ident.endian, segment.align)
                .map(|id| id.with_note_address(address))
        });
        Some((range, build_id))
    }

    /// Build id of the ELF image loaded at `start`, read from core memory.
    pub fn build_id_at(&self, start: Address) -> Option<BuildId>
    {
        self.memory_image(start).and_then(|(_, build_id)| build_id)
    }

    /// Copy the dumped bytes of `range` starting at its first address, as far
    /// as they are contiguous in the core.
    pub fn image_bytes(&self, range: AddressRange) -> Option<Vec<u8>>
    {
        let tail = self.tail(range.start)?;
        let len = usize::try_from(range.len()).unwrap_or(usize::MAX).min(tail.len());
        Some(tail[..len].to_vec())
    }

    /// Module candidates described by this core, in report order.
    ///
    /// The vDSO comes first, then one candidate per run of consecutive
    /// `NT_FILE` entries sharing a path. A run is skipped when it does not map
    /// the start of its file or when its first page was dumped and is not an
    /// ELF header. A cut `NT_FILE` table therefore yields a prefix of what
    /// the intact table would.
    pub fn discover(&self) -> Vec<ModuleReport>
    {
        let mut reports = Vec::new();

        if let Some(vdso) = self.vdso() {
            reports.push(vdso);
        }

        let Some(table) = self.notes.file_mappings.as_ref() else {
            debug!("core has no NT_FILE note");
            return reports;
        };

        let mut entries = table.iter().peekable();
        while let Some(first) = entries.next() {
            let mut end = first.range.end;
            while let Some(next) = entries.next_if(|next| next.path == first.path) {
                end = end.max(next.range.end);
            }

            if first.file_offset != 0 {
                trace!(path = %first.path, "mapping does not start at file offset 0");
                continue;
            }
            let start = first.range.start;
            if self.has_elf_header_at(start) == Some(false) {
                trace!(path = %first.path, %start, "mapped file is not an ELF image");
                continue;
            }

            let Some(range) = AddressRange::new(start, end) else {
                continue;
            };
            reports.push(ModuleReport {
                name: first.path.clone(),
                range,
                build_id: self.build_id_at(start),
                path: Some(PathBuf::from(&first.path)),
            });
        }

        reports
    }

    fn vdso(&self) -> Option<ModuleReport>
    {
        let address = self.notes.auxv.as_ref()?.sysinfo_ehdr()?;
        let (range, build_id) = self.memory_image(address)?;
        let range = range
            .filter(|range| range.contains(address))
            .unwrap_or_else(|| AddressRange::placeholder(address));
        Some(ModuleReport {
            name: VDSO_NAME.to_string(),
            range,
            build_id,
            path: None,
        })
    }
}
