//! # Binary Container Reader
//!
//! A [`Container`] is a parsed view over one ELF byte source: a read-only
//! memory map of a file, or an owned buffer.
//!
//! Only the identification bytes (magic, class, byte order) are checked when a
//! container is opened. Program and section header tables are decoded on first
//! use and cached, so a file whose section table is garbage can still yield
//! the notes in front of it. Every accessor bound-checks against the size of
//! the source and reports [`ScoutError::OutOfBounds`] instead of reading past
//! it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dbgscout_core::container::Container;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let container = Container::open("/usr/bin/true")?;
//!     println!("{:?} with {} segments", container.kind(), container.segments()?.len());
//!     Ok(())
//! }
//! ```

pub mod elf;

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use object::Endianness;
use once_cell::sync::OnceCell;

pub use self::elf::{ByteReader, ElfClass, Ident, ImageKind, Section, Segment};
use crate::error::{Result, ScoutError};
use crate::types::AddressRange;

enum Source
{
    Mapped(Mmap),
    Owned(Box<[u8]>),
}

impl Source
{
    fn as_slice(&self) -> &[u8]
    {
        match self {
            Source::Mapped(map) => &map[..],
            Source::Owned(bytes) => &bytes[..],
        }
    }
}

/// Parsed view of one ELF image.
pub struct Container
{
    source: Source,
    path: Option<PathBuf>,
    ident: Ident,
    segments: OnceCell<Vec<Segment>>,
    sections: OnceCell<Vec<Section>>,
}

impl Container
{
    /// Open and map the file at `path`.
    ///
    /// ## Errors
    ///
    /// - `Io` if the file cannot be opened or mapped
    /// - `InvalidFormat` for empty or non-ELF files
    /// - `Truncated` if the fixed ELF header is cut short
    pub fn open(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_file(file, path)
    }

    /// Map an already opened file. The descriptor is closed once the map
    /// exists; the mapping itself lives as long as the container.
    pub fn from_file(file: File, path: impl Into<PathBuf>) -> Result<Self>
    {
        let path = path.into();
        if file.metadata()?.len() == 0 {
            return Err(ScoutError::InvalidFormat(format!("{} is empty", path.display())));
        }
        // SAFETY: the map is read-only and private to this container. A file
        // truncated underneath us can still fault, which is the usual caveat
        // for file-backed maps.
        let map = unsafe { Mmap::map(&file)? };
        drop(file);
        Self::with_source(Source::Mapped(map), Some(path))
    }

    /// Wrap an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self>
    {
        Self::with_source(Source::Owned(bytes.into().into_boxed_slice()), None)
    }

    /// Wrap an in-memory buffer that stands for the file at `path`.
    pub fn from_bytes_with_path(bytes: impl Into<Vec<u8>>, path: impl Into<PathBuf>) -> Result<Self>
    {
        Self::with_source(Source::Owned(bytes.into().into_boxed_slice()), Some(path.into()))
    }

    fn with_source(source: Source, path: Option<PathBuf>) -> Result<Self>
    {
        let ident = elf::read_ident(source.as_slice())?;
        Ok(Self {
            source,
            path,
            ident,
            segments: OnceCell::new(),
            sections: OnceCell::new(),
        })
    }

    pub fn data(&self) -> &[u8]
    {
        self.source.as_slice()
    }

    pub fn len(&self) -> usize
    {
        self.data().len()
    }

    /// Never true: empty inputs are rejected when the container is opened.
    pub fn is_empty(&self) -> bool
    {
        self.data().is_empty()
    }

    pub fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    pub fn ident(&self) -> &Ident
    {
        &self.ident
    }

    pub fn kind(&self) -> ImageKind
    {
        self.ident.kind
    }

    pub fn class(&self) -> ElfClass
    {
        self.ident.class
    }

    pub fn endian(&self) -> Endianness
    {
        self.ident.endian
    }

    pub fn is_core(&self) -> bool
    {
        self.ident.kind == ImageKind::Core
    }

    /// Whether the bytes come from a memory-mapped file
    pub fn is_mapped(&self) -> bool
    {
        matches!(self.source, Source::Mapped(_))
    }

    pub fn reader(&self) -> ByteReader<'_>
    {
        ByteReader::new(self.data(), self.ident.class, self.ident.endian)
    }

    /// Exactly `len` bytes at `offset`.
    pub fn bytes(&self, offset: u64, len: u64) -> Result<&[u8]>
    {
        self.reader()
            .bytes_at(offset, len)
            .ok_or_else(|| ScoutError::out_of_bounds(offset, len, self.len()))
    }

    /// Up to `len` bytes at `offset`, cut at the end of the source.
    ///
    /// Returns the available bytes and whether they fall short of `len`.
    /// Fails only when `offset` itself is past the end.
    pub fn bytes_truncated(&self, offset: u64, len: u64) -> Result<(&[u8], bool)>
    {
        let data = self.data();
        let start = usize::try_from(offset)
            .ok()
            .filter(|start| *start <= data.len())
            .ok_or_else(|| ScoutError::out_of_bounds(offset, len, data.len()))?;
        let available = (data.len() - start) as u64;
        let take = len.min(available);
        // take <= available <= usize::MAX
        let end = start + take as usize;
        Ok((&data[start..end], take < len))
    }

    /// Program headers, decoded on first call.
    pub fn segments(&self) -> Result<&[Segment]>
    {
        self.segments
            .get_or_try_init(|| elf::read_segments(self.data(), &self.ident))
            .map(Vec::as_slice)
    }

    /// Section headers, decoded on first call.
    pub fn sections(&self) -> Result<&[Section]>
    {
        self.sections
            .get_or_try_init(|| elf::read_sections(self.data(), &self.ident))
            .map(Vec::as_slice)
    }

    pub fn section_by_name(&self, name: &str) -> Option<&Section>
    {
        self.sections().ok()?.iter().find(|section| section.name == name)
    }

    /// File bytes of a section; `NOBITS` sections have none.
    pub fn section_data(&self, section: &Section) -> Result<&[u8]>
    {
        if !section.has_file_data() {
            return Ok(&[]);
        }
        self.bytes(section.offset, section.size)
    }

    /// Union of all `PT_LOAD` segments, starts aligned down.
    ///
    /// Segments whose end would overflow are ignored. Returns `None` when
    /// there is nothing loadable or the segment table is unreadable.
    pub fn load_range(&self) -> Option<AddressRange>
    {
        elf::load_bounds(self.segments().ok()?, 0)
    }

    /// Whether a non-empty `.debug_info` section is present in the file.
    pub fn has_debug_info_section(&self) -> bool
    {
        self.section_by_name(".debug_info")
            .is_some_and(|section| section.has_file_data() && section.size > 0)
    }

    /// File name recorded in `.gnu_debuglink`, if any.
    pub fn debuglink(&self) -> Option<String>
    {
        let section = self.section_by_name(".gnu_debuglink")?;
        let data = self.section_data(section).ok()?;
        let name = data.split(|byte| *byte == 0).next()?;
        if name.is_empty() {
            return None;
        }
        std::str::from_utf8(name).ok().map(str::to_owned)
    }
}

impl fmt::Debug for Container
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("ident", &self.ident)
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish_non_exhaustive()
    }
}
