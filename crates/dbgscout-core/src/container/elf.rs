//! ELF structure decoding on top of `object`.
//!
//! Everything here works on a plain byte slice so the same code can parse a
//! file on disk and an ELF header recovered from core memory. Tables are
//! copied into owned [`Segment`]/[`Section`] values; nothing borrows from the
//! source after a call returns.

use object::elf;
use object::read::elf::{FileHeader, ProgramHeader, SectionHeader};
use object::{Endian, Endianness};

use crate::error::{Result, ScoutError};
use crate::types::{Address, AddressRange};

/// Size of `e_ident`.
pub const EI_NIDENT: usize = 16;
/// Offsets into `e_ident`.
pub const EI_CLASS: usize = 4;
pub const EI_DATA: usize = 5;
pub const EI_VERSION: usize = 6;

/// ELF file class (word size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElfClass
{
    Elf32,
    Elf64,
}

impl ElfClass
{
    /// Size in bytes of an address/offset word for this class
    pub fn word_size(self) -> usize
    {
        match self {
            ElfClass::Elf32 => 4,
            ElfClass::Elf64 => 8,
        }
    }

    fn header_size(self) -> usize
    {
        match self {
            ElfClass::Elf32 => std::mem::size_of::<elf::FileHeader32<Endianness>>(),
            ElfClass::Elf64 => std::mem::size_of::<elf::FileHeader64<Endianness>>(),
        }
    }
}

/// Object file type from `e_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind
{
    Relocatable,
    Executable,
    SharedObject,
    Core,
    Other(u16),
}

impl From<u16> for ImageKind
{
    fn from(e_type: u16) -> Self
    {
        match e_type {
            elf::ET_REL => ImageKind::Relocatable,
            elf::ET_EXEC => ImageKind::Executable,
            elf::ET_DYN => ImageKind::SharedObject,
            elf::ET_CORE => ImageKind::Core,
            other => ImageKind::Other(other),
        }
    }
}

/// The eagerly validated part of an ELF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident
{
    pub class: ElfClass,
    pub endian: Endianness,
    pub kind: ImageKind,
}

/// One program header, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment
{
    pub kind: u32,
    pub offset: u64,
    pub file_size: u64,
    pub vaddr: u64,
    pub mem_size: u64,
    pub align: u64,
}

impl Segment
{
    pub fn is_load(&self) -> bool
    {
        self.kind == elf::PT_LOAD
    }

    pub fn is_note(&self) -> bool
    {
        self.kind == elf::PT_NOTE
    }
}

/// One section header, decoded, with its name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section
{
    pub name: String,
    pub kind: u32,
    pub offset: u64,
    pub size: u64,
    pub address: u64,
    pub align: u64,
}

impl Section
{
    /// Whether the section occupies bytes in the file
    pub fn has_file_data(&self) -> bool
    {
        self.kind != elf::SHT_NOBITS && self.kind != elf::SHT_NULL
    }
}

/// Validate magic, class and byte order, then read `e_type`.
pub fn read_ident(data: &[u8]) -> Result<Ident>
{
    if data.is_empty() {
        return Err(ScoutError::InvalidFormat("empty input".into()));
    }
    let ident = data
        .get(..EI_NIDENT)
        .ok_or_else(|| ScoutError::InvalidFormat(format!("{} bytes is too short for an ELF header", data.len())))?;
    if ident[..4] != elf::ELFMAG {
        return Err(ScoutError::InvalidFormat("bad ELF magic".into()));
    }
    let class = match ident[EI_CLASS] {
        elf::ELFCLASS32 => ElfClass::Elf32,
        elf::ELFCLASS64 => ElfClass::Elf64,
        other => return Err(ScoutError::InvalidFormat(format!("unknown ELF class {other}"))),
    };
    let endian = match ident[EI_DATA] {
        elf::ELFDATA2LSB => Endianness::Little,
        elf::ELFDATA2MSB => Endianness::Big,
        other => return Err(ScoutError::InvalidFormat(format!("unknown ELF byte order {other}"))),
    };
    if data.len() < class.header_size() {
        return Err(ScoutError::Truncated {
            what: "ELF header",
            needed: class.header_size() as u64,
            available: data.len() as u64,
        });
    }
    let reader = ByteReader::new(data, class, endian);
    let e_type = reader.u16_at(EI_NIDENT as u64).unwrap_or(elf::ET_NONE);
    Ok(Ident {
        class,
        endian,
        kind: ImageKind::from(e_type),
    })
}

/// Decode the program header table.
pub fn read_segments(data: &[u8], ident: &Ident) -> Result<Vec<Segment>>
{
    match ident.class {
        ElfClass::Elf32 => segments_for::<elf::FileHeader32<Endianness>>(data),
        ElfClass::Elf64 => segments_for::<elf::FileHeader64<Endianness>>(data),
    }
}

/// Decode the section header table and resolve section names.
///
/// A broken section name string table does not fail the table; the affected
/// sections get an empty name.
pub fn read_sections(data: &[u8], ident: &Ident) -> Result<Vec<Section>>
{
    match ident.class {
        ElfClass::Elf32 => sections_for::<elf::FileHeader32<Endianness>>(data),
        ElfClass::Elf64 => sections_for::<elf::FileHeader64<Endianness>>(data),
    }
}

fn parse_header<Elf: FileHeader<Endian = Endianness>>(data: &[u8]) -> Result<(&Elf, Endianness)>
{
    let header = Elf::parse(data).map_err(|err| ScoutError::InvalidFormat(err.to_string()))?;
    let endian = header
        .endian()
        .map_err(|err| ScoutError::InvalidFormat(err.to_string()))?;
    Ok((header, endian))
}

fn segments_for<Elf: FileHeader<Endian = Endianness>>(data: &[u8]) -> Result<Vec<Segment>>
{
    let (header, endian) = parse_header::<Elf>(data)?;
    let phdrs = header.program_headers(endian, data).map_err(|_| {
        let count = u64::from(header.e_phnum(endian));
        let entry = u64::from(header.e_phentsize(endian));
        ScoutError::out_of_bounds(header.e_phoff(endian).into(), count.saturating_mul(entry), data.len())
    })?;
    Ok(phdrs
        .iter()
        .map(|phdr| Segment {
            kind: phdr.p_type(endian),
            offset: phdr.p_offset(endian).into(),
            file_size: phdr.p_filesz(endian).into(),
            vaddr: phdr.p_vaddr(endian).into(),
            mem_size: phdr.p_memsz(endian).into(),
            align: phdr.p_align(endian).into(),
        })
        .collect())
}

fn sections_for<Elf: FileHeader<Endian = Endianness>>(data: &[u8]) -> Result<Vec<Section>>
{
    let (header, endian) = parse_header::<Elf>(data)?;
    let table = header.sections(endian, data).map_err(|_| {
        let count = u64::from(header.e_shnum(endian));
        let entry = u64::from(header.e_shentsize(endian));
        ScoutError::out_of_bounds(header.e_shoff(endian).into(), count.saturating_mul(entry), data.len())
    })?;
    Ok(table
        .iter()
        .map(|shdr| Section {
            name: table
                .section_name(endian, shdr)
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .unwrap_or_default(),
            kind: shdr.sh_type(endian),
            offset: shdr.sh_offset(endian).into(),
            size: shdr.sh_size(endian).into(),
            address: shdr.sh_addr(endian).into(),
            align: shdr.sh_addralign(endian).into(),
        })
        .collect())
}

/// Union of the `PT_LOAD` segments, shifted by `bias`, each start aligned
/// down to its segment alignment.
///
/// Segments whose end would overflow are ignored.
pub fn load_bounds(segments: &[Segment], bias: u64) -> Option<AddressRange>
{
    let mut bounds: Option<(Address, Address)> = None;
    for segment in segments.iter().filter(|segment| segment.is_load()) {
        let Some(end) = segment
            .vaddr
            .checked_add(segment.mem_size)
            .and_then(|end| end.checked_add(bias))
        else {
            continue;
        };
        let Some(start) = segment.vaddr.checked_add(bias) else {
            continue;
        };
        let start = Address::new(start).align_down(segment.align);
        let end = Address::new(end);
        bounds = Some(match bounds {
            Some((low, high)) => (low.min(start), high.max(end)),
            None => (start, end),
        });
    }
    let (start, end) = bounds?;
    AddressRange::new(start, end)
}

/// Bounds-checked scalar reads in a container's byte order and class.
#[derive(Clone, Copy)]
pub struct ByteReader<'data>
{
    data: &'data [u8],
    class: ElfClass,
    endian: Endianness,
}

impl<'data> ByteReader<'data>
{
    pub fn new(data: &'data [u8], class: ElfClass, endian: Endianness) -> Self
    {
        Self { data, class, endian }
    }

    pub fn len(&self) -> usize
    {
        self.data.len()
    }

    pub fn class(&self) -> ElfClass
    {
        self.class
    }

    pub fn endian(&self) -> Endianness
    {
        self.endian
    }

    /// `len` bytes at `offset`, or `None` if any of them is missing.
    pub fn bytes_at(&self, offset: u64, len: u64) -> Option<&'data [u8]>
    {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        self.data.get(start..end)
    }

    fn array_at<const N: usize>(&self, offset: u64) -> Option<[u8; N]>
    {
        self.bytes_at(offset, N as u64)?.try_into().ok()
    }

    pub fn u16_at(&self, offset: u64) -> Option<u16>
    {
        self.array_at(offset).map(|bytes| self.endian.read_u16_bytes(bytes))
    }

    pub fn u32_at(&self, offset: u64) -> Option<u32>
    {
        self.array_at(offset).map(|bytes| self.endian.read_u32_bytes(bytes))
    }

    pub fn u64_at(&self, offset: u64) -> Option<u64>
    {
        self.array_at(offset).map(|bytes| self.endian.read_u64_bytes(bytes))
    }

    /// An address-sized word (4 or 8 bytes depending on the class).
    pub fn word_at(&self, offset: u64) -> Option<u64>
    {
        match self.class {
            ElfClass::Elf32 => self.u32_at(offset).map(u64::from),
            ElfClass::Elf64 => self.u64_at(offset),
        }
    }
}
