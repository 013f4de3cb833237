//! ELF fixture builder shared by the integration tests.
//!
//! Produces little-endian ELF64 images: executables and shared objects with a
//! self-mapping `PT_LOAD`, a `PT_NOTE` and optional sections, and core files
//! with `CORE` notes and dumped memory segments.

#![allow(dead_code)]

use std::path::Path;

use dbgscout_core::container::elf as ident;
use object::elf;

pub const PAGE: u64 = 0x1000;
const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const SHDR_SIZE: usize = 64;

struct Load
{
    vaddr: u64,
    data: Vec<u8>,
    mem_size: u64,
}

struct SectionSpec
{
    name: String,
    kind: u32,
    data: Vec<u8>,
}

/// Incremental ELF64 image builder.
pub struct ElfBuilder
{
    e_type: u16,
    /// `PT_LOAD` mapping the whole file at this address
    self_load: Option<(u64, u64)>,
    loads: Vec<Load>,
    notes: Vec<u8>,
    sections: Vec<SectionSpec>,
}

fn align_to(value: usize, align: usize) -> usize
{
    (value + align - 1) & !(align - 1)
}

impl ElfBuilder
{
    pub fn new(e_type: u16) -> Self
    {
        Self {
            e_type,
            self_load: None,
            loads: Vec::new(),
            notes: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn shared() -> Self
    {
        Self::new(elf::ET_DYN)
    }

    pub fn exec() -> Self
    {
        Self::new(elf::ET_EXEC)
    }

    pub fn core() -> Self
    {
        Self::new(elf::ET_CORE)
    }

    /// Map the whole file at `vaddr`, spanning at least `mem_size` bytes.
    pub fn load_self(mut self, vaddr: u64, mem_size: u64) -> Self
    {
        self.self_load = Some((vaddr, mem_size));
        self
    }

    /// A `PT_LOAD` whose file bytes are `data`.
    pub fn load(mut self, vaddr: u64, data: Vec<u8>, mem_size: u64) -> Self
    {
        self.loads.push(Load { vaddr, data, mem_size });
        self
    }

    /// Append a raw note entry to the `PT_NOTE` segment.
    pub fn note(mut self, owner: &[u8], kind: u32, desc: &[u8]) -> Self
    {
        self.notes.extend(note(owner, kind, desc));
        self
    }

    pub fn build_id(self, id: &[u8]) -> Self
    {
        self.note(elf::ELF_NOTE_GNU, elf::NT_GNU_BUILD_ID, id)
    }

    pub fn section(mut self, name: &str, kind: u32, data: Vec<u8>) -> Self
    {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            kind,
            data,
        });
        self
    }

    /// `.gnu_debuglink` naming `file` (CRC left zero).
    pub fn debuglink(self, file: &str) -> Self
    {
        let mut data = file.as_bytes().to_vec();
        data.push(0);
        data.resize(align_to(data.len(), 4) + 4, 0);
        self.section(".gnu_debuglink", elf::SHT_PROGBITS, data)
    }

    /// `.debug_info` holding one empty DWARF 4 compilation unit.
    pub fn debug_info(self) -> Self
    {
        let mut unit = Vec::new();
        unit.extend_from_slice(&8u32.to_le_bytes());
        unit.extend_from_slice(&4u16.to_le_bytes());
        unit.extend_from_slice(&0u32.to_le_bytes());
        unit.push(8);
        unit.push(0);
        self.section(".debug_info", elf::SHT_PROGBITS, unit)
    }

    pub fn build(&self) -> Vec<u8>
    {
        let has_notes = !self.notes.is_empty();
        let phnum = usize::from(self.self_load.is_some()) + self.loads.len() + usize::from(has_notes);

        let mut cursor = align_to(EHDR_SIZE + phnum * PHDR_SIZE, 8);
        let note_offset = cursor;
        cursor = align_to(cursor + self.notes.len(), 8);

        let mut load_offsets = Vec::new();
        for load in &self.loads {
            load_offsets.push(cursor);
            cursor = align_to(cursor + load.data.len(), 8);
        }

        let mut shstrtab = vec![0u8];
        let mut section_layout = Vec::new();
        for section in &self.sections {
            section_layout.push((cursor, shstrtab.len()));
            shstrtab.extend_from_slice(section.name.as_bytes());
            shstrtab.push(0);
            cursor = align_to(cursor + section.data.len(), 8);
        }
        let shstrtab_name = shstrtab.len();
        shstrtab.extend_from_slice(b".shstrtab\0");
        let shstrtab_offset = cursor;
        cursor = align_to(cursor + shstrtab.len(), 8);

        let shnum = if self.sections.is_empty() { 0 } else { self.sections.len() + 2 };
        let shoff = if shnum == 0 { 0 } else { cursor };
        let total = cursor + shnum * SHDR_SIZE;

        let mut out = vec![0u8; total];
        out[..4].copy_from_slice(&elf::ELFMAG);
        out[ident::EI_CLASS] = elf::ELFCLASS64;
        out[ident::EI_DATA] = elf::ELFDATA2LSB;
        out[ident::EI_VERSION] = elf::EV_CURRENT;
        put16(&mut out, 16, self.e_type);
        put16(&mut out, 18, elf::EM_X86_64);
        put32(&mut out, 20, u32::from(elf::EV_CURRENT));
        put64(&mut out, 32, EHDR_SIZE as u64);
        put64(&mut out, 40, shoff as u64);
        put16(&mut out, 52, EHDR_SIZE as u16);
        put16(&mut out, 54, PHDR_SIZE as u16);
        put16(&mut out, 56, phnum as u16);
        put16(&mut out, 58, SHDR_SIZE as u16);
        put16(&mut out, 60, shnum as u16);
        put16(&mut out, 62, if shnum == 0 { 0 } else { (shnum - 1) as u16 });

        let mut ph = EHDR_SIZE;
        let mut phdr = |out: &mut Vec<u8>, kind: u32, offset: u64, vaddr: u64, file_size: u64, mem_size: u64, align: u64| {
            put32(out, ph, kind);
            put32(out, ph + 4, elf::PF_R);
            put64(out, ph + 8, offset);
            put64(out, ph + 16, vaddr);
            put64(out, ph + 24, vaddr);
            put64(out, ph + 32, file_size);
            put64(out, ph + 40, mem_size);
            put64(out, ph + 48, align);
            ph += PHDR_SIZE;
        };

        if let Some((vaddr, mem_size)) = self.self_load {
            phdr(&mut out, elf::PT_LOAD, 0, vaddr, total as u64, mem_size.max(total as u64), PAGE);
        }
        for (load, offset) in self.loads.iter().zip(&load_offsets) {
            phdr(&mut out, elf::PT_LOAD, *offset as u64, load.vaddr, load.data.len() as u64, load.mem_size, PAGE);
        }
        if has_notes {
            let vaddr = self.self_load.map_or(0, |(base, _)| base + note_offset as u64);
            phdr(&mut out, elf::PT_NOTE, note_offset as u64, vaddr, self.notes.len() as u64, self.notes.len() as u64, 4);
        }

        out[note_offset..note_offset + self.notes.len()].copy_from_slice(&self.notes);
        for (load, offset) in self.loads.iter().zip(&load_offsets) {
            out[*offset..*offset + load.data.len()].copy_from_slice(&load.data);
        }
        for (section, (offset, _)) in self.sections.iter().zip(&section_layout) {
            out[*offset..*offset + section.data.len()].copy_from_slice(&section.data);
        }
        out[shstrtab_offset..shstrtab_offset + shstrtab.len()].copy_from_slice(&shstrtab);

        if shnum > 0 {
            let headers = self
                .sections
                .iter()
                .zip(&section_layout)
                .map(|(section, (offset, name))| (*name, section.kind, *offset, section.data.len()))
                .chain(std::iter::once((shstrtab_name, elf::SHT_STRTAB, shstrtab_offset, shstrtab.len())));
            for (index, (name, kind, offset, size)) in headers.enumerate() {
                let at = shoff + (index + 1) * SHDR_SIZE;
                put32(&mut out, at, name as u32);
                put32(&mut out, at + 4, kind);
                put64(&mut out, at + 24, offset as u64);
                put64(&mut out, at + 32, size as u64);
                put64(&mut out, at + 48, 1);
            }
        }
        out
    }

    pub fn write_to(&self, path: &Path)
    {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, self.build()).unwrap();
    }
}

fn put16(out: &mut [u8], at: usize, value: u16)
{
    out[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put32(out: &mut [u8], at: usize, value: u32)
{
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put64(out: &mut [u8], at: usize, value: u64)
{
    out[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// One 4-byte aligned note entry.
pub fn note(owner: &[u8], kind: u32, desc: &[u8]) -> Vec<u8>
{
    let mut out = Vec::new();
    out.extend_from_slice(&(owner.len() as u32 + 1).to_le_bytes());
    out.extend_from_slice(&(desc.len() as u32).to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(owner);
    out.push(0);
    out.resize(align_to(out.len(), 4), 0);
    out.extend_from_slice(desc);
    out.resize(align_to(out.len(), 4), 0);
    out
}

/// `NT_FILE` descriptor for `(start, end, page_offset, path)` entries.
pub fn nt_file(entries: &[(u64, u64, u64, &str)]) -> Vec<u8>
{
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    out.extend_from_slice(&PAGE.to_le_bytes());
    for (start, end, pages, _) in entries {
        out.extend_from_slice(&start.to_le_bytes());
        out.extend_from_slice(&end.to_le_bytes());
        out.extend_from_slice(&pages.to_le_bytes());
    }
    for (.., path) in entries {
        out.extend_from_slice(path.as_bytes());
        out.push(0);
    }
    out
}

/// `NT_AUXV` descriptor, terminated with `AT_NULL`.
pub fn auxv(entries: &[(u64, u64)]) -> Vec<u8>
{
    let mut out = Vec::new();
    for (tag, value) in entries.iter().chain(std::iter::once(&(0, 0))) {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub const LIBFOO_BASE: u64 = 0x7f00_0000;
pub const LIBBAR_BASE: u64 = 0x7f20_0000;
pub const DATA_BASE: u64 = 0x7f10_0000;
pub const VDSO_BASE: u64 = 0x7fff_0000;
pub const LIBFOO_ID: [u8; 4] = [0xaa, 0xbb, 0xcc, 0xdd];
pub const VDSO_ID: [u8; 3] = [0x0d, 0x50, 0x01];

/// A shared object with build id `id`, loaded at 0 and spanning 3 pages.
pub fn shared_object(id: &[u8]) -> ElfBuilder
{
    ElfBuilder::shared().load_self(0, 3 * PAGE).build_id(id)
}

pub fn core_mappings() -> Vec<(u64, u64, u64, &'static str)>
{
    vec![
        (LIBFOO_BASE, LIBFOO_BASE + PAGE, 0, "/lib/libfoo.so"),
        (LIBFOO_BASE + PAGE, LIBFOO_BASE + 3 * PAGE, 1, "/lib/libfoo.so"),
        (DATA_BASE, DATA_BASE + PAGE, 0, "/data/blob"),
        (LIBBAR_BASE, LIBBAR_BASE + PAGE, 0, "/lib/libbar.so"),
        (LIBBAR_BASE + PAGE, LIBBAR_BASE + 2 * PAGE, 1, "/lib/libbar.so"),
    ]
}

/// A core dump of a process with:
/// - a vDSO at [`VDSO_BASE`] (dumped)
/// - `/lib/libfoo.so` at [`LIBFOO_BASE`] (first page dumped, build id [`LIBFOO_ID`])
/// - `/data/blob` at [`DATA_BASE`] (dumped, not an ELF file)
/// - `/lib/libbar.so` at [`LIBBAR_BASE`] (not dumped)
///
/// `nt_file` is the `NT_FILE` descriptor to embed.
pub fn core_with_file_note(nt_file_desc: &[u8]) -> Vec<u8>
{
    let vdso = ElfBuilder::shared().load_self(0, 2 * PAGE).build_id(&VDSO_ID).build();
    let libfoo = shared_object(&LIBFOO_ID).build();
    ElfBuilder::core()
        .note(elf::ELF_NOTE_CORE, elf::NT_FILE, nt_file_desc)
        .note(elf::ELF_NOTE_CORE, elf::NT_AUXV, &auxv(&[(3, 0x40_0040), (33, VDSO_BASE)]))
        .load(VDSO_BASE, vdso, 2 * PAGE)
        .load(LIBFOO_BASE, libfoo, PAGE)
        .load(DATA_BASE, vec![0x5a; 64], PAGE)
        .build()
}

pub fn sample_core() -> Vec<u8>
{
    core_with_file_note(&nt_file(&core_mappings()))
}
