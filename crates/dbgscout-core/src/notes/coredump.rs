//! Decoders for the core-dump notes `NT_FILE` and `NT_AUXV`.

use object::Endianness;

use crate::container::{ByteReader, ElfClass};
use crate::types::{Address, AddressRange};

/// Auxiliary vector tags used during discovery.
pub const AT_NULL: u64 = 0;
pub const AT_PHDR: u64 = 3;
pub const AT_PHNUM: u64 = 5;
pub const AT_ENTRY: u64 = 9;
pub const AT_EXECFN: u64 = 31;
pub const AT_SYSINFO_EHDR: u64 = 33;

/// One file-backed mapping from an `NT_FILE` note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping
{
    pub range: AddressRange,
    /// Offset into the file, in bytes
    pub file_offset: u64,
    pub path: String,
}

/// The decoded `NT_FILE` table, in note order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMappings
{
    pub page_size: u64,
    /// Entry count declared by the note
    pub declared: u64,
    pub entries: Vec<FileMapping>,
}

impl FileMappings
{
    /// Decode an `NT_FILE` descriptor.
    ///
    /// Layout: `count`, `page_size`, then `count` triples of
    /// `(start, end, offset_in_pages)`, then `count` NUL-terminated paths.
    /// Only entries with a complete triple *and* a complete path survive, so
    /// a descriptor cut anywhere yields a prefix of the full table. Entries
    /// with `end <= start` are skipped.
    pub fn decode(desc: &[u8], class: ElfClass, endian: Endianness) -> Result<Self, String>
    {
        let reader = ByteReader::new(desc, class, endian);
        let word = class.word_size() as u64;
        let (Some(declared), Some(page_size)) = (reader.word_at(0), reader.word_at(word)) else {
            return Err(format!("NT_FILE header needs {} bytes, have {}", word * 2, desc.len()));
        };

        let table_start = word * 2;
        let triple = word * 3;
        let room = (desc.len() as u64).saturating_sub(table_start) / triple;
        let complete = declared.min(room);

        let mut triples = Vec::new();
        for index in 0..complete {
            let at = table_start + index * triple;
            let (Some(start), Some(end), Some(pages)) =
                (reader.word_at(at), reader.word_at(at + word), reader.word_at(at + word * 2))
            else {
                break;
            };
            triples.push((start, end, pages));
        }

        // Paths follow the *declared* table; if the table itself is cut
        // there are no paths to pair with.
        let names_start = declared
            .checked_mul(triple)
            .and_then(|len| len.checked_add(table_start))
            .and_then(|start| usize::try_from(start).ok());
        let names = match names_start.and_then(|start| desc.get(start..)) {
            Some(rest) => complete_strings(rest, triples.len()),
            None => Vec::new(),
        };

        let entries = triples
            .into_iter()
            .zip(names)
            .filter_map(|((start, end, pages), path)| {
                let range = AddressRange::new(Address::new(start), Address::new(end))?;
                Some(FileMapping {
                    range,
                    file_offset: pages.saturating_mul(page_size),
                    path,
                })
            })
            .collect();

        Ok(Self {
            page_size,
            declared,
            entries,
        })
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileMapping>
    {
        self.entries.iter()
    }
}

/// Up to `limit` strings that are followed by a NUL terminator.
fn complete_strings(bytes: &[u8], limit: usize) -> Vec<String>
{
    let mut out = Vec::new();
    let mut rest = bytes;
    while out.len() < limit {
        let Some(nul) = rest.iter().position(|byte| *byte == 0) else {
            break;
        };
        out.push(String::from_utf8_lossy(&rest[..nul]).into_owned());
        rest = &rest[nul + 1..];
    }
    out
}

/// The decoded `NT_AUXV` vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auxv
{
    pub entries: Vec<(u64, u64)>,
}

impl Auxv
{
    /// Decode `(tag, value)` word pairs up to `AT_NULL` or the end of the
    /// descriptor. A trailing partial pair is ignored.
    pub fn decode(desc: &[u8], class: ElfClass, endian: Endianness) -> Self
    {
        let reader = ByteReader::new(desc, class, endian);
        let word = class.word_size() as u64;
        let mut entries = Vec::new();
        let mut at = 0u64;
        while let (Some(tag), Some(value)) = (reader.word_at(at), reader.word_at(at + word)) {
            if tag == AT_NULL {
                break;
            }
            entries.push((tag, value));
            at += word * 2;
        }
        Self { entries }
    }

    pub fn get(&self, tag: u64) -> Option<u64>
    {
        self.entries.iter().find(|(t, _)| *t == tag).map(|(_, value)| *value)
    }

    pub fn entry(&self) -> Option<Address>
    {
        self.get(AT_ENTRY).map(Address::new)
    }

    pub fn program_headers(&self) -> Option<Address>
    {
        self.get(AT_PHDR).map(Address::new)
    }

    /// Address of the vDSO's ELF header, if the kernel mapped one.
    pub fn sysinfo_ehdr(&self) -> Option<Address>
    {
        self.get(AT_SYSINFO_EHDR).filter(|addr| *addr != 0).map(Address::new)
    }
}
