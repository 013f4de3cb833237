//! # Note Extraction
//!
//! Walks the ELF notes of a [`Container`] and pulls out the ones module
//! discovery cares about:
//!
//! - `NT_GNU_BUILD_ID` (owner `GNU`): the build identifier, first one wins
//! - `NT_FILE` (owner `CORE`, core images only): the table of file-backed mappings
//! - `NT_AUXV` (owner `CORE`, core images only): the auxiliary vector
//!
//! Every other note is kept as-is in [`NoteSet::other`].
//!
//! Extraction never fails. Problems are recorded in [`NoteSet::diagnostics`]
//! and logged; a corrupt entry costs at most the rest of its note area.

pub mod coredump;

use object::elf;
use object::Endianness;
use tracing::warn;

pub use self::coredump::{Auxv, FileMapping, FileMappings};
use crate::container::{ByteReader, Container, ElfClass};
use crate::error::ScoutError;
use crate::types::BuildId;

/// One note entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note
{
    /// Offset of the entry header, relative to the start of the source
    pub offset: u64,
    /// Owner name without trailing NULs
    pub name: Vec<u8>,
    pub kind: u32,
    pub desc: Vec<u8>,
    /// The descriptor was cut short by the end of its note area
    pub truncated: bool,
}

impl Note
{
    fn is(&self, owner: &[u8], kind: u32) -> bool
    {
        self.kind == kind && self.name == owner
    }
}

/// Everything found in a container's notes.
#[derive(Debug, Default)]
pub struct NoteSet
{
    pub build_id: Option<BuildId>,
    pub file_mappings: Option<FileMappings>,
    pub auxv: Option<Auxv>,
    /// Notes that were not recognized, in file order
    pub other: Vec<Note>,
    pub diagnostics: Vec<ScoutError>,
}

impl NoteSet
{
    fn diagnose(&mut self, error: ScoutError)
    {
        warn!(%error, "note extraction");
        self.diagnostics.push(error);
    }

    fn absorb(&mut self, note: Note, class: ElfClass, endian: Endianness, is_core: bool)
    {
        if note.is(elf::ELF_NOTE_GNU, elf::NT_GNU_BUILD_ID) {
            if note.truncated || note.desc.is_empty() {
                self.diagnose(ScoutError::MalformedNote {
                    offset: note.offset,
                    reason: "incomplete build id".into(),
                });
            } else if self.build_id.is_none() {
                self.build_id = Some(BuildId::new(note.desc));
            }
            return;
        }

        if is_core && note.is(elf::ELF_NOTE_CORE, elf::NT_FILE) {
            if self.file_mappings.is_none() {
                match FileMappings::decode(&note.desc, class, endian) {
                    Ok(mappings) => self.file_mappings = Some(mappings),
                    Err(reason) => self.diagnose(ScoutError::MalformedNote {
                        offset: note.offset,
                        reason,
                    }),
                }
            }
            return;
        }

        if is_core && note.is(elf::ELF_NOTE_CORE, elf::NT_AUXV) {
            if self.auxv.is_none() {
                self.auxv = Some(Auxv::decode(&note.desc, class, endian));
            }
            return;
        }

        self.other.push(note);
    }
}

/// Scan all notes of `container`.
///
/// Notes are read from `PT_NOTE` segments. When the container has none, or
/// its program header table is unreadable, `SHT_NOTE` sections are used
/// instead (separate debug files and relocatable objects often only have
/// those).
pub fn extract_notes(container: &Container) -> NoteSet
{
    let mut set = NoteSet::default();
    let mut areas: Vec<(u64, u64, u64)> = Vec::new();

    match container.segments() {
        Ok(segments) => areas.extend(
            segments
                .iter()
                .filter(|segment| segment.is_note())
                .map(|segment| (segment.offset, segment.file_size, segment.align)),
        ),
        Err(error) => set.diagnose(error),
    }

    if areas.is_empty() {
        if let Ok(sections) = container.sections() {
            areas.extend(
                sections
                    .iter()
                    .filter(|section| section.kind == elf::SHT_NOTE)
                    .map(|section| (section.offset, section.size, section.align)),
            );
        }
    }

    for (offset, size, align) in areas {
        let (bytes, short) = match container.bytes_truncated(offset, size) {
            Ok(found) => found,
            Err(error) => {
                set.diagnose(error);
                continue;
            }
        };
        if short {
            set.diagnose(ScoutError::Truncated {
                what: "note area",
                needed: size,
                available: bytes.len() as u64,
            });
        }
        let reader = ByteReader::new(bytes, container.class(), container.endian());
        for note in scan_notes(reader, offset, align, &mut set) {
            set.absorb(note, container.class(), container.endian(), container.is_core());
        }
    }

    set
}

/// Build identifier of a container, if its notes carry one.
pub fn extract_build_id(container: &Container) -> Option<BuildId>
{
    extract_notes(container).build_id
}

/// Find the build id among raw note bytes (used for notes read out of
/// process memory).
pub(crate) fn build_id_in(bytes: &[u8], class: ElfClass, endian: Endianness, align: u64) -> Option<BuildId>
{
    let mut scratch = NoteSet::default();
    let reader = ByteReader::new(bytes, class, endian);
    scan_notes(reader, 0, align, &mut scratch)
        .into_iter()
        .find(|note| note.is(elf::ELF_NOTE_GNU, elf::NT_GNU_BUILD_ID) && !note.truncated && !note.desc.is_empty())
        .map(|note| BuildId::new(note.desc))
}

const NOTE_HEADER_SIZE: u64 = 12;

fn align_note(value: u64, align: u64) -> Option<u64>
{
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Split one note area into entries.
///
/// `base` is the area's offset in its source and is only used for
/// reporting. Entries whose header is complete but whose payload runs past
/// the area are returned with `truncated` set, and scanning stops there.
fn scan_notes(reader: ByteReader<'_>, base: u64, align: u64, set: &mut NoteSet) -> Vec<Note>
{
    let align = if align == 8 { 8 } else { 4 };
    let end = reader.len() as u64;
    let mut notes = Vec::new();
    let mut pos = 0u64;

    while pos < end {
        let offset = base.saturating_add(pos);
        let header = (reader.u32_at(pos), reader.u32_at(pos + 4), reader.u32_at(pos + 8));
        let (Some(name_size), Some(desc_size), Some(kind)) = header else {
            set.diagnose(ScoutError::Truncated {
                what: "note header",
                needed: NOTE_HEADER_SIZE,
                available: end - pos,
            });
            break;
        };

        let name_start = pos + NOTE_HEADER_SIZE;
        let Some(name) = reader.bytes_at(name_start, u64::from(name_size)) else {
            set.diagnose(ScoutError::MalformedNote {
                offset,
                reason: format!("name size {name_size} runs past the note area"),
            });
            break;
        };
        let name = trim_nuls(name).to_vec();

        let desc_start = name_start
            .checked_add(u64::from(name_size))
            .and_then(|value| align_note(value, align))
            .filter(|start| *start <= end);
        let Some(desc_start) = desc_start else {
            set.diagnose(ScoutError::MalformedNote {
                offset,
                reason: "descriptor starts past the note area".into(),
            });
            break;
        };

        match reader.bytes_at(desc_start, u64::from(desc_size)) {
            Some(desc) => {
                notes.push(Note {
                    offset,
                    name,
                    kind,
                    desc: desc.to_vec(),
                    truncated: false,
                });
                // desc_start + desc_size <= end here, so neither add overflows
                match align_note(desc_start + u64::from(desc_size), align) {
                    Some(next) if next > pos => pos = next,
                    _ => break,
                }
            }
            None => {
                set.diagnose(ScoutError::MalformedNote {
                    offset,
                    reason: format!("descriptor size {desc_size} runs past the note area"),
                });
                let available = reader.bytes_at(desc_start, end - desc_start).unwrap_or_default();
                notes.push(Note {
                    offset,
                    name,
                    kind,
                    desc: available.to_vec(),
                    truncated: true,
                });
                break;
            }
        }
    }

    notes
}

fn trim_nuls(bytes: &[u8]) -> &[u8]
{
    let len = bytes.iter().rposition(|byte| *byte != 0).map_or(0, |last| last + 1);
    &bytes[..len]
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn note(name: &[u8], kind: u32, desc: &[u8]) -> Vec<u8>
    {
        let mut out = Vec::new();
        let name_size = name.len() as u32 + 1;
        out.extend_from_slice(&name_size.to_le_bytes());
        out.extend_from_slice(&(desc.len() as u32).to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(name);
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out.extend_from_slice(desc);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    fn scan(bytes: &[u8]) -> (Vec<Note>, NoteSet)
    {
        let mut set = NoteSet::default();
        let reader = ByteReader::new(bytes, ElfClass::Elf64, Endianness::Little);
        let notes = scan_notes(reader, 0, 4, &mut set);
        (notes, set)
    }

    #[test]
    fn test_scan_two_notes()
    {
        let mut bytes = note(b"GNU", elf::NT_GNU_BUILD_ID, &[0xaa, 0xbb, 0xcc]);
        bytes.extend(note(b"Xen", 7, &[1, 2, 3, 4, 5]));
        let (notes, set) = scan(&bytes);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].name, b"GNU");
        assert_eq!(notes[0].desc, vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(notes[1].offset, 20);
        assert!(set.diagnostics.is_empty());
    }

    #[test]
    fn test_scan_truncated_descriptor_keeps_prefix()
    {
        let mut bytes = note(b"GNU", 1, &[]);
        let mut second = note(b"CORE", 9, &[7u8; 16]);
        second.truncate(second.len() - 6);
        bytes.extend(second);
        let (notes, set) = scan(&bytes);
        assert_eq!(notes.len(), 2);
        assert!(!notes[0].truncated);
        assert!(notes[1].truncated);
        assert_eq!(notes[1].desc.len(), 10);
        assert!(matches!(set.diagnostics[0], ScoutError::MalformedNote { .. }));
    }

    #[test]
    fn test_scan_huge_name_stops()
    {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let (notes, set) = scan(&bytes);
        assert!(notes.is_empty());
        assert_eq!(set.diagnostics.len(), 1);
    }

    #[test]
    fn test_scan_partial_header()
    {
        let mut bytes = note(b"GNU", 1, &[1, 2, 3, 4]);
        bytes.extend_from_slice(&[1, 0, 0]);
        let (notes, set) = scan(&bytes);
        assert_eq!(notes.len(), 1);
        assert!(matches!(set.diagnostics[0], ScoutError::Truncated { .. }));
    }

    #[test]
    fn test_first_build_id_wins()
    {
        let mut bytes = note(b"GNU", elf::NT_GNU_BUILD_ID, &[1, 2]);
        bytes.extend(note(b"GNU", elf::NT_GNU_BUILD_ID, &[3, 4]));
        let id = build_id_in(&bytes, ElfClass::Elf64, Endianness::Little, 4).unwrap();
        assert_eq!(id.as_bytes(), &[1, 2]);
    }

    #[test]
    fn test_build_id_needs_gnu_owner()
    {
        let bytes = note(b"GNUX", elf::NT_GNU_BUILD_ID, &[1, 2]);
        assert!(build_id_in(&bytes, ElfClass::Elf64, Endianness::Little, 4).is_none());
    }

    #[test]
    fn test_trim_nuls()
    {
        assert_eq!(trim_nuls(b"GNU\0\0"), b"GNU");
        assert_eq!(trim_nuls(b"\0"), b"");
    }
}
