//! DWARF presence checks.
//!
//! Deciding whether a file "has debug information" takes more than finding a
//! `.debug_info` section name: stripped files keep empty or `NOBITS`
//! placeholders around. A container counts as carrying DWARF once `gimli`
//! can load its sections and read at least one unit header.

use gimli::{Dwarf, EndianSlice, RunTimeEndian, SectionId};
use object::Endianness;

use crate::container::Container;
use crate::error::{Result, ScoutError};

type SliceReader<'data> = EndianSlice<'data, RunTimeEndian>;

/// What loading the DWARF sections of a container found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DwarfSummary
{
    /// Compilation and type units whose headers parsed
    pub units: usize,
    /// `.debug_*` sections that carry file data
    pub sections: Vec<&'static str>,
}

const CHECKED_SECTIONS: [SectionId; 6] = [
    SectionId::DebugInfo,
    SectionId::DebugAbbrev,
    SectionId::DebugLine,
    SectionId::DebugStr,
    SectionId::DebugTypes,
    SectionId::DebugRngLists,
];

fn runtime_endian(container: &Container) -> RunTimeEndian
{
    match container.endian() {
        Endianness::Little => RunTimeEndian::Little,
        Endianness::Big => RunTimeEndian::Big,
    }
}

fn section_reader(container: &Container, id: SectionId) -> SliceReader<'_>
{
    let data = container
        .section_by_name(id.name())
        .and_then(|section| container.section_data(section).ok())
        .unwrap_or_default();
    EndianSlice::new(data, runtime_endian(container))
}

fn map_dwarf_error(context: &str, err: gimli::Error) -> ScoutError
{
    ScoutError::InvalidFormat(format!("{context}: {err}"))
}

/// Load the DWARF sections of `container` and count their units.
///
/// Returns `Ok(None)` when there is no `.debug_info` data at all.
pub fn summarize(container: &Container) -> Result<Option<DwarfSummary>>
{
    if !container.has_debug_info_section() {
        return Ok(None);
    }

    let dwarf: Dwarf<SliceReader<'_>> =
        Dwarf::load(|id| Ok::<_, gimli::Error>(section_reader(container, id)))
            .map_err(|err| map_dwarf_error("loading DWARF sections", err))?;

    let mut units = 0;
    let mut headers = dwarf.units();
    while headers
        .next()
        .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
        .is_some()
    {
        units += 1;
    }
    let mut type_headers = dwarf.type_units();
    while let Ok(Some(_)) = type_headers.next() {
        units += 1;
    }

    let sections = CHECKED_SECTIONS
        .iter()
        .map(|id| id.name())
        .filter(|name| {
            container
                .section_by_name(name)
                .is_some_and(|section| section.has_file_data() && section.size > 0)
        })
        .collect();

    Ok(Some(DwarfSummary { units, sections }))
}

/// Whether `container` carries usable DWARF.
pub fn has_dwarf(container: &Container) -> bool
{
    matches!(summarize(container), Ok(Some(summary)) if summary.units > 0)
}
