//! Build identifiers.

use std::fmt;
use std::path::PathBuf;

use super::Address;

/// Opaque build identifier embedded in an ELF `NT_GNU_BUILD_ID` note
///
/// The identifier is the primary key used to match a running module to the
/// file it was loaded from and to its separate debug information.
///
/// ## Example
///
/// ```rust
/// use dbgscout_core::types::BuildId;
///
/// let id = BuildId::new(vec![0xaa, 0xbb, 0xcc]);
/// assert_eq!(id.to_string(), "aabbcc");
/// assert_eq!(id.index_path(".debug").unwrap(), std::path::PathBuf::from(".build-id/aa/bbcc.debug"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BuildId
{
    bytes: Vec<u8>,
    /// Address of the note that carried the identifier, when it was read
    /// from process memory.
    note_address: Option<Address>,
}

impl BuildId
{
    pub fn new(bytes: Vec<u8>) -> Self
    {
        Self {
            bytes,
            note_address: None,
        }
    }

    #[must_use]
    pub fn with_note_address(mut self, address: Address) -> Self
    {
        self.note_address = Some(address);
        self
    }

    pub fn as_bytes(&self) -> &[u8]
    {
        &self.bytes
    }

    /// A zero-length identifier means "absent".
    pub fn is_empty(&self) -> bool
    {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize
    {
        self.bytes.len()
    }

    pub fn note_address(&self) -> Option<Address>
    {
        self.note_address
    }

    /// Byte-for-byte comparison, ignoring where each identifier was found.
    pub fn matches(&self, other: &BuildId) -> bool
    {
        !self.is_empty() && self.bytes == other.bytes
    }

    /// Relative path of this identifier inside a `.build-id` index
    ///
    /// The first byte names the directory and the remaining bytes the file,
    /// followed by `suffix`. Identifiers shorter than two bytes cannot be
    /// indexed this way.
    pub fn index_path(&self, suffix: &str) -> Option<PathBuf>
    {
        let (first, rest) = self.bytes.split_first()?;
        if rest.is_empty() {
            return None;
        }
        let mut file = hex(rest);
        file.push_str(suffix);
        Some(PathBuf::from(".build-id").join(format!("{first:02x}")).join(file))
    }
}

fn hex(bytes: &[u8]) -> String
{
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

impl fmt::Display for BuildId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&hex(&self.bytes))
    }
}

impl fmt::Debug for BuildId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "BuildId({self})")
    }
}

impl From<&[u8]> for BuildId
{
    fn from(bytes: &[u8]) -> Self
    {
        BuildId::new(bytes.to_vec())
    }
}
