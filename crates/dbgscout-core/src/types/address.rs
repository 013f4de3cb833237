//! Process addresses and half-open address ranges.

use std::fmt;

/// Strongly typed virtual address in the inspected process
///
/// Core dumps and ELF images describe everything in terms of raw `u64`
/// values: addresses, file offsets, sizes, page counts. Wrapping addresses
/// keeps them from being mixed up with the others.
///
/// ## Example
///
/// ```rust
/// use dbgscout_core::types::Address;
///
/// let addr = Address::new(0x1234);
/// assert_eq!(addr.align_down(0x1000), Address::new(0x1000));
/// assert_eq!(addr.checked_add(0x10), Some(Address::new(0x1244)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset, returning `None` on overflow
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Distance from `base` to this address, `None` if it lies below `base`
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }

    /// Round down to a multiple of `align` (a zero or non power of two
    /// alignment leaves the address untouched)
    #[must_use]
    pub fn align_down(self, align: u64) -> Self
    {
        if align.is_power_of_two() {
            Address(self.0 & !(align - 1))
        } else {
            self
        }
    }

    /// Round up to a multiple of `align`, saturating at the top of the space
    #[must_use]
    pub fn align_up(self, align: u64) -> Self
    {
        if !align.is_power_of_two() {
            return self;
        }
        match self.0.checked_add(align - 1) {
            Some(value) => Address(value & !(align - 1)),
            None => Address(u64::MAX & !(align - 1)),
        }
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Half-open address range `[start, end)`
///
/// A range whose `end` is `start + 1` is the placeholder used for modules
/// whose real extent is not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange
{
    pub start: Address,
    pub end: Address,
}

impl AddressRange
{
    /// Build a range, returning `None` unless `end > start`.
    pub fn new(start: Address, end: Address) -> Option<Self>
    {
        (end > start).then_some(Self { start, end })
    }

    /// The one-byte placeholder range at `start`.
    ///
    /// At the very top of the address space the placeholder covers the last
    /// byte instead.
    pub fn placeholder(start: Address) -> Self
    {
        match start.checked_add(1) {
            Some(end) => Self { start, end },
            None => Self {
                start: Address::new(u64::MAX - 1),
                end: Address::new(u64::MAX),
            },
        }
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64
    {
        self.end.value() - self.start.value()
    }

    /// Ranges are never empty; provided for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool
    {
        self.end <= self.start
    }

    /// Whether this is the `start + 1` placeholder
    pub fn is_placeholder(&self) -> bool
    {
        self.len() == 1
    }

    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool
    {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for AddressRange
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}..{:#x}", self.start.value(), self.end.value())
    }
}
