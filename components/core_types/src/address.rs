//! Raw heap address representation.
//!
//! The collector never dereferences the addresses it tracks. It only
//! records them, so an address is a plain machine word with a reserved
//! null value.

use std::fmt;

/// A raw heap address tracked by the collector.
///
/// `Address::NULL` doubles as the "cleared" value for weak references and
/// is never stored in a pointer set or pointer map.
///
/// # Examples
///
/// ```
/// use core_types::Address;
///
/// let addr = Address::new(0x1000);
/// assert!(!addr.is_null());
/// assert_eq!(addr.as_usize(), 0x1000);
/// assert!(Address::NULL.is_null());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(usize);

impl Address {
    /// The null address.
    pub const NULL: Address = Address(0);

    /// Wraps a raw machine word.
    pub const fn new(raw: usize) -> Self {
        Address(raw)
    }

    /// Returns the address of a pointer.
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Address(ptr as usize)
    }

    /// Returns the raw machine word.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns true for the null address.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<usize> for Address {
    fn from(raw: usize) -> Self {
        Address(raw)
    }
}

impl From<Address> for usize {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
