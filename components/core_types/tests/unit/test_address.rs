//! Unit tests for Address

use core_types::Address;
use std::collections::HashSet;

#[test]
fn test_address_roundtrips_through_usize() {
    let addr = Address::from(0xdead_beef_usize);
    let raw: usize = addr.into();
    assert_eq!(raw, 0xdead_beef);
}

#[test]
fn test_address_ordering_follows_raw_value() {
    assert!(Address::new(0x10) < Address::new(0x20));
    assert!(Address::NULL < Address::new(1));
}

#[test]
fn test_address_hashes_by_value() {
    let mut seen = HashSet::new();
    assert!(seen.insert(Address::new(0x100)));
    assert!(!seen.insert(Address::new(0x100)));
    assert_eq!(seen.len(), 1);
}

#[test]
fn test_null_pointer_maps_to_null_address() {
    let ptr: *const u8 = std::ptr::null();
    assert!(Address::from_ptr(ptr).is_null());
}
