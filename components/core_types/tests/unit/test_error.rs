//! Unit tests for ErrorKind, ErrorReport, AuxError and ZoneError

use core_types::{Address, AuxError, ErrorKind, ErrorReport, ZoneError};
use std::error::Error;

#[test]
fn test_report_carries_kind_and_address() {
    let report = ErrorReport::new(ErrorKind::RefcountUnderflow, "refcount below zero")
        .with_address(Address::new(0x80));
    assert_eq!(report.kind, ErrorKind::RefcountUnderflow);
    assert_eq!(report.address, Some(Address::new(0x80)));
    assert_eq!(
        report.to_string(),
        "reference count underflow: refcount below zero (0x80)"
    );
}

#[test]
fn test_invalid_layout_message() {
    let err = AuxError::InvalidLayout {
        count: usize::MAX,
        size: 2,
    };
    assert!(err.to_string().starts_with("invalid auxiliary allocation"));
}

#[test]
fn test_zone_error_aux_is_transparent() {
    let aux = AuxError::Exhausted {
        requested: 8,
        in_use: 0,
    };
    let err = ZoneError::from(aux.clone());
    assert_eq!(err.to_string(), aux.to_string());
}

#[test]
fn test_thread_spawn_error_has_source() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "no threads left");
    let err = ZoneError::ThreadSpawn(io);
    assert!(err.source().is_some());
    assert!(err.to_string().contains("no threads left"));
}
