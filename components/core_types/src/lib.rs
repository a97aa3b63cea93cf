//! Shared vocabulary for the collector components.
//!
//! This crate provides the small value types passed between the collector
//! core, the external tracer and allocator glue.
//!
//! # Overview
//!
//! - [`Address`] - Raw heap address with a reserved null value
//! - [`CollectionMode`] - Kind of collection requested
//! - [`CollectionStatus`] - Terminal outcome of a collection pass
//! - [`ErrorKind`] / [`ErrorReport`] - Misuse and corruption reports
//! - [`AuxError`] / [`ZoneError`] - Failures that stop the collector itself
//!
//! # Examples
//!
//! ```
//! use core_types::{Address, CollectionMode, CollectionStatus};
//!
//! let addr = Address::new(0x2000);
//! assert!(!addr.is_null());
//!
//! let mode = CollectionMode::Incremental.merge(CollectionMode::Full);
//! assert_eq!(mode, CollectionMode::Full);
//! assert!(CollectionStatus::Ok.is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod address;
mod error;
mod status;

pub use address::Address;
pub use error::{AuxError, ErrorKind, ErrorReport, ZoneError};
pub use status::{CollectionMode, CollectionStatus};
