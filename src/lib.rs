//! Workspace placeholder crate.
//!
//! This crate exists to expose a single dependency for host applications
//! (CLI front-ends, schedulers) that want the mirror refresh and sync engine
//! without wiring each workspace crate individually.

#[cfg(feature = "service")]
pub use core_service::*;
