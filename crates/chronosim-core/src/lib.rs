//! Core types shared by the chronosim driver and harness.
//!
//! - [`Name`]: hierarchical NDN-style names (sync prefix, user prefix,
//!   session names, data names)
//! - [`MissingDataInfo`] and [`Data`]: what the sync session announces and
//!   what a fetch returns
//! - [`Environment`]: the owned randomness source every driver is built on
//!
//! Nothing in this crate performs I/O or reads the clock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod name;
pub mod sync;

pub use env::Environment;
pub use name::{Component, Name, NameError};
pub use sync::{Data, MissingDataInfo, SeqNo};
