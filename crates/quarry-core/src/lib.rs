//! # quarry-core
//!
//! Shared primitives for the quarry source-code search services.
//!
//! This crate provides the foundational pieces used across all quarry
//! components:
//!
//! - **Error Types**: shared error definitions and result types
//! - **Observability**: logging initialization and span constructors
//! - **Process Invocation**: a small capability for running external tools
//!
//! ## Crate Boundary
//!
//! `quarry-core` holds only primitives that more than one component needs.
//! Domain logic (indexing, ingestion, merging) lives in the component
//! crates.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod exec;
pub mod observability;

pub use error::{Error, Result};
pub use exec::{ProcessRunner, SystemRunner};
pub use observability::{LogFormat, init_logging};
