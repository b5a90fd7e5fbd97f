//! The logtap synthetic log generator.
//!
//! This library supports the logtap binary found elsewhere in this project. A
//! [`runner::Runner`] writes lines of random or fixed content to stdout,
//! stderr or a file at a fixed interval, keeping count of what it wrote, until
//! told to stop. [`status::Server`] exposes that count over HTTP.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod content;
pub mod field_path;
pub mod preset;
pub mod runner;
pub mod sink;
pub mod status;
pub mod task;
