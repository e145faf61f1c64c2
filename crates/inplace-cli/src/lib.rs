#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(
    dead_code,
    unused,
    unused_imports,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]
#![allow(clippy::redundant_pub_crate)]

//! Command-line front end for the in-place filter engine.
//!
//! Layout:
//! - `cli.rs`: argument parsing, alias expansion, run orchestration, exit codes
//! - `signals.rs`: termination signal listener feeding the signal gate
//! - `output.rs`: per-file skip lines and run summary
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod output;
pub(crate) mod signals;

pub use cli::{run, run_with_args};
