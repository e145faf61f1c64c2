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

//! Configuration inputs for the in-place filter engine.
//!
//! Layout: `model.rs` (immutable filter options), `loader.rs` (alias store
//! discovery and parsing), `defaults.rs` (file locations), `error.rs`.

mod defaults;
pub mod error;
pub mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use loader::AliasStore;
pub use model::{FilterOptions, TempLocation};
