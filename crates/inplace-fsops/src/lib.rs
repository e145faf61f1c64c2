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
#![allow(clippy::module_name_repetitions)]

//! In-place filtering engine: runs external filter commands over files and
//! swaps the results into place atomically, keeping ownership, permissions
//! and optionally timestamps and inode identity.
//!
//! Layout: `template.rs` (placeholder templates and shell quoting),
//! `stage.rs` (one filter command against one file), `replace.rs` (backup,
//! install and metadata restore), `registry.rs` (temp file bookkeeping),
//! `interrupt.rs` (signal deferral), `pipeline.rs` (multi-stage runs),
//! `model/` (snapshots and reports), `error.rs`.

pub mod error;
pub mod interrupt;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod replace;
pub mod stage;
pub mod template;

pub use error::{CommandStatus, FilterError, FilterResult, TemplateError};
pub use interrupt::{Delivery, SignalGate};
pub use model::{FileOutcome, FileSnapshot, RunReport, StageReport};
pub use pipeline::Pipeline;
pub use registry::{TempFile, TempRegistry};
pub use replace::Replacer;
pub use stage::FilterStage;
pub use template::{Formatter, shell_quote, template_from_args};
