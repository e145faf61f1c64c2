//! # Design
//!
//! - Provide structured errors for the filter engine, split into configuration,
//!   per-file, fatal and interruption classes.
//! - Per-file messages double as the user-visible skip reason, so they stay
//!   short and free of the file name (the caller prints it).
//! - Capture operation context (paths, operations) alongside source errors.

use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use nix::sys::signal::Signal;
use thiserror::Error;

/// Result type for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;

/// Problems detected while compiling a command template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template was empty.
    #[error("empty command")]
    EmptyTemplate,
    /// A `%` was followed by something other than `0`, `1`, `2` or `%`.
    #[error("invalid placeholder specification (%{placeholder}): {template}")]
    InvalidPlaceholder {
        /// Character following the `%`, empty when the template ends in `%`.
        placeholder: String,
        /// Template as supplied.
        template: String,
    },
    /// `%2` was used without `%1`.
    #[error("%1 is missing while %2 is specified: {template}")]
    InconsistentPlaceholders {
        /// Template as supplied.
        template: String,
    },
    /// An output path is required to render a two-path template.
    #[error("output path required for: {template}")]
    MissingOutput {
        /// Template that needed the output path.
        template: String,
    },
}

/// How a filter command ended when it did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The command exited with a non-zero code.
    Exited(i32),
    /// The command was killed by a signal.
    Signaled(i32),
}

impl CommandStatus {
    /// Translate a process exit status.
    #[must_use]
    pub fn from_exit_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Exited(-1),
        }
    }
}

impl Display for CommandStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(formatter, "exited with {code}"),
            Self::Signaled(signal) => write!(formatter, "was killed by signal {signal}"),
        }
    }
}

/// Errors produced by the filter engine.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The command template is invalid.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// A pipeline was built without any stage.
    #[error("no filter command given")]
    NoStages,
    /// The input file does not exist.
    #[error("file not found")]
    FileNotFound {
        /// Missing path.
        path: PathBuf,
    },
    /// The destination is a symlink and dereferencing is disabled.
    #[error("symlink")]
    SymlinkPolicyViolation {
        /// Symlink path.
        path: PathBuf,
    },
    /// The destination symlink could not be resolved.
    #[error("symlink unresolvable: {source}")]
    SymlinkUnresolvable {
        /// Symlink path.
        path: PathBuf,
        /// Resolution failure.
        source: io::Error,
    },
    /// The destination is not a regular file.
    #[error("not a regular file")]
    NotRegularFile {
        /// Offending path.
        path: PathBuf,
    },
    /// The destination is not writable and `force` is off.
    #[error("read-only file")]
    ReadOnlyFile {
        /// Offending path.
        path: PathBuf,
    },
    /// The filter command did not succeed.
    #[error("command {status}")]
    CommandFailed {
        /// Rendered command line.
        command: String,
        /// How the command ended.
        status: CommandStatus,
    },
    /// The filter removed its output file.
    #[error("output file removed")]
    OutputRemoved {
        /// Expected output path.
        path: PathBuf,
    },
    /// The filter produced no output and empty output is not accepted.
    #[error("empty output")]
    EmptyOutput,
    /// The filter output is identical to the original file.
    #[error("unchanged")]
    Unchanged,
    /// A filesystem operation outside the install step failed.
    #[error("{operation} failed on {}: {source}", .path.display())]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A system call outside the install step failed.
    #[error("{operation} failed on {}: {source}", .path.display())]
    Nix {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying errno.
        source: nix::Error,
    },
    /// Installing new content onto the destination failed; the destination may
    /// be in a partial state and the filtered output is left behind.
    #[error("{}: failed to overwrite: {source}; result file left: {}", .destination.display(), .orphan.display())]
    Fatal {
        /// Destination that could not be overwritten.
        destination: PathBuf,
        /// Temporary file still holding the filtered content.
        orphan: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A termination signal arrived during a critical section and was honoured
    /// once it completed.
    #[error("interrupted by {signal}")]
    Interrupted {
        /// Signal that was deferred.
        signal: Signal,
    },
}

impl FilterError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn nix(operation: &'static str, path: impl Into<PathBuf>, source: nix::Error) -> Self {
        Self::Nix {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether new content could not be installed onto a real destination.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Errors that must stop the whole run rather than skip one file.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::Interrupted { .. })
    }

    /// Errors raised while building stages, before any file is touched.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Template(_) | Self::NoStages)
    }

    /// Errors confined to the file being processed.
    #[must_use]
    pub const fn is_per_file(&self) -> bool {
        !self.is_terminal() && !self.is_configuration()
    }
}
