//! Typed filter options shared by every stage of a run.
//!
//! # Design
//! - Pure data carrier built once by the argument layer and never mutated.
//! - Derived views (`temp_location`, `backup_suffix`, `log_level`) keep
//!   interpretation rules next to the data.

/// Where filter output is staged before it replaces its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempLocation {
    /// The system temporary directory.
    #[default]
    System,
    /// The directory containing the file being replaced.
    SameDirectory,
}

impl TempLocation {
    /// Render the location as a lowercase label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::SameDirectory => "same_directory",
        }
    }
}

/// Options recognised by the filter engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct FilterOptions {
    /// Follow symlinks and edit their targets instead of skipping them.
    pub dereference: bool,
    /// Suffix appended to the destination to keep a backup copy.
    pub backup_suffix: Option<String>,
    /// Edit files even when they are not writable.
    pub force: bool,
    /// Overwrite the existing inode instead of renaming a new file over it.
    pub preserve_inode: bool,
    /// Restore access and modification times after replacement.
    pub preserve_timestamp: bool,
    /// Log every action without touching any file.
    pub dry_run: bool,
    /// Stage temporary files next to each destination.
    pub same_directory: bool,
    /// Accept zero-length filter output.
    pub accept_empty: bool,
    /// Report every edited file.
    pub verbose: bool,
    /// Report every filesystem action and rendered command.
    pub debug: bool,
}

impl FilterOptions {
    /// Location used for freshly allocated temporary files.
    #[must_use]
    pub const fn temp_location(&self) -> TempLocation {
        if self.same_directory {
            TempLocation::SameDirectory
        } else {
            TempLocation::System
        }
    }

    /// Backup suffix, ignoring an empty value.
    #[must_use]
    pub fn backup_suffix(&self) -> Option<&str> {
        self.backup_suffix
            .as_deref()
            .filter(|suffix| !suffix.is_empty())
    }

    /// Dry runs and debug mode report every action; verbose mode reports
    /// edits; otherwise only problems are shown.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.debug || self.dry_run {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}
