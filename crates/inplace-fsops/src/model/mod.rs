//! Data carried between filter stages and reported back to callers.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use nix::sys::time::TimeSpec;

use crate::error::{FilterError, FilterResult};

/// Metadata of the original file captured just before replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    /// Permission bits, including setuid, setgid and sticky.
    pub mode: u32,
    /// Owning user.
    pub uid: u32,
    /// Owning group.
    pub gid: u32,
    /// Last access time, seconds since the epoch.
    pub atime_secs: i64,
    /// Sub-second part of the access time.
    pub atime_nsecs: i64,
    /// Last modification time, seconds since the epoch.
    pub mtime_secs: i64,
    /// Sub-second part of the modification time.
    pub mtime_nsecs: i64,
    /// Size in bytes.
    pub size: u64,
}

impl FileSnapshot {
    /// Capture the metadata of `path`, following symlinks.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be inspected.
    pub fn capture(path: &Path) -> FilterResult<Self> {
        let metadata =
            fs::metadata(path).map_err(|source| FilterError::io("snapshot.stat", path, source))?;
        Ok(Self {
            mode: metadata.mode() & 0o7777,
            uid: metadata.uid(),
            gid: metadata.gid(),
            atime_secs: metadata.atime(),
            atime_nsecs: metadata.atime_nsec(),
            mtime_secs: metadata.mtime(),
            mtime_nsecs: metadata.mtime_nsec(),
            size: metadata.size(),
        })
    }

    /// Access time at full precision.
    #[must_use]
    pub const fn atime_spec(&self) -> TimeSpec {
        TimeSpec::new(self.atime_secs, self.atime_nsecs)
    }

    /// Modification time at full precision.
    #[must_use]
    pub const fn mtime_spec(&self) -> TimeSpec {
        TimeSpec::new(self.mtime_secs, self.mtime_nsecs)
    }

    /// Access time rendered in local time for logs.
    #[must_use]
    pub fn atime_label(&self) -> String {
        timestamp_label(self.atime_secs, self.atime_nsecs)
    }

    /// Modification time rendered in local time for logs.
    #[must_use]
    pub fn mtime_label(&self) -> String {
        timestamp_label(self.mtime_secs, self.mtime_nsecs)
    }
}

fn timestamp_label(secs: i64, nsecs: i64) -> String {
    u32::try_from(nsecs)
        .ok()
        .and_then(|nsecs| DateTime::from_timestamp(secs, nsecs))
        .map_or_else(
            || secs.to_string(),
            |time| time.with_timezone(&Local).format("%Y-%m-%dT%T").to_string(),
        )
}

/// Outcome of a successful filter stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// File named on the command line.
    pub original: PathBuf,
    /// File that received the new content.
    pub destination: PathBuf,
    /// Size of the input before filtering.
    pub bytes_before: u64,
    /// Size of the destination afterwards; unknown in a dry run.
    pub bytes_after: Option<u64>,
    /// Whether nothing was actually modified.
    pub dry_run: bool,
}

/// Result of processing one file.
#[derive(Debug)]
pub struct FileOutcome {
    /// File named on the command line.
    pub path: PathBuf,
    /// Report when the file was edited, or the reason it was skipped.
    pub result: Result<StageReport, FilterError>,
}

impl FileOutcome {
    /// Whether the file was edited (or would have been, in a dry run).
    #[must_use]
    pub const fn is_edited(&self) -> bool {
        self.result.is_ok()
    }

    /// Reason the file was skipped.
    #[must_use]
    pub fn skip_reason(&self) -> Option<&FilterError> {
        self.result.as_ref().err()
    }
}

/// Outcomes of a whole run, in input order.
#[derive(Debug, Default)]
pub struct RunReport {
    outcomes: Vec<FileOutcome>,
}

impl RunReport {
    pub(crate) fn push(&mut self, outcome: FileOutcome) {
        self.outcomes.push(outcome);
    }

    /// Every outcome, in input order.
    #[must_use]
    pub fn outcomes(&self) -> &[FileOutcome] {
        &self.outcomes
    }

    /// Number of files edited.
    #[must_use]
    pub fn edited(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_edited()).count()
    }

    /// Number of files skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.edited()
    }
}
