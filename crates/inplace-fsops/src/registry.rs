//! Bookkeeping for temporary files created while filtering.
//!
//! # Design
//! - A path is a throwaway intermediate iff it is registered here; anything
//!   else is treated as a user's real file.
//! - Allocation returns an RAII handle that unregisters and removes the file
//!   when dropped, unless ownership is explicitly taken with [`TempFile::keep`].
//! - Temp names keep the suffix of the file they stand in for so filters that
//!   sniff extensions keep working.

use std::cell::RefCell;
use std::collections::HashSet;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use inplace_config::TempLocation;
use tracing::{debug, warn};

use crate::error::{FilterError, FilterResult};

const TEMP_PREFIX: &str = "inplace-";

/// Set of live temporary file paths.
#[derive(Debug, Default)]
pub struct TempRegistry {
    live: RefCell<HashSet<PathBuf>>,
}

impl TempRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty temp file standing in for `outfile`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created in the chosen directory.
    pub fn allocate(&self, outfile: &Path, location: TempLocation) -> FilterResult<TempFile<'_>> {
        let dir = match location {
            TempLocation::SameDirectory => outfile
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
            TempLocation::System => env::temp_dir(),
        };
        let suffix = temp_suffix(outfile);

        let path = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(|source| FilterError::io("temp.allocate", &dir, source))?
            .into_temp_path()
            .keep()
            .map_err(|err| FilterError::io("temp.allocate", &dir, err.error))?;

        self.live.borrow_mut().insert(path.clone());
        debug!(
            path = %path.display(),
            location = location.as_str(),
            "allocated temp file"
        );
        Ok(TempFile {
            registry: self,
            path,
            kept: false,
        })
    }

    /// Whether `path` is a live temp file.
    #[must_use]
    pub fn is_temp(&self, path: &Path) -> bool {
        self.live.borrow().contains(path)
    }

    /// Number of live temp files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.borrow().len()
    }

    /// Whether no temp file is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.borrow().is_empty()
    }

    fn release(&self, path: &Path) {
        self.live.borrow_mut().remove(path);
    }
}

/// Handle to a registered temp file.
#[derive(Debug)]
pub struct TempFile<'a> {
    registry: &'a TempRegistry,
    path: PathBuf,
    kept: bool,
}

impl TempFile<'_> {
    /// Location of the temp file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unregister the file and leave it on disk.
    #[must_use]
    pub fn keep(mut self) -> PathBuf {
        self.kept = true;
        self.registry.release(&self.path);
        self.path.clone()
    }
}

impl Drop for TempFile<'_> {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        self.registry.release(&self.path);
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed temp file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove temp file"
            ),
        }
    }
}

/// Everything from the first `.` of the basename, provided something follows it.
fn temp_suffix(outfile: &Path) -> OsString {
    let Some(name) = outfile.file_name() else {
        return OsString::new();
    };
    let bytes = name.as_bytes();
    match bytes.iter().position(|&byte| byte == b'.') {
        Some(index) if index + 1 < bytes.len() => OsStr::from_bytes(&bytes[index..]).to_os_string(),
        _ => OsString::new(),
    }
}
