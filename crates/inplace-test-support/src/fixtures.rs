//! Test fixtures and environment helpers.

use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use nix::unistd::Uid;
use tempfile::TempDir;

const SHELL: &str = "/bin/sh";

/// Returns `true` if `/bin/sh` can run the given command successfully.
#[must_use]
pub fn shell_supports(script: &str) -> bool {
    Command::new(SHELL)
        .args(["-c", script])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Returns `true` if `/bin/sh` is usable and every tool in `tools` is on `PATH`.
#[must_use]
pub fn tools_available(tools: &[&str]) -> bool {
    Path::new(SHELL).exists()
        && tools
            .iter()
            .all(|tool| shell_supports(&format!("command -v {tool}")))
}

/// Whether the tests run with an effective uid of root, which bypasses
/// permission checks.
#[must_use]
pub fn running_as_root() -> bool {
    Uid::effective().is_root()
}

/// Scratch directory removed when dropped.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn scratch_dir(prefix: &str) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .context("failed to create scratch directory")
}

/// Write `contents` to `dir/name` and return the path.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Write `contents` to `dir/name` and set its permission bits.
///
/// # Errors
///
/// Returns an error if the file cannot be written or its mode set.
pub fn write_file_with_mode(dir: &Path, name: &str, contents: &[u8], mode: u32) -> Result<PathBuf> {
    let path = write_file(dir, name, contents)?;
    fs::set_permissions(&path, Permissions::from_mode(mode))
        .with_context(|| format!("failed to chmod {}", path.display()))?;
    Ok(path)
}

/// Names of the entries in `dir`, sorted.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn entries(dir: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

/// Permission bits of `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be inspected.
pub fn mode_of(path: &Path) -> Result<u32> {
    Ok(fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .permissions()
        .mode()
        & 0o7777)
}
