//! Default locations for the alias configuration.
//!
//! # Design
//! - Keep the XDG directory name and the legacy dotfile name in one place.
//! - The XDG location wins over the legacy file when both exist.

/// Directory under `$XDG_CONFIG_HOME` holding the alias file.
pub(crate) const CONFIG_DIR_NAME: &str = "inplace";
/// Alias file name inside [`CONFIG_DIR_NAME`].
pub(crate) const CONFIG_FILE_NAME: &str = "config";
/// Fallback configuration directory relative to `$HOME`.
pub(crate) const XDG_FALLBACK_DIR: &str = ".config";
/// Legacy alias file in the home directory.
pub(crate) const LEGACY_FILE_NAME: &str = ".inplace";
