//! Installation of filtered content onto its destination.
//!
//! # Design
//! - Hand-off temps are plain moves: no backup and no metadata.
//! - Real destinations get an optional backup, the new content (by rename or
//!   by overwriting the existing inode), then the snapshot's ownership, mode
//!   and optionally timestamps.
//! - A failure while installing is fatal and leaves the filtered output on disk.
//! - In a dry run every action is logged and nothing is touched.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use inplace_config::FilterOptions;
use nix::errno::Errno;
use nix::sys::stat::{UtimensatFlags, utimensat};
use nix::unistd::{Gid, Uid, chown};
use tracing::{debug, error};

use crate::error::{FilterError, FilterResult};
use crate::model::FileSnapshot;
use crate::registry::{TempFile, TempRegistry};

/// Mode bits kept when ownership cannot be restored.
const UNOWNED_MODE_MASK: u32 = 0o1777;

/// Swaps filtered content into place.
#[derive(Debug, Clone, Copy)]
pub struct Replacer<'a> {
    options: &'a FilterOptions,
    registry: &'a TempRegistry,
}

impl<'a> Replacer<'a> {
    /// Build a replacer bound to the run's options and temp registry.
    #[must_use]
    pub const fn new(options: &'a FilterOptions, registry: &'a TempRegistry) -> Self {
        Self { options, registry }
    }

    /// Move `temp` onto `destination`, restoring `snapshot` when the
    /// destination is a real file.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Fatal`] if the content cannot be installed onto a
    /// real destination, and a per-file error if the backup or the metadata
    /// restore fails.
    pub fn replace(
        &self,
        temp: TempFile<'_>,
        destination: &Path,
        snapshot: &FileSnapshot,
    ) -> FilterResult<()> {
        if self.registry.is_temp(destination) {
            debug!(
                from = %temp.path().display(),
                to = %destination.display(),
                "move"
            );
            if !self.options.dry_run {
                move_file(temp.path(), destination)
                    .map_err(|source| FilterError::io("replace.handoff", destination, source))?;
            }
            return Ok(());
        }

        if let Some(suffix) = self.options.backup_suffix() {
            self.backup(destination, suffix, snapshot)?;
        }
        self.install(temp, destination)?;
        self.restore(destination, snapshot, self.options.preserve_timestamp)
    }

    fn backup(&self, destination: &Path, suffix: &str, snapshot: &FileSnapshot) -> FilterResult<()> {
        let backup = backup_path(destination, suffix);
        if self.options.preserve_inode {
            debug!(from = %destination.display(), to = %backup.display(), "copy");
            if !self.options.dry_run {
                fs::copy(destination, &backup)
                    .map_err(|source| FilterError::io("replace.backup", &backup, source))?;
            }
            self.restore(&backup, snapshot, true)
        } else {
            debug!(from = %destination.display(), to = %backup.display(), "move");
            if self.options.dry_run {
                return Ok(());
            }
            fs::rename(destination, &backup)
                .map_err(|source| FilterError::io("replace.backup", &backup, source))
        }
    }

    fn install(&self, temp: TempFile<'_>, destination: &Path) -> FilterResult<()> {
        let result = if self.options.preserve_inode {
            debug!(from = %temp.path().display(), to = %destination.display(), "copy");
            if self.options.dry_run {
                Ok(())
            } else {
                overwrite_contents(temp.path(), destination)
            }
        } else {
            debug!(from = %temp.path().display(), to = %destination.display(), "move");
            if self.options.dry_run {
                Ok(())
            } else {
                move_file(temp.path(), destination)
            }
        };

        match result {
            Ok(()) => {
                if self.options.preserve_inode {
                    debug!(path = %temp.path().display(), "remove");
                }
                Ok(())
            }
            Err(source) => {
                let orphan = temp.keep();
                error!(
                    destination = %destination.display(),
                    error = %source,
                    "failed to overwrite"
                );
                error!(
                    destination = %destination.display(),
                    orphan = %orphan.display(),
                    "result file left"
                );
                Err(FilterError::Fatal {
                    destination: destination.to_path_buf(),
                    orphan,
                    source,
                })
            }
        }
    }

    fn restore(&self, path: &Path, snapshot: &FileSnapshot, with_times: bool) -> FilterResult<()> {
        let dry_run = self.options.dry_run;

        if with_times {
            debug!(
                atime = %snapshot.atime_label(),
                mtime = %snapshot.mtime_label(),
                path = %path.display(),
                "utime"
            );
            if !dry_run {
                utimensat(
                    None,
                    path,
                    &snapshot.atime_spec(),
                    &snapshot.mtime_spec(),
                    UtimensatFlags::FollowSymlink,
                )
                .map_err(|source| FilterError::nix("restore.utime", path, source))?;
            }
        }

        let mut mode = snapshot.mode;
        debug!(
            uid = snapshot.uid,
            gid = snapshot.gid,
            path = %path.display(),
            "chown"
        );
        if !dry_run {
            match chown(
                path,
                Some(Uid::from_raw(snapshot.uid)),
                Some(Gid::from_raw(snapshot.gid)),
            ) {
                Ok(()) => {}
                Err(Errno::EPERM) => {
                    mode &= UNOWNED_MODE_MASK;
                    debug!(path = %path.display(), "ownership not restorable; dropping setuid/setgid");
                }
                Err(source) => return Err(FilterError::nix("restore.chown", path, source)),
            }
        }

        debug!(mode = %format!("{mode:o}"), path = %path.display(), "chmod");
        if !dry_run {
            fs::set_permissions(path, Permissions::from_mode(mode))
                .map_err(|source| FilterError::io("restore.chmod", path, source))?;
        }
        Ok(())
    }
}

fn backup_path(destination: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Rename `from` onto `to`, copying across filesystems when needed.
pub(crate) fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), to = %to.display(), "rename crosses devices; copying");
            overwrite_contents(from, to)?;
            fs::remove_file(from)
        }
        Err(err) => Err(err),
    }
}

/// Replace the bytes of `to` with those of `from`, keeping `to`'s inode.
fn overwrite_contents(from: &Path, to: &Path) -> io::Result<()> {
    let mut source = File::open(from)?;
    let mut target = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(to)?;
    io::copy(&mut source, &mut target)?;
    target.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use std::sync::mpsc;
    use std::thread;

    use anyhow::Result;
    use inplace_config::TempLocation;
    use inplace_test_support::fixtures::{
        entries, mode_of, running_as_root, scratch_dir, write_file, write_file_with_mode,
    };
    use nix::sys::signal::Signal;

    use crate::interrupt::{Delivery, SignalGate};

    type TestResult<T> = Result<T>;

    fn staged<'a>(registry: &'a TempRegistry, destination: &Path, contents: &[u8]) -> TestResult<TempFile<'a>> {
        let temp = registry.allocate(destination, TempLocation::SameDirectory)?;
        fs::write(temp.path(), contents)?;
        Ok(temp)
    }

    #[test]
    fn rename_install_restores_mode() -> TestResult<()> {
        let dir = scratch_dir("inplace-replace-")?;
        let file = write_file_with_mode(dir.path(), "a.txt", b"foo", 0o640)?;
        let snapshot = FileSnapshot::capture(&file)?;
        let options = FilterOptions::default();
        let registry = TempRegistry::new();

        let temp = staged(&registry, &file, b"bar")?;
        Replacer::new(&options, &registry).replace(temp, &file, &snapshot)?;

        assert_eq!(fs::read(&file)?, b"bar");
        assert_eq!(mode_of(&file)?, 0o640);
        assert_eq!(entries(dir.path())?, vec!["a.txt".to_string()]);
        assert!(registry.is_empty());
        Ok(())
    }

    #[test]
    fn backup_suffix_keeps_previous_content() -> TestResult<()> {
        let dir = scratch_dir("inplace-replace-")?;
        let file = write_file_with_mode(dir.path(), "a.txt", b"foo", 0o600)?;
        let snapshot = FileSnapshot::capture(&file)?;
        let options = FilterOptions {
            backup_suffix: Some(".bak".to_string()),
            ..FilterOptions::default()
        };
        let registry = TempRegistry::new();

        let temp = staged(&registry, &file, b"bar")?;
        Replacer::new(&options, &registry).replace(temp, &file, &snapshot)?;

        let backup = dir.path().join("a.txt.bak");
        assert_eq!(fs::read(&file)?, b"bar");
        assert_eq!(fs::read(&backup)?, b"foo");
        assert_eq!(mode_of(&backup)?, 0o600);
        Ok(())
    }

    #[test]
    fn preserve_inode_overwrites_in_place() -> TestResult<()> {
        let dir = scratch_dir("inplace-replace-")?;
        let file = write_file_with_mode(dir.path(), "a.txt", b"foo", 0o644)?;
        let inode = fs::metadata(&file)?.ino();
        let snapshot = FileSnapshot::capture(&file)?;
        let options = FilterOptions {
            preserve_inode: true,
            preserve_timestamp: true,
            backup_suffix: Some("~".to_string()),
            ..FilterOptions::default()
        };
        let registry = TempRegistry::new();

        let temp = staged(&registry, &file, b"longer content")?;
        Replacer::new(&options, &registry).replace(temp, &file, &snapshot)?;

        let metadata = fs::metadata(&file)?;
        assert_eq!(metadata.ino(), inode);
        assert_eq!(fs::read(&file)?, b"longer content");
        assert_eq!(metadata.mtime(), snapshot.mtime_secs);

        let backup = fs::metadata(dir.path().join("a.txt~"))?;
        assert_ne!(backup.ino(), inode);
        assert_eq!(backup.mtime(), snapshot.mtime_secs);
        assert_eq!(entries(dir.path())?, vec!["a.txt".to_string(), "a.txt~".to_string()]);
        Ok(())
    }

    #[test]
    fn preserve_timestamp_restores_times() -> TestResult<()> {
        let dir = scratch_dir("inplace-replace-")?;
        let file = write_file(dir.path(), "a.txt", b"foo")?;
        let mut snapshot = FileSnapshot::capture(&file)?;
        snapshot.atime_secs = 1_000_000_000;
        snapshot.atime_nsecs = 250_000_001;
        snapshot.mtime_secs = 1_100_000_000;
        snapshot.mtime_nsecs = 123_456_789;
        let options = FilterOptions {
            preserve_timestamp: true,
            ..FilterOptions::default()
        };
        let registry = TempRegistry::new();

        let temp = staged(&registry, &file, b"bar")?;
        Replacer::new(&options, &registry).replace(temp, &file, &snapshot)?;

        let metadata = fs::metadata(&file)?;
        assert_eq!(metadata.mtime(), 1_100_000_000);
        assert_eq!(metadata.mtime_nsec(), 123_456_789);
        assert_eq!(metadata.atime(), 1_000_000_000);
        assert_eq!(metadata.atime_nsec(), 250_000_001);
        Ok(())
    }

    #[test]
    fn handoff_destination_is_a_plain_move() -> TestResult<()> {
        let dir = scratch_dir("inplace-replace-")?;
        let file = write_file_with_mode(dir.path(), "a.txt", b"foo", 0o644)?;
        let snapshot = FileSnapshot::capture(&file)?;
        let options = FilterOptions {
            backup_suffix: Some(".bak".to_string()),
            ..FilterOptions::default()
        };
        let registry = TempRegistry::new();
        let handoff = registry.allocate(&file, TempLocation::SameDirectory)?;
        let handoff_mode = mode_of(handoff.path())?;

        let temp = staged(&registry, &file, b"middle")?;
        Replacer::new(&options, &registry).replace(temp, handoff.path(), &snapshot)?;

        assert_eq!(fs::read(handoff.path())?, b"middle");
        assert_eq!(mode_of(handoff.path())?, handoff_mode);
        assert!(!dir.path().join("a.txt.bak").exists());
        assert_eq!(registry.len(), 1);
        Ok(())
    }

    #[test]
    fn dry_run_touches_nothing() -> TestResult<()> {
        let dir = scratch_dir("inplace-replace-")?;
        let file = write_file_with_mode(dir.path(), "a.txt", b"foo", 0o644)?;
        let mut snapshot = FileSnapshot::capture(&file)?;
        snapshot.mode = 0o600;
        let options = FilterOptions {
            dry_run: true,
            backup_suffix: Some(".bak".to_string()),
            ..FilterOptions::default()
        };
        let registry = TempRegistry::new();

        let temp = staged(&registry, &file, b"bar")?;
        Replacer::new(&options, &registry).replace(temp, &file, &snapshot)?;

        assert_eq!(fs::read(&file)?, b"foo");
        assert_eq!(mode_of(&file)?, 0o644);
        assert_eq!(entries(dir.path())?, vec!["a.txt".to_string()]);
        Ok(())
    }

    #[test]
    fn install_failure_is_fatal_and_keeps_output() -> TestResult<()> {
        let dir = scratch_dir("inplace-replace-")?;
        let file = write_file(dir.path(), "a.txt", b"foo")?;
        let snapshot = FileSnapshot::capture(&file)?;
        let options = FilterOptions::default();
        let registry = TempRegistry::new();
        let missing = dir.path().join("gone").join("a.txt");

        let temp = staged(&registry, &file, b"bar")?;
        let err = Replacer::new(&options, &registry)
            .replace(temp, &missing, &snapshot)
            .err();

        match err {
            Some(FilterError::Fatal {
                destination,
                orphan,
                ..
            }) => {
                assert_eq!(destination, missing);
                assert_eq!(fs::read(&orphan)?, b"bar");
            }
            other => anyhow::bail!("expected fatal error, got {other:?}"),
        }
        assert!(registry.is_empty());
        Ok(())
    }

    #[test]
    fn denied_chown_drops_setuid_and_setgid() -> TestResult<()> {
        if running_as_root() {
            return Ok(());
        }
        let dir = scratch_dir("inplace-replace-")?;
        let file = write_file_with_mode(dir.path(), "a.txt", b"foo", 0o644)?;
        let mut snapshot = FileSnapshot::capture(&file)?;
        snapshot.uid = 0;
        snapshot.gid = 0;
        snapshot.mode = 0o6755;
        let options = FilterOptions::default();
        let registry = TempRegistry::new();

        let temp = staged(&registry, &file, b"bar")?;
        Replacer::new(&options, &registry).replace(temp, &file, &snapshot)?;

        assert_eq!(fs::read(&file)?, b"bar");
        assert_eq!(mode_of(&file)?, 0o755);
        assert_ne!(fs::metadata(&file)?.uid(), 0);
        Ok(())
    }

    #[test]
    fn signal_during_replacement_completes_it_first() -> TestResult<()> {
        let dir = scratch_dir("inplace-replace-")?;
        let file = write_file_with_mode(dir.path(), "a.txt", b"foo", 0o640)?;
        let snapshot = FileSnapshot::capture(&file)?;
        let options = FilterOptions {
            backup_suffix: Some(".bak".to_string()),
            ..FilterOptions::default()
        };
        let registry = TempRegistry::new();
        let gate = SignalGate::new();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (delivered_tx, delivered_rx) = mpsc::channel();

        let listener = {
            let gate = gate.clone();
            thread::spawn(move || {
                let _ = entered_rx.recv();
                let delivery = gate.deliver(Signal::SIGTERM);
                let _ = delivered_tx.send(());
                delivery
            })
        };

        let temp = staged(&registry, &file, b"bar")?;
        let replacer = Replacer::new(&options, &registry);
        let result = gate.critical(|| {
            assert_eq!(gate.depth(), 1);
            let _ = entered_tx.send(());
            let _ = delivered_rx.recv();
            replacer.replace(temp, &file, &snapshot)
        });

        assert!(matches!(listener.join().ok(), Some(Delivery::Deferred)));
        assert!(matches!(
            result,
            Err(FilterError::Interrupted {
                signal: Signal::SIGTERM
            })
        ));
        assert_eq!(fs::read(&file)?, b"bar");
        assert_eq!(mode_of(&file)?, 0o640);
        assert_eq!(fs::read(dir.path().join("a.txt.bak"))?, b"foo");
        assert_eq!(
            entries(dir.path())?,
            vec!["a.txt".to_string(), "a.txt.bak".to_string()]
        );
        assert!(registry.is_empty());
        Ok(())
    }
}
