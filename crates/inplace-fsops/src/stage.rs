//! A single filter command applied to one file.
//!
//! # Design
//! - Checks run in a fixed order and the first failure short-circuits, so the
//!   reported reason is always the earliest problem.
//! - Output always lands in a fresh temp file first; the destination is only
//!   touched by the replacer inside the signal gate's critical section.
//! - Metadata is snapshotted from the file named on the command line, never
//!   from a hand-off temp.
//! - The command is polled rather than waited on, so a cancelled run kills it
//!   and unwinds through the temp file guards.

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use inplace_config::FilterOptions;
use nix::unistd::{AccessFlags, access};
use tracing::{debug, info};

use crate::error::{CommandStatus, FilterError, FilterResult};
use crate::interrupt::SignalGate;
use crate::model::{FileSnapshot, StageReport};
use crate::registry::TempRegistry;
use crate::replace::Replacer;
use crate::template::Formatter;

const SHELL: &str = "/bin/sh";
const COMPARE_CHUNK: usize = 64 * 1024;
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One compiled filter command.
#[derive(Debug, Clone)]
pub struct FilterStage {
    formatter: Formatter,
    options: Arc<FilterOptions>,
    gate: SignalGate,
}

impl FilterStage {
    /// Compile `template` into a stage.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Template`] when the template is invalid.
    pub fn new(template: &str, options: Arc<FilterOptions>, gate: SignalGate) -> FilterResult<Self> {
        let formatter = Formatter::new(template)?;
        debug!(
            template = formatter.template(),
            arity = formatter.arity(),
            "compiled filter"
        );
        Ok(Self {
            formatter,
            options,
            gate,
        })
    }

    /// Whether the command edits its input in place.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        self.formatter.is_destructive()
    }

    /// Compiled template.
    #[must_use]
    pub const fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    /// Filter `file` onto itself.
    ///
    /// # Errors
    ///
    /// See [`FilterStage::filter`].
    pub fn filter_destructive(
        &self,
        registry: &TempRegistry,
        original: &Path,
        file: &Path,
    ) -> FilterResult<StageReport> {
        self.filter(registry, original, file, file)
    }

    /// Run the command reading `input` and replace `output` with the result.
    /// `original` is the file named on the command line.
    ///
    /// # Errors
    ///
    /// Returns a per-file error when a check fails, the command fails or its
    /// output is rejected; [`FilterError::Fatal`] when the output cannot be
    /// installed; [`FilterError::Interrupted`] when a signal arrived during
    /// the replacement.
    pub fn filter(
        &self,
        registry: &TempRegistry,
        original: &Path,
        input: &Path,
        output: &Path,
    ) -> FilterResult<StageReport> {
        let dry_run = self.options.dry_run;
        self.gate.checkpoint()?;

        if !input.exists() {
            return Err(FilterError::FileNotFound {
                path: input.to_path_buf(),
            });
        }

        let output_is_original = !registry.is_temp(output);
        let destination = self.resolve_destination(output)?;
        let temp = registry.allocate(&destination, self.options.temp_location())?;

        let command = if self.formatter.is_destructive() {
            debug!(from = %input.display(), to = %temp.path().display(), "copy");
            if !dry_run {
                copy_contents(input, temp.path())?;
            }
            self.formatter.format(original, temp.path(), None)?
        } else {
            self.formatter.format(original, input, Some(temp.path()))?
        };
        let command_line = command.to_string_lossy().into_owned();

        debug!(command = %command_line, "command");
        if !dry_run {
            let status = self.run_command(&command, &command_line)?;
            if !status.success() {
                return Err(FilterError::CommandFailed {
                    command: command_line,
                    status: CommandStatus::from_exit_status(status),
                });
            }
            self.validate_output(original, temp.path(), output_is_original)?;
        }

        let snapshot = FileSnapshot::capture(original)?;
        let bytes_before = fs::metadata(input)
            .map_err(|source| FilterError::io("stage.stat", input, source))?
            .len();

        let replacer = Replacer::new(&self.options, registry);
        self.gate
            .critical(|| replacer.replace(temp, &destination, &snapshot))?;

        let bytes_after = if dry_run {
            None
        } else {
            Some(
                fs::metadata(&destination)
                    .map_err(|source| FilterError::io("stage.stat", &destination, source))?
                    .len(),
            )
        };

        if output_is_original {
            let after = bytes_after.map_or_else(|| "?".to_string(), |bytes| bytes.to_string());
            info!(
                path = %original.display(),
                "edited ({bytes_before} bytes -> {after} bytes)"
            );
        }

        Ok(StageReport {
            original: original.to_path_buf(),
            destination,
            bytes_before,
            bytes_after,
            dry_run,
        })
    }

    /// Run the rendered command, stopping it if the run is cancelled.
    fn run_command(&self, command: &OsStr, command_line: &str) -> FilterResult<ExitStatus> {
        let mut child = Command::new(SHELL)
            .arg("-c")
            .arg(command)
            .spawn()
            .map_err(|source| FilterError::io("stage.spawn", SHELL, source))?;
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|source| FilterError::io("stage.wait", SHELL, source))?
            {
                return Ok(status);
            }
            if let Some(signal) = self.gate.received() {
                debug!(signal = %signal, command = %command_line, "stopping filter command");
                if let Err(err) = child.kill() {
                    debug!(error = %err, "filter command already exited");
                }
                if let Err(err) = child.wait() {
                    debug!(error = %err, "failed to reap filter command");
                }
                return Err(FilterError::Interrupted { signal });
            }
            thread::sleep(COMMAND_POLL_INTERVAL);
        }
    }

    fn resolve_destination(&self, output: &Path) -> FilterResult<PathBuf> {
        let metadata = fs::symlink_metadata(output)
            .map_err(|source| FilterError::io("stage.lstat", output, source))?;

        let (destination, metadata) = if metadata.file_type().is_symlink() {
            if !self.options.dereference {
                return Err(FilterError::SymlinkPolicyViolation {
                    path: output.to_path_buf(),
                });
            }
            let unresolvable = |source| FilterError::SymlinkUnresolvable {
                path: output.to_path_buf(),
                source,
            };
            let target = fs::canonicalize(output).map_err(unresolvable)?;
            let metadata = fs::symlink_metadata(&target).map_err(unresolvable)?;
            debug!(link = %output.display(), target = %target.display(), "dereferenced symlink");
            (target, metadata)
        } else {
            (output.to_path_buf(), metadata)
        };

        if !metadata.is_file() {
            return Err(FilterError::NotRegularFile { path: destination });
        }
        if !self.options.force && access(&destination, AccessFlags::W_OK).is_err() {
            return Err(FilterError::ReadOnlyFile { path: destination });
        }
        Ok(destination)
    }

    fn validate_output(
        &self,
        original: &Path,
        temp: &Path,
        output_is_original: bool,
    ) -> FilterResult<()> {
        let metadata = match fs::metadata(temp) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                return Err(FilterError::OutputRemoved {
                    path: temp.to_path_buf(),
                });
            }
        };
        if !self.options.accept_empty && metadata.len() == 0 {
            return Err(FilterError::EmptyOutput);
        }
        if output_is_original && same_contents(original, temp)? {
            return Err(FilterError::Unchanged);
        }
        Ok(())
    }
}

/// Copy bytes only; the temp keeps its own restrictive mode.
fn copy_contents(from: &Path, to: &Path) -> FilterResult<()> {
    let mut source = File::open(from).map_err(|source| FilterError::io("stage.copy", from, source))?;
    let mut target = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(to)
        .map_err(|source| FilterError::io("stage.copy", to, source))?;
    io::copy(&mut source, &mut target).map_err(|source| FilterError::io("stage.copy", to, source))?;
    Ok(())
}

fn same_contents(left: &Path, right: &Path) -> FilterResult<bool> {
    let open = |path: &Path| File::open(path).map_err(|source| FilterError::io("stage.compare", path, source));
    let mut left_file = open(left)?;
    let mut right_file = open(right)?;

    let left_len = left_file
        .metadata()
        .map_err(|source| FilterError::io("stage.compare", left, source))?
        .len();
    let right_len = right_file
        .metadata()
        .map_err(|source| FilterError::io("stage.compare", right, source))?
        .len();
    if left_len != right_len {
        return Ok(false);
    }

    let mut left_buf = vec![0_u8; COMPARE_CHUNK];
    let mut right_buf = vec![0_u8; COMPARE_CHUNK];
    loop {
        let read = read_chunk(&mut left_file, &mut left_buf)
            .map_err(|source| FilterError::io("stage.compare", left, source))?;
        let other = read_chunk(&mut right_file, &mut right_buf)
            .map_err(|source| FilterError::io("stage.compare", right, source))?;
        if read != other || left_buf[..read] != right_buf[..other] {
            return Ok(false);
        }
        if read == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows, returning the byte count.
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
