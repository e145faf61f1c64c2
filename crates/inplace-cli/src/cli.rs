//! Argument parsing, alias expansion and run orchestration for `inplace`.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use inplace_config::{AliasStore, FilterOptions};
use inplace_fsops::{FilterError, Pipeline, SignalGate, template_from_args};
use inplace_telemetry::{LogFormat, LoggingConfig, build_sha, init_logging};
use tracing::debug;

use crate::output;
use crate::signals;

pub(crate) const EXIT_FAILURE: i32 = 1;
pub(crate) const EXIT_NO_FILES: i32 = 2;
pub(crate) const EXIT_USAGE: i32 = 64;
const EXIT_INTERRUPTED: i32 = 130;

const EXECUTE_ARGS_TERMINATOR: &str = "--";
const PLACEHOLDER_HELP: &str = "\
Placeholders in COMMANDLINE:
  %0  the original file path
  %1  the source file path
  %2  the destination file path
  %%  a literal %
Missing %2 means %1 is edited destructively, and missing both %1 and %2
implies \"(...) < %1 > %2\" around the command line.";

/// Parses the process arguments, runs the filters and returns the exit code.
pub async fn run() -> i32 {
    run_with_args(env::args_os()).await
}

/// Same as [`run`] with an explicit argument list; the first item is the
/// program name.
pub async fn run_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    match execute(&args).await {
        Ok(()) => 0,
        Err(err) => {
            err.report();
            err.exit_code()
        }
    }
}

async fn execute(args: &[OsString]) -> CliResult<()> {
    let matches = Cli::command()
        .try_get_matches_from(args)
        .map_err(CliError::Usage)?;
    let cli = Cli::from_arg_matches(&matches).map_err(CliError::Usage)?;
    if unterminated_execute_args(args) {
        return Err(CliError::validation(format!(
            "-E must end with {EXECUTE_ARGS_TERMINATOR}"
        )));
    }

    let options = Arc::new(cli.filter_options());
    let logging = LoggingConfig {
        level: options.log_level(),
        format: cli.log_format,
        build_sha: option_env!("INPLACE_BUILD_SHA").unwrap_or("dev"),
    };
    if let Err(err) = init_logging(&logging) {
        debug!(error = %err, "logging already initialised");
    }
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        build = build_sha(),
        "inplace starting"
    );

    let aliases = AliasStore::discover()
        .context("failed to load alias configuration")
        .map_err(CliError::failure)?;
    debug!(
        source = ?aliases.source(),
        aliases = aliases.len(),
        "alias configuration ready"
    );

    let mut templates: Vec<String> = ordered_templates(&cli, &matches)
        .iter()
        .map(|template| aliases.expand(template).to_string())
        .collect();
    let mut files = cli.files;
    if templates.is_empty() && !files.is_empty() {
        let template = files
            .remove(0)
            .into_os_string()
            .into_string()
            .map_err(|raw| {
                CliError::validation(format!(
                    "filter command is not valid UTF-8: {}",
                    raw.to_string_lossy()
                ))
            })?;
        templates.push(aliases.expand(&template).to_string());
    }

    let gate = SignalGate::new();
    let pipeline = if templates.is_empty() {
        None
    } else {
        Some(
            Pipeline::from_templates(&templates, Arc::clone(&options), &gate)?,
        )
    };
    if files.is_empty() {
        return Err(CliError::NoFiles);
    }
    let pipeline = pipeline.ok_or(CliError::NoFilter)?;

    debug!(
        stages = pipeline.stages().len(),
        files = files.len(),
        dry_run = options.dry_run,
        "starting run"
    );
    let listener = signals::spawn_listener(gate)
        .context("failed to install signal handlers")
        .map_err(CliError::failure)?;
    let outcome = tokio::task::spawn_blocking(move || {
        pipeline.run_with(&files, output::report_outcome)
    })
    .await;
    listener.abort();

    let report = outcome
        .context("filter run did not complete")
        .map_err(CliError::failure)?
        .inspect_err(|err| {
            if let FilterError::Interrupted { signal } = err {
                debug!(signal = %signal, "run interrupted");
            }
        })?;
    output::summarize(&report);
    Ok(())
}

#[derive(Debug, Parser)]
#[command(
    name = "inplace",
    version,
    about = "Edits files in-place through given filter commands.",
    after_help = PLACEHOLDER_HELP
)]
struct Cli {
    /// Edit the original file for each symlink.
    #[arg(short = 'L', long)]
    dereference: bool,

    /// Create a backup file with the SUFFIX for each file; existing backups
    /// are overwritten.
    #[arg(short = 'b', long = "backup-suffix", value_name = "SUFFIX")]
    backup_suffix: Option<String>,

    /// Turn on debug mode.
    #[arg(short = 'D', long)]
    debug: bool,

    /// Run COMMANDLINE for each file (repeatable).
    #[arg(short = 'e', long = "execute", value_name = "COMMANDLINE")]
    execute: Vec<String>,

    /// Run COMMAND with all following arguments until `--` (repeatable).
    #[arg(
        short = 'E',
        long = "execute-args",
        value_name = "COMMAND",
        num_args = 1..,
        allow_hyphen_values = true,
        value_terminator = EXECUTE_ARGS_TERMINATOR
    )]
    execute_args: Vec<String>,

    /// Force editing even if a file is read-only.
    #[arg(short = 'f', long)]
    force: bool,

    /// Make sure to preserve the inode number of each file.
    #[arg(short = 'i', long = "preserve-inode")]
    preserve_inode: bool,

    /// Just show what would have been done.
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// Create a temporary file in the same directory as each replaced file.
    #[arg(short = 's', long = "same-directory")]
    same_directory: bool,

    /// Preserve the access and modification times of each file.
    #[arg(short = 't', long = "preserve-timestamp")]
    preserve_timestamp: bool,

    /// Turn on verbose mode.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Accept empty (zero-sized) output.
    #[arg(short = 'z', long = "accept-empty")]
    accept_empty: bool,

    /// Log output format.
    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        default_value = "pretty",
        env = "INPLACE_LOG_FORMAT"
    )]
    log_format: LogFormat,

    /// Files to edit; without -e or -E the first one is the filter command.
    #[arg(value_name = "FILE", trailing_var_arg = true)]
    files: Vec<PathBuf>,
}

impl Cli {
    fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            dereference: self.dereference,
            backup_suffix: self.backup_suffix.clone(),
            force: self.force,
            preserve_inode: self.preserve_inode,
            preserve_timestamp: self.preserve_timestamp,
            dry_run: self.dry_run,
            same_directory: self.same_directory,
            accept_empty: self.accept_empty,
            verbose: self.verbose || self.debug || self.dry_run,
            debug: self.debug,
        }
    }
}

/// `-e` and `-E` templates in command-line order.
fn ordered_templates(cli: &Cli, matches: &ArgMatches) -> Vec<String> {
    let mut ordered: Vec<(usize, String)> = matches
        .indices_of("execute")
        .into_iter()
        .flatten()
        .zip(cli.execute.iter().cloned())
        .collect();

    if !cli.execute_args.is_empty() {
        let mut indices = matches.indices_of("execute_args").into_iter().flatten();
        for occurrence in matches
            .get_occurrences::<String>("execute_args")
            .into_iter()
            .flatten()
        {
            let words: Vec<&String> = occurrence.collect();
            let Some(first) = indices.next() else {
                break;
            };
            if words.len() > 1 {
                indices.nth(words.len() - 2);
            }
            ordered.push((first, template_from_args(&words)));
        }
    }

    ordered.sort_by_key(|(index, _)| *index);
    ordered.into_iter().map(|(_, template)| template).collect()
}

/// Whether the last `-E` runs to the end of the arguments without `--`.
fn unterminated_execute_args(args: &[OsString]) -> bool {
    args.iter()
        .rposition(|arg| arg == "-E" || arg == "--execute-args")
        .is_some_and(|start| {
            !args[start + 1..]
                .iter()
                .any(|arg| arg == EXECUTE_ARGS_TERMINATOR)
        })
}

#[derive(Debug)]
enum CliError {
    Usage(clap::Error),
    Validation(String),
    NoFiles,
    NoFilter,
    Failure(anyhow::Error),
    Interrupted,
}

type CliResult<T> = Result<T, CliError>;

impl CliError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(err) if !err.use_stderr() => 0,
            Self::Usage(_) => EXIT_USAGE,
            Self::NoFiles => EXIT_NO_FILES,
            Self::Validation(_) | Self::NoFilter | Self::Failure(_) => EXIT_FAILURE,
            Self::Interrupted => EXIT_INTERRUPTED,
        }
    }

    fn display_message(&self) -> String {
        match self {
            Self::Usage(err) => err.to_string(),
            Self::Validation(message) => format!("inplace: {message}"),
            Self::NoFiles => "No files to process given.".to_string(),
            Self::NoFilter => "No filter command line to execute given.".to_string(),
            Self::Failure(error) => format!("inplace: {error:#}"),
            Self::Interrupted => "Interrupted.".to_string(),
        }
    }

    fn report(&self) {
        match self {
            Self::Usage(err) => {
                if let Err(print_err) = err.print() {
                    debug!(error = %print_err, "failed to print usage");
                }
            }
            Self::NoFiles | Self::NoFilter => {
                eprintln!("{}\n", self.display_message());
                if let Err(print_err) = Cli::command().print_help() {
                    debug!(error = %print_err, "failed to print help");
                }
            }
            _ => eprintln!("{}", self.display_message()),
        }
    }
}

impl From<FilterError> for CliError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::Interrupted { .. } => Self::Interrupted,
            other => Self::failure(other),
        }
    }
}
