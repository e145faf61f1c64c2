//! User-facing reporting of per-file outcomes.

use inplace_fsops::{FileOutcome, RunReport};
use tracing::info;

/// Print the skip line for a file that was not edited.
pub(crate) fn report_outcome(outcome: &FileOutcome) {
    if let Some(line) = skip_line(outcome) {
        eprintln!("{line}");
    }
}

/// `<path>: skipped: <reason>` for skipped files.
pub(crate) fn skip_line(outcome: &FileOutcome) -> Option<String> {
    outcome
        .skip_reason()
        .map(|reason| format!("{}: skipped: {reason}", outcome.path.display()))
}

pub(crate) fn summarize(report: &RunReport) {
    info!(
        edited = report.edited(),
        skipped = report.skipped(),
        "run complete"
    );
}
