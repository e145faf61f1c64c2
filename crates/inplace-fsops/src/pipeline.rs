//! Sequencing of filter stages over a list of files.
//!
//! # Design
//! - Files are processed strictly one after another.
//! - With several stages, data flows through one hand-off temp per file:
//!   the first stage writes it, middle stages edit it, the last stage reads it
//!   back onto the real file.
//! - Per-file failures are collected and the run moves on; fatal and
//!   interrupted errors end the run immediately, after the file's temps
//!   have been released.

use std::path::Path;
use std::sync::Arc;

use inplace_config::FilterOptions;
use tracing::debug;

use crate::error::{FilterError, FilterResult};
use crate::interrupt::SignalGate;
use crate::model::{FileOutcome, RunReport, StageReport};
use crate::registry::TempRegistry;
use crate::stage::FilterStage;

/// Ordered filter stages plus the temp registry they share.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<FilterStage>,
    options: Arc<FilterOptions>,
    registry: TempRegistry,
}

impl Pipeline {
    /// Build a pipeline from compiled stages.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::NoStages`] when `stages` is empty.
    pub fn new(stages: Vec<FilterStage>, options: Arc<FilterOptions>) -> FilterResult<Self> {
        if stages.is_empty() {
            return Err(FilterError::NoStages);
        }
        Ok(Self {
            stages,
            options,
            registry: TempRegistry::new(),
        })
    }

    /// Compile every template and build a pipeline from them.
    ///
    /// # Errors
    ///
    /// Returns the first template error, or [`FilterError::NoStages`] when no
    /// template is given.
    pub fn from_templates<S: AsRef<str>>(
        templates: &[S],
        options: Arc<FilterOptions>,
        gate: &SignalGate,
    ) -> FilterResult<Self> {
        let stages = templates
            .iter()
            .map(|template| FilterStage::new(template.as_ref(), Arc::clone(&options), gate.clone()))
            .collect::<FilterResult<Vec<_>>>()?;
        Self::new(stages, options)
    }

    /// Compiled stages, in execution order.
    #[must_use]
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// Temp registry shared by the stages.
    #[must_use]
    pub const fn registry(&self) -> &TempRegistry {
        &self.registry
    }

    /// Process every file in order.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Fatal`] or [`FilterError::Interrupted`] as soon
    /// as either occurs; every other failure is recorded in the report.
    pub fn run<P: AsRef<Path>>(&self, files: &[P]) -> FilterResult<RunReport> {
        self.run_with(files, |_| {})
    }

    /// Process every file in order, handing each outcome to `observe` as soon
    /// as it is known.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`].
    pub fn run_with<P, F>(&self, files: &[P], mut observe: F) -> FilterResult<RunReport>
    where
        P: AsRef<Path>,
        F: FnMut(&FileOutcome),
    {
        let mut report = RunReport::default();
        for file in files {
            let path = file.as_ref();
            let result = match self.process(path) {
                Err(err) if !err.is_per_file() => return Err(err),
                result => result,
            };
            if let Err(err) = &result {
                debug!(path = %path.display(), reason = %err, "skipped");
            }
            let outcome = FileOutcome {
                path: path.to_path_buf(),
                result,
            };
            observe(&outcome);
            report.push(outcome);
        }
        Ok(report)
    }

    /// Run every stage over a single file.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; later stages are not run.
    pub fn process(&self, file: &Path) -> FilterResult<StageReport> {
        match self.stages.as_slice() {
            [] => Err(FilterError::NoStages),
            [only] => only.filter_destructive(&self.registry, file, file),
            [first, middle @ .., last] => {
                let handoff = self
                    .registry
                    .allocate(file, self.options.temp_location())?;
                let first_report = first.filter(&self.registry, file, file, handoff.path())?;
                for stage in middle {
                    stage.filter_destructive(&self.registry, file, handoff.path())?;
                }
                let last_report = last.filter(&self.registry, file, handoff.path(), file)?;
                Ok(StageReport {
                    bytes_before: first_report.bytes_before,
                    ..last_report
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;

    #[test]
    fn empty_pipeline_is_rejected() {
        let options = Arc::new(FilterOptions::default());
        let err = Pipeline::new(Vec::new(), Arc::clone(&options)).err();
        assert!(matches!(err, Some(FilterError::NoStages)));

        let none: [&str; 0] = [];
        let err = Pipeline::from_templates(&none, options, &SignalGate::new()).err();
        assert!(matches!(err, Some(FilterError::NoStages)));
    }

    #[test]
    fn bad_template_fails_construction() {
        let err = Pipeline::from_templates(
            &["cat", "cat > %2"],
            Arc::new(FilterOptions::default()),
            &SignalGate::new(),
        )
        .err();
        assert!(matches!(err, Some(FilterError::Template(_))));
    }

    #[test]
    fn from_templates_preserves_order() -> Result<()> {
        let pipeline = Pipeline::from_templates(
            &["sort", "sed -i '' %1", "uniq %1 %2"],
            Arc::new(FilterOptions::default()),
            &SignalGate::new(),
        )?;
        let arities: Vec<u8> = pipeline
            .stages()
            .iter()
            .map(|stage| stage.formatter().arity())
            .collect();
        assert_eq!(arities, vec![2, 1, 2]);
        assert!(pipeline.registry().is_empty());
        Ok(())
    }
}
