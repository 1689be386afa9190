//! The pluggable analyser contract.
//!
//! An [`Analyser`] consumes the shared, immutable [`ImageMatrix`] and
//! returns its findings. It may run for a long time, in which case it
//! should report its own progress through the [`Reporter`] it is handed;
//! the orchestrator maps that onto the progress of the whole run.
//!
//! # Strategy pattern
//!
//! Analysers are trait objects so that the set of enabled analysers can
//! be chosen at runtime. All of them share one raster, so implementations
//! must be `Send + Sync` and must not rely on interior mutation of the
//! image.

use std::sync::Arc;

use crate::finding::Finding;
use crate::orchestrator::RunHub;
use crate::types::ImageMatrix;

/// Errors an analyser may raise during its invocation.
///
/// Both variants are recovered by the orchestrator: the analyser
/// contributes no findings and the failure is narrated as a status event.
#[derive(Debug, thiserror::Error)]
pub enum AnalyserError {
    /// The analysis itself failed.
    #[error("analysis failed: {0}")]
    Failed(String),

    /// The analyser cannot handle this raster (size, colour model, ...).
    #[error("unsupported input: {0}")]
    Unsupported(String),
}

/// A named unit that computes findings from a raster.
pub trait Analyser: Send + Sync {
    /// Declared display name, or `None` for an anonymous analyser.
    ///
    /// Anonymous analysers are labelled "Unknown analyser #N" in reports.
    fn name(&self) -> Option<&str> {
        None
    }

    /// One-line description of what the analyser looks for.
    fn description(&self) -> &str {
        ""
    }

    /// Run the analysis.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyserError`] when the analysis cannot complete. The
    /// run continues with the remaining analysers.
    fn analyse(
        &self,
        image: &ImageMatrix,
        reporter: &Reporter<'_>,
    ) -> Result<Vec<Finding>, AnalyserError>;
}

/// Shared handle to an analyser. Identity is by pointer.
pub type AnalyserHandle = Arc<dyn Analyser>;

/// Name used in event narration for an analyser without a declared name.
pub const ANONYMOUS_ANALYSER: &str = "Unknown analyser";

/// Display name for narration: the declared name or a generic fallback.
#[must_use]
pub fn display_name(analyser: &dyn Analyser) -> &str {
    analyser.name().unwrap_or(ANONYMOUS_ANALYSER)
}

/// Channel through which a running analyser reports on itself.
///
/// Progress passed to [`progress`](Self::progress) is the fraction of
/// *this analyser's* work, in `[0, 1]`. It is capped just below the
/// analyser's completion point, which only the orchestrator records.
pub struct Reporter<'a> {
    hub: Option<&'a RunHub<'a>>,
    slot: usize,
}

impl<'a> Reporter<'a> {
    pub(crate) const fn new(hub: &'a RunHub<'a>, slot: usize) -> Self {
        Self {
            hub: Some(hub),
            slot,
        }
    }

    /// A reporter that discards everything. Useful for calling an
    /// analyser outside of a run.
    #[must_use]
    pub const fn silent() -> Self {
        Self { hub: None, slot: 0 }
    }

    /// Report the fraction of this analyser's work completed so far.
    pub fn progress(&self, fraction: f32) {
        if let Some(hub) = self.hub {
            hub.report_slot_progress(self.slot, fraction);
        }
    }

    /// Announce a new stage within the analyser.
    pub fn stage(&self, stage: impl Into<String>) {
        if let Some(hub) = self.hub {
            hub.stage(stage.into());
        }
    }

    /// Append a line to the run's status narration.
    pub fn status(&self, status: impl Into<String>) {
        if let Some(hub) = self.hub {
            hub.status(status.into());
        }
    }

    /// Whether the run has been cancelled. Long-running analysers may
    /// poll this and bail out early.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.hub.is_some_and(RunHub::is_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Anonymous;

    impl Analyser for Anonymous {
        fn analyse(
            &self,
            _image: &ImageMatrix,
            _reporter: &Reporter<'_>,
        ) -> Result<Vec<Finding>, AnalyserError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn default_name_is_anonymous() {
        assert!(Anonymous.name().is_none());
        assert_eq!(display_name(&Anonymous), ANONYMOUS_ANALYSER);
        assert_eq!(Anonymous.description(), "");
    }

    #[test]
    fn silent_reporter_is_inert() {
        let reporter = Reporter::silent();
        reporter.progress(0.5);
        reporter.stage("stage");
        reporter.status("status");
        assert!(!reporter.is_cancelled());
    }

    #[test]
    fn error_display() {
        let err = AnalyserError::Failed("out of memory".to_string());
        assert_eq!(err.to_string(), "analysis failed: out of memory");
        let err = AnalyserError::Unsupported("16-bit raster".to_string());
        assert_eq!(err.to_string(), "unsupported input: 16-bit raster");
    }
}
