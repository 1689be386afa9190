//! Run diagnostics: timing, finding counts, and outcome per analyser.
//!
//! Every orchestrated run collects diagnostics alongside its findings.
//! They are also the one place where a failed analyser can be told apart
//! from one that legitimately found nothing: the report tree shows both
//! as empty groups.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::orchestrator::ExecutionMode;
use crate::types::Dimensions;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// How one analyser's invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Outcome {
    /// The analyser returned its findings (possibly none).
    Completed,
    /// The analyser raised an error or panicked; it contributed nothing.
    Failed(String),
}

impl Outcome {
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Diagnostics for a single analyser invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyserDiagnostics {
    /// Narration name of the analyser (declared name or generic fallback).
    pub name: String,
    /// Wall-clock duration of the invocation (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Number of findings contributed.
    pub finding_count: usize,
    pub outcome: Outcome,
}

/// Diagnostics collected from one orchestrated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Raster the run analysed.
    pub image: Dimensions,
    /// Whether analysers ran one after another or concurrently.
    pub execution: ExecutionMode,
    /// One entry per analyser, in submission order.
    pub analysers: Vec<AnalyserDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl RunDiagnostics {
    /// Findings contributed across all analysers.
    #[must_use]
    pub fn total_findings(&self) -> usize {
        self.analysers.iter().map(|a| a.finding_count).sum()
    }

    /// Number of analysers whose invocation failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.analysers.iter().filter(|a| a.outcome.is_failed()).count()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Analysis Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.image.width,
            self.image.height,
            self.image.pixel_count(),
        ));
        lines.push(format!("Execution: {:?}", self.execution));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<32} {:>10} {:>9}  {}",
            "Analyser", "Duration", "Findings", "Outcome"
        ));
        lines.push("-".repeat(80));

        for diag in &self.analysers {
            let ms = duration_ms(diag.duration);
            let outcome = match &diag.outcome {
                Outcome::Completed => "completed".to_string(),
                Outcome::Failed(message) => format!("FAILED: {message}"),
            };
            lines.push(format!(
                "{:<32} {ms:>8.3}ms {:>9}  {outcome}",
                diag.name, diag.finding_count,
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Analysers: {}  |  Failed: {}  |  Findings: {}",
            self.analysers.len(),
            self.failed_count(),
            self.total_findings(),
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
