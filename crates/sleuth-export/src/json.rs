//! JSON report document.
//!
//! A flat, serializable snapshot of one analysis: the grouped findings as
//! shown by the [`ReportIndex`], the status messages observed during the
//! run and the run diagnostics.

use serde::{Deserialize, Serialize};
use sleuth_core::geometry::anchor_bounds;
use sleuth_core::{
    Anchor, AnalysisReport, Dimensions, Finding, Point, Rect, ReportGroup, ReportIndex,
    RunDiagnostics, Severity,
};

/// Errors from serializing or parsing a report document.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid report JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The secondary anchor of a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub location: Point,
    pub extent: String,
    pub bounds: Rect,
}

impl From<&Anchor> for SourceDocument {
    fn from(anchor: &Anchor) -> Self {
        Self {
            location: anchor.location,
            extent: anchor.extent.kind().to_owned(),
            bounds: anchor_bounds(anchor),
        }
    }
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingDocument {
    pub id: u64,
    pub label: String,
    pub severity: Severity,
    pub location: Point,
    pub extent: String,
    pub bounds: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceDocument>,
}

impl From<&Finding> for FindingDocument {
    fn from(finding: &Finding) -> Self {
        let primary = finding.primary();
        Self {
            id: finding.id().get(),
            label: finding.label().to_owned(),
            severity: finding.severity(),
            location: primary.location,
            extent: primary.extent.kind().to_owned(),
            bounds: anchor_bounds(primary),
            source: finding.source().map(SourceDocument::from),
        }
    }
}

/// The findings of one analyser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDocument {
    pub label: String,
    pub description: String,
    pub findings: Vec<FindingDocument>,
}

impl From<&ReportGroup> for GroupDocument {
    fn from(group: &ReportGroup) -> Self {
        Self {
            label: group.label().to_owned(),
            description: group.description().to_owned(),
            findings: group
                .findings()
                .iter()
                .map(|f| FindingDocument::from(f.as_ref()))
                .collect(),
        }
    }
}

/// Serializable snapshot of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDocument {
    pub image: Dimensions,
    pub groups: Vec<GroupDocument>,
    /// Status messages in the order they were observed.
    #[serde(default)]
    pub status_log: Vec<String>,
    pub diagnostics: RunDiagnostics,
}

impl ReportDocument {
    /// Snapshot `index` (built from `report`) together with the observed
    /// status messages.
    #[must_use]
    pub fn new(index: &ReportIndex, report: &AnalysisReport, status_log: Vec<String>) -> Self {
        Self {
            image: report.image().dimensions(),
            groups: index.groups().iter().map(GroupDocument::from).collect(),
            status_log,
            diagnostics: report.diagnostics().clone(),
        }
    }

    /// Total number of findings across all groups.
    #[must_use]
    pub fn total_findings(&self) -> usize {
        self.groups.iter().map(|g| g.findings.len()).sum()
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document previously written by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Json`] if `json` is not a report document.
    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        Ok(serde_json::from_str(json)?)
    }
}
