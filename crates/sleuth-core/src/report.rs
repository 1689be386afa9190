//! The report index: a completed run grouped for navigation.
//!
//! One [`ReportGroup`] per analyser, in submission order, each holding
//! that analyser's findings in the order it returned them. Analysers
//! without a declared name are labelled "Unknown analyser #N", numbered
//! in encounter order. Labels never repeat within one index.

use std::collections::{BTreeMap, HashSet};

use crate::finding::{FindingId, FindingRef, Severity};
use crate::orchestrator::AnalysisReport;

/// One analyser's findings under a unique label.
#[derive(Debug, Clone)]
pub struct ReportGroup {
    label: String,
    description: String,
    findings: Vec<FindingRef>,
}

impl ReportGroup {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn findings(&self) -> &[FindingRef] {
        &self.findings
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.findings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Read-only, labelled view of a completed run.
#[derive(Debug, Clone, Default)]
pub struct ReportIndex {
    groups: Vec<ReportGroup>,
}

impl ReportIndex {
    /// Group a completed run's findings by analyser.
    #[must_use]
    pub fn build(report: &AnalysisReport) -> Self {
        let mut used = HashSet::new();
        let mut anonymous = 0_usize;

        let groups = report
            .entries()
            .iter()
            .map(|entry| {
                let analyser = entry.analyser();
                let base = analyser.name().map_or_else(
                    || {
                        anonymous += 1;
                        format!("Unknown analyser #{anonymous}")
                    },
                    str::to_string,
                );
                let label = unique_label(&mut used, base);
                ReportGroup {
                    label,
                    description: analyser.description().to_string(),
                    findings: entry.findings().to_vec(),
                }
            })
            .collect();

        Self { groups }
    }

    #[must_use]
    pub fn groups(&self) -> &[ReportGroup] {
        &self.groups
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[must_use]
    pub fn total_findings(&self) -> usize {
        self.groups.iter().map(ReportGroup::len).sum()
    }

    /// Look up a finding by identity, with the label of its group.
    #[must_use]
    pub fn find(&self, id: FindingId) -> Option<(&str, &FindingRef)> {
        self.groups.iter().find_map(|group| {
            group
                .findings
                .iter()
                .find(|f| f.id() == id)
                .map(|f| (group.label.as_str(), f))
        })
    }

    /// Number of findings at each severity. Absent levels are omitted.
    #[must_use]
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for finding in self.groups.iter().flat_map(|g| g.findings.iter()) {
            *counts.entry(finding.severity()).or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn highest_severity(&self) -> Option<Severity> {
        self.groups
            .iter()
            .flat_map(|g| g.findings.iter())
            .map(|f| f.severity())
            .max()
    }
}

/// Claim `base`, or the first free `base (n)` if it is already taken.
fn unique_label(used: &mut HashSet<String>, base: String) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2_usize;
    loop {
        let candidate = format!("{base} ({n})");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
