//! The run report: one entry per resource execution, in execution order.

use serde::{Deserialize, Serialize};

/// Outcome of one resource execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The provider mutated the system
    Updated,
    /// Current state already matched desired state
    UpToDate,
    /// A guard suppressed execution
    Skipped {
        /// Which guard fired
        reason: String,
    },
    /// The provider (or a guard evaluation) failed
    Failed {
        /// The error, flattened to a message
        error: String,
    },
}

/// One line of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Resource identity, as `type[name]`
    pub resource: String,
    /// The action that was (or would have been) applied
    pub action: String,
    /// Whether the resource's updated flag became true
    pub updated: bool,
    /// What happened
    pub outcome: Outcome,
}

/// The ordered report for one run.
///
/// Resources never reached (because of an abort) are simply absent; partial
/// convergence is observable, not discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Entries in execution order; a notified resource appears once per
    /// execution
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    /// Append one entry.
    pub fn record(&mut self, resource: String, action: String, outcome: Outcome) {
        let updated = matches!(outcome, Outcome::Updated);
        self.entries.push(ReportEntry {
            resource,
            action,
            updated,
            outcome,
        });
    }

    /// Identities of resources that updated, in execution order.
    pub fn updated_resources(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.updated)
            .map(|e| e.resource.as_str())
            .collect()
    }

    /// Aggregate counts.
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for entry in &self.entries {
            match entry.outcome {
                Outcome::Updated => summary.updated += 1,
                Outcome::UpToDate => summary.up_to_date += 1,
                Outcome::Skipped { .. } => summary.skipped += 1,
                Outcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

/// Aggregate counts over a run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub updated: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ReportSummary {
    /// Total entries counted.
    pub fn total(&self) -> usize {
        self.updated + self.up_to_date + self.skipped + self.failed
    }

    /// Whether nothing failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_outcome() {
        let mut report = RunReport::default();
        report.record("package[nginx]".into(), "install".into(), Outcome::Updated);
        report.record("file[motd]".into(), "create".into(), Outcome::UpToDate);
        report.record(
            "service[ntp]".into(),
            "start".into(),
            Outcome::Skipped { reason: "not_if".into() },
        );

        let summary = report.summary();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.up_to_date, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total(), 3);
        assert!(summary.is_success());
        assert_eq!(report.updated_resources(), vec!["package[nginx]"]);
    }
}
