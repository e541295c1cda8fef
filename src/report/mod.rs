//! # Report Model
//!
//! Accumulates findings from a batch run into a stable, ordered result set.
//! Appends are idempotent per finding key (duplicate suppression is the only
//! merging behavior; nothing is silently dropped), findings keep
//! first-encounter order, and `drain` hands the ordered sequence to the
//! reporting layer. The model itself performs no I/O beyond the optional
//! terminal presentation helpers.

mod finding;

pub use finding::{Finding, FindingKind, SinkCategory};

use colored::*;
use serde::Serialize;
use std::collections::HashSet;

/// Ordered, deduplicated collection of findings for one batch run.
#[derive(Debug, Default)]
pub struct Report {
    findings: Vec<Finding>,
    seen: HashSet<String>,
}

/// Counts of findings by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub external_output: usize,
    pub shared_state: usize,
    pub annotated: usize,
    pub structural: usize,
    pub total: usize,
}

/// Serializable snapshot of a report for machine-readable output.
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub summary: ReportSummary,
    pub findings: &'a [Finding],
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finding unless an equal-keyed one was already recorded.
    /// Returns whether the finding was kept.
    pub fn append(&mut self, finding: Finding) -> bool {
        if !self.seen.insert(finding.key()) {
            return false;
        }
        self.findings.push(finding);
        true
    }

    /// Yields the ordered findings and empties the model.
    pub fn drain(&mut self) -> Vec<Finding> {
        self.seen.clear();
        std::mem::take(&mut self.findings)
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            external_output: 0,
            shared_state: 0,
            annotated: 0,
            structural: 0,
            total: self.findings.len(),
        };

        for finding in &self.findings {
            match &finding.kind {
                FindingKind::Leak {
                    category: SinkCategory::ExternalOutput,
                    ..
                } => summary.external_output += 1,
                FindingKind::Leak {
                    category: SinkCategory::SharedState,
                    ..
                } => summary.shared_state += 1,
                FindingKind::Leak {
                    category: SinkCategory::Annotated,
                    ..
                } => summary.annotated += 1,
                FindingKind::StructuralError { .. } => summary.structural += 1,
            }
        }

        summary
    }

    /// Snapshot for JSON serialization.
    pub fn document(&self) -> ReportDocument<'_> {
        ReportDocument {
            summary: self.summary(),
            findings: &self.findings,
        }
    }

    /// Prints colorized findings to the terminal.
    pub fn print_terminal(&self) {
        if self.findings.is_empty() {
            println!("\n{}", "[+] No information-flow leaks found.".green().bold());
            return;
        }

        println!("\n{}", "[!] Information-Flow Findings:".red().bold());
        println!("{}", "=".repeat(60).cyan());

        for (i, finding) in self.findings.iter().enumerate() {
            finding.print_terminal(i + 1);
        }
    }

    /// Prints summary statistics to the terminal.
    pub fn print_summary(&self) {
        let summary = self.summary();
        println!(
            "{}",
            format!(
                "[*] Summary: {} External | {} Shared-State | {} Annotated | {} Structural",
                summary.external_output, summary.shared_state, summary.annotated, summary.structural
            )
            .bold()
        );

        if summary.total == 0 {
            println!("{}", "[+] No issues found.".green().bold());
        } else {
            println!(
                "{}",
                format!("[!] Total: {} finding(s)", summary.total).red().bold()
            );
        }
    }
}
