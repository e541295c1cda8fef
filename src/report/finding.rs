//! # Finding Definitions
//!
//! Data structures for individual analysis results: a source-to-sink leak or
//! a structural diagnostic for a method the analyzer had to skip.

use colored::*;
use serde::{Deserialize, Serialize};

/// How a sink exposes data, for independent filtering and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkCategory {
    /// Data leaves through the caller: return values and thrown exceptions.
    ExternalOutput,

    /// Data lands in static/shared state observable by other code.
    SharedState,

    /// Data reaches a local the front-end explicitly marked as a sink.
    Annotated,
}

impl SinkCategory {
    /// Returns a colored label for terminal output.
    pub fn colored_label(&self) -> ColoredString {
        match self {
            SinkCategory::ExternalOutput => "EXTERNAL".white().on_red().bold(),
            SinkCategory::SharedState => "SHARED".black().on_yellow().bold(),
            SinkCategory::Annotated => "ANNOTATED".white().on_magenta().bold(),
        }
    }
}

impl std::fmt::Display for SinkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkCategory::ExternalOutput => write!(f, "external-output"),
            SinkCategory::SharedState => write!(f, "shared-state"),
            SinkCategory::Annotated => write!(f, "annotated"),
        }
    }
}

/// What a finding reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FindingKind {
    /// A sensitive source reaches an observable sink.
    Leak {
        /// The source parameter the taint originated from.
        source: String,

        /// Sink label, e.g. `<return>`, `<throw>`, `<static counter>`.
        sink: String,

        category: SinkCategory,
    },

    /// The method's input graph was malformed and analysis was skipped.
    StructuralError { detail: String },
}

/// One immutable analysis result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier of the analyzed method.
    pub method: String,

    #[serde(flatten)]
    pub kind: FindingKind,
}

impl Finding {
    pub fn leak(method: &str, source: &str, sink: &str, category: SinkCategory) -> Self {
        Self {
            method: method.to_string(),
            kind: FindingKind::Leak {
                source: source.to_string(),
                sink: sink.to_string(),
                category,
            },
        }
    }

    pub fn structural(method: &str, detail: &str) -> Self {
        Self {
            method: method.to_string(),
            kind: FindingKind::StructuralError {
                detail: detail.to_string(),
            },
        }
    }

    /// Deduplication key: multiple paths between the same source and sink
    /// collapse into one finding.
    pub fn key(&self) -> String {
        match &self.kind {
            FindingKind::Leak { source, sink, .. } => {
                format!("{}::{}->{}", self.method, source, sink)
            }
            FindingKind::StructuralError { .. } => format!("{}::<structural>", self.method),
        }
    }

    /// Prints the finding to terminal with color formatting.
    pub fn print_terminal(&self, index: usize) {
        match &self.kind {
            FindingKind::Leak {
                source,
                sink,
                category,
            } => {
                println!(
                    "{} {} {} {} {} {}",
                    format!("#{}", index).cyan().bold(),
                    category.colored_label(),
                    self.method.white().bold(),
                    source.yellow(),
                    "->".dimmed(),
                    sink.red()
                );
            }
            FindingKind::StructuralError { detail } => {
                println!(
                    "{} {} {} {}",
                    format!("#{}", index).cyan().bold(),
                    "STRUCTURAL".white().on_bright_blue().bold(),
                    self.method.white().bold(),
                    detail.dimmed()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_source_and_sink_share_a_key() {
        let a = Finding::leak("m", "x", "<return>", SinkCategory::ExternalOutput);
        let b = Finding::leak("m", "x", "<return>", SinkCategory::ExternalOutput);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn different_sinks_have_different_keys() {
        let a = Finding::leak("m", "x", "<return>", SinkCategory::ExternalOutput);
        let b = Finding::leak("m", "x", "<throw>", SinkCategory::ExternalOutput);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn finding_serializes_with_flattened_kind() {
        let f = Finding::leak("m", "x", "<return>", SinkCategory::ExternalOutput);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["kind"], "leak");
        assert_eq!(json["method"], "m");
        assert_eq!(json["sink"], "<return>");
    }
}
