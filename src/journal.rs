//! Ordered, append-only record of the steps attempted during one merge run.

use serde::{Deserialize, Serialize};

/// The kind of work a step performs. Order of declaration is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Commit,
    PushCurrent,
    FetchTarget,
    CheckoutTarget,
    PullTarget,
    MergeIntoTarget,
    PushTarget,
    CheckoutBack,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Commit => "commit",
            StepKind::PushCurrent => "push-current",
            StepKind::FetchTarget => "fetch-target",
            StepKind::CheckoutTarget => "checkout-target",
            StepKind::PullTarget => "pull-target",
            StepKind::MergeIntoTarget => "merge-current-into-target",
            StepKind::PushTarget => "push-target",
            StepKind::CheckoutBack => "checkout-back",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// One attempted unit of work and what it printed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: StepKind,
    pub label: String,
    pub outcome: Outcome,
    pub output: String,
}

impl LogEntry {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }

    /// True when there is captured output worth showing.
    pub fn has_output(&self) -> bool {
        !self.output.trim().is_empty()
    }
}

/// Journal of a single run. A new run starts with a new, empty journal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    entries: Vec<LogEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, kind: StepKind, label: impl Into<String>, output: impl Into<String>) -> &LogEntry {
        self.push(kind, label.into(), Outcome::Success, output.into())
    }

    pub fn record_failure(&mut self, kind: StepKind, label: impl Into<String>, output: impl Into<String>) -> &LogEntry {
        self.push(kind, label.into(), Outcome::Failure, output.into())
    }

    fn push(&mut self, kind: StepKind, label: String, outcome: Outcome, output: String) -> &LogEntry {
        self.entries.push(LogEntry { kind, label, outcome, output });
        &self.entries[self.entries.len() - 1]
    }

    /// True iff at least one recorded entry failed.
    pub fn has_error(&self) -> bool {
        self.entries.iter().any(LogEntry::is_failure)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kinds of all recorded entries, in order.
    pub fn kinds(&self) -> Vec<StepKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    pub fn find(&self, kind: StepKind) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }
}
