//! Per-unit outcomes and run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{error, warn};

use crate::error::Result;

/// Final status of one work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    /// All statements executed.
    Done,

    /// Target already in place; nothing executed.
    Skipped,

    /// A statement was rejected by the warehouse.
    Failed,

    /// Orchestration failed (connection, existence check, task panic).
    Error,
}

impl UnitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOutcome::Done => "done",
            UnitOutcome::Skipped => "skipped",
            UnitOutcome::Failed => "failed",
            UnitOutcome::Error => "error",
        }
    }

    /// Whether the unit needs another run.
    pub fn needs_retry(&self) -> bool {
        matches!(self, UnitOutcome::Failed | UnitOutcome::Error)
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Totals per outcome kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub error: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.done + self.skipped + self.failed + self.error
    }
}

/// Collects exactly one outcome per unit id.
#[derive(Debug, Clone, Default)]
pub struct OutcomeSummary {
    outcomes: BTreeMap<String, UnitOutcome>,
}

impl OutcomeSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a unit's result; errors become [`UnitOutcome::Error`].
    ///
    /// The first outcome recorded for an id wins.
    pub fn record(&mut self, id: &str, result: Result<UnitOutcome>) -> UnitOutcome {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}: {}", id, e);
                UnitOutcome::Error
            }
        };
        if let Some(existing) = self.outcomes.get(id) {
            warn!(
                "{}: outcome already recorded as {}, ignoring {}",
                id, existing, outcome
            );
            return *existing;
        }
        self.outcomes.insert(id.to_string(), outcome);
        outcome
    }

    pub fn get(&self, id: &str) -> Option<UnitOutcome> {
        self.outcomes.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &BTreeMap<String, UnitOutcome> {
        &self.outcomes
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for outcome in self.outcomes.values() {
            match outcome {
                UnitOutcome::Done => counts.done += 1,
                UnitOutcome::Skipped => counts.skipped += 1,
                UnitOutcome::Failed => counts.failed += 1,
                UnitOutcome::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Units that ended `Failed` or `Error`.
    pub fn failed_units(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.needs_retry())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Result of a scheduled run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Which phase produced this summary ("databases", "tables", "merge").
    pub phase: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Units submitted.
    pub units_total: usize,

    pub counts: OutcomeCounts,

    /// Units that ended failed or in error.
    pub failed_units: Vec<String>,

    /// Outcome per unit id.
    pub outcomes: BTreeMap<String, UnitOutcome>,
}

impl RunSummary {
    pub fn new(phase: &str, started_at: DateTime<Utc>, summary: &OutcomeSummary) -> Self {
        let completed_at = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            phase: phase.to_string(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            units_total: summary.len(),
            counts: summary.counts(),
            failed_units: summary.failed_units(),
            outcomes: summary.outcomes().clone(),
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
