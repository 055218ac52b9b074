//! Per-run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, PipelineError};
use crate::state_machine::PipelineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Daily,
    Periodic,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Periodic => "periodic",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts, outcome and ordered error list of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunStats {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: PipelineState,
    /// Items returned by the collector.
    pub collected: usize,
    /// Collected items that were new to the store.
    pub stored: usize,
    pub analyzed: usize,
    pub extraction_failed: usize,
    /// Items selected for the digest after filtering and deduplication.
    pub curated: usize,
    pub delivered: bool,
    /// Embedded items assigned to a cluster (periodic runs).
    pub clustered: usize,
    pub trend_report_delivered: bool,
    pub errors: Vec<PipelineError>,
}

impl PipelineRunStats {
    pub fn new(kind: RunKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            finished_at: None,
            state: PipelineState::Init,
            collected: 0,
            stored: 0,
            analyzed: 0,
            extraction_failed: 0,
            curated: 0,
            delivered: false,
            clustered: 0,
            trend_report_delivered: false,
            errors: Vec::new(),
        }
    }

    pub fn record_error(
        &mut self,
        phase: PipelineState,
        kind: ErrorKind,
        message: impl Into<String>,
        item_key: Option<&str>,
    ) {
        self.errors.push(PipelineError {
            phase,
            kind,
            message: message.into(),
            item_key: item_key.map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    pub fn finish(&mut self, state: PipelineState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    pub fn success(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &PipelineError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}
