use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use operant_core::config::ExpectedResponse;

use crate::consequence::Consequence;
use crate::scoring::{ObservedResponse, Outcome};

/// Immutable log entry for one completed trial. Appended once, never
/// mutated; fault-affected trials carry the flag so analysis can exclude
/// them from behavioral scoring.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrialRecord {
    pub index: u64,
    pub timestamp_utc: DateTime<Utc>,
    pub block_index: u32,
    pub condition: String,
    pub stimulus: String,
    pub expected: ExpectedResponse,
    pub response: ObservedResponse,
    pub outcome: Outcome,
    pub consequence: Consequence,
    pub fault: bool,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink rejected record: {0}")]
    Rejected(String),
}

/// Append-only record sink. The on-disk schema is owned by the excluded
/// logging subsystem; the engine only ever appends.
pub trait TrialSink: Send {
    fn append(&mut self, record: &TrialRecord) -> Result<(), SinkError>;
}

/// In-memory sink used by the test suites.
#[derive(Default)]
pub struct MemorySink {
    pub records: Vec<TrialRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrialSink for MemorySink {
    fn append(&mut self, record: &TrialRecord) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }
}
