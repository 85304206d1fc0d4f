use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use simrun_core::Metadata;

/// Ordered failure records keyed by runner identifier.
pub type FailureLedger = IndexMap<String, FailureRecord>;

/// What was known about a job when its failure was collected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub return_code: i32,
    /// Independent copy of the runner's metadata.
    pub metadata: Metadata,
    /// Head of the output file, when there was one to read.
    pub output_excerpt: Option<String>,
    /// Full size of the output file. Exceeds the excerpt length when it was cut.
    pub output_bytes: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(return_code: i32, metadata: Metadata, output_excerpt: Option<String>) -> Self {
        Self {
            return_code,
            metadata,
            output_excerpt,
            output_bytes: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_output_bytes(mut self, bytes: u64) -> Self {
        self.output_bytes = Some(bytes);
        self
    }
}
