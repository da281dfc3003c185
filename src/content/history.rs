//! Conversation history partition.

use crate::content::{AddOutcome, ContentIndex, HistoryRecord, MessageRole};
use crate::error::RagResult;

/// Current time as fractional seconds since the Unix epoch.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

impl ContentIndex<HistoryRecord> {
    /// Stores one message; `timestamp` defaults to now.
    pub fn add_message(
        &mut self,
        external_id: impl Into<String>,
        role: MessageRole,
        text: impl Into<String>,
        timestamp: Option<f64>,
    ) -> RagResult<AddOutcome> {
        self.add(HistoryRecord {
            external_id: external_id.into(),
            role,
            text: text.into(),
            timestamp: timestamp.unwrap_or_else(now_timestamp),
        })
    }

    /// The `count * 2` most recent messages of any role, newest first.
    ///
    /// `count` counts exchanges, each being a user and an assistant message.
    pub fn get_recent(&self, count: usize) -> Vec<HistoryRecord> {
        let mut messages: Vec<&HistoryRecord> = self.records().map(|(_, r)| r).collect();
        messages.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
        messages
            .into_iter()
            .take(count.saturating_mul(2))
            .cloned()
            .collect()
    }
}
