//! Append-only record of the hops a chain went through.

use crate::types::RedirectRecord;

/// Redirect history of one request; records nothing unless tracking is enabled.
#[derive(Debug, Clone, Default)]
pub(crate) struct RedirectHistory {
    enabled: bool,
    records: Vec<RedirectRecord>,
}

impl RedirectHistory {
    pub(crate) fn new(enabled: bool) -> Self {
        RedirectHistory {
            enabled,
            records: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, record: impl FnOnce() -> RedirectRecord) {
        if self.enabled {
            self.records.push(record());
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<RedirectRecord> {
        self.records.clone()
    }
}
