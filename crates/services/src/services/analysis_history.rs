//! Session-only record of recent analyses, newest first.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::text::preview;
use uuid::Uuid;

pub const HISTORY_CAPACITY: usize = 10;
pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisHistoryEntry {
    pub id: Uuid,
    pub item_name: String,
    pub timestamp: DateTime<Utc>,
    pub metadata_preview: String,
}

/// Bounded ring buffer; appending past capacity evicts the oldest entry.
/// Nothing reads it back during enrichment.
#[derive(Debug, Default)]
pub struct AnalysisHistory {
    entries: Mutex<VecDeque<AnalysisHistoryEntry>>,
}

impl AnalysisHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AnalysisHistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, item_name: &str, metadata: &str) -> AnalysisHistoryEntry {
        let entry = AnalysisHistoryEntry {
            id: Uuid::new_v4(),
            item_name: item_name.to_string(),
            timestamp: Utc::now(),
            metadata_preview: preview(metadata.trim(), PREVIEW_CHARS),
        };

        let mut entries = self.lock();
        entries.push_front(entry.clone());
        entries.truncate(HISTORY_CAPACITY);
        entry
    }

    /// Snapshot, index 0 is the most recent
    pub fn entries(&self) -> Vec<AnalysisHistoryEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
