//! Bounded history of finalized transitions

use std::collections::VecDeque;
use std::sync::Mutex;

use super::record::TransitionRecord;

/// Default number of records kept
pub const DEFAULT_HISTORY: usize = 50;

/// Newest-first, fixed-capacity record history
#[derive(Debug)]
pub struct TransitionLog {
    capacity: usize,
    records: Mutex<VecDeque<TransitionRecord>>,
}

impl TransitionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, record: TransitionRecord) {
        let mut records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.push_front(record);
        records.truncate(self.capacity);
    }

    /// All kept records, newest first
    pub fn records(&self) -> Vec<TransitionRecord> {
        match self.records.lock() {
            Ok(records) => records.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn latest(&self) -> Option<TransitionRecord> {
        self.records.lock().ok().and_then(|r| r.front().cloned())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TransitionLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}
