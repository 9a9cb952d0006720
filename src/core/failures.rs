//! Per-operation failure tracking used to detect a caller stuck retrying the
//! same invalid call.
//!
//! Each operation name owns an independent record. A record counts
//! consecutive failures while they stay inside [`FAILURE_WINDOW`] of each
//! other and is dropped entirely on the next successful validation. When a
//! streak reaches [`LOOP_THRESHOLD`] with the latest gap under
//! [`LOOP_WINDOW`], the failure escalates to a loop verdict.

use crate::core::clock::{Clock, SystemClock};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const FAILURE_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const LOOP_WINDOW: Duration = Duration::from_secs(2 * 60);
pub const LOOP_THRESHOLD: u32 = 3;
pub const HISTORY_LIMIT: usize = 5;
pub const LOOP_HISTORY_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub count: u32,
    pub last_failure: Instant,
    errors: VecDeque<String>,
}

impl FailureRecord {
    fn first(now: Instant, message: String) -> Self {
        let mut errors = VecDeque::with_capacity(HISTORY_LIMIT);
        errors.push_back(message);
        Self {
            count: 1,
            last_failure: now,
            errors,
        }
    }

    fn push_error(&mut self, message: String) {
        if self.errors.len() == HISTORY_LIMIT {
            self.errors.pop_front();
        }
        self.errors.push_back(message);
    }

    pub fn errors(&self) -> impl Iterator<Item = &String> {
        self.errors.iter()
    }

    /// Most recent distinct messages, oldest first.
    fn recent_distinct(&self, limit: usize) -> Vec<String> {
        let mut picked: Vec<String> = Vec::with_capacity(limit);
        for message in self.errors.iter().rev() {
            if picked.len() == limit {
                break;
            }
            if !picked.contains(message) {
                picked.push(message.clone());
            }
        }
        picked.reverse();
        picked
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureVerdict {
    /// Report the failure as-is.
    Plain,
    /// The caller is looping; report guidance instead.
    Loop { attempts: u32, history: Vec<String> },
}

pub struct FailureTracker {
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, FailureRecord>>,
}

impl FailureTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_failure(&self, operation: &str, message: impl Into<String>) -> FailureVerdict {
        let message = message.into();
        let now = self.clock.now();
        let mut records = self.lock();

        let Some(record) = records.get_mut(operation) else {
            records.insert(operation.to_string(), FailureRecord::first(now, message));
            return FailureVerdict::Plain;
        };

        let gap = now.saturating_duration_since(record.last_failure);
        if gap >= FAILURE_WINDOW {
            *record = FailureRecord::first(now, message);
            return FailureVerdict::Plain;
        }

        record.count += 1;
        record.last_failure = now;
        record.push_error(message);

        if record.count >= LOOP_THRESHOLD && gap < LOOP_WINDOW {
            FailureVerdict::Loop {
                attempts: record.count,
                history: record.recent_distinct(LOOP_HISTORY_LEN),
            }
        } else {
            FailureVerdict::Plain
        }
    }

    pub fn clear(&self, operation: &str) {
        self.lock().remove(operation);
    }

    pub fn snapshot(&self, operation: &str) -> Option<FailureRecord> {
        self.lock().get(operation).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FailureRecord>> {
        self.records.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::tests::ManualClock;

    fn tracker() -> (Arc<ManualClock>, FailureTracker) {
        let clock = Arc::new(ManualClock::new());
        let tracker = FailureTracker::new(clock.clone());
        (clock, tracker)
    }

    #[test]
    fn third_failure_within_two_minutes_escalates() {
        let (clock, tracker) = tracker();
        assert_eq!(tracker.record_failure("upload_file", "a"), FailureVerdict::Plain);
        clock.advance(Duration::from_secs(10));
        assert_eq!(tracker.record_failure("upload_file", "b"), FailureVerdict::Plain);
        clock.advance(Duration::from_secs(10));
        assert_eq!(
            tracker.record_failure("upload_file", "c"),
            FailureVerdict::Loop {
                attempts: 3,
                history: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            }
        );
    }

    #[test]
    fn failures_on_one_operation_do_not_touch_another() {
        let (_clock, tracker) = tracker();
        tracker.record_failure("upload_file", "a");
        tracker.record_failure("view_pdf", "x");
        tracker.record_failure("upload_file", "b");

        assert_eq!(tracker.snapshot("view_pdf").map(|r| r.count), Some(1));
        tracker.clear("upload_file");
        assert_eq!(tracker.snapshot("view_pdf").map(|r| r.count), Some(1));
        assert!(tracker.snapshot("upload_file").is_none());
    }

    #[test]
    fn success_resets_the_streak() {
        let (_clock, tracker) = tracker();
        tracker.record_failure("config_set", "a");
        tracker.record_failure("config_set", "b");
        tracker.clear("config_set");
        assert_eq!(tracker.record_failure("config_set", "c"), FailureVerdict::Plain);
        assert_eq!(tracker.snapshot("config_set").map(|r| r.count), Some(1));
    }

    #[test]
    fn stale_record_restarts_at_one() {
        let (clock, tracker) = tracker();
        tracker.record_failure("view_pdf", "a");
        tracker.record_failure("view_pdf", "b");
        clock.advance(Duration::from_secs(5 * 60 + 1));
        assert_eq!(tracker.record_failure("view_pdf", "c"), FailureVerdict::Plain);

        let record = tracker.snapshot("view_pdf").expect("record");
        assert_eq!(record.count, 1);
        assert_eq!(record.errors().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn slow_streak_counts_but_does_not_escalate() {
        let (clock, tracker) = tracker();
        tracker.record_failure("view_pdf", "a");
        clock.advance(Duration::from_secs(150));
        tracker.record_failure("view_pdf", "b");
        clock.advance(Duration::from_secs(150));
        assert_eq!(tracker.record_failure("view_pdf", "c"), FailureVerdict::Plain);
        assert_eq!(tracker.snapshot("view_pdf").map(|r| r.count), Some(3));
    }

    #[test]
    fn history_keeps_last_five_and_loop_reports_distinct() {
        let (_clock, tracker) = tracker();
        for message in ["1", "2", "3", "4", "5", "6"] {
            tracker.record_failure("config_set", message);
        }
        let record = tracker.snapshot("config_set").expect("record");
        assert_eq!(
            record.errors().cloned().collect::<Vec<_>>(),
            vec!["2", "3", "4", "5", "6"]
        );

        let verdict = tracker.record_failure("config_set", "6");
        assert_eq!(
            verdict,
            FailureVerdict::Loop {
                attempts: 7,
                history: vec!["4".to_string(), "5".to_string(), "6".to_string()],
            }
        );
    }
}
