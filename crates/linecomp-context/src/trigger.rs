//! Pending completion triggers, each consumed by exactly one provider call.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_TRIGGER_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerIntent {
    pub id: u64,
    pub document: String,
    pub requested_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    pending: VecDeque<TriggerIntent>,
}

#[derive(Debug)]
pub struct TriggerQueue {
    ttl: Duration,
    state: Mutex<QueueState>,
}

impl Default for TriggerQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_TTL)
    }
}

impl TriggerQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(QueueState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, document: &str) -> TriggerIntent {
        self.enqueue_at(document, Instant::now())
    }

    pub fn enqueue_at(&self, document: &str, now: Instant) -> TriggerIntent {
        let mut state = self.state();
        state.next_id += 1;
        let intent = TriggerIntent {
            id: state.next_id,
            document: document.to_owned(),
            requested_at: now,
        };
        state.pending.push_back(intent.clone());
        intent
    }

    /// Oldest live intent for `document`. Expired intents are dropped on the way.
    pub fn take(&self, document: &str) -> Option<TriggerIntent> {
        self.take_at(document, Instant::now())
    }

    pub fn take_at(&self, document: &str, now: Instant) -> Option<TriggerIntent> {
        let mut state = self.state();
        let ttl = self.ttl;
        state
            .pending
            .retain(|intent| now.saturating_duration_since(intent.requested_at) <= ttl);
        let position = state
            .pending
            .iter()
            .position(|intent| intent.document == document)?;
        state.pending.remove(position)
    }

    pub fn pending(&self) -> usize {
        self.state().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_intent_is_consumed_once() {
        let queue = TriggerQueue::default();
        let now = Instant::now();
        let first = queue.enqueue_at("a.py", now);
        let second = queue.enqueue_at("a.py", now);
        assert_ne!(first.id, second.id);

        assert_eq!(queue.take_at("a.py", now), Some(first));
        assert_eq!(queue.take_at("a.py", now), Some(second));
        assert_eq!(queue.take_at("a.py", now), None);
    }

    #[test]
    fn intents_are_per_document() {
        let queue = TriggerQueue::default();
        let now = Instant::now();
        queue.enqueue_at("a.py", now);
        assert_eq!(queue.take_at("b.py", now), None);
        assert_eq!(queue.pending(), 1);
        assert!(queue.take_at("a.py", now).is_some());
    }

    #[test]
    fn stale_intents_expire() {
        let queue = TriggerQueue::new(Duration::from_secs(10));
        let start = Instant::now();
        queue.enqueue_at("a.py", start);
        let fresh = queue.enqueue_at("a.py", start + Duration::from_secs(8));

        let later = start + Duration::from_secs(11);
        assert_eq!(queue.take_at("a.py", later), Some(fresh));
        assert_eq!(queue.pending(), 0);
    }
}
