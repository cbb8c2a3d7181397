//! First-class timers for the single-threaded event loop.
//!
//! Every delayed behaviour (heartbeat, autosave, stash removal) is an entry
//! in one [`TimerQueue`] owned by the client. The loop sleeps until
//! [`TimerQueue::next_deadline`] and then drains [`TimerQueue::pop_due`].
//! Time is always passed in, never read, so tests drive the queue with
//! synthetic instants.
//!
//! ## Guarantees
//! - `cancel` is idempotent: cancelling twice, or cancelling a one-shot timer
//!   that already fired, is a no-op that returns `false`.
//! - A cancelled timer never fires afterwards.
//! - Repeating timers fire at most once per `pop_due` call, however late the
//!   loop is; missed periods are skipped, not replayed.

use std::time::{Duration, Instant};

use crate::protocol::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a timer is for; the client routes each firing on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Heartbeat,
    Autosave,
    StashRemoval(MessageId),
}

#[derive(Debug, Clone)]
struct Entry {
    id: TimerId,
    kind: TimerKind,
    deadline: Instant,
    period: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    entries: Vec<Entry>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot timer firing `delay` after `now`.
    pub fn schedule(&mut self, now: Instant, delay: Duration, kind: TimerKind) -> TimerId {
        self.push(now + delay, None, kind)
    }

    /// Timer firing every `period`, first at `now + period`.
    pub fn schedule_repeating(&mut self, now: Instant, period: Duration, kind: TimerKind) -> TimerId {
        self.push(now + period, Some(period), kind)
    }

    fn push(&mut self, deadline: Instant, period: Option<Duration>, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.entries.push(Entry {
            id,
            kind,
            deadline,
            period,
        });
        id
    }

    /// Returns whether the timer was still armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Every timer due at `now`, earliest deadline first. One-shot timers are
    /// removed; repeating timers are re-armed past `now`.
    pub fn pop_due(&mut self, now: Instant) -> Vec<(TimerId, TimerKind)> {
        let mut due: Vec<(Instant, TimerId, TimerKind)> = Vec::new();
        self.entries.retain_mut(|entry| {
            if entry.deadline > now {
                return true;
            }
            due.push((entry.deadline, entry.id, entry.kind));
            match entry.period {
                Some(period) => {
                    while entry.deadline <= now {
                        entry.deadline += period;
                    }
                    true
                }
                None => false,
            }
        });
        due.sort_by_key(|(deadline, id, _)| (*deadline, *id));
        due.into_iter().map(|(_, id, kind)| (id, kind)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: Duration = Duration::from_secs(1);

    #[test]
    fn test_one_shot_fires_once() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        let id = q.schedule(t0, 2 * S, TimerKind::StashRemoval(MessageId(4)));
        assert!(q.pop_due(t0 + S).is_empty());
        assert_eq!(q.pop_due(t0 + 2 * S), vec![(id, TimerKind::StashRemoval(MessageId(4)))]);
        assert!(q.pop_due(t0 + 10 * S).is_empty());
        assert!(!q.is_armed(id));
    }

    #[test]
    fn test_repeating_rearms() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        let id = q.schedule_repeating(t0, 2 * S, TimerKind::Autosave);
        assert_eq!(q.pop_due(t0 + 2 * S).len(), 1);
        assert_eq!(q.next_deadline(), Some(t0 + 4 * S));
        assert!(q.is_armed(id));
    }

    #[test]
    fn test_repeating_skips_missed_periods() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        q.schedule_repeating(t0, S, TimerKind::Heartbeat);
        assert_eq!(q.pop_due(t0 + 5 * S + S / 2).len(), 1);
        assert_eq!(q.next_deadline(), Some(t0 + 6 * S));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        let id = q.schedule_repeating(t0, S, TimerKind::Autosave);
        assert!(q.cancel(id));
        assert!(!q.cancel(id));
        assert!(q.pop_due(t0 + 3 * S).is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn test_due_ordered_by_deadline() {
        let t0 = Instant::now();
        let mut q = TimerQueue::new();
        let late = q.schedule(t0, 3 * S, TimerKind::StashRemoval(MessageId(2)));
        let early = q.schedule(t0, S, TimerKind::StashRemoval(MessageId(1)));
        let fired: Vec<TimerId> = q.pop_due(t0 + 5 * S).into_iter().map(|(id, _)| id).collect();
        assert_eq!(fired, vec![early, late]);
    }
}
