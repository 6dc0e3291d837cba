// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! One-shot grace checks.
//!
//! The queue only knows "run this check at time T"; there is no cancellation.
//! Whoever drains it must re-validate each check against current session
//! state before acting on it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::session::GraceKind;

/// Stand-in deadline for grace values `Instant` cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + grace`, clamped to a far-future deadline instead of overflowing.
pub fn deadline_after(now: Instant, grace: Duration) -> Instant {
    now.checked_add(grace)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// A grace window that ends at `due` for one session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GraceCheck {
    pub due: Instant,
    pub uid: String,
    pub session_id: Uuid,
    pub kind: GraceKind,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, GraceCheck)>>,
    seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, check: GraceCheck) {
        // seq keeps checks with equal deadlines in scheduling order
        self.seq += 1;
        self.heap.push(Reverse((check.due, self.seq, check)));
    }

    /// Remove and return every check due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<GraceCheck> {
        let mut due = Vec::new();
        while let Some(Reverse((at, _, _))) = self.heap.peek() {
            if *at > now {
                break;
            }
            if let Some(Reverse((_, _, check))) = self.heap.pop() {
                due.push(check);
            }
        }
        due
    }

    /// Deadline of the earliest outstanding check.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse((at, _, _))| *at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(uid: &str, due: Instant, kind: GraceKind) -> GraceCheck {
        GraceCheck {
            due,
            uid: uid.to_string(),
            session_id: Uuid::new_v4(),
            kind,
        }
    }

    #[test]
    fn test_pop_due_in_deadline_order() {
        let base = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(check("late", base + Duration::from_secs(30), GraceKind::Approval));
        queue.schedule(check("early", base + Duration::from_secs(1), GraceKind::Report));
        queue.schedule(check("mid", base + Duration::from_secs(15), GraceKind::Report));

        assert_eq!(queue.next_due(), Some(base + Duration::from_secs(1)));

        let due = queue.pop_due(base + Duration::from_secs(15));
        let uids: Vec<&str> = due.iter().map(|c| c.uid.as_str()).collect();
        assert_eq!(uids, vec!["early", "mid"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_deadline_is_inclusive() {
        let base = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(check("u1", base + Duration::from_secs(1), GraceKind::Report));
        assert!(queue.pop_due(base + Duration::from_millis(999)).is_empty());
        assert_eq!(queue.pop_due(base + Duration::from_secs(1)).len(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.next_due(), None);
    }

    #[test]
    fn test_deadline_after_clamps_overflow() {
        let base = Instant::now();
        assert_eq!(deadline_after(base, Duration::from_secs(15)), base + Duration::from_secs(15));

        let clamped = deadline_after(base, Duration::from_secs(u64::MAX));
        assert!(clamped > base + Duration::from_secs(60 * 60 * 24 * 365));
    }

    #[test]
    fn test_equal_deadlines_keep_schedule_order() {
        let base = Instant::now();
        let mut queue = TimerQueue::new();
        for uid in ["a", "b", "c"] {
            queue.schedule(check(uid, base, GraceKind::Report));
        }
        let uids: Vec<String> = queue.pop_due(base).into_iter().map(|c| c.uid).collect();
        assert_eq!(uids, vec!["a", "b", "c"]);
    }
}
