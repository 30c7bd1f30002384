//! Backs `GetRecentlyOnline` from a best-effort, non-durable LRU rather
//! than a new persisted store.

use std::collections::{HashMap, VecDeque};

const MAX_ENTRIES: usize = 10_000;

#[derive(Default)]
struct Inner {
    last_seen: HashMap<i64, i64>,
    order: VecDeque<i64>,
}

/// Thread-safety is the caller's responsibility: `PresenceService` wraps
/// this in a `tokio::sync::Mutex`.
#[derive(Default)]
pub struct RecentlyOnline {
    inner: Inner,
}

impl RecentlyOnline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `user_id` just went offline at `last_seen_ms`. A repeat
    /// touch moves the user to the back of `order` so it is reported ahead
    /// of users untouched since.
    pub fn touch(&mut self, user_id: i64, last_seen_ms: i64) {
        if self.inner.last_seen.insert(user_id, last_seen_ms).is_some()
            && let Some(pos) = self.inner.order.iter().position(|&id| id == user_id)
        {
            self.inner.order.remove(pos);
        }
        self.inner.order.push_back(user_id);
        if self.inner.order.len() > MAX_ENTRIES
            && let Some(oldest) = self.inner.order.pop_front()
        {
            self.inner.last_seen.remove(&oldest);
        }
    }

    #[must_use]
    pub fn last_seen(&self, user_id: i64) -> Option<i64> {
        self.inner.last_seen.get(&user_id).copied()
    }

    /// Most-recently-touched users first, capped at `limit`.
    #[must_use]
    pub fn recently_online(&self, limit: usize) -> Vec<(i64, i64)> {
        self.inner
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|uid| self.inner.last_seen.get(uid).map(|&ts| (*uid, ts)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_most_recent_first() {
        let mut r = RecentlyOnline::new();
        r.touch(1, 100);
        r.touch(2, 200);
        r.touch(3, 300);
        assert_eq!(r.recently_online(2), vec![(3, 300), (2, 200)]);
    }

    #[test]
    fn re_touching_a_user_moves_it_to_the_back() {
        let mut r = RecentlyOnline::new();
        r.touch(1, 100);
        r.touch(2, 200);
        r.touch(1, 300);
        assert_eq!(r.recently_online(2), vec![(1, 300), (2, 200)]);
    }

    #[test]
    fn caps_at_max_entries() {
        let mut r = RecentlyOnline::new();
        for i in 0..(MAX_ENTRIES as i64 + 10) {
            r.touch(i, i);
        }
        assert_eq!(r.inner.last_seen.len(), MAX_ENTRIES);
        assert!(r.last_seen(0).is_none());
        assert!(r.last_seen(MAX_ENTRIES as i64 + 9).is_some());
    }
}
