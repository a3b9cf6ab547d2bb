//! Keep-alive idle discipline: either a per-connection timer, or membership
//! in the worker's shared, deadline-sorted wait queue — never both at once
//! (spec.md invariants 4 and 5).
//!
//! `mio` has no built-in timer wheel, so idle deadlines are checked on every
//! worker tick rather than via a dedicated timer syscall per connection —
//! the same coarse "sweep everything on every tick" idiom
//! `kill-ux-01-server`'s `timeouts::process` uses for its connection-retain
//! pass.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use mio::Token;

/// What a connection is presently armed with while sitting in `KeepAlive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveSlot {
    /// Linked into the worker's shared, deadline-sorted wait queue.
    Linked,
    /// A per-connection deadline, not shared with any other connection.
    Timed(Instant),
    /// Neither armed (connection is not presently in the `KeepAlive` state).
    Idle,
}

/// The worker-scope shared keep-alive wait queue.
///
/// New entries always carry the greatest deadline of any entry already
/// queued (connections join with `now + keep_alive_queue_timeout`, a fixed
/// offset, so arrival order is deadline order), so the front of the queue is
/// always the next connection to expire.
#[derive(Debug, Default)]
pub struct KeepAliveQueue {
    entries: VecDeque<(Token, Instant)>,
}

impl KeepAliveQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        KeepAliveQueue::default()
    }

    /// `true` if the queue holds no connections.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `token` with the given absolute deadline. Callers are
    /// responsible for only calling this with monotonically increasing
    /// deadlines (guaranteed by a fixed `queue_timeout` offset from `now`).
    pub fn push(&mut self, token: Token, deadline: Instant) {
        debug_assert!(
            self.entries.back().map(|(_, d)| *d <= deadline).unwrap_or(true),
            "keep-alive queue entries must be pushed in non-decreasing deadline order"
        );
        self.entries.push_back((token, deadline));
    }

    /// Removes and returns every entry whose deadline has passed as of `now`.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<Token> {
        let mut expired = Vec::new();
        while let Some((_, deadline)) = self.entries.front() {
            if *deadline > now {
                break;
            }
            let (token, _) = self.entries.pop_front().unwrap();
            expired.push(token);
        }
        expired
    }

    /// Removes a specific token from the queue, e.g. because the connection
    /// was picked up for a new request before its deadline elapsed.
    pub fn remove(&mut self, token: Token) {
        self.entries.retain(|(t, _)| *t != token);
    }
}

/// Computes which keep-alive disposition a connection should take, given the
/// configured idle policy, mirroring `li_connection_reset_keep_alive`.
#[derive(Debug, Clone, Copy)]
pub enum KeepAliveDisposition {
    /// `max_idle` is `0`: release the connection immediately rather than
    /// keeping it alive at all.
    ReleaseNow,
    /// Join the worker's shared wait queue with the given absolute deadline.
    Queue(Instant),
    /// Arm a private timer for `max_idle`.
    Timer(Instant),
}

/// Decides the disposition for a freshly-reset, about-to-be-idle connection.
pub fn decide(max_idle_secs: u64, queue_timeout_secs: u64, now: Instant) -> KeepAliveDisposition {
    if max_idle_secs == 0 {
        return KeepAliveDisposition::ReleaseNow;
    }
    if max_idle_secs >= queue_timeout_secs && queue_timeout_secs > 0 {
        KeepAliveDisposition::Queue(now + Duration::from_secs(queue_timeout_secs))
    } else {
        KeepAliveDisposition::Timer(now + Duration::from_secs(max_idle_secs))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_max_idle_releases_immediately() {
        let now = Instant::now();
        assert!(matches!(
            decide(0, 4, now),
            KeepAliveDisposition::ReleaseNow
        ));
    }

    #[test]
    fn long_max_idle_joins_shared_queue() {
        let now = Instant::now();
        assert!(matches!(decide(30, 4, now), KeepAliveDisposition::Queue(_)));
    }

    #[test]
    fn short_max_idle_arms_private_timer() {
        let now = Instant::now();
        assert!(matches!(decide(2, 4, now), KeepAliveDisposition::Timer(_)));
    }

    #[test]
    fn queue_drains_only_expired_entries_in_order() {
        let mut q = KeepAliveQueue::new();
        let base = Instant::now();
        q.push(Token(1), base + Duration::from_millis(10));
        q.push(Token(2), base + Duration::from_millis(20));
        let expired = q.drain_expired(base + Duration::from_millis(15));
        assert_eq!(vec![Token(1)], expired);
        assert!(!q.is_empty());
    }
}
