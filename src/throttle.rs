//! Three-level throttling credit hierarchy: connection -> IP -> pool.
//!
//! A connection's write size on each I/O callback is capped by the smallest
//! of its own magazine and (if it belongs to a pool) the pool's magazine.
//! Connection and IP magazines are plain, worker-local counters; pool state
//! is the one piece of throttle state genuinely shared across worker
//! threads (ported from `original_source`'s `li_throttle_pool`), so it alone
//! uses atomics.
//!
//! Pool membership is double-buffered per worker (`queues[ndx]` /
//! `queues[ndx + workers]`, alternated by `current_queue[ndx]`) so that
//! workers never contend on the same queue while one worker refills it and
//! another is draining it — this mirrors the original's
//! `pool->queues[wrk->ndx + pool->current_queues[wrk->ndx] * wrk_count]`
//! indexing scheme.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mio::Token;

/// A single worker-local byte budget. Negative values are never observed;
/// depleted magazines sit at zero until refilled.
#[derive(Debug, Default, Clone, Copy)]
pub struct Magazine {
    bytes: i64,
}

impl Magazine {
    /// Creates a magazine with `bytes` available immediately.
    pub fn new(bytes: i64) -> Self {
        Magazine { bytes }
    }

    /// Bytes currently available.
    pub fn available(&self) -> i64 {
        self.bytes
    }

    /// Debits `n` bytes, never going below zero.
    pub fn debit(&mut self, n: i64) {
        self.bytes = (self.bytes - n).max(0);
    }

    /// Credits `n` bytes.
    pub fn credit(&mut self, n: i64) {
        self.bytes += n;
    }

    /// Drains the magazine entirely, returning what was taken.
    pub fn drain(&mut self) -> i64 {
        std::mem::replace(&mut self.bytes, 0)
    }
}

/// Shared, cross-worker throttle pool. Each worker thread keeps its own
/// `Mutex<VecDeque<Token>>` slot per double-buffer generation so a refill on
/// one worker never blocks a drain on another.
#[derive(Debug)]
pub struct ThrottlePool {
    /// Aggregate bytes/second the pool is configured to allow.
    pub rate: i64,
    /// Bytes presently available to hand out to member connections.
    magazine: AtomicI64,
    /// Number of connections presently members of this pool.
    num_connections: AtomicI64,
    /// Per-worker, double-buffered wait queues of connections that ran out
    /// of pool credit and are waiting for a refill.
    queues: Vec<Mutex<VecDeque<Token>>>,
    current_queue: Vec<AtomicUsize>,
    worker_count: usize,
}

impl ThrottlePool {
    /// Creates a new pool sized for `worker_count` worker threads.
    pub fn new(rate: i64, initial_magazine: i64, worker_count: usize) -> Arc<Self> {
        let mut queues = Vec::with_capacity(worker_count * 2);
        for _ in 0..worker_count * 2 {
            queues.push(Mutex::new(VecDeque::new()));
        }
        Arc::new(ThrottlePool {
            rate,
            magazine: AtomicI64::new(initial_magazine),
            num_connections: AtomicI64::new(0),
            queues,
            current_queue: (0..worker_count).map(|_| AtomicUsize::new(0)).collect(),
            worker_count,
        })
    }

    fn queue_index(&self, worker_ndx: usize) -> usize {
        let gen = self.current_queue[worker_ndx].load(Ordering::Acquire);
        worker_ndx + gen * self.worker_count
    }

    /// Pushes `token` onto `worker_ndx`'s current wait queue. A connection
    /// is queued in at most one per-worker queue at a time.
    pub fn push(&self, worker_ndx: usize, token: Token) {
        let idx = self.queue_index(worker_ndx);
        self.queues[idx].lock().unwrap().push_back(token);
        self.num_connections.fetch_add(1, Ordering::AcqRel);
    }

    /// Drains the *previous* generation's queue for `worker_ndx` and flips
    /// the double-buffer, so new pushes land in the other half while this
    /// worker refills the connections it just drained.
    pub fn drain_for_refill(&self, worker_ndx: usize) -> Vec<Token> {
        let idx = self.queue_index(worker_ndx);
        self.current_queue[worker_ndx].fetch_xor(1, Ordering::AcqRel);
        let mut guard = self.queues[idx].lock().unwrap();
        let drained: Vec<Token> = guard.drain(..).collect();
        self.num_connections
            .fetch_sub(drained.len() as i64, Ordering::AcqRel);
        drained
    }

    /// Atomically takes up to `want` bytes from the pool magazine, returning
    /// how many were actually available.
    pub fn take(&self, want: i64) -> i64 {
        let mut current = self.magazine.load(Ordering::Acquire);
        loop {
            let take = want.min(current).max(0);
            match self.magazine.compare_exchange_weak(
                current,
                current - take,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return take,
                Err(observed) => current = observed,
            }
        }
    }

    /// Atomically returns `n` bytes to the pool, e.g. when a connection
    /// releases unused credit on reset.
    pub fn give_back(&self, n: i64) {
        if n > 0 {
            self.magazine.fetch_add(n, Ordering::AcqRel);
        }
    }

    /// Replenishes the pool magazine by `self.rate` bytes, called once per
    /// second from each worker's tick (workers race harmlessly here; the
    /// rate is an aggregate target, not a per-worker one).
    pub fn refill(&self) {
        self.magazine.fetch_add(self.rate, Ordering::AcqRel);
    }
}

/// Per-connection throttle state: its own magazine, an IP-level magazine
/// (ported from `con->throttle.ip` in `original_source`'s `connection.c` —
/// there it is itself a second, smaller `ThrottlePool`-shaped bucket keyed
/// by remote address; here it is kept per-connection and worker-local, but
/// replenished at the same rate its pool is, per spec.md §4.8), and an
/// optional pool membership.
#[derive(Debug, Default)]
pub struct ConnectionThrottle {
    pub conn: Magazine,
    pub ip: Magazine,
    /// Bytes/second the `ip` magazine is credited on each worker tick.
    /// `0` (no pool attached) means the IP level is not enforced at all.
    pub ip_rate: i64,
    pub pool: Option<Arc<ThrottlePool>>,
    /// `true` while this connection sits in exactly one per-worker pool
    /// queue, per spec.md invariant 8.
    pub queued: bool,
}

impl ConnectionThrottle {
    /// The byte cap for the next write. When this connection is subject to
    /// throttling (`pool.is_some()`), the cap is `min(conn.magazine,
    /// ip.magazine, ceiling)` — the full per-connection → per-IP → per-pool
    /// hierarchy spec.md §4.8 describes; otherwise it is simply `ceiling` —
    /// spec.md §4.7's `write_max = throttled ? min(conn.magazine, 256KiB) :
    /// 256KiB` extended with the IP level.
    ///
    /// Tops `conn`'s magazine up from the pool first, pulling only as much
    /// as `ceiling` ever allows spending in one write. This is where the
    /// credit hierarchy's pool level actually reaches a connection: nothing
    /// else ever calls `ThrottlePool::take`.
    pub fn write_max(&mut self, ceiling: i64) -> i64 {
        if let Some(pool) = &self.pool {
            let want = ceiling - self.conn.available();
            if want > 0 {
                self.conn.credit(pool.take(want));
            }
            self.conn.available().min(self.ip.available()).min(ceiling)
        } else {
            ceiling
        }
    }

    /// Debits `n` bytes from every level this connection participates in
    /// after a successful write of `n` bytes.
    pub fn debit(&mut self, n: i64) {
        self.conn.debit(n);
        self.ip.debit(n);
    }

    /// Replenishes the `ip` magazine by `ip_rate` bytes — the "per-IP ...
    /// magazine replenished from pool rates on a worker tick" half of
    /// spec.md §4.8, called once per worker tick (`Worker::sweep_timeouts`)
    /// for every connection that belongs to a pool. A no-op when no pool is
    /// attached (`ip_rate == 0`).
    pub fn tick_refill_ip(&mut self) {
        if self.ip_rate > 0 {
            self.ip.credit(self.ip_rate);
        }
    }

    /// Returns all outstanding credit to the pool and clears queue
    /// membership. Called from both `Connection::reset` and
    /// `Connection::reset_keep_alive` in the original, which duplicate this
    /// exact teardown block — here it is a single method both call.
    pub fn release_to_pool(&mut self) {
        if let Some(pool) = &self.pool {
            let leftover = self.conn.drain();
            pool.give_back(leftover);
        }
        self.queued = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn magazine_never_goes_negative() {
        let mut m = Magazine::new(100);
        m.debit(150);
        assert_eq!(0, m.available());
    }

    #[test]
    fn pool_take_never_oversubscribes() {
        let pool = ThrottlePool::new(1000, 500, 2);
        let a = pool.take(400);
        let b = pool.take(400);
        assert_eq!(400, a);
        assert_eq!(100, b);
    }

    #[test]
    fn pool_refill_adds_rate_once() {
        let pool = ThrottlePool::new(1000, 0, 1);
        pool.refill();
        assert_eq!(1000, pool.take(5000));
    }

    #[test]
    fn release_to_pool_returns_leftover_conn_magazine() {
        let pool = ThrottlePool::new(1000, 0, 1);
        let mut throttle = ConnectionThrottle {
            conn: Magazine::new(250),
            pool: Some(Arc::clone(&pool)),
            ..Default::default()
        };
        throttle.release_to_pool();
        assert_eq!(0, throttle.conn.available());
        assert_eq!(250, pool.take(1000));
    }

    #[test]
    fn double_buffered_push_and_drain_alternate_generations() {
        let pool = ThrottlePool::new(1000, 0, 1);
        pool.push(0, Token(1));
        let drained = pool.drain_for_refill(0);
        assert_eq!(vec![Token(1)], drained);
        pool.push(0, Token(2));
        assert_eq!(vec![Token(2)], pool.drain_for_refill(0));
    }

    #[test]
    fn write_max_is_capped_by_the_ip_magazine_even_with_conn_credit_to_spare() {
        let pool = ThrottlePool::new(1_000_000, 1_000_000, 1);
        let mut throttle = ConnectionThrottle {
            conn: Magazine::new(5_000),
            ip: Magazine::new(200),
            ip_rate: 1_000,
            pool: Some(pool),
            ..Default::default()
        };
        assert_eq!(200, throttle.write_max(256 * 1024));
    }

    #[test]
    fn tick_refill_ip_credits_the_ip_magazine_by_its_rate() {
        let mut throttle = ConnectionThrottle {
            ip: Magazine::new(0),
            ip_rate: 500,
            ..Default::default()
        };
        throttle.tick_refill_ip();
        assert_eq!(500, throttle.ip.available());
        throttle.tick_refill_ip();
        assert_eq!(1000, throttle.ip.available());
    }

    #[test]
    fn tick_refill_ip_is_a_no_op_without_a_pool() {
        let mut throttle = ConnectionThrottle::default();
        throttle.tick_refill_ip();
        assert_eq!(0, throttle.ip.available());
    }
}
