//! A worker owns one `mio::Poll`, one cloned listener, and a `Slab` of
//! connections — entirely single-threaded. Running N workers on N threads
//! (thread-per-core) is how this server scales, rather than sharing a
//! connection slab behind a lock the way an earlier generation of this code
//! considered and rejected (see the long comment this module used to carry
//! about mutex contention, preserved in spirit by `ConnectionThrottle` and
//! `ThrottlePool` being the only state that actually needs to cross threads).

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionOutcome};
use crate::hooks::{Action, PluginRegistry};
use crate::keepalive::KeepAliveQueue;
use crate::net::tcp_listener::TcpListener;
use crate::net::tcp_stream::TcpStream;
use crate::throttle::ThrottlePool;

const LISTEN_TOKEN: Token = Token(usize::MAX);

/// Counters a worker accumulates across its lifetime. Deliberately plain
/// `u64`s, not atomics: a `WorkerStats` is only ever touched by the thread
/// that owns it.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub requests: u64,
}

/// Borrowed context handed to a connection for the duration of one
/// `io_event` call: the pieces of worker-local state a connection needs to
/// touch (the keep-alive queue, the io-timeout queue, this tick's
/// timestamp) without the connection owning a whole `Worker`.
pub struct WorkerTick<'a> {
    pub now: Instant,
    pub ndx: usize,
    pub running: bool,
    pub keep_alive_queue: &'a mut KeepAliveQueue,
    pub io_timeout_queue: &'a mut VecDeque<(Token, Instant)>,
    pub stats: &'a mut WorkerStats,
}

impl WorkerTick<'_> {
    /// Called the moment a connection's keep-alive queue transitions from
    /// empty to non-empty. The sweep itself runs unconditionally once per
    /// tick from `Worker::run`'s bounded poll timeout, so there is nothing
    /// to arm here today — this exists as the seam a dedicated wakeup timer
    /// would plug into if the fixed poll timeout ever proved too coarse.
    pub fn arm_keep_alive_sweep(&mut self) {}
}

/// How long `Worker::run`'s poll call blocks before waking up to sweep
/// keep-alive/io-timeout queues and refill the throttle pool, absent any
/// socket readiness.
const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// One worker thread's entire event loop: accept, dispatch readiness events
/// to connections, and periodically sweep time-based state.
pub struct Worker<T, S>
where
    T: TcpListener<S> + Source,
    S: TcpStream + Read + Write + Source,
{
    ndx: usize,
    poll: Poll,
    listener: T,
    connections: Slab<Connection<S>>,
    keep_alive_queue: KeepAliveQueue,
    io_timeout_queue: VecDeque<(Token, Instant)>,
    stats: WorkerStats,
    config: Arc<ServerConfig>,
    throttle_pool: Option<Arc<ThrottlePool>>,
    action: Arc<dyn Action>,
    plugins: Arc<PluginRegistry>,
    running: Arc<AtomicBool>,
}

impl<T, S> Worker<T, S>
where
    T: TcpListener<S> + Source,
    S: TcpStream + Read + Write + Source,
{
    /// Builds a worker around an already-bound listener. `ndx` identifies
    /// this worker within the pool, used to index `ThrottlePool`'s
    /// per-worker double-buffered queues.
    pub fn new(
        ndx: usize,
        mut listener: T,
        config: Arc<ServerConfig>,
        throttle_pool: Option<Arc<ThrottlePool>>,
        action: Arc<dyn Action>,
        plugins: Arc<PluginRegistry>,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTEN_TOKEN, Interest::READABLE)?;

        Ok(Worker {
            ndx,
            poll,
            listener,
            connections: Slab::new(),
            keep_alive_queue: KeepAliveQueue::new(),
            io_timeout_queue: VecDeque::new(),
            stats: WorkerStats::default(),
            config,
            throttle_pool,
            action,
            plugins,
            running,
        })
    }

    fn accept(&mut self) -> std::io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, remote_addr)) => {
                    let entry = self.connections.vacant_entry();
                    let token = Token(entry.key());
                    let mut connection = Connection::new(
                        token,
                        stream,
                        remote_addr,
                        Arc::clone(&self.action),
                        Arc::clone(&self.plugins),
                        Arc::clone(&self.config),
                        self.throttle_pool.clone(),
                    );
                    connection.register(self.poll.registry())?;
                    entry.insert(connection);
                }
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    fn dispatch(&mut self, token: Token, readable: bool, writable: bool) {
        let now = Instant::now();
        let outcome = {
            let Some(connection) = self.connections.get_mut(token.0) else {
                return;
            };
            let mut wrk = WorkerTick {
                now,
                ndx: self.ndx,
                running: self.running.load(Ordering::Acquire),
                keep_alive_queue: &mut self.keep_alive_queue,
                io_timeout_queue: &mut self.io_timeout_queue,
                stats: &mut self.stats,
            };
            connection.io_event(readable, writable, &mut wrk)
        };

        match outcome {
            ConnectionOutcome::Release => {
                if let Some(mut connection) = self.connections.try_remove(token.0) {
                    let _ = connection.deregister(self.poll.registry());
                }
            }
            ConnectionOutcome::Continue => {
                // Readiness interest may have changed (e.g. a response was
                // just queued into raw_out, or fully drained from it).
                if let Some(connection) = self.connections.get_mut(token.0) {
                    let _ = connection.reregister(self.poll.registry());
                }
            }
        }
    }

    /// Sweeps the keep-alive queue and the io-timeout queue for entries
    /// that have expired as of `now`, releasing each matching connection.
    fn sweep_timeouts(&mut self, now: Instant) {
        for token in self.keep_alive_queue.drain_expired(now) {
            if let Some(mut connection) = self.connections.try_remove(token.0) {
                let _ = connection.deregister(self.poll.registry());
            }
        }

        while let Some((token, seen_at)) = self.io_timeout_queue.front().copied() {
            if now.duration_since(seen_at) < Duration::from_secs(60) {
                break;
            }
            self.io_timeout_queue.pop_front();
            let still_stale = self
                .connections
                .get(token.0)
                .map(|c| c.io_timeout_elem == seen_at)
                .unwrap_or(false);
            if still_stale {
                if let Some(mut connection) = self.connections.try_remove(token.0) {
                    let _ = connection.deregister(self.poll.registry());
                }
            }
        }

        if let Some(pool) = &self.throttle_pool {
            pool.refill();
            for (_, connection) in self.connections.iter_mut() {
                connection.tick_refill_ip_throttle();
            }
            for token in pool.drain_for_refill(self.ndx) {
                self.dispatch(token, false, true);
            }
        }
    }

    /// Runs this worker's event loop until `running` is cleared.
    pub fn run(&mut self) {
        let mut events = Events::with_capacity(1024);

        while self.running.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, Some(TICK_INTERVAL)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(worker = self.ndx, error = %e, "poll failed");
                    return;
                }
            }

            for event in events.iter() {
                match event.token() {
                    LISTEN_TOKEN => {
                        if let Err(e) = self.accept() {
                            warn!(worker = self.ndx, error = %e, "accept failed");
                        }
                    }
                    token => self.dispatch(token, event.is_readable(), event.is_writable()),
                }
            }

            self.sweep_timeouts(Instant::now());
        }

        info!(
            worker = self.ndx,
            requests = self.stats.requests,
            bytes_in = self.stats.bytes_in,
            bytes_out = self.stats.bytes_out,
            "worker shut down"
        );
    }
}
