//! Ordered byte-segment queue with a shared credit limit.
//!
//! Every byte pipeline in a connection (`raw_in`, `raw_out`, and the logical
//! request's `in`/`out`) is a `ChunkQueue`. Segments are appended in O(1) and
//! can be stolen as a whole (`steal_all`) or as a byte-accurate prefix
//! (`steal_len`) without copying the remainder. `append_mem` wraps a
//! `&'static [u8]` literal (e.g. the 100-continue line) without copying it.
//!
//! Two queues that belong to the same pipeline (e.g. `raw_in` and the logical
//! request's `in`) share one `CqLimit` so that a single deduction point
//! governs how much unread data may accumulate across both — this is the
//! "shared credit limit" spec.md invariant 7 describes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A single contiguous run of bytes owned by a `ChunkQueue`.
#[derive(Debug, Clone)]
enum Segment {
    Owned(Vec<u8>),
    Static(&'static [u8]),
}

impl Segment {
    fn as_slice(&self) -> &[u8] {
        match self {
            Segment::Owned(v) => v,
            Segment::Static(s) => s,
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// A byte-budget shared between one or more `ChunkQueue`s.
///
/// Connections share the limit between `raw_in`/`in` and, separately,
/// between `raw_out`/`out` — not across all four — so that read-side
/// backpressure and write-side backpressure are independent.
#[derive(Debug)]
pub struct CqLimit {
    limit: i64,
    used: i64,
}

impl CqLimit {
    /// Creates a new limit. `0` means unlimited.
    pub fn new(limit: i64) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(CqLimit { limit, used: 0 }))
    }

    /// Returns `true` if `n` additional bytes may be accepted without
    /// exceeding the limit.
    pub fn has_room_for(&self, n: usize) -> bool {
        self.limit == 0 || self.used + n as i64 <= self.limit
    }

    fn add(&mut self, n: usize) {
        self.used += n as i64;
    }

    fn sub(&mut self, n: usize) {
        self.used -= n as i64;
        debug_assert!(self.used >= 0, "chunkqueue limit usage underflowed");
    }

    /// Bytes currently counted against this limit.
    pub fn used(&self) -> i64 {
        self.used
    }
}

/// An ordered queue of byte segments with O(1) append and prefix-stealing.
#[derive(Debug)]
pub struct ChunkQueue {
    segments: VecDeque<Segment>,
    /// Total unread bytes across all segments.
    length: usize,
    /// Total bytes ever appended to this queue, including already-stolen
    /// ones — the monotonic counter used for connection/worker byte stats.
    bytes_in: u64,
    /// Total bytes stolen out of this queue.
    bytes_out: u64,
    /// Once set, no further bytes will ever be appended.
    is_closed: bool,
    limit: Rc<RefCell<CqLimit>>,
}

impl ChunkQueue {
    /// Creates a new, empty queue backed by `limit`.
    pub fn new(limit: Rc<RefCell<CqLimit>>) -> Self {
        ChunkQueue {
            segments: VecDeque::new(),
            length: 0,
            bytes_in: 0,
            bytes_out: 0,
            is_closed: false,
            limit,
        }
    }

    /// Creates a queue with its own, independent unlimited budget.
    pub fn unlimited() -> Self {
        Self::new(CqLimit::new(0))
    }

    /// Number of unread bytes currently queued.
    pub fn length(&self) -> usize {
        self.length
    }

    /// `true` once the queue has been closed (no more data will ever arrive)
    /// and fully drained.
    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    /// `true` once closed and drained — the "finished" half of spec.md's
    /// response-complete predicate.
    pub fn is_finished(&self) -> bool {
        self.is_closed && self.length == 0
    }

    /// Marks the queue closed: no further bytes will be appended.
    pub fn close(&mut self) {
        self.is_closed = true;
    }

    /// Total bytes ever appended, for stats purposes.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Total bytes ever stolen out, for stats purposes.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Whether `n` bytes may be appended without exceeding the shared limit.
    pub fn has_room_for(&self, n: usize) -> bool {
        self.limit.borrow().has_room_for(n)
    }

    /// Appends an owned buffer to the end of the queue.
    pub fn append(&mut self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        self.length += data.len();
        self.bytes_in += data.len() as u64;
        self.limit.borrow_mut().add(data.len());
        self.segments.push_back(Segment::Owned(data));
    }

    /// Appends a `'static` byte slice without copying it — used for
    /// compile-time literals such as the 100-continue status line.
    pub fn append_mem(&mut self, data: &'static [u8]) {
        if data.is_empty() {
            return;
        }
        self.length += data.len();
        self.bytes_in += data.len() as u64;
        self.limit.borrow_mut().add(data.len());
        self.segments.push_back(Segment::Static(data));
    }

    /// Removes and returns every queued segment as one contiguous buffer,
    /// without touching `is_closed`.
    pub fn steal_all(&mut self) -> Vec<u8> {
        if self.segments.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(self.length);
        for seg in self.segments.drain(..) {
            out.extend_from_slice(seg.as_slice());
        }
        self.limit.borrow_mut().sub(self.length);
        self.bytes_out += self.length as u64;
        self.length = 0;
        out
    }

    /// Removes and returns exactly `len` bytes from the front of the queue,
    /// splitting a segment if `len` falls in its middle. Returns fewer bytes
    /// only if the queue holds less than `len`.
    pub fn steal_len(&mut self, len: usize) -> Vec<u8> {
        let take = len.min(self.length);
        let mut out = Vec::with_capacity(take);

        while out.len() < take {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            let need = take - out.len();
            let front_len = front.len();

            if front_len <= need {
                out.extend_from_slice(front.as_slice());
                self.segments.pop_front();
            } else {
                let slice = front.as_slice();
                out.extend_from_slice(&slice[..need]);
                let remainder = slice[need..].to_vec();
                *front = Segment::Owned(remainder);
            }
        }

        self.length -= out.len();
        self.bytes_out += out.len() as u64;
        self.limit.borrow_mut().sub(out.len());
        out
    }

    /// Resets the queue to empty and not-closed, leaving the shared limit
    /// untouched beyond returning any outstanding usage.
    pub fn reset(&mut self) {
        if self.length > 0 {
            self.limit.borrow_mut().sub(self.length);
        }
        self.segments.clear();
        self.length = 0;
        self.bytes_in = 0;
        self.bytes_out = 0;
        self.is_closed = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn append_and_steal_all_round_trips() {
        let limit = CqLimit::new(0);
        let mut cq = ChunkQueue::new(limit);
        cq.append(b"hello ".to_vec());
        cq.append_mem(b"world");
        assert_eq!(11, cq.length());
        assert_eq!(b"hello world".to_vec(), cq.steal_all());
        assert_eq!(0, cq.length());
    }

    #[test]
    fn steal_len_splits_a_segment() {
        let limit = CqLimit::new(0);
        let mut cq = ChunkQueue::new(limit);
        cq.append(b"0123456789".to_vec());
        let first = cq.steal_len(4);
        assert_eq!(b"0123".to_vec(), first);
        assert_eq!(6, cq.length());
        let rest = cq.steal_len(100);
        assert_eq!(b"456789".to_vec(), rest);
        assert_eq!(0, cq.length());
    }

    #[test]
    fn shared_limit_is_enforced_across_two_queues() {
        let limit = CqLimit::new(10);
        let mut a = ChunkQueue::new(Rc::clone(&limit));
        let b = ChunkQueue::new(Rc::clone(&limit));
        a.append(vec![0u8; 8]);
        assert!(!b.has_room_for(4));
        assert!(b.has_room_for(2));
    }

    #[test]
    fn is_finished_requires_closed_and_empty() {
        let mut cq = ChunkQueue::unlimited();
        assert!(!cq.is_finished());
        cq.close();
        assert!(cq.is_finished());
        cq.append(b"x".to_vec());
        assert!(!cq.is_finished());
    }

    #[test]
    fn reset_returns_credit_to_the_shared_limit() {
        let limit = CqLimit::new(10);
        let mut cq = ChunkQueue::new(Rc::clone(&limit));
        cq.append(vec![0u8; 10]);
        assert!(!cq.has_room_for(1));
        cq.reset();
        assert!(cq.has_room_for(10));
    }
}
