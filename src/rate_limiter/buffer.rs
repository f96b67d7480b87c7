//! # Permit Buffer
//!
//! Callers that arrive while no permit is available wait here, oldest first.
//!
//! ```text
//!     enqueue ──►  [ E | D | C | B | A ]  ──► dequeue (A first)
//!                                    ▲
//!                         evict_expired() trims from this end
//! ```
//!
//! The buffer never invokes a callback itself. Every removal hands the
//! [`PendingCallback`] back to the caller, who completes it once it no longer
//! holds the limiter's lock.

use super::config::OverflowPolicy;
use super::error::RateLimiterError;
use std::collections::VecDeque;
use std::fmt;

/// Completion handler a caller hands to `submit`.
///
/// Receives `Ok(())` when a permit is granted, or the reason it never will be.
pub type Completion = Box<dyn FnOnce(Result<(), RateLimiterError>) + Send + 'static>;

/// A submitted callback waiting for a permit.
///
/// Completing consumes it, so a callback can't be invoked twice.
pub struct PendingCallback {
    completion: Completion,
    enqueued_at_ms: u64,
}

impl PendingCallback {
    /// Wraps `completion`, recording when it was submitted.
    pub fn new(completion: Completion, enqueued_at_ms: u64) -> Self {
        Self {
            completion,
            enqueued_at_ms,
        }
    }

    /// When the callback entered the buffer.
    #[inline]
    pub fn enqueued_at_ms(&self) -> u64 {
        self.enqueued_at_ms
    }

    /// Grants the permit.
    pub fn succeed(self) {
        (self.completion)(Ok(()))
    }

    /// Fails the callback with `error`.
    pub fn fail(self, error: RateLimiterError) {
        (self.completion)(Err(error))
    }
}

impl fmt::Debug for PendingCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCallback")
            .field("enqueued_at_ms", &self.enqueued_at_ms)
            .finish()
    }
}

/// What happened to an enqueued callback.
#[derive(Debug)]
pub enum Enqueued {
    /// Queued normally.
    Queued,
    /// Queued; the oldest entry was pushed out and must be failed by the caller.
    Evicted(PendingCallback),
    /// Queued beyond the configured size.
    OverCapacity,
    /// Not queued; the callback is handed back.
    Rejected(PendingCallback),
}

/// Bounded FIFO of callbacks waiting for permits.
pub struct PermitBuffer {
    entries: VecDeque<PendingCallback>,
    max_buffered: usize,
    policy: OverflowPolicy,
    ttl_ms: Option<u64>,
}

impl PermitBuffer {
    /// Creates an empty buffer.
    pub fn new(max_buffered: usize, policy: OverflowPolicy, ttl_ms: Option<u64>) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_buffered.min(1024)),
            max_buffered,
            policy,
            ttl_ms,
        }
    }

    /// Adds `callback` at the back, applying the overflow policy when full.
    pub fn enqueue(&mut self, callback: PendingCallback) -> Enqueued {
        if self.entries.len() < self.max_buffered {
            self.entries.push_back(callback);
            return Enqueued::Queued;
        }

        match self.policy {
            OverflowPolicy::Reject => Enqueued::Rejected(callback),
            OverflowPolicy::DropOldest => match self.entries.pop_front() {
                Some(oldest) => {
                    self.entries.push_back(callback);
                    Enqueued::Evicted(oldest)
                }
                // max_buffered == 0: the newcomer is itself the oldest
                None => Enqueued::Evicted(callback),
            },
            OverflowPolicy::ScheduleWithWarning => {
                self.entries.push_back(callback);
                Enqueued::OverCapacity
            }
        }
    }

    /// Removes the oldest callback.
    #[inline]
    pub fn dequeue(&mut self) -> Option<PendingCallback> {
        self.entries.pop_front()
    }

    /// Removes every callback that has waited at least the TTL as of `now_ms`.
    ///
    /// Entries are ordered by submission, so the expired ones are a prefix.
    pub fn evict_expired(&mut self, now_ms: u64) -> Vec<PendingCallback> {
        let ttl = match self.ttl_ms {
            Some(ttl) => ttl,
            None => return Vec::new(),
        };

        let expired = self
            .entries
            .iter()
            .take_while(|entry| now_ms.saturating_sub(entry.enqueued_at_ms) >= ttl)
            .count();

        self.entries.drain(..expired).collect()
    }

    /// Removes every callback.
    pub fn drain(&mut self) -> Vec<PendingCallback> {
        self.entries.drain(..).collect()
    }

    /// When the oldest callback expires, if a TTL is set.
    pub fn next_expiry_ms(&self) -> Option<u64> {
        let ttl = self.ttl_ms?;
        self.entries
            .front()
            .map(|entry| entry.enqueued_at_ms.saturating_add(ttl))
    }

    /// Number of waiting callbacks.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is waiting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the next enqueue hits the overflow policy.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_buffered
    }

    /// Entries beyond `max_buffered` (only under `ScheduleWithWarning`).
    #[inline]
    pub fn overflow_len(&self) -> usize {
        self.entries.len().saturating_sub(self.max_buffered)
    }

    /// Configured maximum.
    #[inline]
    pub fn max_buffered(&self) -> usize {
        self.max_buffered
    }
}

impl fmt::Debug for PermitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermitBuffer")
            .field("len", &self.entries.len())
            .field("max_buffered", &self.max_buffered)
            .field("policy", &self.policy)
            .field("ttl_ms", &self.ttl_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<(u32, bool)>>>;

    fn pending(log: &Log, id: u32, at: u64) -> PendingCallback {
        let log = log.clone();
        PendingCallback::new(
            Box::new(move |result| log.lock().unwrap().push((id, result.is_ok()))),
            at,
        )
    }

    #[test]
    fn test_fifo_order() {
        let log = Log::default();
        let mut buffer = PermitBuffer::new(8, OverflowPolicy::Reject, None);

        for id in 0..3 {
            assert!(matches!(buffer.enqueue(pending(&log, id, 0)), Enqueued::Queued));
        }
        while let Some(entry) = buffer.dequeue() {
            entry.succeed();
        }

        assert_eq!(*log.lock().unwrap(), vec![(0, true), (1, true), (2, true)]);
    }

    #[test]
    fn test_reject_when_full() {
        let log = Log::default();
        let mut buffer = PermitBuffer::new(1, OverflowPolicy::Reject, None);

        assert!(matches!(buffer.enqueue(pending(&log, 0, 0)), Enqueued::Queued));
        assert!(buffer.is_full());

        match buffer.enqueue(pending(&log, 1, 0)) {
            Enqueued::Rejected(callback) => callback.fail(RateLimiterError::InvalidConfig("full")),
            other => panic!("expected rejection, got {:?}", other),
        }

        assert_eq!(buffer.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec![(1, false)]);
    }

    #[test]
    fn test_reject_with_zero_capacity() {
        let log = Log::default();
        let mut buffer = PermitBuffer::new(0, OverflowPolicy::Reject, None);
        assert!(matches!(buffer.enqueue(pending(&log, 0, 0)), Enqueued::Rejected(_)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drop_oldest_evicts_front() {
        let log = Log::default();
        let mut buffer = PermitBuffer::new(2, OverflowPolicy::DropOldest, None);

        buffer.enqueue(pending(&log, 0, 0));
        buffer.enqueue(pending(&log, 1, 0));
        match buffer.enqueue(pending(&log, 2, 0)) {
            Enqueued::Evicted(oldest) => oldest.fail(RateLimiterError::InvalidConfig("evicted")),
            other => panic!("expected eviction, got {:?}", other),
        }

        assert_eq!(buffer.len(), 2);
        buffer.dequeue().unwrap().succeed();
        buffer.dequeue().unwrap().succeed();
        assert_eq!(*log.lock().unwrap(), vec![(0, false), (1, true), (2, true)]);
    }

    #[test]
    fn test_schedule_with_warning_accepts_overflow() {
        let log = Log::default();
        let mut buffer = PermitBuffer::new(1, OverflowPolicy::ScheduleWithWarning, None);

        buffer.enqueue(pending(&log, 0, 0));
        assert!(matches!(buffer.enqueue(pending(&log, 1, 0)), Enqueued::OverCapacity));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.overflow_len(), 1);
    }

    #[test]
    fn test_evict_expired_takes_prefix() {
        let log = Log::default();
        let mut buffer = PermitBuffer::new(8, OverflowPolicy::Reject, Some(100));

        buffer.enqueue(pending(&log, 0, 0));
        buffer.enqueue(pending(&log, 1, 50));
        buffer.enqueue(pending(&log, 2, 120));

        assert_eq!(buffer.next_expiry_ms(), Some(100));
        assert!(buffer.evict_expired(99).is_empty());

        let expired = buffer.evict_expired(150);
        assert_eq!(expired.len(), 2);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.next_expiry_ms(), Some(220));
    }

    #[test]
    fn test_evict_without_ttl_is_noop() {
        let log = Log::default();
        let mut buffer = PermitBuffer::new(8, OverflowPolicy::Reject, None);
        buffer.enqueue(pending(&log, 0, 0));

        assert!(buffer.evict_expired(u64::MAX).is_empty());
        assert_eq!(buffer.next_expiry_ms(), None);
    }

    #[test]
    fn test_drain_removes_everything() {
        let log = Log::default();
        let mut buffer = PermitBuffer::new(8, OverflowPolicy::Reject, None);
        for id in 0..4 {
            buffer.enqueue(pending(&log, id, 0));
        }

        let drained = buffer.drain();
        assert_eq!(drained.len(), 4);
        assert!(buffer.is_empty());
        assert!(buffer.dequeue().is_none());
    }
}
