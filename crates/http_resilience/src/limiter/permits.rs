// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_channel::oneshot;
use parking_lot::Mutex;

use crate::options::{ConcurrencyLimiterOptions, QueueOrder};

/// A bounded pool of permits with a bounded wait queue.
///
/// Released permits are handed directly to a queued waiter, so a permit never becomes
/// available while someone is waiting for one.
#[derive(Debug)]
pub(crate) struct PermitPool {
    state: Mutex<PoolState>,
    queue_limit: usize,
    order: QueueOrder,
}

#[derive(Debug)]
struct PoolState {
    available: usize,
    waiters: VecDeque<Waiter>,
    next_id: u64,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    sender: oneshot::Sender<()>,
}

enum Admission {
    Granted,
    Queued(u64, oneshot::Receiver<()>),
    Rejected,
}

impl PermitPool {
    pub fn new(options: &ConcurrencyLimiterOptions) -> Self {
        Self {
            state: Mutex::new(PoolState {
                available: options.permit_limit,
                waiters: VecDeque::new(),
                next_id: 0,
            }),
            queue_limit: options.queue_limit,
            order: options.queue_order,
        }
    }

    /// Acquires a permit, waiting in the queue if none is free.
    ///
    /// Returns `None` when the queue is full, or when this waiter was evicted from a full
    /// `NewestFirst` queue by a newer caller.
    pub async fn acquire(self: &Arc<Self>) -> Option<ConcurrencyToken> {
        let (id, receiver) = match self.admit() {
            Admission::Granted => return Some(ConcurrencyToken::new(Arc::clone(self))),
            Admission::Rejected => return None,
            Admission::Queued(id, receiver) => (id, receiver),
        };

        let mut waiting = QueuedWaiter {
            pool: self,
            id,
            receiver,
            done: false,
        };

        let granted = (&mut waiting.receiver).await.is_ok();
        waiting.done = true;

        granted.then(|| ConcurrencyToken::new(Arc::clone(self)))
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Callers currently waiting for a permit.
    pub fn queued(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn admit(&self) -> Admission {
        let mut state = self.state.lock();

        if state.available > 0 {
            state.available -= 1;
            return Admission::Granted;
        }

        if state.waiters.len() >= self.queue_limit {
            match self.order {
                QueueOrder::NewestFirst if self.queue_limit > 0 => {
                    // dropping the sender rejects the evicted waiter
                    drop(state.waiters.pop_front());
                }
                _ => return Admission::Rejected,
            }
        }

        let (sender, receiver) = oneshot::channel();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        state.waiters.push_back(Waiter { id, sender });

        Admission::Queued(id, receiver)
    }

    fn release(&self) {
        let mut state = self.state.lock();

        loop {
            let next = match self.order {
                QueueOrder::OldestFirst => state.waiters.pop_front(),
                QueueOrder::NewestFirst => state.waiters.pop_back(),
            };

            match next {
                Some(waiter) => {
                    if waiter.sender.send(()).is_ok() {
                        return;
                    }
                }
                None => {
                    state.available += 1;
                    return;
                }
            }
        }
    }

    /// Removes a waiter that gave up. Returns `false` if it was no longer queued.
    fn withdraw(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let Some(position) = state.waiters.iter().position(|waiter| waiter.id == id) else {
            return false;
        };
        state.waiters.remove(position);
        true
    }
}

/// Cleans up after a queued caller that stopped waiting before its permit arrived.
struct QueuedWaiter<'a> {
    pool: &'a PermitPool,
    id: u64,
    receiver: oneshot::Receiver<()>,
    done: bool,
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        if self.done || self.pool.withdraw(self.id) {
            return;
        }

        // The permit was handed over after the caller stopped waiting; pass it on.
        if matches!(self.receiver.try_recv(), Ok(Some(()))) {
            self.pool.release();
        }
    }
}

/// Permit for one call in flight.
///
/// The permit goes back to the pool when the token is dropped, whatever ends the call.
#[derive(Debug)]
pub(crate) struct ConcurrencyToken {
    pool: Arc<PermitPool>,
}

impl ConcurrencyToken {
    fn new(pool: Arc<PermitPool>) -> Self {
        Self { pool }
    }
}

impl Drop for ConcurrencyToken {
    fn drop(&mut self) {
        self.pool.release();
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::pin::pin;
    use std::task::Poll;

    use futures::FutureExt;
    use futures::executor::block_on;
    use futures::task::noop_waker_ref;

    use super::*;

    fn pool(permit_limit: usize, queue_limit: usize, queue_order: QueueOrder) -> Arc<PermitPool> {
        Arc::new(PermitPool::new(&ConcurrencyLimiterOptions {
            permit_limit,
            queue_limit,
            queue_order,
        }))
    }

    fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
        future.poll_unpin(&mut std::task::Context::from_waker(noop_waker_ref()))
    }

    #[test]
    fn acquire_until_exhausted_then_reject() {
        let pool = pool(2, 0, QueueOrder::OldestFirst);

        let first = block_on(pool.acquire()).unwrap();
        let _second = block_on(pool.acquire()).unwrap();
        assert_eq!(pool.available(), 0);

        assert!(block_on(pool.acquire()).is_none());

        drop(first);
        assert_eq!(pool.available(), 1);
        assert!(block_on(pool.acquire()).is_some());
    }

    #[test]
    fn token_released_exactly_once() {
        let pool = pool(3, 0, QueueOrder::OldestFirst);

        let tokens: Vec<_> = (0..3).map(|_| block_on(pool.acquire()).unwrap()).collect();
        assert_eq!(pool.available(), 0);

        drop(tokens);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn released_permit_goes_to_oldest_waiter() {
        let pool = pool(1, 10, QueueOrder::OldestFirst);
        let held = block_on(pool.acquire()).unwrap();

        let mut first = pin!(pool.acquire());
        let mut second = pin!(pool.acquire());
        assert!(poll_once(&mut first).is_pending());
        assert!(poll_once(&mut second).is_pending());
        assert_eq!(pool.queued(), 2);

        drop(held);
        let Poll::Ready(Some(token)) = poll_once(&mut first) else {
            panic!("oldest waiter should own the released permit");
        };
        assert!(poll_once(&mut second).is_pending());
        assert_eq!(pool.available(), 0);

        drop(token);
        assert!(matches!(poll_once(&mut second), Poll::Ready(Some(_))));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn released_permit_goes_to_newest_waiter() {
        let pool = pool(1, 10, QueueOrder::NewestFirst);
        let held = block_on(pool.acquire()).unwrap();

        let mut first = pin!(pool.acquire());
        let mut second = pin!(pool.acquire());
        assert!(poll_once(&mut first).is_pending());
        assert!(poll_once(&mut second).is_pending());

        drop(held);
        assert!(matches!(poll_once(&mut second), Poll::Ready(Some(_))));
        assert!(poll_once(&mut first).is_pending());
    }

    #[test]
    fn newest_first_evicts_oldest_when_full() {
        let pool = pool(1, 1, QueueOrder::NewestFirst);
        let _held = block_on(pool.acquire()).unwrap();

        let mut first = pin!(pool.acquire());
        assert!(poll_once(&mut first).is_pending());

        let mut second = pin!(pool.acquire());
        assert!(poll_once(&mut second).is_pending());

        assert!(matches!(poll_once(&mut first), Poll::Ready(None)));
        assert_eq!(pool.queued(), 1);
    }

    #[test]
    fn oldest_first_rejects_when_full() {
        let pool = pool(1, 1, QueueOrder::OldestFirst);
        let _held = block_on(pool.acquire()).unwrap();

        let mut first = pin!(pool.acquire());
        assert!(poll_once(&mut first).is_pending());

        assert!(block_on(pool.acquire()).is_none());
        assert!(poll_once(&mut first).is_pending());
    }

    #[test]
    fn cancelled_waiter_leaves_queue() {
        let pool = pool(1, 5, QueueOrder::OldestFirst);
        let held = block_on(pool.acquire()).unwrap();

        {
            let mut waiting = Box::pin(pool.acquire());
            assert!(poll_once(&mut waiting).is_pending());
            assert_eq!(pool.queued(), 1);
        }

        assert_eq!(pool.queued(), 0);
        drop(held);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn cancelled_after_handover_returns_permit() {
        let pool = pool(1, 5, QueueOrder::OldestFirst);
        let held = block_on(pool.acquire()).unwrap();

        let mut waiting = Box::pin(pool.acquire());
        assert!(poll_once(&mut waiting).is_pending());

        // the permit is handed over but the waiter never observes it
        drop(held);
        assert_eq!(pool.available(), 0);

        drop(waiting);
        assert_eq!(pool.available(), 1);
    }
}
