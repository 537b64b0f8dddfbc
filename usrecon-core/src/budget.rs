use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

/// Default ceiling for concurrently reserved bytes (4 GiB).
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 4 * 1024 * 1024 * 1024;

const MIB: u64 = 1024 * 1024;

/// Admission controller bounding the bytes reserved by concurrent requests.
///
/// A `MemoryBudget` is created once per process and handed to every request
/// context (usually behind an `Arc`). Callers reserve the size of their large
/// buffers with [`MemoryBudget::acquire`] before allocating them; the returned
/// [`Reservation`] gives the bytes back when dropped.
///
/// Waiters are woken together on every release and race to re-check the
/// admission condition. There is no FIFO ordering and no starvation
/// guarantee, and `acquire` has no timeout.
///
/// # Example
///
/// ```rust
/// # use usrecon_core::budget::MemoryBudget;
///
/// let budget = MemoryBudget::new(1024);
/// {
///     let _reservation = budget.acquire(600);
///     assert_eq!(budget.reserved(), 600);
/// }
/// assert_eq!(budget.reserved(), 0);
/// ```
#[derive(Debug)]
pub struct MemoryBudget {
    limit: u64,
    reserved: Mutex<u64>,
    released: Condvar,
}

impl MemoryBudget {
    pub fn new(limit: u64) -> Self {
        MemoryBudget {
            limit,
            reserved: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Bytes currently reserved.
    pub fn reserved(&self) -> u64 {
        *self.lock()
    }

    /// Blocks until `reserved + bytes <= limit`, then reserves `bytes`.
    ///
    /// A request larger than the limit never becomes admissible; callers that
    /// can detect this should reject it up front instead of calling here.
    pub fn acquire(&self, bytes: u64) -> Reservation<'_> {
        let mut reserved = self.lock();
        if !self.admits(*reserved, bytes) {
            debug!(bytes, reserved_total = *reserved, "waiting for memory budget");
        }
        while !self.admits(*reserved, bytes) {
            reserved = self
                .released
                .wait(reserved)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *reserved += bytes;
        info!(
            reserved_mb = bytes / MIB,
            total_mb = *reserved / MIB,
            "memory reserved"
        );
        Reservation {
            budget: self,
            bytes,
        }
    }

    /// Returns `bytes` to the budget and wakes every waiter.
    ///
    /// Releasing more than is reserved resets the total to zero. Prefer
    /// dropping a [`Reservation`]; this is the primitive it uses.
    pub fn release(&self, bytes: u64) {
        let mut reserved = self.lock();
        *reserved = reserved.saturating_sub(bytes);
        info!(
            released_mb = bytes / MIB,
            total_mb = *reserved / MIB,
            "memory released"
        );
        drop(reserved);
        self.released.notify_all();
    }

    fn admits(&self, reserved: u64, bytes: u64) -> bool {
        reserved
            .checked_add(bytes)
            .is_some_and(|total| total <= self.limit)
    }

    // The counter stays consistent even if a holder panicked, so poisoning
    // is ignored.
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        MemoryBudget::new(DEFAULT_MEMORY_LIMIT_BYTES)
    }
}

/// Bytes held against a [`MemoryBudget`]; released exactly once on drop.
#[must_use = "the reservation is released as soon as it is dropped"]
#[derive(Debug)]
pub struct Reservation<'a> {
    budget: &'a MemoryBudget,
    bytes: u64,
}

impl Reservation<'_> {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.budget.release(self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::SmallRng;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_and_drop() {
        let budget = MemoryBudget::new(100);
        let a = budget.acquire(40);
        let b = budget.acquire(60);
        assert_eq!(budget.reserved(), 100);
        assert_eq!(a.bytes(), 40);
        drop(a);
        assert_eq!(budget.reserved(), 60);
        drop(b);
        assert_eq!(budget.reserved(), 0);
    }

    #[test]
    fn over_release_floors_at_zero() {
        let budget = MemoryBudget::new(100);
        let held = budget.acquire(30);
        budget.release(500);
        assert_eq!(budget.reserved(), 0);
        // The guard's own release must not underflow either.
        drop(held);
        assert_eq!(budget.reserved(), 0);
    }

    #[test]
    fn released_on_panic() {
        let budget = Arc::new(MemoryBudget::new(100));
        let inner = Arc::clone(&budget);
        let result = thread::spawn(move || {
            let _held = inner.acquire(70);
            panic!("request failed");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(budget.reserved(), 0);
    }

    #[test]
    fn blocks_until_released() {
        let budget = Arc::new(MemoryBudget::new(100));
        let held = budget.acquire(80);

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let budget = Arc::clone(&budget);
            thread::spawn(move || {
                let reservation = budget.acquire(50);
                tx.send(budget.reserved()).unwrap();
                drop(reservation);
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(held);
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, 50);
        waiter.join().unwrap();
        assert_eq!(budget.reserved(), 0);
    }

    #[test]
    fn never_exceeds_limit_under_contention() {
        let limit = 1_000;
        let budget = Arc::new(MemoryBudget::new(limit));
        let done = Arc::new(AtomicBool::new(false));

        let monitor = {
            let budget = Arc::clone(&budget);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut max_seen = 0;
                while !done.load(Ordering::Relaxed) {
                    max_seen = max_seen.max(budget.reserved());
                }
                max_seen
            })
        };

        let workers: Vec<_> = (0..8)
            .map(|seed| {
                let budget = Arc::clone(&budget);
                thread::spawn(move || {
                    let mut rng = SmallRng::seed_from_u64(seed);
                    for _ in 0..200 {
                        let bytes = rng.random_range(1..=limit);
                        let held = budget.acquire(bytes);
                        assert!(budget.reserved() <= limit);
                        thread::yield_now();
                        drop(held);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, Ordering::Relaxed);
        assert!(monitor.join().unwrap() <= limit);
        assert_eq!(budget.reserved(), 0);
    }
}
