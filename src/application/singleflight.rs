//! Per-key single-flight guard for the cache-miss path.
//!
//! Two concurrent misses for the same key would otherwise both invoke the
//! (slow, metered) generation provider before the metadata store's unique
//! constraint resolves the race. Holding a keyed async mutex across the miss
//! path keeps duplicate generation to one per process; the unique constraint
//! remains the cross-process backstop.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type FlightMap = Arc<DashMap<String, Arc<Mutex<()>>>>;

#[derive(Default, Clone)]
pub struct SingleFlight {
    flights: FlightMap,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive occupancy of `key`. The returned guard releases
    /// the key on drop and prunes the map entry once nobody else is waiting.
    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let lock = self
            .flights
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.lock_owned().await;

        FlightGuard {
            key: key.to_owned(),
            flights: Arc::clone(&self.flights),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.flights.len()
    }
}

pub struct FlightGuard {
    key: String,
    flights: FlightMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Prune only when the map holds the last handle; a waiter that
        // already cloned the lock keeps its own Arc and is unaffected. A
        // racing clone can at worst leave two flights for one key, which the
        // metadata unique constraint still converges.
        self.flights
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn concurrent_acquires_for_one_key_serialize() {
        let flights = SingleFlight::new();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let flights = flights.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _guard = flights.acquire("key").await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.expect("flight task");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let flights = SingleFlight::new();
        let _a = flights.acquire("a").await;
        let _b = flights.acquire("b").await;
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let flights = SingleFlight::new();
        drop(flights.acquire("key").await);
        assert_eq!(flights.tracked_keys(), 0);
    }
}
