use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One `T` per worker thread, merged only when read
///
/// Writers touch only their own shard, so hot-path updates never contend on
/// a shared cache line. Threads beyond the shard count share shards
/// round-robin, which is why `T` is expected to use atomics.
pub struct PerWorker<T> {
    shards: Box<[CachePadded<T>]>,
}

impl<T: Default> PerWorker<T> {
    pub fn new(workers: usize) -> Self {
        let shards = (0..workers.max(1))
            .map(|_| CachePadded::new(T::default()))
            .collect();
        Self { shards }
    }

    /// One shard per available CPU
    pub fn per_cpu() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(cpus)
    }
}

impl<T> PerWorker<T> {
    /// Shard owned by the calling thread
    pub fn local(&self) -> &T {
        &self.shards[worker_index() % self.shards.len()]
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.shards.iter().map(|shard| &**shard)
    }
}

/// Stable per-thread index, assigned on first use
fn worker_index() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    thread_local! {
        static INDEX: usize = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    INDEX.with(|index| *index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_local_is_stable_per_thread() {
        let store: PerWorker<AtomicU64> = PerWorker::new(4);
        let a = store.local() as *const AtomicU64;
        let b = store.local() as *const AtomicU64;
        assert_eq!(a, b);
    }

    #[test]
    fn test_merge_on_read_sees_every_increment() {
        let store: PerWorker<AtomicU64> = PerWorker::new(3);

        std::thread::scope(|s| {
            for _ in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for _ in 0..1000 {
                        store.local().fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        let total: u64 = store.iter().map(|c| c.load(Ordering::Relaxed)).sum();
        assert_eq!(total, 8000);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_zero_workers_gets_one_shard() {
        let store: PerWorker<AtomicU64> = PerWorker::new(0);
        assert_eq!(store.len(), 1);
        store.local().fetch_add(1, Ordering::Relaxed);
    }
}
