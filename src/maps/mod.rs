//! Bounded concurrent tables backing all flow state
//!
//! Three shapes, mirroring the kernel map types the data plane is built on:
//! - [`BoundedMap`]: plain hash map with a hard entry limit (`BPF_MAP_TYPE_HASH`)
//! - [`LruMap`]: evicts the coldest entry on insert at capacity (`BPF_MAP_TYPE_LRU_HASH`)
//! - [`PerWorker`]: one slot per worker thread, merged on read (`BPF_MAP_TYPE_PERCPU_ARRAY`)

pub mod bounded;
pub mod lru;
pub mod per_worker;

pub use self::bounded::{BoundedMap, InsertOutcome};
pub use self::lru::LruMap;
pub use self::per_worker::PerWorker;
