//! 存储模块
//!
//! 提供翻译缓存和底层的持久化键值存储。

pub mod cache;
pub mod clock;
pub mod key;
pub mod store;

pub use cache::{CacheEntry, CacheStats, TranslationCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::derive_key;
pub use store::{KeyValueStore, MemoryStore, RedbStore};
