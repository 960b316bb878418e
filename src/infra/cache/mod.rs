//! Product snapshot cache backends.

mod memory;
mod redis;

pub use self::memory::MemoryProductCache;
pub use self::redis::RedisProductCache;
