use std::time::Duration;

use anyhow::Result;

mod fs_store;
mod memory_store;

pub use fs_store::FsCacheStore;
pub use memory_store::MemoryCacheStore;

pub trait CacheStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    fn delete(&self, key: &str) -> Result<bool>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}
