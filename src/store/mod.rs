pub mod memory_cache;
pub mod original_cache;
pub mod persistent_cache;
pub mod persistent_store;
