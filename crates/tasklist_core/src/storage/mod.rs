pub mod kv_store;
pub mod persistence;

pub use kv_store::{FileStore, KeyValueStore, MemoryStore, store_dir};
pub use persistence::{Persistence, STORAGE_KEY};
