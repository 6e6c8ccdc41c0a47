pub mod kv;
pub mod redis_store;
