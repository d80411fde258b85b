//! `croftos-config` – typed configuration with pluggable persistence.
//!
//! # Modules
//!
//! - [`section`] – [`ConfigSection`][section::ConfigSection]: typed,
//!   defaultable configuration sections with partial `load`, total `store`
//!   and `reset`.
//! - [`kv`] – [`KvStore`][kv::KvStore]: whole-value JSON blob storage keyed
//!   by name, with an in-memory backend and a directory-backed backend.
//! - [`store`] – [`ConfigStore`][store::ConfigStore]: binds one section to a
//!   backend key, with load-with-fallback at construction,
//!   update-with-persist and ordered change notification.

pub mod kv;
pub mod section;
pub mod store;

pub use kv::{DirKvStore, KvStore, MemoryKvStore};
pub use section::ConfigSection;
pub use store::ConfigStore;
