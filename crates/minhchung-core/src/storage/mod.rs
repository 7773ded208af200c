//! # Storage
//!
//! Disk-backed registry storage on redb.

mod redb_store;

pub use redb_store::RedbStore;
