//! Rebuild Integration Tests
//!
//! End-to-end view rebuilds through the `viewbuild` facade:
//! - Store lifecycle across runs (reuse, sweep, signature change)
//! - Index contents (ordering, unique ids, key records, checkpoints)
//! - Map failures and cancellation
//! - Disk-backed collections

#[path = "../common/mod.rs"]
mod common;

mod disk_collections;
mod failure_modes;
mod index_contents;
mod view_lifecycle;
