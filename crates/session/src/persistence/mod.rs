//! Persistence layer for the session snapshot
//!
//! This module provides:
//! - [`SnapshotStore`] trait for loading and saving the recoverable state
//! - [`InMemorySnapshotStore`] for testing
//! - [`FileSnapshotStore`] for on-device storage

mod file;
mod memory;
mod store;

pub use file::FileSnapshotStore;
pub use memory::InMemorySnapshotStore;
pub use store::{Persist, SessionSnapshot, SnapshotStore, SNAPSHOT_KEY};
