//! Storage abstractions for checkpoints and output artifacts.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── entities.json            # Listing harvest (+ detail attributes)
//! ├── aggregates.json          # One row per entity, ranked
//! ├── history.json             # One row per history entry
//! ├── failures.json            # Abandoned targets of the last run
//! └── checkpoints/
//!     ├── listing.json         # Live checkpoints (checksummed envelope)
//!     ├── details.json
//!     ├── events.json
//!     └── archive/
//!         └── listing.20261018T101500Z.json
//! ```

pub mod checkpoint;
pub mod local;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};
pub use local::LocalStorage;

/// Key/value byte storage the checkpoint store writes through.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Replace `key` atomically: readers see the old bytes or the new ones.
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read `key`, `None` when it does not exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Move `from` to `to`. Returns `false` when `from` does not exist.
    async fn rename(&self, from: &str, to: &str) -> Result<bool>;
}
