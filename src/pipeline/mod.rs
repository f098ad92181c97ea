//! Pipeline entry points for harvester operations.
//!
//! - `run_listing`: Harvest the paginated entity listing
//! - `run_details`: Harvest per-entity pass distribution and age
//! - `run_events`: Fold event records into per-entity aggregates
//! - `run_pipeline`: All of the above in order
//! - `run_validate` / `run_info`: Configuration and checkpoint inspection

pub mod context;
pub mod details;
pub mod events;
pub mod guard;
pub mod info;
pub mod listing;
pub mod output;
#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod validate;

pub use context::HarvestContext;
pub use details::run_details;
pub use events::{EventInput, run_events};
pub use guard::{OutputGuard, OutputGuardConfig};
pub use info::run_info;
pub use listing::{ListingOptions, ListingOutcome, run_listing};
pub use pipeline::{PipelineOptions, run_pipeline};
pub use validate::run_validate;
