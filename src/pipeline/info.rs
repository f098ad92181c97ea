// src/pipeline/info.rs

use crate::storage::CheckpointStatus;
use crate::utils::log;

use super::context::HarvestContext;
use super::details::DETAILS;
use super::events::EVENTS;
use super::listing::LISTING;

/// Log the state of every harvest checkpoint.
pub async fn run_info(ctx: &HarvestContext) -> Vec<(&'static str, CheckpointStatus)> {
    log::header("Checkpoints");
    log::info(&format!("Storage: {}", ctx.storage.root().display()));

    let mut statuses = Vec::new();
    for kind in [LISTING, DETAILS, EVENTS] {
        let status = ctx.checkpoint(kind).status().await;
        match &status {
            CheckpointStatus::Missing => log::sub_item(&format!("{kind}: none")),
            CheckpointStatus::Corrupt(reason) => {
                log::warn(&format!("{kind}: corrupt ({reason}); next run starts fresh"))
            }
            CheckpointStatus::Present {
                saved_at,
                completed,
                cursor,
                processed,
                failed,
            } => {
                let cursor = cursor.map_or_else(|| "-".to_string(), |c| c.to_string());
                log::sub_item(&format!(
                    "{kind}: saved {saved_at}, {completed} completed, cursor {cursor}, {processed} processed, {failed} failed"
                ));
            }
        }
        statuses.push((kind, status));
    }
    statuses
}
