// src/pipeline/listing.rs

//! Paginated listing harvest.

use crate::error::Result;
use crate::models::{EntityMap, EntityRecord, FailedTarget, FailureReason, RunReport};
use crate::pipeline::context::HarvestContext;
use crate::pipeline::guard::OutputGuard;
use crate::pipeline::output::{write_entities, write_failures};
use crate::services::{CursorPager, FetchTarget, Fetched, TargetResult};
use crate::storage::Checkpoint;
use crate::utils::log;

pub const LISTING: &str = "listing";

/// Listing run options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListingOptions {
    /// Write `entities.json` even if the output guard objects
    pub force: bool,
}

/// Merged entities plus the run report.
#[derive(Debug)]
pub struct ListingOutcome {
    pub entities: EntityMap,
    pub report: RunReport,
}

/// Harvest the paginated listing into an entity map.
///
/// Resumes from the listing checkpoint when one exists. Pages are fetched
/// in batches; the first page reporting no more data stops new cursors
/// from being issued, but pages already in flight are still merged.
pub async fn run_listing(ctx: &HarvestContext, options: ListingOptions) -> Result<ListingOutcome> {
    let config = &ctx.config;
    let source = &config.source;
    log::header("Listing harvest");

    let mut store = ctx.checkpoint(LISTING);
    let mut report = RunReport::new(LISTING);
    let mut entities = EntityMap::new();

    let start = match store.load::<EntityRecord>().await {
        Some(checkpoint) => {
            report.resumed = true;
            let cursor = checkpoint.cursor.unwrap_or(source.listing_start);
            entities.merge_all(checkpoint.completed.into_values());
            entities.collisions = checkpoint.collisions;
            log::sub_item(&format!(
                "Resuming at cursor {} with {} entities",
                cursor,
                entities.len()
            ));
            cursor
        }
        None => source.listing_start,
    };

    let mut pager = CursorPager::new(start, source.page_step, source.listing_ceiling);
    report.total = pager.total_pages();
    let scheduler = ctx.scheduler(LISTING);
    let batch_size = config.listing.batch_size.max(1);

    while !scheduler.is_cancelled() {
        let batch: Vec<_> = pager
            .by_ref()
            .take(batch_size)
            .map(|request| {
                let target = FetchTarget::new(
                    format!("cursor:{}", request.cursor),
                    source.listing_url_for(request.cursor),
                );
                (request, target)
            })
            .collect();
        if batch.is_empty() {
            break;
        }

        let scheduler_ref = &scheduler;
        let mut results = scheduler
            .run_concurrent(batch, |(request, target)| async move {
                let fetched = scheduler_ref.fetch(&target).await;
                (request, target, fetched)
            })
            .await;
        // Merge in page order so collisions resolve the same way every run.
        results.sort_by_key(|(request, _, _)| *request);

        let mut merged = 0;
        for (request, target, fetched) in results {
            match fetched.result {
                TargetResult::Done(Fetched::Body(body)) => {
                    report.processed += 1;
                    match ctx.parser.parse_listing(&target.id, &body) {
                        Ok(page) => {
                            merged += entities.merge_all(page.entities);
                            if !page.has_more {
                                log::sub_item(&format!("No more data at {}", target.id));
                                pager.terminate();
                            }
                        }
                        Err(e) => {
                            log::warn(&format!("Skipping malformed page {}: {}", target.id, e));
                            report.failures.push(FailedTarget::new(
                                target.id,
                                FailureReason::Malformed {
                                    message: e.to_string(),
                                },
                            ));
                        }
                    }
                    pager.complete(request.cursor);
                }
                TargetResult::Done(Fetched::Empty) => {
                    report.processed += 1;
                    pager.terminate();
                    pager.complete(request.cursor);
                }
                TargetResult::Abandoned(reason) => {
                    report.processed += 1;
                    report.failures.push(FailedTarget::new(target.id, reason));
                }
                TargetResult::Cancelled => {}
            }
        }
        report.completed += merged;

        if store.record_progress(merged) {
            store
                .save(&listing_checkpoint(&entities, pager.resume_cursor(), &report))
                .await?;
        }
        scheduler
            .end_batch(report.processed, report.total, config.listing.batch_delay())
            .await;
    }

    report.cancelled = ctx.is_cancelled();
    store
        .save(&listing_checkpoint(&entities, pager.resume_cursor(), &report))
        .await?;

    if report.cancelled {
        log::warn(&format!(
            "Listing cancelled; checkpoint saved at cursor {}",
            pager.resume_cursor()
        ));
        return Ok(ListingOutcome {
            entities,
            report: report.finish(),
        });
    }

    if !entities.collisions.is_empty() {
        log::warn(&format!(
            "{} id-less name collision(s) were not merged",
            entities.collisions.len()
        ));
    }

    let guard = OutputGuard::new();
    write_entities(&ctx.storage, &entities, (!options.force).then_some(&guard)).await?;
    write_failures(&ctx.storage, LISTING, &report.failures).await?;

    if report.failures.is_empty() {
        store.archive().await?;
    } else {
        log::sub_item(&format!(
            "Checkpoint kept at cursor {}; rerun to retry {} failed page(s)",
            pager.resume_cursor(),
            report.failures.len()
        ));
    }

    let report = report.finish();
    log::summary("Listing", &report.summary_items());
    log::success(&format!("Harvested {} entities", entities.len()));
    Ok(ListingOutcome { entities, report })
}

fn listing_checkpoint(
    entities: &EntityMap,
    cursor: u64,
    report: &RunReport,
) -> Checkpoint<EntityRecord> {
    Checkpoint {
        completed: entities.records.clone(),
        cursor: Some(cursor),
        collisions: entities.collisions.clone(),
        failed: report.failures.clone(),
        ..Checkpoint::new()
    }
}
