// src/pipeline/details.rs

//! Per-entity detail harvest: pass distribution and age.

use crate::error::Result;
use crate::models::{
    DetailRecord, EntityKey, EntityMap, FailedTarget, FailureReason, PassDistribution, RunReport,
};
use crate::pipeline::context::HarvestContext;
use crate::pipeline::output::{write_entities, write_failures};
use crate::services::{CursorPager, FetchScheduler, FetchTarget, Fetched, TargetResult};
use crate::storage::Checkpoint;
use crate::utils::log;

pub const DETAILS: &str = "details";

/// How one entity's detail harvest ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Complete(DetailRecord),
    /// Abandoned part-way with some passes counted; the counts are kept
    Partial(DetailRecord, FailureReason),
    Failed(FailureReason),
    Cancelled,
}

/// Harvest details for every entity with an id, then merge them into
/// `entities` as `pass_distribution` / `age` attributes and rewrite
/// `entities.json`.
pub async fn run_details(ctx: &HarvestContext, entities: &mut EntityMap) -> Result<RunReport> {
    let config = &ctx.config;
    log::header("Detail harvest");

    let mut store = ctx.checkpoint(DETAILS);
    let mut report = RunReport::new(DETAILS);
    let mut checkpoint: Checkpoint<DetailRecord> = match store.load().await {
        Some(checkpoint) => {
            report.resumed = true;
            log::sub_item(&format!(
                "Resuming with {} entities already done",
                checkpoint.completed.len()
            ));
            Checkpoint {
                failed: Vec::new(),
                ..checkpoint
            }
        }
        None => Checkpoint::new(),
    };

    let targets: Vec<(EntityKey, String)> = entities
        .iter()
        .filter_map(|(key, record)| Some((key.clone(), record.id.clone()?)))
        .collect();
    let pending: Vec<(EntityKey, String)> = targets
        .iter()
        .filter(|(key, _)| !checkpoint.completed.contains_key(key))
        .cloned()
        .collect();
    report.total = targets.len();
    report.processed = targets.len() - pending.len();
    log::info(&format!(
        "{} entities with ids, {} pending",
        targets.len(),
        pending.len()
    ));

    let scheduler = ctx.scheduler(DETAILS);
    for chunk in pending.chunks(config.details.batch_size.max(1)) {
        if scheduler.is_cancelled() {
            break;
        }
        let scheduler_ref = &scheduler;
        let results = scheduler
            .run_concurrent(chunk.to_vec(), |(key, id)| async move {
                let outcome = harvest_entity(ctx, scheduler_ref, &id).await;
                (key, outcome)
            })
            .await;

        let mut completed = 0;
        for (key, outcome) in results {
            match outcome {
                DetailOutcome::Complete(record) => {
                    checkpoint.completed.insert(key, record);
                    completed += 1;
                }
                DetailOutcome::Partial(record, reason) => {
                    log::warn(&format!("Keeping partial passes for {}: {}", key, reason));
                    checkpoint.completed.insert(key, record);
                    completed += 1;
                }
                DetailOutcome::Failed(reason) => {
                    report.processed += 1;
                    checkpoint.failed.push(FailedTarget::new(key.to_string(), reason));
                }
                DetailOutcome::Cancelled => {}
            }
        }
        report.processed += completed;
        report.completed += completed;

        if store.record_progress(completed) {
            store.save(&checkpoint).await?;
        }
        scheduler
            .end_batch(report.processed, report.total, config.details.batch_delay())
            .await;
    }

    report.cancelled = ctx.is_cancelled();
    report.failures = checkpoint.failed.clone();
    store.save(&checkpoint).await?;

    for (key, detail) in &checkpoint.completed {
        if let Some(record) = entities.get_mut(key) {
            record.attributes.extend(detail.attributes());
        }
    }

    if report.cancelled {
        log::warn(&format!(
            "Detail harvest cancelled; {} of {} done, checkpoint saved",
            checkpoint.completed.len(),
            report.total
        ));
        return Ok(report.finish());
    }

    write_entities(&ctx.storage, entities, None).await?;
    write_failures(&ctx.storage, DETAILS, &report.failures).await?;
    if report.failures.is_empty() {
        store.archive().await?;
    }

    let report = report.finish();
    log::summary("Details", &report.summary_items());
    Ok(report)
}

/// Scan one entity's pass leaderboard page by page, then fetch its profile.
pub async fn harvest_entity(
    ctx: &HarvestContext,
    scheduler: &FetchScheduler,
    id: &str,
) -> DetailOutcome {
    let source = &ctx.config.source;
    let mut distribution = PassDistribution::new();
    let mut abandoned = None;

    for request in CursorPager::new(0, source.page_step, source.pass_ceiling) {
        let target = FetchTarget::new(
            format!("pass:{}:{}", id, request.cursor),
            source.pass_url_for(id, request.cursor),
        );
        match scheduler.fetch(&target).await.result {
            TargetResult::Done(Fetched::Body(body)) => {
                match ctx.parser.parse_pass_page(&target.id, &body) {
                    Ok(page) => {
                        distribution.absorb(&page.counts);
                        if page.is_last() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn(&format!("Stopping pass scan at {}: {}", target.id, e));
                        abandoned = Some(FailureReason::Malformed {
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
            TargetResult::Done(Fetched::Empty) => break,
            TargetResult::Abandoned(reason) => {
                abandoned = Some(reason);
                break;
            }
            TargetResult::Cancelled => return DetailOutcome::Cancelled,
        }
    }

    let profile = FetchTarget::new(format!("profile:{id}"), source.profile_url_for(id));
    let age = match scheduler.fetch(&profile).await.result {
        TargetResult::Done(Fetched::Body(body)) => {
            match ctx.parser.parse_age(&profile.id, &body, ctx.today) {
                Ok(age) => age,
                Err(e) => {
                    ::log::debug!("No age for {}: {}", id, e);
                    None
                }
            }
        }
        TargetResult::Cancelled => return DetailOutcome::Cancelled,
        _ => None,
    };

    let has_passes = !distribution.is_empty();
    let record = DetailRecord {
        pass_distribution: has_passes.then_some(distribution),
        age,
    };
    match abandoned {
        None => DetailOutcome::Complete(record),
        Some(reason) if has_passes => DetailOutcome::Partial(record, reason),
        Some(reason) => DetailOutcome::Failed(reason),
    }
}
