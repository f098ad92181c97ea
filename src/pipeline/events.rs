// src/pipeline/events.rs

//! Event harvest: fetch event records and fold them into per-entity aggregates.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{EntityAggregate, EventRecord, FailedTarget, FailureReason, RunReport};
use crate::pipeline::context::HarvestContext;
use crate::pipeline::output::{write_aggregates, write_failures};
use crate::services::{
    AggregationEngine, Aggregator, FetchTarget, Fetched, FoldOutcome, TargetResult,
};
use crate::storage::Checkpoint;
use crate::utils::log;

pub const EVENTS: &str = "events";

/// Where events come from.
#[derive(Debug, Clone, PartialEq)]
pub enum EventInput {
    /// Event URLs to fetch, each returning one event record
    Urls(Vec<String>),
    /// Records already at hand; each needs a `source` for resume
    Records(Vec<EventRecord>),
}

impl EventInput {
    /// Read an input file: a JSON array of event records, or one URL per
    /// line (blank lines and `#` comments ignored).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        if text.trim_start().starts_with('[') {
            let mut records: Vec<EventRecord> = serde_json::from_str(&text)?;
            let label = path.display().to_string();
            for (index, record) in records.iter_mut().enumerate() {
                if record.source.is_none() {
                    record.source = Some(format!("{label}#{index}"));
                }
            }
            return Ok(Self::Records(records));
        }
        let urls: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            return Err(AppError::validation(format!(
                "{} lists no events",
                path.display()
            )));
        }
        Ok(Self::Urls(urls))
    }
}

/// What happened to one event source.
enum EventTask {
    Folded,
    Duplicate,
    Failed(FailedTarget),
    Cancelled,
}

/// Fold the input into aggregates, resuming from the events checkpoint,
/// and write `aggregates.json` / `history.json`.
pub async fn run_events(ctx: &HarvestContext, input: EventInput) -> Result<(Aggregator, RunReport)> {
    let config = &ctx.config;
    log::header("Event harvest");

    let mut store = ctx.checkpoint(EVENTS);
    let mut report = RunReport::new(EVENTS);
    let aggregator = match store.load::<EntityAggregate>().await {
        Some(checkpoint) => {
            report.resumed = true;
            log::sub_item(&format!(
                "Resuming with {} events folded into {} entities",
                checkpoint.processed.len(),
                checkpoint.completed.len()
            ));
            Aggregator::from_parts(checkpoint.completed, checkpoint.processed, config.scoring.clone())
        }
        None => Aggregator::new(config.scoring.clone()),
    };

    // Duplicate sources are dropped up front, folded ones skipped.
    let (urls, mut records) = match input {
        EventInput::Urls(urls) => (urls, Vec::new()),
        EventInput::Records(records) => (Vec::new(), records),
    };
    let mut seen = HashSet::new();
    let urls: Vec<String> = urls.into_iter().filter(|url| seen.insert(url.clone())).collect();
    records.retain(|record| record.source.as_ref().is_none_or(|s| seen.insert(s.clone())));

    report.total = urls.len() + records.len();
    let is_folded = |source: &str| aggregator.folded_sources.contains(source);
    let pending_urls: Vec<String> = urls.iter().filter(|u| !is_folded(u)).cloned().collect();
    records.retain(|record| record.source.as_deref().is_none_or(|s| !is_folded(s)));
    report.processed = report.total - pending_urls.len() - records.len();

    let engine = AggregationEngine::new(aggregator);
    let scheduler = ctx.scheduler(EVENTS);
    let batch_size = config.events.batch_size.max(1);
    let mut failures = Vec::new();

    let work: Vec<EventWork> = pending_urls
        .into_iter()
        .map(EventWork::Fetch)
        .chain(records.into_iter().map(EventWork::Inline))
        .collect();

    let mut batches = work.into_iter().peekable();
    while batches.peek().is_some() && !scheduler.is_cancelled() {
        let chunk: Vec<EventWork> = batches.by_ref().take(batch_size).collect();
        let scheduler_ref = &scheduler;
        let engine_ref = &engine;
        let results = scheduler
            .run_concurrent(chunk, |work| async move {
                match work {
                    EventWork::Inline(record) => {
                        let label = record.source.clone().unwrap_or_else(|| {
                            format!(
                                "{} vs {} on {}",
                                record.participant_a, record.participant_b, record.date
                            )
                        });
                        match record.validate(&label) {
                            Ok(()) => fold(engine_ref, record).await,
                            Err(e) => malformed(label, e),
                        }
                    }
                    EventWork::Fetch(url) => {
                        let target = FetchTarget::new(url.clone(), url.clone());
                        match scheduler_ref.fetch(&target).await.result {
                            TargetResult::Done(Fetched::Body(body)) => {
                                match ctx.parser.parse_event(&url, &body) {
                                    Ok(mut record) => {
                                        record.source = Some(url);
                                        fold(engine_ref, record).await
                                    }
                                    Err(e) => malformed(url, e),
                                }
                            }
                            TargetResult::Done(Fetched::Empty) => {
                                EventTask::Failed(FailedTarget::new(
                                    url,
                                    FailureReason::Malformed {
                                        message: "empty body".to_string(),
                                    },
                                ))
                            }
                            TargetResult::Abandoned(reason) => {
                                EventTask::Failed(FailedTarget::new(url, reason))
                            }
                            TargetResult::Cancelled => EventTask::Cancelled,
                        }
                    }
                }
            })
            .await;

        let mut folded = 0;
        for result in results {
            match result {
                EventTask::Folded => {
                    folded += 1;
                    report.processed += 1;
                }
                EventTask::Duplicate => report.processed += 1,
                EventTask::Failed(failed) => {
                    report.processed += 1;
                    failures.push(failed);
                }
                EventTask::Cancelled => {}
            }
        }
        report.completed += folded;

        if store.record_progress(folded) {
            save(&mut store, &engine, &failures).await?;
        }
        scheduler
            .end_batch(report.processed, report.total, config.events.batch_delay())
            .await;
    }

    report.cancelled = ctx.is_cancelled();
    report.failures = failures;
    let aggregator = save(&mut store, &engine, &report.failures).await?;

    if report.cancelled {
        log::warn(&format!(
            "Event harvest cancelled; {} of {} events done, checkpoint saved",
            report.processed, report.total
        ));
        return Ok((aggregator, report.finish()));
    }

    write_aggregates(&ctx.storage, &aggregator).await?;
    write_failures(&ctx.storage, EVENTS, &report.failures).await?;
    if report.failures.is_empty() {
        store.archive().await?;
    }

    let report = report.finish();
    log::summary("Events", &report.summary_items());
    Ok((aggregator, report))
}

enum EventWork {
    Fetch(String),
    Inline(EventRecord),
}

async fn fold(engine: &AggregationEngine, record: EventRecord) -> EventTask {
    match engine.fold(record).await {
        FoldOutcome::Applied => EventTask::Folded,
        FoldOutcome::Duplicate => EventTask::Duplicate,
    }
}

fn malformed(source: String, error: AppError) -> EventTask {
    log::warn(&format!("Skipping malformed event {}: {}", source, error));
    EventTask::Failed(FailedTarget::new(
        source,
        FailureReason::Malformed {
            message: error.to_string(),
        },
    ))
}

/// Snapshot the engine (lock released before serializing) and persist it.
async fn save(
    store: &mut crate::storage::CheckpointStore,
    engine: &AggregationEngine,
    failures: &[FailedTarget],
) -> Result<Aggregator> {
    let snapshot = engine.snapshot().await;
    let checkpoint = Checkpoint {
        completed: snapshot.aggregates.clone(),
        processed: snapshot.folded_sources.clone(),
        failed: failures.to_vec(),
        ..Checkpoint::new()
    };
    store.save(&checkpoint).await?;
    Ok(snapshot)
}
