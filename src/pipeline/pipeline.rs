// src/pipeline/pipeline.rs

use crate::error::Result;
use crate::models::RunReport;
use crate::utils::log;

use super::context::HarvestContext;
use super::details::run_details;
use super::events::{EventInput, run_events};
use super::listing::{ListingOptions, run_listing};

/// Options for the full pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub force: bool,
    /// Fold these events after the listing and detail steps
    pub events: Option<EventInput>,
}

/// Run listing → details → (optionally) events.
///
/// Stops after the step that was cancelled; its checkpoint is saved.
pub async fn run_pipeline(ctx: &HarvestContext, options: PipelineOptions) -> Result<Vec<RunReport>> {
    log::header("Scorecard pipeline");

    let total_steps = if options.events.is_some() { 3 } else { 2 };
    let mut reports = Vec::with_capacity(total_steps);

    log::step(1, total_steps, "Listing - Harvesting entities");
    let listing = run_listing(ctx, ListingOptions { force: options.force }).await?;
    let mut entities = listing.entities;
    let cancelled = listing.report.cancelled;
    reports.push(listing.report);
    if cancelled {
        return Ok(finish(reports));
    }

    log::step(2, total_steps, "Details - Pass distribution and age");
    let details = run_details(ctx, &mut entities).await?;
    let cancelled = details.cancelled;
    reports.push(details);
    if cancelled {
        return Ok(finish(reports));
    }

    if let Some(input) = options.events {
        log::step(3, total_steps, "Events - Aggregating match results");
        let (_, events) = run_events(ctx, input).await?;
        reports.push(events);
    }

    Ok(finish(reports))
}

fn finish(reports: Vec<RunReport>) -> Vec<RunReport> {
    log::separator();
    for report in &reports {
        log::summary(&report.kind, &report.summary_items());
        for failure in &report.failures {
            log::sub_item(&format!("{}: {}", failure.target, failure.reason));
        }
    }
    if reports.iter().any(|r| r.cancelled) {
        log::warn("Pipeline cancelled; rerun to resume from checkpoints");
    } else {
        log::success("Pipeline complete");
    }
    reports
}
