//! Service layer for the harvester.
//!
//! This module contains the fetch machinery and the fold:
//! - Single-request transport (`TransportClient`)
//! - Retry policy and controller (`RetryController`)
//! - Cursor pagination (`CursorPager`)
//! - Bounded parallel fetching (`FetchScheduler`)
//! - Page parsing (`JsonParser`)
//! - Event aggregation (`AggregationEngine`)
//! - Progress reporting (`ProgressReporter`)

mod aggregator;
mod pager;
mod parser;
mod progress;
mod retry;
mod scheduler;
mod transport;

pub use aggregator::{AggregationEngine, Aggregator, FoldOutcome};
pub use pager::CursorPager;
pub use parser::{JsonParser, PageParser, PassPage};
pub use progress::{LatestProgress, LogProgress, NoProgress, ProgressReporter};
pub use retry::{
    FetchReport, FetchState, Fetched, RetryController, RetryDecision, RetryPolicy, TargetResult,
};
pub use scheduler::{FetchScheduler, FetchTarget, ThrottledTransport};
pub use transport::{FetchOutcome, Transport, TransportClient};
