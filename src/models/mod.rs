// src/models/mod.rs

//! Domain models for the harvester.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod aggregate;
mod config;
mod detail;
mod entity;
mod event;
mod report;

// Re-export all public types
pub use aggregate::{EntityAggregate, EntryResult, FightRecord, HistoryEntry, ScoringTable};
pub use config::{
    BatchConfig, CheckpointConfig, Config, HttpConfig, LoggingConfig, RetryConfig,
    SchedulerConfig, SourceConfig,
};
pub use detail::{DetailRecord, PassDistribution, PASS_LEVEL_FLOOR, PASS_LEVEL_MAX};
pub use entity::{EntityKey, EntityMap, EntityRecord, NameCollision, PageRequest, PageResult};
pub use event::{EntityRef, EventRecord, Method, Outcome};
pub use report::{FailedTarget, FailureReason, RunReport};
