// src/lib.rs

//! Scorecard harvester library
//!
//! Harvests a paginated, rate-limited entity listing with checkpoint/resume
//! and folds match events into deterministic per-entity scorecards.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
