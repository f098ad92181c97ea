//! Output guard for `entities.json`.
//!
//! Refuses to replace the previous listing when the new one lost more than
//! 20% of its entities, which usually means the source failed part-way
//! rather than the roster actually shrinking.

use crate::error::{AppError, Result};

/// Guard thresholds.
#[derive(Debug, Clone)]
pub struct OutputGuardConfig {
    /// Maximum allowed drop percentage (0-100). Default: 20%
    pub max_drop_percent: u8,
    /// Previous counts below this are not checked (fresh deployments)
    pub min_baseline: usize,
}

impl Default for OutputGuardConfig {
    fn default() -> Self {
        Self {
            max_drop_percent: 20,
            min_baseline: 10,
        }
    }
}

/// Result of a guard check.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardVerdict {
    /// Safe to overwrite
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// No usable previous artifact
    Baseline { current_count: usize },
    /// Overwrite refused
    Tripped {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct OutputGuard {
    config: OutputGuardConfig,
}

impl OutputGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: OutputGuardConfig) -> Self {
        Self { config }
    }

    pub fn check(&self, current_count: usize, previous_count: usize) -> GuardVerdict {
        if previous_count < self.config.min_baseline {
            return GuardVerdict::Baseline { current_count };
        }
        if current_count < previous_count {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;
            if drop_percent > f64::from(self.config.max_drop_percent) {
                return GuardVerdict::Tripped {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }
        GuardVerdict::Safe {
            current_count,
            previous_count,
        }
    }

    /// `Ok` when the write may proceed.
    pub fn validate(&self, current_count: usize, previous_count: usize) -> Result<()> {
        match self.check(current_count, previous_count) {
            GuardVerdict::Safe {
                current_count,
                previous_count,
            } => {
                log::info!(
                    "Output guard: SAFE ({} entities, was {})",
                    current_count,
                    previous_count
                );
                Ok(())
            }
            GuardVerdict::Baseline { current_count } => {
                log::info!(
                    "Output guard: BASELINE ({} entities, no comparable previous output)",
                    current_count
                );
                Ok(())
            }
            GuardVerdict::Tripped {
                current_count,
                previous_count,
                drop_percent,
            } => {
                log::error!(
                    "Output guard: TRIPPED! {} → {} entities ({:.1}% drop > {}% threshold)",
                    previous_count,
                    current_count,
                    drop_percent,
                    self.config.max_drop_percent
                );
                Err(AppError::OutputGuardTripped {
                    current_count,
                    previous_count,
                    drop_percent,
                    threshold_percent: self.config.max_drop_percent,
                })
            }
        }
    }
}
