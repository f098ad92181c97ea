//! Event aggregation.
//!
//! [`Aggregator`] is the pure fold. [`AggregationEngine`] shares one behind a
//! `tokio::sync::Mutex` so concurrent fetch tasks can fold into it; the lock
//! covers exactly one event's read-modify-append and is never held across I/O.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{
    EntityAggregate, EntityKey, EntityRef, EntryResult, EventRecord, HistoryEntry, Method,
    Outcome, ScoringTable,
};

/// Per-entity aggregates plus the set of event sources already folded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregator {
    pub aggregates: BTreeMap<EntityKey, EntityAggregate>,
    #[serde(default)]
    pub folded_sources: BTreeSet<String>,
    #[serde(skip)]
    scoring: ScoringTable,
}

/// What happened to one folded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Applied,
    /// Same source was folded before
    Duplicate,
}

impl Aggregator {
    pub fn new(scoring: ScoringTable) -> Self {
        Self {
            aggregates: BTreeMap::new(),
            folded_sources: BTreeSet::new(),
            scoring,
        }
    }

    /// Rebuild from a snapshot (checkpoint) with the given scoring table.
    pub fn from_parts(
        aggregates: BTreeMap<EntityKey, EntityAggregate>,
        folded_sources: BTreeSet<String>,
        scoring: ScoringTable,
    ) -> Self {
        Self {
            aggregates,
            folded_sources,
            scoring,
        }
    }

    pub fn scoring(&self) -> &ScoringTable {
        &self.scoring
    }

    /// Fold one event into both participants' aggregates.
    pub fn fold(&mut self, event: EventRecord) -> FoldOutcome {
        if let Some(source) = &event.source {
            if !self.folded_sources.insert(source.clone()) {
                log::debug!("Skipping already folded event {}", source);
                return FoldOutcome::Duplicate;
            }
        }

        for participant in event.participants() {
            let entry = self.entry_for(&event, participant);
            let aggregate = self
                .aggregates
                .entry(participant.key())
                .or_insert_with(|| EntityAggregate::new(participant.clone()));
            aggregate.observe(participant, event.date);
            aggregate.append(entry);
        }
        FoldOutcome::Applied
    }

    /// Components applied to `who` for `event`.
    fn entry_for(&self, event: &EventRecord, who: &EntityRef) -> HistoryEntry {
        let (result, method_points) = match &event.outcome {
            Outcome::Draw => (EntryResult::Draw, 0),
            Outcome::NoContest => (EntryResult::NoContest, self.scoring.no_contest_credit),
            Outcome::WinLoss { winner, .. } if winner.key() == who.key() => {
                let points = match self.scoring.win_points(event.method) {
                    Some(points) => points,
                    None => {
                        log::warn!(
                            "Unknown scoring method '{}' for {} on {}; scoring 0",
                            event.method,
                            who,
                            event.date
                        );
                        0
                    }
                };
                (EntryResult::Win, points)
            }
            Outcome::WinLoss { .. } => (EntryResult::Loss, 0),
        };

        let round_bonus = if event.rounds_scheduled == 5 {
            self.scoring.five_round_bonus
        } else {
            0
        };
        let strike_bonus = if event.is_strike_leader(who) {
            i64::from(event.strike_differential)
        } else {
            0
        };

        HistoryEntry {
            date: event.date,
            opponent: event.opponent_of(who).clone(),
            method: match result {
                EntryResult::NoContest => Method::NoContest,
                _ => event.method,
            },
            result,
            method_points,
            strike_bonus,
            round_bonus,
            total_points: method_points + strike_bonus + round_bonus,
        }
    }

    pub fn get(&self, key: &EntityKey) -> Option<&EntityAggregate> {
        self.aggregates.get(key)
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// Aggregates with history in date order, ranked by net points
    /// descending; ties by key.
    pub fn ranked(&self) -> Vec<(EntityKey, EntityAggregate)> {
        let mut rows: Vec<_> = self
            .aggregates
            .iter()
            .map(|(key, agg)| (key.clone(), agg.canonical()))
            .collect();
        rows.sort_by(|(ka, a), (kb, b)| {
            b.net_points(&self.scoring)
                .cmp(&a.net_points(&self.scoring))
                .then_with(|| ka.cmp(kb))
        });
        rows
    }
}

/// Shared, lock-guarded aggregator.
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    inner: Arc<Mutex<Aggregator>>,
}

impl AggregationEngine {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(aggregator)),
        }
    }

    /// Fold one event atomically. Ownership of the event moves in.
    pub async fn fold(&self, event: EventRecord) -> FoldOutcome {
        self.inner.lock().await.fold(event)
    }

    /// Consistent copy of the accumulator; the lock is released before
    /// the caller serializes it.
    pub async fn snapshot(&self) -> Aggregator {
        self.inner.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
