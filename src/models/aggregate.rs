//! Per-entity scorecards built by folding events.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{EntityRef, Method};

/// Points awarded by the fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringTable {
    #[serde(default = "defaults::ko_tko")]
    pub ko_tko: i64,
    #[serde(default = "defaults::submission")]
    pub submission: i64,
    #[serde(default = "defaults::unanimous_decision")]
    pub unanimous_decision: i64,
    #[serde(default = "defaults::majority_decision")]
    pub majority_decision: i64,
    #[serde(default = "defaults::split_decision")]
    pub split_decision: i64,
    /// Credit each participant gets for a no-contest
    #[serde(default = "defaults::no_contest_credit")]
    pub no_contest_credit: i64,
    /// Bonus for a bout scheduled for five rounds
    #[serde(default = "defaults::five_round_bonus")]
    pub five_round_bonus: i64,
    /// Penalty per loss, applied as `loss_count * loss_penalty`
    #[serde(default = "defaults::loss_penalty")]
    pub loss_penalty: i64,
}

impl ScoringTable {
    /// Points for a win by `method`; `None` for methods the table does not know.
    pub fn win_points(&self, method: Method) -> Option<i64> {
        match method {
            Method::KoTko => Some(self.ko_tko),
            Method::Submission => Some(self.submission),
            Method::UnanimousDecision => Some(self.unanimous_decision),
            Method::MajorityDecision => Some(self.majority_decision),
            Method::SplitDecision => Some(self.split_decision),
            Method::NoContest | Method::Unknown => None,
        }
    }
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self {
            ko_tko: defaults::ko_tko(),
            submission: defaults::submission(),
            unanimous_decision: defaults::unanimous_decision(),
            majority_decision: defaults::majority_decision(),
            split_decision: defaults::split_decision(),
            no_contest_credit: defaults::no_contest_credit(),
            five_round_bonus: defaults::five_round_bonus(),
            loss_penalty: defaults::loss_penalty(),
        }
    }
}

mod defaults {
    pub fn ko_tko() -> i64 {
        100
    }
    pub fn submission() -> i64 {
        90
    }
    pub fn unanimous_decision() -> i64 {
        80
    }
    pub fn majority_decision() -> i64 {
        75
    }
    pub fn split_decision() -> i64 {
        70
    }
    pub fn no_contest_credit() -> i64 {
        10
    }
    pub fn five_round_bonus() -> i64 {
        25
    }
    pub fn loss_penalty() -> i64 {
        10
    }
}

/// Result of one history entry from the entity's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryResult {
    Win,
    Loss,
    Draw,
    NoContest,
}

/// One event as seen by one participant. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub opponent: EntityRef,
    pub method: Method,
    pub result: EntryResult,
    pub method_points: i64,
    pub strike_bonus: i64,
    pub round_bonus: i64,
    pub total_points: i64,
}

impl HistoryEntry {
    /// Method bucket the entry's method points are credited to.
    pub fn credited_method(&self) -> Method {
        match self.result {
            EntryResult::NoContest => Method::NoContest,
            _ => self.method,
        }
    }
}

/// Win/loss/draw/no-contest counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightRecord {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub no_contests: u32,
}

/// Running totals plus the history they were folded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAggregate {
    /// Display reference: the one from the latest event, lowest name on a tie
    pub entity: EntityRef,
    /// Date of the event `entity` was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_on: Option<NaiveDate>,
    pub totals_by_method: BTreeMap<Method, i64>,
    pub strike_bonus_total: i64,
    pub five_round_bonus_total: i64,
    pub loss_count: u32,
    pub history: Vec<HistoryEntry>,
}

impl EntityAggregate {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            named_on: None,
            totals_by_method: BTreeMap::new(),
            strike_bonus_total: 0,
            five_round_bonus_total: 0,
            loss_count: 0,
            history: Vec::new(),
        }
    }

    /// Take `entity` as the display reference if it comes from a later
    /// event, or the same day with a lower name. Independent of fold order.
    pub(crate) fn observe(&mut self, entity: &EntityRef, date: NaiveDate) {
        let replace = match self.named_on {
            None => true,
            Some(seen) => date > seen || (date == seen && entity.name < self.entity.name),
        };
        if replace {
            self.entity = entity.clone();
            self.named_on = Some(date);
        }
    }

    /// Append an entry and fold its components into the totals.
    ///
    /// This is the only mutation path, which keeps totals equal to the
    /// fold of `history`.
    pub(crate) fn append(&mut self, entry: HistoryEntry) {
        debug_assert_eq!(
            entry.total_points,
            entry.method_points + entry.strike_bonus + entry.round_bonus
        );
        if entry.method_points != 0 {
            *self
                .totals_by_method
                .entry(entry.credited_method())
                .or_default() += entry.method_points;
        }
        self.strike_bonus_total += entry.strike_bonus;
        self.five_round_bonus_total += entry.round_bonus;
        if entry.result == EntryResult::Loss {
            self.loss_count += 1;
        }
        self.history.push(entry);
    }

    /// Sum of method totals and both bonus totals.
    pub fn total_points(&self) -> i64 {
        self.totals_by_method.values().sum::<i64>()
            + self.strike_bonus_total
            + self.five_round_bonus_total
    }

    /// Sum of `total_points` over history.
    pub fn history_points(&self) -> i64 {
        self.history.iter().map(|h| h.total_points).sum()
    }

    /// Whether the totals are exactly the fold of the history.
    pub fn is_consistent(&self) -> bool {
        self.total_points() == self.history_points()
    }

    pub fn loss_penalty(&self, scoring: &ScoringTable) -> i64 {
        i64::from(self.loss_count) * scoring.loss_penalty
    }

    /// Ranking value: total points minus the loss penalty.
    pub fn net_points(&self, scoring: &ScoringTable) -> i64 {
        self.total_points() - self.loss_penalty(scoring)
    }

    pub fn record(&self) -> FightRecord {
        let mut record = FightRecord::default();
        for entry in &self.history {
            match entry.result {
                EntryResult::Win => record.wins += 1,
                EntryResult::Loss => record.losses += 1,
                EntryResult::Draw => record.draws += 1,
                EntryResult::NoContest => record.no_contests += 1,
            }
        }
        record
    }

    /// History in authoritative order: by date, ties broken by the rest of the entry.
    pub fn sorted_history(&self) -> Vec<HistoryEntry> {
        let mut history = self.history.clone();
        history.sort();
        history
    }

    /// Copy with history in authoritative order.
    pub fn canonical(&self) -> Self {
        Self {
            history: self.sorted_history(),
            ..self.clone()
        }
    }
}
