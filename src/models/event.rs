//! Match events as handed to the aggregation engine.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::EntityKey;

/// Reference to a participant inside an event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

impl EntityRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.id.as_deref(), &self.name)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// How a match ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    WinLoss { winner: EntityRef, loser: EntityRef },
    Draw,
    NoContest,
}

/// Method of victory, as labelled by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Method {
    KoTko,
    Submission,
    UnanimousDecision,
    MajorityDecision,
    SplitDecision,
    NoContest,
    Unknown,
}

impl Method {
    /// Parse a source label. Anything unrecognized becomes `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "kotko" | "ko" | "tko" => Self::KoTko,
            "submission" | "sub" => Self::Submission,
            "decisionunanimous" | "unanimousdecision" => Self::UnanimousDecision,
            "decisionmajority" | "majoritydecision" => Self::MajorityDecision,
            "decisionsplit" | "splitdecision" => Self::SplitDecision,
            "nocontest" | "nc" => Self::NoContest,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::KoTko => "KO/TKO",
            Self::Submission => "Submission",
            Self::UnanimousDecision => "Decision - Unanimous",
            Self::MajorityDecision => "Decision - Majority",
            Self::SplitDecision => "Decision - Split",
            Self::NoContest => "No Contest",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for Method {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.label().to_string()
    }
}

/// A single match between two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub date: NaiveDate,
    pub participant_a: EntityRef,
    pub participant_b: EntityRef,
    pub outcome: Outcome,
    pub method: Method,
    pub rounds_scheduled: u8,
    #[serde(default)]
    pub strike_leader: Option<EntityRef>,
    #[serde(default)]
    pub strike_differential: u32,
    /// Where the event came from (URL); used to skip events folded already
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl EventRecord {
    /// Participants in page order.
    pub fn participants(&self) -> [&EntityRef; 2] {
        [&self.participant_a, &self.participant_b]
    }

    /// Opponent of `who`, judged by key.
    pub fn opponent_of(&self, who: &EntityRef) -> &EntityRef {
        if who.key() == self.participant_a.key() {
            &self.participant_b
        } else {
            &self.participant_a
        }
    }

    pub fn is_strike_leader(&self, who: &EntityRef) -> bool {
        self.strike_leader
            .as_ref()
            .is_some_and(|leader| leader.key() == who.key())
    }

    /// Check the record can be folded: two distinct participants, and a
    /// winner and loser that are exactly those two.
    pub fn validate(&self, context: &str) -> Result<()> {
        let a = self.participant_a.key();
        let b = self.participant_b.key();
        if a == b {
            return Err(AppError::malformed(
                context,
                format!("{} cannot face themselves", self.participant_a),
            ));
        }
        if let Outcome::WinLoss { winner, loser } = &self.outcome {
            let (winner, loser) = (winner.key(), loser.key());
            if !((winner == a && loser == b) || (winner == b && loser == a)) {
                return Err(AppError::malformed(
                    context,
                    format!(
                        "winner/loser {}/{} do not match participants {}/{}",
                        winner, loser, a, b
                    ),
                ));
            }
        }
        Ok(())
    }
}
