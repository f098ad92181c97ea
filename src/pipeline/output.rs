//! Output artifacts.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{
    EntityAggregate, EntityKey, EntityMap, EntityRecord, EntryResult, FailedTarget, FightRecord,
    ScoringTable,
};
use crate::pipeline::guard::OutputGuard;
use crate::services::Aggregator;
use crate::storage::LocalStorage;

pub const ENTITIES_FILE: &str = "entities.json";
pub const AGGREGATES_FILE: &str = "aggregates.json";
pub const HISTORY_FILE: &str = "history.json";
pub const FAILURES_FILE: &str = "failures.json";

/// One row of `aggregates.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub key: EntityKey,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub net_points: i64,
    pub total_points: i64,
    pub loss_penalty: i64,
    pub totals_by_method: BTreeMap<String, i64>,
    pub strike_bonus_total: i64,
    pub five_round_bonus_total: i64,
    pub loss_count: u32,
    pub record: FightRecord,
}

impl AggregateRow {
    pub fn new(key: EntityKey, aggregate: &EntityAggregate, scoring: &ScoringTable) -> Self {
        Self {
            key,
            name: aggregate.entity.name.clone(),
            id: aggregate.entity.id.clone(),
            net_points: aggregate.net_points(scoring),
            total_points: aggregate.total_points(),
            loss_penalty: aggregate.loss_penalty(scoring),
            totals_by_method: aggregate
                .totals_by_method
                .iter()
                .map(|(method, points)| (method.label().to_string(), *points))
                .collect(),
            strike_bonus_total: aggregate.strike_bonus_total,
            five_round_bonus_total: aggregate.five_round_bonus_total,
            loss_count: aggregate.loss_count,
            record: aggregate.record(),
        }
    }
}

/// One row of `history.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub key: EntityKey,
    pub date: NaiveDate,
    pub opponent: String,
    pub method: String,
    pub result: EntryResult,
    pub method_points: i64,
    pub strike_bonus: i64,
    pub round_bonus: i64,
    pub total_points: i64,
}

/// Ranked aggregate rows and date-ordered history rows.
pub fn aggregate_tables(aggregator: &Aggregator) -> (Vec<AggregateRow>, Vec<HistoryRow>) {
    let ranked = aggregator.ranked();
    let rows = ranked
        .iter()
        .map(|(key, aggregate)| AggregateRow::new(key.clone(), aggregate, aggregator.scoring()))
        .collect();
    let history = ranked
        .iter()
        .flat_map(|(key, aggregate)| {
            aggregate.history.iter().map(move |entry| HistoryRow {
                key: key.clone(),
                date: entry.date,
                opponent: entry.opponent.name.clone(),
                method: entry.method.label().to_string(),
                result: entry.result,
                method_points: entry.method_points,
                strike_bonus: entry.strike_bonus,
                round_bonus: entry.round_bonus,
                total_points: entry.total_points,
            })
        })
        .collect();
    (rows, history)
}

pub async fn write_aggregates(storage: &LocalStorage, aggregator: &Aggregator) -> Result<usize> {
    let (rows, history) = aggregate_tables(aggregator);
    storage.write_json(AGGREGATES_FILE, &rows).await?;
    storage.write_json(HISTORY_FILE, &history).await?;
    log::info!(
        "Wrote {} aggregates and {} history rows",
        rows.len(),
        history.len()
    );
    Ok(rows.len())
}

/// Previous listing, empty when missing or unreadable.
pub async fn load_entities(storage: &LocalStorage) -> Result<EntityMap> {
    let records: Vec<EntityRecord> = storage.read_json(ENTITIES_FILE).await?.unwrap_or_default();
    let mut map = EntityMap::new();
    map.merge_all(records);
    Ok(map)
}

/// Write `entities.json`, checking the guard first unless `force`.
pub async fn write_entities(
    storage: &LocalStorage,
    entities: &EntityMap,
    guard: Option<&OutputGuard>,
) -> Result<()> {
    if let Some(guard) = guard {
        let previous = match storage.read_json::<Vec<serde_json::Value>>(ENTITIES_FILE).await {
            Ok(previous) => previous.map_or(0, |p| p.len()),
            Err(e) => {
                log::warn!("Previous {} unreadable, skipping comparison: {}", ENTITIES_FILE, e);
                0
            }
        };
        guard.validate(entities.len(), previous)?;
    }
    let records: Vec<&EntityRecord> = entities.records.values().collect();
    storage.write_json(ENTITIES_FILE, &records).await?;
    log::info!("Wrote {} entities to {}", records.len(), ENTITIES_FILE);
    Ok(())
}

/// Replace this run kind's section of `failures.json`.
pub async fn write_failures(
    storage: &LocalStorage,
    kind: &str,
    failures: &[FailedTarget],
) -> Result<()> {
    let mut all: BTreeMap<String, Vec<FailedTarget>> = match storage.read_json(FAILURES_FILE).await {
        Ok(all) => all.unwrap_or_default(),
        Err(e) => {
            log::warn!("Discarding unreadable {}: {}", FAILURES_FILE, e);
            BTreeMap::new()
        }
    };
    all.insert(kind.to_string(), failures.to_vec());
    storage.write_json(FAILURES_FILE, &all).await
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::{EntityRef, EventRecord, Method, Outcome, ScoringTable};

    fn entities(n: usize) -> EntityMap {
        let mut map = EntityMap::new();
        map.merge_all((0..n).map(|i| EntityRecord::new(Some(i.to_string()), format!("E{i}"), 1)));
        map
    }

    #[tokio::test]
    async fn guard_keeps_previous_entities() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let guard = OutputGuard::new();

        write_entities(&storage, &entities(20), Some(&guard)).await.unwrap();
        assert!(write_entities(&storage, &entities(10), Some(&guard)).await.is_err());
        assert_eq!(load_entities(&storage).await.unwrap().len(), 20);

        // forced
        write_entities(&storage, &entities(10), None).await.unwrap();
        assert_eq!(load_entities(&storage).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn failures_are_kept_per_kind() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let failed = vec![FailedTarget::new(
            "cursor:40",
            crate::models::FailureReason::Unauthorized,
        )];
        write_failures(&storage, "listing", &failed).await.unwrap();
        write_failures(&storage, "events", &[]).await.unwrap();

        let all: BTreeMap<String, Vec<FailedTarget>> =
            storage.read_json(FAILURES_FILE).await.unwrap().unwrap();
        assert_eq!(all["listing"].len(), 1);
        assert!(all["events"].is_empty());
    }

    #[test]
    fn tables_are_ranked_with_history_rows() {
        let mut aggregator = Aggregator::new(ScoringTable::default());
        aggregator.fold(EventRecord {
            date: "2024-01-20".parse().unwrap(),
            participant_a: EntityRef::named("A"),
            participant_b: EntityRef::named("B"),
            outcome: Outcome::WinLoss {
                winner: EntityRef::named("B"),
                loser: EntityRef::named("A"),
            },
            method: Method::Submission,
            rounds_scheduled: 3,
            strike_leader: None,
            strike_differential: 0,
            source: None,
        });

        let (rows, history) = aggregate_tables(&aggregator);
        assert_eq!(rows[0].name, "B");
        assert_eq!(rows[0].totals_by_method["Submission"], 90);
        assert_eq!(rows[1].net_points, -10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].key, EntityKey::Name("B".into()));
    }
}
