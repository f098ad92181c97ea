//! Page parsing.
//!
//! Turns fetched bytes into structured records. A body that is not the
//! expected shape is an [`AppError::MalformedPage`]; callers skip that one
//! page or event and carry on.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{EntityRecord, EventRecord, PageResult, PassDistribution, PASS_LEVEL_FLOOR};

/// One page of a per-entity pass leaderboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassPage {
    pub counts: PassDistribution,
    /// A pass at or below the floor level was seen; later pages are lower still
    pub reached_floor: bool,
    /// No feed items at all
    pub empty: bool,
}

impl PassPage {
    /// Whether the scan for this entity should stop after this page.
    pub fn is_last(&self) -> bool {
        self.reached_floor || self.empty
    }
}

/// Extracts fields from source pages.
pub trait PageParser: Send + Sync {
    /// Listing page: entities plus the has-more signal.
    fn parse_listing(&self, context: &str, body: &[u8]) -> Result<PageResult>;

    /// Pass leaderboard page.
    fn parse_pass_page(&self, context: &str, body: &[u8]) -> Result<PassPage>;

    /// Profile page: age in whole years at `today`, if the profile has a birth date.
    fn parse_age(&self, context: &str, body: &[u8], today: NaiveDate) -> Result<Option<u32>>;

    /// One event record.
    fn parse_event(&self, context: &str, body: &[u8]) -> Result<EventRecord>;
}

/// Parser for the JSON API shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl JsonParser {
    fn json(context: &str, body: &[u8]) -> Result<Value> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| AppError::malformed(context, e))?;
        if !value.is_object() {
            return Err(AppError::malformed(context, "expected a JSON object"));
        }
        Ok(value)
    }

    fn listing_item(item: &Value) -> Option<EntityRecord> {
        let entity = item.get("entity")?;
        let name = entity.get("name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }
        let id = match entity.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        let value = item.get("value").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().map(|f| f.round() as i64))
        })?;
        Some(EntityRecord::new(id, name, value))
    }
}

impl PageParser for JsonParser {
    fn parse_listing(&self, context: &str, body: &[u8]) -> Result<PageResult> {
        let json = Self::json(context, body)?;
        let items = match json.get("items") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(Value::Null) | None => &[],
            Some(_) => return Err(AppError::malformed(context, "'items' is not an array")),
        };

        let mut entities = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match Self::listing_item(item) {
                Some(record) => entities.push(record),
                None => log::warn!("{}: skipping item {} without entity name/value", context, index),
            }
        }

        let has_more = json
            .get("hasMore")
            .and_then(Value::as_bool)
            .unwrap_or(!items.is_empty());
        Ok(PageResult { entities, has_more })
    }

    fn parse_pass_page(&self, context: &str, body: &[u8]) -> Result<PassPage> {
        let json = Self::json(context, body)?;
        let items = json
            .get("feedItems")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut page = PassPage {
            empty: items.is_empty(),
            ..PassPage::default()
        };
        for item in items {
            let Some(level) = item
                .get("boostInfo")
                .and_then(|info| info.get("level"))
                .and_then(Value::as_u64)
            else {
                continue;
            };
            if level <= u64::from(PASS_LEVEL_FLOOR) {
                page.reached_floor = true;
                break;
            }
            if let Ok(level) = u8::try_from(level) {
                page.counts.record(level);
            }
        }
        Ok(page)
    }

    fn parse_age(&self, context: &str, body: &[u8], today: NaiveDate) -> Result<Option<u32>> {
        let json = Self::json(context, body)?;
        let details = json
            .pointer("/team/additionalInfo/details")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(details
            .iter()
            .filter_map(Value::as_str)
            .filter(|detail| detail.contains("DOB:"))
            .find_map(extract_dob)
            .and_then(|dob| today.years_since(dob)))
    }

    fn parse_event(&self, context: &str, body: &[u8]) -> Result<EventRecord> {
        let event: EventRecord =
            serde_json::from_slice(body).map_err(|e| AppError::malformed(context, e))?;
        event.validate(context)?;
        Ok(event)
    }
}

/// Pull the `DOB: YYYY-MM-DD` date out of a profile detail line.
fn extract_dob(detail: &str) -> Option<NaiveDate> {
    let pattern = Regex::new(r"DOB: (\d{4}-\d{2}-\d{2})").ok()?;
    let captures = pattern.captures(detail)?;
    NaiveDate::parse_from_str(captures.get(1)?.as_str(), "%Y-%m-%d").ok()
}
