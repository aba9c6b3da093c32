use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::priority::Priority;
use crate::constants::fields;
use crate::dates;
use crate::store::{Row, StoreError};

/// Where an item came from. Category activities carry their category id so
/// the caller can re-query or open the record's discussion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum Origin {
    PersonalMeeting,
    CategoryActivity { category_id: String },
}

/// A normalized activity merged from any source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub id: String,
    pub source_name: String,
    #[serde(flatten)]
    pub origin: Origin,
    pub priority: Priority,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    /// Display-only fields carried through untouched (location, supplier, remarks, ...)
    pub attributes: Row,
}

impl ScheduleItem {
    /// Normalize a raw source row.
    ///
    /// Rows without an identifier or without a parseable date in
    /// `date_field` are rejected: every item must be sortable and
    /// addressable.
    pub fn from_row(
        mut row: Row,
        origin: Origin,
        source_name: &str,
        date_field: &str,
        end_date_field: Option<&str>,
    ) -> Result<Self, StoreError> {
        let id = match row.remove(fields::ID) {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(StoreError::Malformed(format!(
                    "{} row without an id",
                    source_name
                )))
            }
        };

        let start = row
            .get(date_field)
            .and_then(dates::parse_timestamp)
            .ok_or_else(|| {
                StoreError::Malformed(format!(
                    "{} row {} has no usable {}",
                    source_name, id, date_field
                ))
            })?;
        row.remove(date_field);

        // A malformed end date only loses the end, not the item
        let end = end_date_field
            .and_then(|field| row.remove(field))
            .and_then(|value| dates::parse_timestamp(&value));

        let priority = Priority::from_value(row.remove(fields::PRIORITY).as_ref());

        Ok(Self {
            id,
            source_name: source_name.to_string(),
            origin,
            priority,
            start,
            end,
            attributes: row,
        })
    }

    pub fn category_id(&self) -> Option<&str> {
        match &self.origin {
            Origin::PersonalMeeting => None,
            Origin::CategoryActivity { category_id } => Some(category_id),
        }
    }

    /// The date used for filtering and ordering
    pub fn date(&self) -> NaiveDateTime {
        self.start
    }

    /// Identity across sources: ids are only unique within one source
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.source_name, &self.id)
    }

    /// `(record id, category id)` for items that own a discussion thread
    pub fn discussion_key(&self) -> Option<(String, String)> {
        self.category_id()
            .map(|category_id| (self.id.clone(), category_id.to_string()))
    }

    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// "Most urgent, soonest first": priority descending, then date
    /// ascending. Source and id break remaining ties so the order never
    /// depends on which query finished first.
    pub fn schedule_cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.start.cmp(&other.start))
            .then_with(|| self.source_name.cmp(&other.source_name))
            .then_with(|| self.id.cmp(&other.id))
    }
}
