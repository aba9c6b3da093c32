//! Cross-source schedule aggregation.
//!
//! One range query per registered category plus one against the personal
//! source, issued together and awaited together. A failing source
//! contributes nothing and is reported as a warning; the merge only runs
//! once every query has settled.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDateTime;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::fields;
use crate::dates::{self, DateRange};
use crate::error::CoreError;
use crate::models::{Origin, Priority, ScheduleItem};
use crate::registry::CategoryRegistry;
use crate::store::{ExternalStore, Filter, OrderBy, Row, StoreError};

/// A source that could not be read during one aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceWarning {
    pub source_name: String,
    /// None for the personal source
    pub category_id: Option<String>,
    pub message: String,
}

impl SourceWarning {
    pub fn to_error(&self) -> CoreError {
        CoreError::SourceUnavailable {
            source_name: self.source_name.clone(),
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Sorted by priority descending, then date ascending
    pub items: Vec<ScheduleItem>,
    pub warnings: Vec<SourceWarning>,
}

impl AggregateResult {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// `(record id, category id)` of every item that owns a discussion
    pub fn discussion_keys(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .filter_map(ScheduleItem::discussion_key)
            .collect()
    }
}

/// One source to read during an aggregation
struct SourcePlan<'a> {
    source_name: &'a str,
    date_field: &'a str,
    end_date_field: Option<&'a str>,
    origin: Origin,
    owner_field: Option<&'a str>,
}

pub struct ScheduleAggregator {
    store: Arc<dyn ExternalStore>,
    registry: Arc<CategoryRegistry>,
}

impl ScheduleAggregator {
    pub fn new(store: Arc<dyn ExternalStore>, registry: Arc<CategoryRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Merge every source's activities in `range` into one ordered list.
    ///
    /// A range with a missing bound yields an empty result without touching
    /// the store; an inverted range is a validation failure.
    pub async fn aggregate(
        &self,
        user_id: &str,
        range: &DateRange,
        priority_filter: Option<Priority>,
    ) -> Result<AggregateResult, CoreError> {
        let Some((lower, upper)) = range.bounds()? else {
            debug!("Aggregation skipped: incomplete date range {:?}", range);
            return Ok(AggregateResult::default());
        };

        let plans = self.plans();
        let fetches = plans
            .iter()
            .map(|plan| self.fetch(plan, user_id, lower, upper, priority_filter));
        let outcomes = join_all(fetches).await;

        let mut result = AggregateResult::default();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for (plan, outcome) in plans.iter().zip(outcomes) {
            let rows = match outcome {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(source = plan.source_name, error = %e, "Schedule source unavailable");
                    result.warnings.push(SourceWarning {
                        source_name: plan.source_name.to_string(),
                        category_id: match &plan.origin {
                            Origin::CategoryActivity { category_id } => Some(category_id.clone()),
                            Origin::PersonalMeeting => None,
                        },
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for row in rows {
                match ScheduleItem::from_row(
                    row,
                    plan.origin.clone(),
                    plan.source_name,
                    plan.date_field,
                    plan.end_date_field,
                ) {
                    Ok(item) if priority_filter.is_some_and(|p| item.priority != p) => {
                        debug!(source = plan.source_name, id = %item.id, "Outside priority filter");
                    }
                    Ok(item) => {
                        let key = (item.source_name.clone(), item.id.clone());
                        if seen.insert(key) {
                            result.items.push(item);
                        }
                    }
                    Err(e) => debug!(source = plan.source_name, "Skipping row: {}", e),
                }
            }
        }

        result.items.sort_by(ScheduleItem::schedule_cmp);
        debug!(
            items = result.items.len(),
            warnings = result.warnings.len(),
            "Aggregation complete"
        );
        Ok(result)
    }

    fn plans(&self) -> Vec<SourcePlan<'_>> {
        let mut plans: Vec<SourcePlan<'_>> = self
            .registry
            .categories()
            .iter()
            .map(|category| SourcePlan {
                source_name: &category.source_name,
                date_field: &category.date_field,
                end_date_field: category.end_date_field.as_deref(),
                origin: Origin::CategoryActivity {
                    category_id: category.id.clone(),
                },
                owner_field: None,
            })
            .collect();

        let personal = self.registry.personal_source();
        plans.push(SourcePlan {
            source_name: &personal.source_name,
            date_field: &personal.date_field,
            end_date_field: personal.end_date_field.as_deref(),
            origin: Origin::PersonalMeeting,
            owner_field: Some(&personal.owner_field),
        });
        plans
    }

    async fn fetch(
        &self,
        plan: &SourcePlan<'_>,
        user_id: &str,
        lower: NaiveDateTime,
        upper: NaiveDateTime,
        priority_filter: Option<Priority>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut filter = Filter::new()
            .gte(plan.date_field, dates::format_timestamp(lower))
            .lt(plan.date_field, dates::format_timestamp(upper));
        // Missing or out-of-range priorities read as Normal, so a Normal
        // filter can only be applied after normalization
        if let Some(priority) = priority_filter.filter(|p| *p != Priority::NORMAL) {
            filter = filter.eq(fields::PRIORITY, priority.value());
        }
        if let Some(owner_field) = plan.owner_field {
            filter = filter.eq(owner_field, user_id);
        }
        self.store
            .query(plan.source_name, &filter, &[OrderBy::asc(plan.date_field)])
            .await
    }
}
