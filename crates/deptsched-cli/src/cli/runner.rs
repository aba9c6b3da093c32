use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use deptsched_core::dates::{self, DateRange};
use deptsched_core::store::ExternalStore;
use deptsched_core::{
    AggregateQuery, CategoryRegistry, CoreConfig, DiscussionManager, MemoryStore, Priority,
    RefreshController, RefreshOutcome, ScheduleAggregator, ScheduleSnapshot,
};
use serde_json::{json, Value};
use tracing::debug;

use super::protocol::CliCommand;

/// Everything a command needs, built once per invocation
pub struct Session {
    store: Arc<MemoryStore>,
    config: CoreConfig,
    registry: Arc<CategoryRegistry>,
    aggregator: Arc<ScheduleAggregator>,
}

impl Session {
    pub fn new(store: MemoryStore, config: CoreConfig) -> Self {
        let store = Arc::new(store);
        let registry = Arc::new(CategoryRegistry::from_config(&config));
        let aggregator = Arc::new(ScheduleAggregator::new(store.clone(), registry.clone()));
        Self {
            store,
            config,
            registry,
            aggregator,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub async fn execute(&self, command: CliCommand) -> Result<Value> {
        debug!("Executing {:?}", command);
        match command {
            CliCommand::Categories => Ok(serde_json::to_value(self.registry.categories())?),
            CliCommand::Agenda {
                user,
                from,
                to,
                priority,
                with_unread,
            } => {
                let user = self.acting_user(user).await?;
                let range = DateRange::partial(parse_day(from)?, parse_day(to)?);
                let query = AggregateQuery::new(&user, range).with_priority(priority.map(Priority::from));
                self.agenda(query, with_unread).await
            }
            CliCommand::Watch {
                user,
                from,
                to,
                ticks,
            } => {
                let user = self.acting_user(user).await?;
                let range = DateRange::partial(parse_day(Some(from))?, parse_day(Some(to))?);
                self.watch(AggregateQuery::new(&user, range), ticks).await
            }
            CliCommand::Unread { viewer, records } => {
                let viewer = self.acting_user(viewer).await?;
                let discussions = self.discussions();
                let index = discussions.unread_counts(&records, &viewer).await;
                Ok(serde_json::to_value(index)?)
            }
            CliCommand::Thread {
                record,
                category,
                mark_read_as,
            } => self.thread(&record, &category, mark_read_as).await,
            CliCommand::Send {
                record,
                category,
                sender,
                content,
            } => {
                let sender = self.acting_user(sender).await?;
                let mut discussions = self.discussions();
                discussions.open(&record, &category).await?;
                let id = discussions.send(&record, &category, &sender, &content).await?;
                discussions.close(&record, &category);
                Ok(json!({ "record": record, "id": id }))
            }
        }
    }

    fn discussions(&self) -> DiscussionManager {
        DiscussionManager::new(self.store.clone(), self.registry.clone())
    }

    /// Explicit id, or the identity the store reports
    async fn acting_user(&self, explicit: Option<String>) -> Result<String> {
        if let Some(id) = explicit {
            return Ok(id);
        }
        let identity = self
            .store
            .current_identity()
            .await
            .context("No user given and the store has no identity")?;
        Ok(identity.id)
    }

    async fn agenda(&self, query: AggregateQuery, with_unread: Option<String>) -> Result<Value> {
        let controller = RefreshController::new(
            self.aggregator.clone(),
            query,
            self.config.auto_refresh_interval(),
        );
        let snapshot = match controller.manual_refresh().await {
            RefreshOutcome::Refreshed(snapshot) => snapshot,
            RefreshOutcome::Failed(e) => return Err(e.into()),
            RefreshOutcome::Skipped => bail!("Refresh already in progress"),
        };

        let mut output = json!({
            "items": snapshot.result.items,
            "warnings": snapshot.result.warnings,
        });
        if let Some(viewer) = with_unread {
            let unread = self
                .discussions()
                .unread_for_items(&snapshot.result, &viewer)
                .await;
            output["unread"] = serde_json::to_value(unread)?;
        }
        Ok(output)
    }

    async fn watch(&self, query: AggregateQuery, ticks: u32) -> Result<Value> {
        let controller = RefreshController::new(
            self.aggregator.clone(),
            query,
            self.config.auto_refresh_interval(),
        );
        let mut rx = controller.subscribe();
        let mut summaries = Vec::new();

        if let RefreshOutcome::Failed(e) = controller.manual_refresh().await {
            return Err(e.into());
        }
        rx.borrow_and_update();
        summaries.push(summarize(&controller.latest()));

        if summaries.len() < ticks as usize {
            controller.set_auto_refresh(true);
            while summaries.len() < ticks as usize {
                rx.changed()
                    .await
                    .map_err(|_| anyhow!("Refresh controller stopped"))?;
                let snapshot = rx.borrow_and_update().clone();
                summaries.push(summarize(&snapshot));
            }
        }
        controller.teardown();
        Ok(Value::Array(summaries))
    }

    async fn thread(&self, record: &str, category: &str, mark_read_as: Option<String>) -> Result<Value> {
        let mut discussions = self.discussions();
        discussions.open(record, category).await?;

        let marked = match &mark_read_as {
            Some(viewer) => Some(discussions.mark_read(record, category, viewer).await),
            None => None,
        };
        let unread = match &mark_read_as {
            Some(viewer) => discussions.unread_count(record, category, viewer),
            None => None,
        };
        let messages = discussions.messages(record, category);
        discussions.close(record, category);

        Ok(json!({
            "record": record,
            "category": category,
            "messages": messages,
            "markedRead": marked,
            "unread": unread,
        }))
    }
}

fn summarize(snapshot: &ScheduleSnapshot) -> Value {
    json!({
        "refreshedAt": snapshot.refreshed_at,
        "items": snapshot.result.items.len(),
        "warnings": snapshot.result.warnings.len(),
    })
}

fn parse_day(value: Option<String>) -> Result<Option<chrono::NaiveDate>> {
    match value {
        None => Ok(None),
        Some(s) => dates::parse_date(&s)
            .map(Some)
            .ok_or_else(|| anyhow!("Invalid date '{}', expected YYYY-MM-DD", s)),
    }
}
