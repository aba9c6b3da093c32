use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use super::{
    compare_rows, ExternalStore, Filter, Identity, InsertCallback, OrderBy, Row, StoreError,
    SubscriptionHandle,
};
use crate::constants::message_fields;
use crate::dates;

struct Subscription {
    source: String,
    filter: Filter,
    on_insert: InsertCallback,
}

#[derive(Default)]
struct MemoryState {
    sources: HashMap<String, Vec<Row>>,
    subscriptions: HashMap<u64, Subscription>,
    next_subscription: u64,
    identity: Option<Identity>,

    // Failure injection
    failing_sources: HashSet<String>,
    fail_subscriptions: bool,
    fail_writes: bool,
    latency: Option<Duration>,

    // Call accounting
    queries_by_source: HashMap<String, usize>,
    write_count: usize,
}

/// In-process store: rows are kept per source in insertion order.
///
/// Besides backing the CLI it doubles as the test store, so it can be told
/// to fail specific sources, subscriptions or writes, to delay every call,
/// and it counts the calls made against it.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(id: &str) -> Self {
        let store = Self::new();
        store.set_identity(Some(id));
        store
    }

    // ===== Seeding =====

    pub fn set_identity(&self, id: Option<&str>) {
        self.state.lock().identity = id.map(|id| Identity { id: id.to_string() });
    }

    /// Append rows to a source without notifying subscribers
    pub fn seed(&self, source: &str, rows: impl IntoIterator<Item = Row>) {
        self.state
            .lock()
            .sources
            .entry(source.to_string())
            .or_default()
            .extend(rows);
    }

    /// Seed from a JSON array of objects; non-object entries are rejected
    pub fn seed_json(&self, source: &str, rows: Value) -> Result<usize, StoreError> {
        let Value::Array(items) = rows else {
            return Err(StoreError::Malformed(format!(
                "seed for {} is not an array",
                source
            )));
        };
        let mut parsed = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Object(row) => parsed.push(row),
                other => {
                    return Err(StoreError::Malformed(format!(
                        "seed row for {} is not an object: {}",
                        source, other
                    )))
                }
            }
        }
        let count = parsed.len();
        self.seed(source, parsed);
        Ok(count)
    }

    // ===== Failure injection =====

    pub fn fail_source(&self, source: &str) {
        self.state.lock().failing_sources.insert(source.to_string());
    }

    pub fn restore_source(&self, source: &str) {
        self.state.lock().failing_sources.remove(source);
    }

    pub fn set_fail_subscriptions(&self, fail: bool) {
        self.state.lock().fail_subscriptions = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Delay every async call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    // ===== Inspection =====

    pub fn rows(&self, source: &str) -> Vec<Row> {
        self.state
            .lock()
            .sources
            .get(source)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of `query`/`count` calls, failed ones included
    pub fn query_count(&self) -> usize {
        self.state.lock().queries_by_source.values().sum()
    }

    pub fn query_count_for(&self, source: &str) -> usize {
        self.state
            .lock()
            .queries_by_source
            .get(source)
            .copied()
            .unwrap_or(0)
    }

    /// Number of `insert`/`update`/`delete` calls that reached the store
    pub fn write_count(&self) -> usize {
        self.state.lock().write_count
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    // ===== Internals =====

    async fn simulate_latency(&self) {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_readable(state: &MemoryState, source: &str) -> Result<(), StoreError> {
        if state.failing_sources.contains(source) {
            return Err(StoreError::Unavailable {
                source_name: source.to_string(),
                message: "source offline".to_string(),
            });
        }
        Ok(())
    }

    fn check_writable(state: &MemoryState, source: &str) -> Result<(), StoreError> {
        if state.fail_writes || state.failing_sources.contains(source) {
            return Err(StoreError::Rejected {
                source_name: source.to_string(),
                message: "write refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalStore for MemoryStore {
    async fn query(
        &self,
        source: &str,
        filter: &Filter,
        order_by: &[OrderBy],
    ) -> Result<Vec<Row>, StoreError> {
        {
            let mut state = self.state.lock();
            *state
                .queries_by_source
                .entry(source.to_string())
                .or_insert(0) += 1;
        }
        self.simulate_latency().await;

        let state = self.state.lock();
        Self::check_readable(&state, source)?;
        let mut rows: Vec<Row> = state
            .sources
            .get(source)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        if !order_by.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, order_by));
        }
        Ok(rows)
    }

    async fn insert(&self, source: &str, mut row: Row) -> Result<Row, StoreError> {
        self.simulate_latency().await;

        let callbacks: Vec<InsertCallback> = {
            let mut state = self.state.lock();
            state.write_count += 1;
            Self::check_writable(&state, source)?;

            let missing = |row: &Row, field: &str| row.get(field).map_or(true, Value::is_null);
            if missing(&row, message_fields::ID) {
                row.insert(
                    message_fields::ID.to_string(),
                    Value::String(Uuid::new_v4().to_string()),
                );
            }
            if missing(&row, message_fields::CREATED_AT) {
                row.insert(
                    message_fields::CREATED_AT.to_string(),
                    Value::String(dates::now_rfc3339()),
                );
            }

            state
                .sources
                .entry(source.to_string())
                .or_default()
                .push(row.clone());

            state
                .subscriptions
                .values()
                .filter(|sub| sub.source == source && sub.filter.matches(&row))
                .map(|sub| sub.on_insert.clone())
                .collect()
        };

        // Callbacks run outside the lock so they may call back into the store
        for on_insert in callbacks {
            on_insert(row.clone());
        }
        Ok(row)
    }

    async fn update(&self, source: &str, filter: &Filter, patch: Row) -> Result<usize, StoreError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        state.write_count += 1;
        Self::check_writable(&state, source)?;

        let mut affected = 0;
        if let Some(rows) = state.sources.get_mut(source) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                for (field, value) in &patch {
                    row.insert(field.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(&self, source: &str, filter: &Filter) -> Result<usize, StoreError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        state.write_count += 1;
        Self::check_writable(&state, source)?;

        let Some(rows) = state.sources.get_mut(source) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok(before - rows.len())
    }

    async fn subscribe(
        &self,
        source: &str,
        filter: Filter,
        on_insert: InsertCallback,
    ) -> Result<SubscriptionHandle, StoreError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        if state.fail_subscriptions {
            return Err(StoreError::Unavailable {
                source_name: source.to_string(),
                message: "push channel refused".to_string(),
            });
        }
        state.next_subscription += 1;
        let id = state.next_subscription;
        state.subscriptions.insert(
            id,
            Subscription {
                source: source.to_string(),
                filter,
                on_insert,
            },
        );
        Ok(SubscriptionHandle(id))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.state.lock().subscriptions.remove(&handle.0);
    }

    async fn current_identity(&self) -> Result<Identity, StoreError> {
        self.state.lock().identity.clone().ok_or(StoreError::NoIdentity)
    }
}
