//! Per-record discussion threads.
//!
//! Each thread moves `Closed -> Loading -> Live -> Closed`. A thread only
//! becomes live after its history loaded and its push subscription opened;
//! from then on pushed inserts are appended in arrival order. Closing (or
//! dropping the manager) releases the subscription and the cached history.
//!
//! Record ids are only unique within a source, so a thread is identified
//! by its record id together with the category that owns the record.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::aggregator::AggregateResult;
use crate::constants::message_fields;
use crate::error::{CoreError, ValidationError};
use crate::models::message::new_message_row;
use crate::models::{Message, UnreadIndex};
use crate::registry::CategoryRegistry;
use crate::store::{ExternalStore, Filter, OrderBy, Row, StoreError, SubscriptionGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Closed,
    Loading,
    Live,
}

type MessageCache = Arc<Mutex<Vec<Message>>>;

/// `(record id, category id)`
type ThreadKey = (String, String);

fn thread_key(record_id: &str, category_id: &str) -> ThreadKey {
    (record_id.to_string(), category_id.to_string())
}

struct OpenThread {
    feedback_source: String,
    state: ThreadState,
    messages: MessageCache,
    subscription: Option<SubscriptionGuard>,
}

/// Owns every open thread of one discussion view.
pub struct DiscussionManager {
    store: Arc<dyn ExternalStore>,
    registry: Arc<CategoryRegistry>,
    threads: HashMap<ThreadKey, OpenThread>,
}

impl DiscussionManager {
    pub fn new(store: Arc<dyn ExternalStore>, registry: Arc<CategoryRegistry>) -> Self {
        Self {
            store,
            registry,
            threads: HashMap::new(),
        }
    }

    fn thread(&self, record_id: &str, category_id: &str) -> Option<&OpenThread> {
        self.threads.get(&thread_key(record_id, category_id))
    }

    fn live_thread(&self, record_id: &str, category_id: &str) -> Option<&OpenThread> {
        self.thread(record_id, category_id)
            .filter(|t| t.state == ThreadState::Live)
    }

    // ===== Getters =====

    pub fn state(&self, record_id: &str, category_id: &str) -> ThreadState {
        self.thread(record_id, category_id)
            .map(|t| t.state)
            .unwrap_or(ThreadState::Closed)
    }

    pub fn is_live(&self, record_id: &str, category_id: &str) -> bool {
        self.state(record_id, category_id) == ThreadState::Live
    }

    /// Snapshot of the held history, oldest first
    pub fn messages(&self, record_id: &str, category_id: &str) -> Vec<Message> {
        self.thread(record_id, category_id)
            .map(|t| t.messages.lock().clone())
            .unwrap_or_default()
    }

    /// `(record id, category id)` of every open thread, sorted
    pub fn open_threads(&self) -> Vec<(String, String)> {
        let mut keys: Vec<ThreadKey> = self.threads.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Feedback source the thread reads from and writes to
    pub fn feedback_source_of(&self, record_id: &str, category_id: &str) -> Option<&str> {
        self.thread(record_id, category_id)
            .map(|t| t.feedback_source.as_str())
    }

    /// Unread count computed from the held messages; `None` if the thread is not live
    pub fn unread_count(&self, record_id: &str, category_id: &str, viewer_id: &str) -> Option<usize> {
        let thread = self.live_thread(record_id, category_id)?;
        let messages = thread.messages.lock();
        Some(UnreadIndex::count_messages(messages.iter(), viewer_id))
    }

    /// Unread counts of every live thread
    pub fn unread_index(&self, viewer_id: &str) -> UnreadIndex {
        let mut index = UnreadIndex::new();
        for (record_id, category_id) in self.threads.keys() {
            if let Some(count) = self.unread_count(record_id, category_id, viewer_id) {
                index.set(record_id, category_id, count);
            }
        }
        index
    }

    // ===== Lifecycle =====

    /// Load the thread's history and start listening for new messages.
    ///
    /// On any failure the thread stays closed and no subscription is left
    /// behind. Opening a thread that is already live is a no-op.
    pub async fn open(&mut self, record_id: &str, category_id: &str) -> Result<(), CoreError> {
        if self.is_live(record_id, category_id) {
            debug!(record_id, category_id, "Thread already live");
            return Ok(());
        }

        let key = thread_key(record_id, category_id);
        let feedback_source = self.registry.feedback_source(category_id).to_string();
        let messages: MessageCache = Arc::new(Mutex::new(Vec::new()));
        self.threads.insert(
            key.clone(),
            OpenThread {
                feedback_source: feedback_source.clone(),
                state: ThreadState::Loading,
                messages: messages.clone(),
                subscription: None,
            },
        );
        debug!(record_id, category_id, source = %feedback_source, "Thread loading");

        let thread_filter = Filter::new().eq(message_fields::RECORD_ID, record_id);
        let rows = match self
            .store
            .query(
                &feedback_source,
                &thread_filter,
                &[OrderBy::asc(message_fields::CREATED_AT)],
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                self.threads.remove(&key);
                warn!(record_id, category_id, error = %e, "Failed to load thread history");
                return Err(CoreError::source_unavailable(&feedback_source, &e));
            }
        };

        {
            let mut held = messages.lock();
            for row in &rows {
                match Message::from_row(row) {
                    Ok(message) => held.push(message),
                    Err(e) => debug!(record_id, "Skipping message row: {}", e),
                }
            }
        }

        let on_insert = {
            let messages = messages.clone();
            let record_id = record_id.to_string();
            Arc::new(move |row: Row| append_pushed(&messages, &record_id, &row))
        };
        let handle = match self
            .store
            .subscribe(&feedback_source, thread_filter, on_insert)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.threads.remove(&key);
                warn!(record_id, category_id, error = %e, "Failed to open push channel");
                return Err(CoreError::subscription(&feedback_source, &e));
            }
        };

        if let Some(thread) = self.threads.get_mut(&key) {
            thread.subscription = Some(SubscriptionGuard::new(self.store.clone(), handle));
            thread.state = ThreadState::Live;
        }
        info!(record_id, category_id, messages = rows.len(), "Thread live");
        Ok(())
    }

    /// Release the thread's subscription and drop its history.
    /// Returns false if the thread was not open.
    pub fn close(&mut self, record_id: &str, category_id: &str) -> bool {
        match self.threads.remove(&thread_key(record_id, category_id)) {
            Some(mut thread) => {
                if let Some(mut guard) = thread.subscription.take() {
                    guard.release();
                }
                debug!(record_id, category_id, "Thread closed");
                true
            }
            None => false,
        }
    }

    /// Close every thread (view teardown)
    pub fn close_all(&mut self) {
        for (record_id, category_id) in self.open_threads() {
            self.close(&record_id, &category_id);
        }
    }

    // ===== Messaging =====

    /// Post a message to a live thread.
    ///
    /// The held history is not touched: the message shows up through the
    /// push channel (or the next load) like anyone else's. Returns the id
    /// the store assigned.
    pub async fn send(
        &self,
        record_id: &str,
        category_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<String, CoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        let thread = self.live_thread(record_id, category_id).ok_or_else(|| {
            ValidationError::ThreadNotLive {
                record_id: record_id.to_string(),
            }
        })?;

        let stored = self
            .store
            .insert(
                &thread.feedback_source,
                new_message_row(record_id, sender_id, content),
            )
            .await
            .map_err(|e| {
                warn!(record_id, error = %e, "Failed to send message");
                CoreError::write(&thread.feedback_source, &e)
            })?;

        let id = match stored.get(message_fields::ID) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(StoreError::Malformed(format!(
                    "{} returned a message without an id",
                    thread.feedback_source
                ))
                .into())
            }
        };
        debug!(record_id, message_id = %id, "Message sent");
        Ok(id)
    }

    /// Mark every held message from someone else as read, in one batched
    /// update. Best effort: a failed write is logged and nothing changes.
    /// Returns the number of messages marked.
    pub async fn mark_read(&self, record_id: &str, category_id: &str, viewer_id: &str) -> usize {
        let Some(thread) = self.thread(record_id, category_id) else {
            return 0;
        };
        let unread_ids: Vec<String> = thread
            .messages
            .lock()
            .iter()
            .filter(|m| m.is_unread_for(viewer_id))
            .map(|m| m.id.clone())
            .collect();
        if unread_ids.is_empty() {
            return 0;
        }

        let read_at = Utc::now();
        let mut patch = Row::new();
        patch.insert(
            message_fields::READ_AT.to_string(),
            Value::String(read_at.to_rfc3339()),
        );
        let filter = Filter::new().is_in(message_fields::ID, unread_ids.iter().cloned());

        match self.store.update(&thread.feedback_source, &filter, patch).await {
            Ok(affected) => {
                let mut held = thread.messages.lock();
                for message in held.iter_mut().filter(|m| unread_ids.contains(&m.id)) {
                    message.read_at = Some(read_at);
                }
                debug!(record_id, marked = unread_ids.len(), affected, "Marked read");
                unread_ids.len()
            }
            Err(e) => {
                warn!(record_id, error = %e, "Failed to mark messages read");
                0
            }
        }
    }

    // ===== Batch unread lookup =====

    /// Unread counts for records whose threads are not necessarily open.
    ///
    /// Records are grouped by feedback source and each source is queried
    /// once, all sources concurrently. Records of a source that fails are
    /// left out of the index rather than guessed.
    pub async fn unread_counts(&self, records: &[(String, String)], viewer_id: &str) -> UnreadIndex {
        let mut by_source: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
        for (record_id, category_id) in records {
            let keys = by_source
                .entry(self.registry.feedback_source(category_id))
                .or_default();
            let key = (record_id.as_str(), category_id.as_str());
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let queries = by_source.iter().map(|(source, keys)| {
            let mut record_ids: Vec<&str> = keys.iter().map(|(record_id, _)| *record_id).collect();
            record_ids.sort_unstable();
            record_ids.dedup();
            let filter = Filter::new()
                .is_in(message_fields::RECORD_ID, record_ids)
                .is_null(message_fields::READ_AT)
                .neq(message_fields::SENDER_ID, viewer_id);
            async move { self.store.query(source, &filter, &[]).await }
        });
        let outcomes = join_all(queries).await;

        let mut index = UnreadIndex::new();
        for ((source, keys), outcome) in by_source.iter().zip(outcomes) {
            let rows = match outcome {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(source = *source, error = %e, "Unread lookup failed");
                    continue;
                }
            };
            let mut counts: HashMap<String, usize> = HashMap::new();
            for row in &rows {
                let record_id = match row.get(message_fields::RECORD_ID) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => continue,
                };
                *counts.entry(record_id).or_default() += 1;
            }
            for (record_id, category_id) in keys {
                let count = counts.get(*record_id).copied().unwrap_or(0);
                index.set(record_id, category_id, count);
            }
        }
        index
    }

    /// Unread counts for every discussion-owning item of an aggregation
    pub async fn unread_for_items(&self, result: &AggregateResult, viewer_id: &str) -> UnreadIndex {
        self.unread_counts(&result.discussion_keys(), viewer_id).await
    }
}

impl Drop for DiscussionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Push callback body: parse and append, ignoring ids already held
fn append_pushed(messages: &MessageCache, record_id: &str, row: &Row) {
    let message = match Message::from_row(row) {
        Ok(message) => message,
        Err(e) => {
            warn!(record_id, "Ignoring pushed row: {}", e);
            return;
        }
    };
    if message.thread_id != record_id {
        return;
    }
    let mut held = messages.lock();
    if !held.iter().any(|m| m.id == message.id) {
        held.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FALLBACK_FEEDBACK_SOURCE;
    use crate::store::{Identity, InsertCallback, MemoryStore, SubscriptionHandle};
    use async_trait::async_trait;
    use serde_json::json;

    const FEEDBACK: &str = "purchase_order_feedback";
    const PO: &str = "purchasing";

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::with_identity("bob"));
        store.seed(
            FEEDBACK,
            vec![
                row(json!({"id": "m2", "record_id": "po-1", "sender_id": "alice",
                           "content": "second", "created_at": "2024-01-10T09:00:00Z", "read_at": null})),
                row(json!({"id": "m1", "record_id": "po-1", "sender_id": "alice",
                           "content": "first", "created_at": "2024-01-10T08:00:00Z", "read_at": null})),
                row(json!({"id": "m3", "record_id": "po-1", "sender_id": "bob",
                           "content": "mine", "created_at": "2024-01-10T10:00:00Z", "read_at": null})),
                row(json!({"id": "m4", "record_id": "po-2", "sender_id": "alice",
                           "content": "other", "created_at": "2024-01-11T08:00:00Z", "read_at": null})),
            ],
        );
        store
    }

    fn manager(store: &Arc<MemoryStore>) -> DiscussionManager {
        DiscussionManager::new(store.clone(), Arc::new(CategoryRegistry::default()))
    }

    fn contents(manager: &DiscussionManager, record_id: &str, category_id: &str) -> Vec<String> {
        manager
            .messages(record_id, category_id)
            .into_iter()
            .map(|m| m.content)
            .collect()
    }

    /// Store whose inserts come back without an id
    struct IdlessInserts(Arc<MemoryStore>);

    #[async_trait]
    impl ExternalStore for IdlessInserts {
        async fn query(
            &self,
            source: &str,
            filter: &Filter,
            order_by: &[OrderBy],
        ) -> Result<Vec<Row>, StoreError> {
            self.0.query(source, filter, order_by).await
        }

        async fn insert(&self, source: &str, row: Row) -> Result<Row, StoreError> {
            let mut stored = self.0.insert(source, row).await?;
            stored.remove(message_fields::ID);
            Ok(stored)
        }

        async fn update(&self, source: &str, filter: &Filter, patch: Row) -> Result<usize, StoreError> {
            self.0.update(source, filter, patch).await
        }

        async fn delete(&self, source: &str, filter: &Filter) -> Result<usize, StoreError> {
            self.0.delete(source, filter).await
        }

        async fn subscribe(
            &self,
            source: &str,
            filter: Filter,
            on_insert: InsertCallback,
        ) -> Result<SubscriptionHandle, StoreError> {
            self.0.subscribe(source, filter, on_insert).await
        }

        fn unsubscribe(&self, handle: SubscriptionHandle) {
            self.0.unsubscribe(handle)
        }

        async fn current_identity(&self) -> Result<Identity, StoreError> {
            self.0.current_identity().await
        }
    }

    #[tokio::test]
    async fn test_open_loads_history_in_order_and_goes_live() {
        let store = seeded_store();
        let mut manager = manager(&store);
        assert_eq!(manager.state("po-1", PO), ThreadState::Closed);

        manager.open("po-1", PO).await.unwrap();
        assert_eq!(manager.state("po-1", PO), ThreadState::Live);
        assert_eq!(contents(&manager, "po-1", PO), vec!["first", "second", "mine"]);
        assert_eq!(store.active_subscriptions(), 1);
        assert_eq!(manager.feedback_source_of("po-1", PO), Some(FEEDBACK));

        // Re-opening a live thread does not subscribe twice
        manager.open("po-1", PO).await.unwrap();
        assert_eq!(store.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_same_record_id_under_two_categories_are_separate_threads() {
        let store = seeded_store();
        store.seed(
            FEEDBACK,
            vec![row(json!({"id": "p9", "record_id": "9", "sender_id": "alice",
                            "content": "po", "created_at": "2024-01-10T08:00:00Z"}))],
        );
        store.seed(
            "delivery_feedback",
            vec![row(json!({"id": "d9", "record_id": "9", "sender_id": "alice",
                            "content": "delivery", "created_at": "2024-01-10T08:00:00Z"}))],
        );
        let mut manager = manager(&store);

        manager.open("9", PO).await.unwrap();
        manager.open("9", "deliveries").await.unwrap();
        assert_eq!(store.active_subscriptions(), 2);
        assert_eq!(contents(&manager, "9", PO), vec!["po"]);
        assert_eq!(contents(&manager, "9", "deliveries"), vec!["delivery"]);
        assert_eq!(manager.feedback_source_of("9", "deliveries"), Some("delivery_feedback"));

        manager.send("9", "deliveries", "bob", "arrived").await.unwrap();
        assert_eq!(store.rows(FEEDBACK).len(), 5);
        assert_eq!(store.rows("delivery_feedback").len(), 2);
        assert_eq!(contents(&manager, "9", "deliveries"), vec!["delivery", "arrived"]);
        assert_eq!(contents(&manager, "9", PO), vec!["po"]);

        assert!(manager.close("9", PO));
        assert!(manager.is_live("9", "deliveries"));
        assert_eq!(store.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_failed_history_load_leaves_thread_closed() {
        let store = seeded_store();
        store.fail_source(FEEDBACK);
        let mut manager = manager(&store);

        let err = manager.open("po-1", PO).await.unwrap_err();
        assert!(matches!(err, CoreError::SourceUnavailable { .. }));
        assert_eq!(manager.state("po-1", PO), ThreadState::Closed);
        assert_eq!(store.active_subscriptions(), 0);
        assert!(manager.messages("po-1", PO).is_empty());
    }

    #[tokio::test]
    async fn test_failed_subscription_leaves_thread_closed() {
        let store = seeded_store();
        store.set_fail_subscriptions(true);
        let mut manager = manager(&store);

        let err = manager.open("po-1", PO).await.unwrap_err();
        assert!(matches!(err, CoreError::Subscription { .. }));
        assert_eq!(manager.state("po-1", PO), ThreadState::Closed);
        assert!(manager.messages("po-1", PO).is_empty());

        // Caller may retry once the channel recovers
        store.set_fail_subscriptions(false);
        manager.open("po-1", PO).await.unwrap();
        assert!(manager.is_live("po-1", PO));
    }

    #[tokio::test]
    async fn test_pushed_messages_append_in_arrival_order() {
        let store = seeded_store();
        let mut manager = manager(&store);
        manager.open("po-1", PO).await.unwrap();

        // Older timestamp, but arrives later: appended, not re-sorted
        store
            .insert(FEEDBACK, row(json!({"id": "p1", "record_id": "po-1", "sender_id": "carol",
                                        "content": "late", "created_at": "2024-01-01T00:00:00Z"})))
            .await
            .unwrap();
        store
            .insert(FEEDBACK, row(json!({"id": "p2", "record_id": "po-2", "sender_id": "carol",
                                        "content": "elsewhere"})))
            .await
            .unwrap();

        assert_eq!(
            contents(&manager, "po-1", PO),
            vec!["first", "second", "mine", "late"]
        );
    }

    #[tokio::test]
    async fn test_send_validation() {
        let store = seeded_store();
        let mut manager = manager(&store);

        let err = manager.send("po-1", PO, "bob", "hello").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::ThreadNotLive { .. })
        ));

        manager.open("po-1", PO).await.unwrap();
        let err = manager.send("po-1", PO, "bob", "   \n").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::EmptyContent)
        ));
        // Live under another category only
        let err = manager.send("po-1", "deliveries", "bob", "hello").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_sent_message_arrives_once_through_push() {
        let store = seeded_store();
        let mut manager = manager(&store);
        manager.open("po-1", PO).await.unwrap();

        let id = manager.send("po-1", PO, "bob", "  on my way ").await.unwrap();
        assert!(!id.is_empty());

        let messages = manager.messages("po-1", PO);
        let sent: Vec<_> = messages.iter().filter(|m| m.id == id).collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "on my way");
        assert_eq!(sent[0].sender_id, "bob");
    }

    #[tokio::test]
    async fn test_send_without_stored_id_is_an_error() {
        let memory = seeded_store();
        let store: Arc<dyn ExternalStore> = Arc::new(IdlessInserts(memory.clone()));
        let mut manager = DiscussionManager::new(store, Arc::new(CategoryRegistry::default()));
        manager.open("po-1", PO).await.unwrap();

        let err = manager.send("po-1", PO, "bob", "hello").await.unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_write_failure_leaves_history_untouched() {
        let store = seeded_store();
        let mut manager = manager(&store);
        manager.open("po-1", PO).await.unwrap();
        store.set_fail_writes(true);

        let err = manager.send("po-1", PO, "bob", "hello").await.unwrap_err();
        assert!(matches!(err, CoreError::Write { .. }));
        assert_eq!(manager.messages("po-1", PO).len(), 3);
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let store = seeded_store();
        let mut manager = manager(&store);
        manager.open("po-1", PO).await.unwrap();
        assert_eq!(manager.unread_count("po-1", PO, "bob"), Some(2));

        assert_eq!(manager.mark_read("po-1", PO, "bob").await, 2);
        assert_eq!(store.write_count(), 1);
        assert_eq!(manager.unread_count("po-1", PO, "bob"), Some(0));

        assert_eq!(manager.mark_read("po-1", PO, "bob").await, 0);
        assert_eq!(store.write_count(), 1);

        // Persisted too: bob's own message stays unread for alice
        let unread = manager
            .unread_counts(&[("po-1".to_string(), PO.to_string())], "bob")
            .await;
        assert_eq!(unread.get("po-1", PO), Some(0));
        assert_eq!(manager.unread_count("po-1", PO, "alice"), Some(1));
    }

    #[tokio::test]
    async fn test_mark_read_failure_is_best_effort() {
        let store = seeded_store();
        let mut manager = manager(&store);
        manager.open("po-1", PO).await.unwrap();
        store.set_fail_writes(true);

        assert_eq!(manager.mark_read("po-1", PO, "bob").await, 0);
        assert_eq!(manager.unread_count("po-1", PO, "bob"), Some(2));
        assert_eq!(manager.mark_read("closed-thread", PO, "bob").await, 0);
    }

    #[tokio::test]
    async fn test_close_releases_subscription_and_history() {
        let store = seeded_store();
        let mut manager = manager(&store);
        manager.open("po-1", PO).await.unwrap();
        manager.open("po-2", PO).await.unwrap();
        assert_eq!(store.active_subscriptions(), 2);

        assert!(manager.close("po-1", PO));
        assert!(!manager.close("po-1", PO));
        assert!(!manager.close("po-2", "deliveries"));
        assert_eq!(store.active_subscriptions(), 1);
        assert_eq!(manager.state("po-1", PO), ThreadState::Closed);
        assert!(manager.messages("po-1", PO).is_empty());
        assert_eq!(
            manager.open_threads(),
            vec![("po-2".to_string(), PO.to_string())]
        );

        drop(manager);
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_unknown_category_uses_fallback_source() {
        let store = seeded_store();
        store.seed(
            FALLBACK_FEEDBACK_SOURCE,
            vec![row(json!({"id": "g1", "record_id": "x-1", "sender_id": "alice",
                            "content": "fallback", "created_at": "2024-01-10T08:00:00Z"}))],
        );
        let mut manager = manager(&store);
        manager.open("x-1", "retired-category").await.unwrap();
        assert_eq!(contents(&manager, "x-1", "retired-category"), vec!["fallback"]);
    }

    #[tokio::test]
    async fn test_batch_unread_counts_without_opening_threads() {
        let store = seeded_store();
        store.seed(
            "delivery_feedback",
            vec![row(json!({"id": "d1", "record_id": 9, "sender_id": "alice",
                            "created_at": "2024-01-10T08:00:00Z", "read_at": null}))],
        );
        let manager = manager(&store);

        let records = vec![
            ("po-1".to_string(), PO.to_string()),
            ("po-2".to_string(), PO.to_string()),
            ("po-9".to_string(), PO.to_string()),
            ("9".to_string(), "deliveries".to_string()),
        ];
        let index = manager.unread_counts(&records, "bob").await;
        assert_eq!(index.get("po-1", PO), Some(2));
        assert_eq!(index.get("po-2", PO), Some(1));
        assert_eq!(index.get("po-9", PO), Some(0));
        assert_eq!(index.get("9", "deliveries"), Some(1));
        assert_eq!(index.total(), 4);
        // One query per feedback source, no push channels
        assert_eq!(store.query_count(), 2);
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_batch_unread_keeps_colliding_record_ids_apart() {
        let store = seeded_store();
        store.seed(
            FEEDBACK,
            vec![row(json!({"id": "p9", "record_id": "9", "sender_id": "alice",
                            "created_at": "2024-01-10T08:00:00Z", "read_at": null}))],
        );
        store.seed(
            "delivery_feedback",
            vec![
                row(json!({"id": "d1", "record_id": "9", "sender_id": "alice",
                           "created_at": "2024-01-10T08:00:00Z", "read_at": null})),
                row(json!({"id": "d2", "record_id": "9", "sender_id": "carol",
                           "created_at": "2024-01-10T09:00:00Z", "read_at": null})),
            ],
        );
        let manager = manager(&store);

        let records = vec![
            ("9".to_string(), PO.to_string()),
            ("9".to_string(), "deliveries".to_string()),
        ];
        let index = manager.unread_counts(&records, "bob").await;
        assert_eq!(index.get("9", PO), Some(1));
        assert_eq!(index.get("9", "deliveries"), Some(2));
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_unread_omits_failing_source() {
        let store = seeded_store();
        store.fail_source("delivery_feedback");
        let manager = manager(&store);

        let records = vec![
            ("po-1".to_string(), PO.to_string()),
            ("9".to_string(), "deliveries".to_string()),
        ];
        let index = manager.unread_counts(&records, "bob").await;
        assert_eq!(index.get("po-1", PO), Some(2));
        assert!(!index.contains("9", "deliveries"));
    }

    #[tokio::test]
    async fn test_unread_index_covers_live_threads_only() {
        let store = seeded_store();
        let mut manager = manager(&store);
        manager.open("po-1", PO).await.unwrap();

        let index = manager.unread_index("bob");
        assert_eq!(index.get("po-1", PO), Some(2));
        assert_eq!(index.get("po-2", PO), None);
        assert_eq!(manager.unread_count("po-2", PO, "bob"), None);
    }
}
