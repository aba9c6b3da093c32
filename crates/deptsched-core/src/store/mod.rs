//! Abstract capability set of the external data store.
//!
//! The core never talks to a concrete backend; it only sees `ExternalStore`.
//! `MemoryStore` is the in-process implementation used by tests and the CLI.

pub mod filter;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use filter::{compare_rows, compare_values, Condition, Filter, OrderBy};
pub use memory::MemoryStore;

/// A record as returned by the store: field name -> JSON value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Invoked once per row inserted into a subscribed source
pub type InsertCallback = Arc<dyn Fn(Row) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// The acting viewer, as established by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Source {source_name} unavailable: {message}")]
    Unavailable {
        source_name: String,
        message: String,
    },

    #[error("Write to {source_name} rejected: {message}")]
    Rejected {
        source_name: String,
        message: String,
    },

    #[error("Malformed row: {0}")]
    Malformed(String),

    #[error("No identity established")]
    NoIdentity,
}

#[async_trait]
pub trait ExternalStore: Send + Sync {
    /// Rows of `source` matching `filter`, ordered by the given keys
    async fn query(
        &self,
        source: &str,
        filter: &Filter,
        order_by: &[OrderBy],
    ) -> Result<Vec<Row>, StoreError>;

    /// Number of rows matching `filter`
    async fn count(&self, source: &str, filter: &Filter) -> Result<usize, StoreError> {
        Ok(self.query(source, filter, &[]).await?.len())
    }

    /// Insert a row; the store fills server-assigned fields and returns the stored row
    async fn insert(&self, source: &str, row: Row) -> Result<Row, StoreError>;

    /// Apply `patch` to every matching row, returning the number of affected rows
    async fn update(&self, source: &str, filter: &Filter, patch: Row) -> Result<usize, StoreError>;

    async fn delete(&self, source: &str, filter: &Filter) -> Result<usize, StoreError>;

    /// Deliver every future insert into `source` that matches `filter`
    async fn subscribe(
        &self,
        source: &str,
        filter: Filter,
        on_insert: InsertCallback,
    ) -> Result<SubscriptionHandle, StoreError>;

    /// Release a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    async fn current_identity(&self) -> Result<Identity, StoreError>;
}

/// Owns a live subscription and releases it when dropped.
pub struct SubscriptionGuard {
    store: Arc<dyn ExternalStore>,
    handle: Option<SubscriptionHandle>,
}

impl SubscriptionGuard {
    pub fn new(store: Arc<dyn ExternalStore>, handle: SubscriptionHandle) -> Self {
        Self {
            store,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> Option<SubscriptionHandle> {
        self.handle
    }

    /// Release now instead of waiting for drop
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.store.unsubscribe(handle);
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("handle", &self.handle)
            .finish()
    }
}
