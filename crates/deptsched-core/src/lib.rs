//! Schedule aggregation and per-record discussion engine for department
//! scheduling.

pub mod aggregator;
pub mod config;
pub mod constants;
pub mod dates;
pub mod discussion;
pub mod error;
pub mod models;
pub mod refresh;
pub mod registry;
pub mod store;
pub mod tracing_setup;

pub use aggregator::{AggregateResult, ScheduleAggregator, SourceWarning};
pub use config::CoreConfig;
pub use dates::DateRange;
pub use discussion::{DiscussionManager, ThreadState};
pub use error::{CoreError, ValidationError};
pub use models::{Category, Message, Origin, Priority, ScheduleItem, UnreadIndex};
pub use refresh::{AggregateQuery, RefreshController, RefreshOutcome, RefreshState, ScheduleSnapshot};
pub use registry::CategoryRegistry;
pub use store::{ExternalStore, MemoryStore};
