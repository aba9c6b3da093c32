//! Application-wide constants
//!
//! Centralized location for field names and policy values that are shared
//! between the aggregator, the discussion manager and the refresh controller.

/// Priority assigned when a record carries none (or an out-of-range value)
pub const DEFAULT_PRIORITY: u8 = 2;

/// Lowest valid priority
pub const MIN_PRIORITY: u8 = 1;

/// Highest valid priority (most urgent)
pub const MAX_PRIORITY: u8 = 5;

/// Interval between automatic refreshes of an aggregation view
pub const AUTO_REFRESH_INTERVAL_SECS: u64 = 2 * 60; // 2 minutes

/// Feedback source used when a category id cannot be resolved
pub const FALLBACK_FEEDBACK_SOURCE: &str = "general_feedback";

// Personal-activity source defaults
pub const PERSONAL_SOURCE: &str = "meetings";
pub const PERSONAL_DATE_FIELD: &str = "meeting_date";
pub const PERSONAL_OWNER_FIELD: &str = "user_id";

// Field names shared by every activity row
pub mod fields {
    /// Row identifier (string or integer)
    pub const ID: &str = "id";
    /// Priority 1..=5
    pub const PRIORITY: &str = "priority";
}

// Field names of feedback (discussion message) rows
pub mod message_fields {
    pub const ID: &str = "id";
    /// Identifier of the record the thread is attached to
    pub const RECORD_ID: &str = "record_id";
    pub const SENDER_ID: &str = "sender_id";
    pub const CONTENT: &str = "content";
    /// Assigned by the store on insert
    pub const CREATED_AT: &str = "created_at";
    pub const READ_AT: &str = "read_at";
}
