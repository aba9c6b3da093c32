use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::message_fields as f;
use crate::dates;
use crate::store::{Row, StoreError};

/// One message of a record's discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Identifier of the record that owns the thread
    pub thread_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        let text = |field: &str| -> Option<String> {
            match row.get(field)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };

        let id = text(f::ID).ok_or_else(|| StoreError::Malformed("message without id".into()))?;
        let thread_id = text(f::RECORD_ID)
            .ok_or_else(|| StoreError::Malformed(format!("message {} without record", id)))?;
        let sender_id = text(f::SENDER_ID)
            .ok_or_else(|| StoreError::Malformed(format!("message {} without sender", id)))?;
        let created_at = row
            .get(f::CREATED_AT)
            .and_then(dates::parse_utc)
            .ok_or_else(|| StoreError::Malformed(format!("message {} without timestamp", id)))?;

        Ok(Self {
            id,
            thread_id,
            sender_id,
            content: text(f::CONTENT).unwrap_or_default(),
            created_at,
            read_at: row.get(f::READ_AT).and_then(dates::parse_utc),
        })
    }

    /// Unread for `viewer`: authored by someone else and never read
    pub fn is_unread_for(&self, viewer_id: &str) -> bool {
        self.sender_id != viewer_id && self.read_at.is_none()
    }
}

/// Row for a new message. `id` and `created_at` are left to the store.
pub fn new_message_row(record_id: &str, sender_id: &str, content: &str) -> Row {
    let mut row = Row::new();
    row.insert(f::RECORD_ID.into(), Value::String(record_id.to_string()));
    row.insert(f::SENDER_ID.into(), Value::String(sender_id.to_string()));
    row.insert(f::CONTENT.into(), Value::String(content.to_string()));
    row.insert(f::READ_AT.into(), Value::Null);
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_row() {
        let message = Message::from_row(&row(json!({
            "id": 7,
            "record_id": "po-1",
            "sender_id": "alice",
            "content": "Supplier confirmed",
            "created_at": "2024-01-10T08:00:00Z",
            "read_at": null
        })))
        .unwrap();
        assert_eq!(message.id, "7");
        assert_eq!(message.thread_id, "po-1");
        assert!(message.read_at.is_none());
        assert!(message.is_unread_for("bob"));
        assert!(!message.is_unread_for("alice"));
    }

    #[test]
    fn test_read_message_is_not_unread() {
        let message = Message::from_row(&row(json!({
            "id": "m",
            "record_id": "r",
            "sender_id": "alice",
            "created_at": "2024-01-10T08:00:00Z",
            "read_at": "2024-01-10T09:00:00Z"
        })))
        .unwrap();
        assert!(!message.is_unread_for("bob"));
        assert_eq!(message.content, "");
    }

    #[test]
    fn test_from_row_requires_timestamp_and_sender() {
        assert!(Message::from_row(&row(json!({"id": "m", "record_id": "r", "sender_id": "a"}))).is_err());
        assert!(Message::from_row(&row(json!({
            "id": "m", "record_id": "r", "created_at": "2024-01-10"
        })))
        .is_err());
    }

    #[test]
    fn test_new_message_row_leaves_server_fields_out() {
        let row = new_message_row("r1", "alice", "hello");
        assert!(!row.contains_key("id"));
        assert!(!row.contains_key("created_at"));
        assert_eq!(row["content"], json!("hello"));
    }
}
