use deptsched_core::CoreError;
use serde::{Deserialize, Serialize};

/// Envelope printed for every command
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl Response {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }

    pub fn from_error(err: &anyhow::Error) -> Self {
        Self::error(error_code(err), &format!("{:#}", err))
    }
}

/// Stable machine-readable code for an error chain
pub fn error_code(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<CoreError>() {
        Some(CoreError::Validation(_)) => "validation",
        Some(CoreError::SourceUnavailable { .. }) => "source_unavailable",
        Some(CoreError::Subscription { .. }) => "subscription",
        Some(CoreError::Write { .. }) => "write_failed",
        Some(CoreError::Store(_)) => "store",
        None => "internal",
    }
}

/// CLI command parsed from arguments
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// List registered categories
    Categories,
    /// Aggregate a user's schedule
    Agenda {
        user: Option<String>,
        from: Option<String>,
        to: Option<String>,
        priority: Option<u8>,
        with_unread: Option<String>,
    },
    /// Keep an agenda fresh with the auto-refresh timer
    Watch {
        user: Option<String>,
        from: String,
        to: String,
        ticks: u32,
    },
    /// Batch unread lookup; records are (record id, category id)
    Unread {
        viewer: Option<String>,
        records: Vec<(String, String)>,
    },
    /// Print a thread's history
    Thread {
        record: String,
        category: String,
        mark_read_as: Option<String>,
    },
    /// Post a message to a thread
    Send {
        record: String,
        category: String,
        sender: Option<String>,
        content: String,
    },
}

/// Parse `RECORD:CATEGORY`. The category is taken after the last colon so
/// record ids may contain colons themselves.
pub fn parse_record_ref(s: &str) -> Result<(String, String), String> {
    match s.rsplit_once(':') {
        Some((record, category)) if !record.is_empty() && !category.is_empty() => {
            Ok((record.to_string(), category.to_string()))
        }
        _ => Err(format!("expected RECORD:CATEGORY, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deptsched_core::ValidationError;

    #[test]
    fn test_parse_record_ref() {
        assert_eq!(
            parse_record_ref("po-1:purchasing"),
            Ok(("po-1".to_string(), "purchasing".to_string()))
        );
        assert_eq!(
            parse_record_ref("ns:po-1:purchasing"),
            Ok(("ns:po-1".to_string(), "purchasing".to_string()))
        );
        assert!(parse_record_ref("po-1").is_err());
        assert!(parse_record_ref(":purchasing").is_err());
        assert!(parse_record_ref("po-1:").is_err());
    }

    #[test]
    fn test_error_codes() {
        let err = anyhow::Error::new(CoreError::from(ValidationError::EmptyContent));
        assert_eq!(error_code(&err), "validation");
        let response = Response::from_error(&err);
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().code, "validation");

        assert_eq!(error_code(&anyhow::anyhow!("boom")), "internal");
    }

    #[test]
    fn test_success_envelope_shape() {
        let json = serde_json::to_value(Response::success(serde_json::json!([1]))).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true, "result": [1]}));
    }
}
