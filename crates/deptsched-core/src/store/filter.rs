use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Row;
use crate::dates;

/// A single predicate on one field of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Eq { field: String, value: Value },
    Neq { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    IsNull { field: String },
}

/// Conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn neq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Neq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Gte {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn lt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lt {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn lte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lte {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn is_null(mut self, field: &str) -> Self {
        self.conditions.push(Condition::IsNull {
            field: field.to_string(),
        });
        self
    }

    /// Evaluate the filter against a row. Used by in-process stores; remote
    /// stores translate the conditions into their own query language.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::Eq { field, .. }
            | Condition::Neq { field, .. }
            | Condition::Gte { field, .. }
            | Condition::Lt { field, .. }
            | Condition::Lte { field, .. }
            | Condition::In { field, .. }
            | Condition::IsNull { field } => field,
        }
    }

    fn matches(&self, row: &Row) -> bool {
        let actual = row.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Condition::Eq { value, .. } => values_equal(actual, value),
            // SQL semantics: NULL is never "not equal" to anything
            Condition::Neq { value, .. } => !actual.is_null() && !values_equal(actual, value),
            Condition::Gte { value, .. } => {
                matches!(compare_values(actual, value), Some(Ordering::Greater | Ordering::Equal))
            }
            Condition::Lt { value, .. } => {
                matches!(compare_values(actual, value), Some(Ordering::Less))
            }
            Condition::Lte { value, .. } => {
                matches!(compare_values(actual, value), Some(Ordering::Less | Ordering::Equal))
            }
            Condition::In { values, .. } => values.iter().any(|v| values_equal(actual, v)),
            Condition::IsNull { .. } => actual.is_null(),
        }
    }
}

/// Sort direction for one key of an `order_by` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: true,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: false,
        }
    }
}

/// Multi-key row comparison. Nulls sort last regardless of direction.
pub fn compare_rows(a: &Row, b: &Row, order_by: &[OrderBy]) -> Ordering {
    for key in order_by {
        let left = a.get(&key.field).unwrap_or(&Value::Null);
        let right = b.get(&key.field).unwrap_or(&Value::Null);
        let ord = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => compare_values(left, right)
                .unwrap_or_else(|| type_rank(left).cmp(&type_rank(right))),
        };
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        // Ids are frequently numeric in one place and textual in another
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => a == b,
    }
}

/// Sort position of a value's JSON type when values of different types
/// meet in one column
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Order two scalar values: numbers numerically, strings as timestamps
/// when both parse, otherwise lexically. Timestamps sort before strings
/// that are not timestamps. Pairs of different types yield `None`.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (dates::parse_timestamp_str(x), dates::parse_timestamp_str(y)) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                (Some(_), None) => Some(Ordering::Less),
                (None, Some(_)) => Some(Ordering::Greater),
                (None, None) => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_date_range_conditions_compare_as_timestamps() {
        let filter = Filter::new()
            .gte("due", "2024-01-01T00:00:00")
            .lt("due", "2024-02-01T00:00:00");
        assert!(filter.matches(&row(json!({"due": "2024-01-31T18:00:00"}))));
        assert!(filter.matches(&row(json!({"due": "2024-01-01"}))));
        assert!(!filter.matches(&row(json!({"due": "2024-02-01"}))));
        assert!(!filter.matches(&row(json!({"due": null}))));
        assert!(!filter.matches(&row(json!({}))));
    }

    #[test]
    fn test_neq_never_matches_null() {
        let filter = Filter::new().neq("sender_id", "alice");
        assert!(filter.matches(&row(json!({"sender_id": "bob"}))));
        assert!(!filter.matches(&row(json!({"sender_id": "alice"}))));
        assert!(!filter.matches(&row(json!({"sender_id": null}))));
    }

    #[test]
    fn test_in_and_is_null() {
        let filter = Filter::new().is_in("record_id", ["r1", "r2"]).is_null("read_at");
        assert!(filter.matches(&row(json!({"record_id": "r2"}))));
        assert!(!filter.matches(&row(json!({"record_id": "r2", "read_at": "2024-01-01"}))));
        assert!(!filter.matches(&row(json!({"record_id": "r3"}))));
    }

    #[test]
    fn test_numeric_and_textual_ids_are_equal() {
        let filter = Filter::new().eq("id", "42");
        assert!(filter.matches(&row(json!({"id": 42}))));
        let filter = Filter::new().eq("priority", 5);
        assert!(filter.matches(&row(json!({"priority": 5.0}))));
    }

    #[test]
    fn test_compare_rows_multi_key_nulls_last() {
        let a = row(json!({"p": 5, "d": "2024-01-10"}));
        let b = row(json!({"p": 5, "d": "2024-01-05"}));
        let c = row(json!({"p": null, "d": "2024-01-01"}));
        let order = [OrderBy::desc("p"), OrderBy::asc("d")];
        assert_eq!(compare_rows(&b, &a, &order), Ordering::Less);
        assert_eq!(compare_rows(&a, &c, &order), Ordering::Less);
        assert_eq!(compare_rows(&c, &b, &order), Ordering::Greater);
    }

    #[test]
    fn test_mixed_column_sorts_consistently() {
        // "2024-01-02" reads as a date; "10" and "9" as plain text
        let values = [
            json!("9"),
            json!("2024-01-02"),
            json!(3),
            json!("10"),
            json!(true),
            json!("2024-01-01T12:00:00"),
            json!(1),
        ];
        let mut rows: Vec<Row> = values.iter().map(|v| row(json!({ "k": v }))).collect();
        let order = [OrderBy::asc("k")];
        rows.sort_by(|a, b| compare_rows(a, b, &order));

        let sorted: Vec<Value> = rows.iter().map(|r| r["k"].clone()).collect();
        assert_eq!(
            sorted,
            vec![
                json!(true),
                json!(1),
                json!(3),
                json!("2024-01-01T12:00:00"),
                json!("2024-01-02"),
                json!("10"),
                json!("9"),
            ]
        );

        // Antisymmetric across every pair
        for a in &rows {
            for b in &rows {
                assert_eq!(
                    compare_rows(a, b, &order),
                    compare_rows(b, a, &order).reverse()
                );
            }
        }
    }
}
