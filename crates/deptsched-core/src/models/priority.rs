use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY};

/// Urgency of an activity, 1 (low) to 5 (urgent).
///
/// Construction always normalizes: anything missing or outside 1..=5
/// becomes 2 (Normal), so a `Priority` value is valid by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const LOW: Priority = Priority(1);
    pub const NORMAL: Priority = Priority(DEFAULT_PRIORITY);
    pub const URGENT: Priority = Priority(MAX_PRIORITY);

    pub fn new(value: i64) -> Self {
        if (MIN_PRIORITY as i64..=MAX_PRIORITY as i64).contains(&value) {
            Priority(value as u8)
        } else {
            Self::NORMAL
        }
    }

    /// Read a priority from a row value. Accepts integers, integral floats
    /// and numeric strings; everything else is Normal.
    pub fn from_value(value: Option<&Value>) -> Self {
        let raw = match value {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        raw.map(Self::new).unwrap_or(Self::NORMAL)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "Low",
            2 => "Normal",
            3 => "Elevated",
            4 => "High",
            _ => "Urgent",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Self::new(value as i64)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_out_of_range_normalizes_to_normal() {
        assert_eq!(Priority::new(0), Priority::NORMAL);
        assert_eq!(Priority::new(6), Priority::NORMAL);
        assert_eq!(Priority::new(-3), Priority::NORMAL);
        assert_eq!(Priority::new(5), Priority::URGENT);
        assert_eq!(Priority::new(1), Priority::LOW);
    }

    #[test]
    fn test_from_value_shapes() {
        assert_eq!(Priority::from_value(None).value(), 2);
        assert_eq!(Priority::from_value(Some(&json!(null))).value(), 2);
        assert_eq!(Priority::from_value(Some(&json!(4))).value(), 4);
        assert_eq!(Priority::from_value(Some(&json!(3.0))).value(), 3);
        assert_eq!(Priority::from_value(Some(&json!(3.5))).value(), 2);
        assert_eq!(Priority::from_value(Some(&json!(" 5 "))).value(), 5);
        assert_eq!(Priority::from_value(Some(&json!("high"))).value(), 2);
    }

    #[test]
    fn test_serde_normalizes() {
        let p: Priority = serde_json::from_str("9").unwrap();
        assert_eq!(p, Priority::NORMAL);
        assert_eq!(serde_json::to_string(&Priority::URGENT).unwrap(), "5");
    }

    #[test]
    fn test_labels() {
        assert_eq!(Priority::new(3).label(), "Elevated");
        assert_eq!(Priority::URGENT.to_string(), "5 (Urgent)");
    }
}
