use serde::{Deserialize, Serialize};

use crate::constants::{PERSONAL_DATE_FIELD, PERSONAL_OWNER_FIELD, PERSONAL_SOURCE};

/// A registered kind of schedulable activity, backed by its own source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub display_name: String,
    /// Collection holding this category's activity records
    pub source_name: String,
    /// Field used for range filtering and sorting
    pub date_field: String,
    /// Optional field carrying the end of the activity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_field: Option<String>,
    /// Collection holding the discussion messages of this category's records
    pub feedback_source_name: String,
}

impl Category {
    pub fn new(
        id: &str,
        display_name: &str,
        source_name: &str,
        date_field: &str,
        feedback_source_name: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            source_name: source_name.to_string(),
            date_field: date_field.to_string(),
            end_date_field: None,
            feedback_source_name: feedback_source_name.to_string(),
        }
    }

    pub fn with_end_date_field(mut self, field: &str) -> Self {
        self.end_date_field = Some(field.to_string());
        self
    }
}

/// The per-user activity source (meetings the user takes part in).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalSource {
    pub source_name: String,
    pub date_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_field: Option<String>,
    /// Field matched against the requesting user's id
    pub owner_field: String,
}

impl Default for PersonalSource {
    fn default() -> Self {
        Self {
            source_name: PERSONAL_SOURCE.to_string(),
            date_field: PERSONAL_DATE_FIELD.to_string(),
            end_date_field: Some("meeting_end".to_string()),
            owner_field: PERSONAL_OWNER_FIELD.to_string(),
        }
    }
}

/// Department categories known out of the box
pub fn builtin_categories() -> Vec<Category> {
    vec![
        Category::new(
            "purchasing",
            "Purchase Orders",
            "purchase_orders",
            "order_date",
            "purchase_order_feedback",
        ),
        Category::new(
            "deliveries",
            "Deliveries",
            "deliveries",
            "delivery_date",
            "delivery_feedback",
        ),
        Category::new(
            "trainings",
            "Trainings",
            "trainings",
            "start_date",
            "training_feedback",
        )
        .with_end_date_field("end_date"),
        Category::new(
            "inspections",
            "Inspections",
            "inspections",
            "inspection_date",
            "inspection_feedback",
        ),
        Category::new(
            "maintenance",
            "Maintenance",
            "maintenance_tasks",
            "scheduled_date",
            "maintenance_feedback",
        ),
    ]
}
