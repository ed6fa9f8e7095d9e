use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A project owning one or more boards. Only the first project is ever loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    #[serde(default, alias = "title")]
    pub name: String,
}

/// Represents a board as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    pub id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default, deserialize_with = "crate::models::timestamp::deserialize_optional")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::models::timestamp::deserialize_optional")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Workflow status attached to a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnStatus {
    /// Work not yet started.
    #[default]
    Todo,
    /// Work currently in progress.
    #[serde(alias = "in_progress", alias = "inprogress")]
    InProgress,
    /// Work awaiting review.
    Review,
    /// Finished work.
    Done,
    /// Any status the backend knows and this client does not.
    #[serde(other)]
    Other,
}

/// Represents a column of a board.
///
/// `order` lays the columns out left to right; ties keep arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub id: String,
    #[serde(default)]
    pub board_id: Option<String>,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub status: ColumnStatus,
    #[serde(default, alias = "position")]
    pub order: i64,
}

/// Payload transmitted when a column is created.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Validate)]
pub struct NewColumn {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    pub status: ColumnStatus,
    pub order: i64,
}

impl NewColumn {
    /// Builds the create payload, defaulting a blank title to "Untitled Column".
    pub fn sanitized(title: &str, status: ColumnStatus, order: i64) -> Result<Self, crate::error::AppError> {
        let trimmed = title.trim();
        let column = Self {
            title: if trimmed.is_empty() {
                UNTITLED_COLUMN.to_string()
            } else {
                trimmed.to_string()
            },
            status,
            order,
        };
        column.validate()?;
        Ok(column)
    }
}

pub const UNTITLED_COLUMN: &str = "Untitled Column";

/// Pending edits to a column. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ColumnPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ColumnStatus>,
}

impl ColumnPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.status.is_none()
    }

    /// Trims the title and rejects patches that fail validation.
    pub fn sanitized(mut self) -> Result<Self, crate::error::AppError> {
        if let Some(title) = self.title.take() {
            let trimmed = title.trim();
            self.title = Some(if trimmed.is_empty() {
                UNTITLED_COLUMN.to_string()
            } else {
                trimmed.to_string()
            });
        }
        self.validate()?;
        Ok(self)
    }
}

/// Sorts columns by `order`; the sort is stable so ties keep arrival order.
pub fn sort_columns(columns: &mut [Column]) {
    columns.sort_by_key(|column| column.order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn column(id: &str, order: i64) -> Column {
        Column {
            id: id.to_string(),
            board_id: None,
            title: id.to_uppercase(),
            status: ColumnStatus::Todo,
            order,
        }
    }

    #[test]
    fn test_column_status_decoding() {
        let col: Column =
            serde_json::from_value(json!({"id": "c1", "title": "Doing", "status": "in_progress", "position": 2}))
                .unwrap();
        assert_eq!(col.status, ColumnStatus::InProgress);
        assert_eq!(col.order, 2);

        let col: Column =
            serde_json::from_value(json!({"id": "c2", "title": "Blocked", "status": "blocked"})).unwrap();
        assert_eq!(col.status, ColumnStatus::Other);
        assert_eq!(col.order, 0);
    }

    #[test]
    fn test_sort_columns_is_stable() {
        let mut columns = vec![column("b", 1), column("a", 0), column("c", 1), column("d", 0)];
        sort_columns(&mut columns);
        let ids: Vec<&str> = columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn test_new_column_defaults_blank_title() {
        let column = NewColumn::sanitized("   ", ColumnStatus::Review, 3).unwrap();
        assert_eq!(column.title, UNTITLED_COLUMN);
        assert_eq!(column.order, 3);

        let too_long = "x".repeat(101);
        assert!(NewColumn::sanitized(&too_long, ColumnStatus::Todo, 0).is_err());
    }

    #[test]
    fn test_column_patch_serializes_only_present_fields() {
        let patch = ColumnPatch {
            title: Some("  Ready ".into()),
            status: None,
        }
        .sanitized()
        .unwrap();
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"title": "Ready"}));
        assert!(ColumnPatch::default().is_empty());
    }
}
