use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::AppError;
use crate::models::timestamp;

/// Title given to cards created or renamed with a blank title.
pub const UNTITLED_CARD: &str = "Untitled Card";

/// Represents the priority of a card.
///
/// Decoding is lenient: anything that is not one of the four known values
/// becomes `Medium`.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    #[default]
    Medium,
    /// High priority.
    High,
    /// Urgent priority.
    Urgent,
}

impl Priority {
    /// Coerces user or backend input into a priority, defaulting to `Medium`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Priority::Low,
            "medium" => Priority::Medium,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            other => {
                debug!("Unknown priority {:?}, using medium", other);
                Priority::Medium
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(Priority::parse_lenient).unwrap_or_default())
    }
}

/// A label attached to a card. The backend sends either a bare name or an object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "LabelRepr")]
pub struct Label {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelRepr {
    Name(String),
    Full {
        #[serde(default)]
        id: Option<String>,
        #[serde(alias = "text")]
        name: String,
        #[serde(default)]
        color: Option<String>,
    },
}

impl From<LabelRepr> for Label {
    fn from(repr: LabelRepr) -> Self {
        match repr {
            LabelRepr::Name(name) => Label {
                id: None,
                name,
                color: None,
            },
            LabelRepr::Full { id, name, color } => Label { id, name, color },
        }
    }
}

impl Label {
    pub fn named(name: &str) -> Self {
        Label {
            id: None,
            name: name.to_string(),
            color: None,
        }
    }
}

/// One entry of a card checklist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecklistItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    #[serde(default, alias = "name")]
    pub filename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Represents a card as held in the mirror.
///
/// `column_id` is the only record of placement; per-column lists are derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: String,
    pub column_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub assigned_to: BTreeSet<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default, alias = "checklist_items")]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Card {
    /// Synthesizes the entity shown in place of a card that could not be found.
    pub fn placeholder(id: &str, reason: &str) -> Self {
        Self {
            id: id.to_string(),
            column_id: String::new(),
            title: "Card not found".to_string(),
            description: reason.to_string(),
            priority: Priority::default(),
            position: None,
            assigned_to: BTreeSet::new(),
            due_date: None,
            labels: Vec::new(),
            checklist: Vec::new(),
            comments: Vec::new(),
            attachments: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_assigned_to(&self, member_id: &str) -> bool {
        self.assigned_to.contains(member_id)
    }

    /// Returns `(completed, total)` checklist items.
    pub fn checklist_progress(&self) -> (usize, usize) {
        let done = self.checklist.iter().filter(|item| item.completed).count();
        (done, self.checklist.len())
    }
}

/// A card as entered by the user, before sanitation.
///
/// Fields the backend does not accept end up in `extra` and are never transmitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CardDraft {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    /// Produces the create payload for `column_id`.
    ///
    /// Blank titles become "Untitled Card", unknown priorities become `medium`,
    /// duplicate assignees collapse and unsupported fields are dropped.
    pub fn sanitize(self, column_id: &str) -> Result<NewCard, AppError> {
        if !self.extra.is_empty() {
            let dropped: Vec<&String> = self.extra.keys().collect();
            debug!("Stripping unsupported card fields before create: {:?}", dropped);
        }

        let title = self.title.trim();
        let mut assigned_to: Vec<String> = Vec::with_capacity(self.assigned_to.len());
        for member in self.assigned_to {
            if !member.trim().is_empty() && !assigned_to.contains(&member) {
                assigned_to.push(member);
            }
        }

        let payload = NewCard {
            title: if title.is_empty() {
                UNTITLED_CARD.to_string()
            } else {
                title.to_string()
            },
            description: self.description.unwrap_or_default(),
            column_id: column_id.to_string(),
            priority: self
                .priority
                .as_deref()
                .map(Priority::parse_lenient)
                .unwrap_or_default(),
            position: self.position,
            assigned_to,
            due_date: self.due_date,
            checklist: self.checklist,
            labels: self.labels,
        };
        payload.validate()?;
        Ok(payload)
    }
}

/// Create payload transmitted to the backend.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Validate)]
pub struct NewCard {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: String,
    #[validate(length(min = 1))]
    pub column_id: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0))]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assigned_to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checklist: Vec<ChecklistItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

/// Pending edits to a card as collected by the editor.
///
/// Only the fields of `CardPatch` are ever sent; everything else lands in `other`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub column_id: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl CardChanges {
    /// Restricts the changes to the update allow-list and sanitizes them.
    pub fn sanitize(self) -> Result<CardPatch, AppError> {
        if !self.other.is_empty() {
            let dropped: Vec<&String> = self.other.keys().collect();
            debug!("Stripping fields outside the update allow-list: {:?}", dropped);
        }

        let patch = CardPatch {
            title: self.title.map(|title| {
                let trimmed = title.trim();
                if trimmed.is_empty() {
                    UNTITLED_CARD.to_string()
                } else {
                    trimmed.to_string()
                }
            }),
            description: self.description,
            priority: self.priority.as_deref().map(Priority::parse_lenient),
            position: self.position,
            column_id: self.column_id.filter(|id| !id.trim().is_empty()),
        };
        patch.validate()?;
        Ok(patch)
    }
}

/// Update payload transmitted to the backend: `{title, description, priority, position, column_id}`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq, Validate)]
pub struct CardPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0))]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
}

impl CardPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.position.is_none()
            && self.column_id.is_none()
    }
}
