//! Read-only filtered views over the card mirror.
//!
//! Free-text search matches title, description or any label name, case-insensitively.
//! Facets (priority, assignee, due date) are independent and combine by AND.
//! Due-date buckets use UTC calendar days.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Card, Priority};

/// Due-date bucket relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "bucket")]
pub enum DueDateFilter {
    /// Due strictly before now.
    Overdue,
    /// Due on the current calendar day.
    Today,
    /// Due between today and seven days from today, inclusive.
    ThisWeek,
    /// Due between today and the same day next month, inclusive.
    ThisMonth,
    /// Due within `[start, end]`, inclusive.
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Optional facet filters. A `None` (or empty list) facet is inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facets {
    #[serde(default)]
    pub priority: Option<Vec<Priority>>,
    #[serde(default)]
    pub assignee: Option<Vec<String>>,
    #[serde(default)]
    pub due_date: Option<DueDateFilter>,
}

impl Facets {
    pub fn is_empty(&self) -> bool {
        active(&self.priority).is_none() && active(&self.assignee).is_none() && self.due_date.is_none()
    }
}

fn active<T>(facet: &Option<Vec<T>>) -> Option<&[T]> {
    facet.as_deref().filter(|values| !values.is_empty())
}

/// Returns the cards matching `search_text` and every active facet, in mirror order.
pub fn filter_cards(cards: &[Card], search_text: &str, facets: &Facets, now: DateTime<Utc>) -> Vec<Card> {
    // Whitespace-only input is no search; otherwise the text is matched as typed.
    let needle = if search_text.trim().is_empty() {
        String::new()
    } else {
        search_text.to_lowercase()
    };
    if needle.is_empty() && facets.is_empty() {
        return cards.to_vec();
    }

    cards
        .iter()
        .filter(|card| matches_text(card, &needle))
        .filter(|card| matches_facets(card, facets, now))
        .cloned()
        .collect()
}

fn matches_text(card: &Card, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    card.title.to_lowercase().contains(needle)
        || card.description.to_lowercase().contains(needle)
        || card
            .labels
            .iter()
            .any(|label| label.name.to_lowercase().contains(needle))
}

fn matches_facets(card: &Card, facets: &Facets, now: DateTime<Utc>) -> bool {
    if let Some(priorities) = active(&facets.priority) {
        if !priorities.contains(&card.priority) {
            return false;
        }
    }
    if let Some(assignees) = active(&facets.assignee) {
        if !assignees.iter().any(|member| card.is_assigned_to(member)) {
            return false;
        }
    }
    if let Some(bucket) = &facets.due_date {
        match card.due_date {
            Some(due) if in_bucket(due, bucket, now) => {}
            _ => return false,
        }
    }
    true
}

fn in_bucket(due: DateTime<Utc>, bucket: &DueDateFilter, now: DateTime<Utc>) -> bool {
    let today = now.date_naive();
    let due_day = due.date_naive();
    match bucket {
        DueDateFilter::Overdue => due < now,
        DueDateFilter::Today => due_day == today,
        DueDateFilter::ThisWeek => within_days(due_day, today, today + Duration::days(7)),
        DueDateFilter::ThisMonth => match today.checked_add_months(Months::new(1)) {
            Some(limit) => within_days(due_day, today, limit),
            None => false,
        },
        DueDateFilter::Custom { start, end } => *start <= due && due <= *end,
    }
}

fn within_days(day: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    from <= day && day <= to
}
