//! In-process `BoardApi` implementation.
//!
//! Backs the demo binary and doubles as the test backend: responses can be shaped
//! like any of the forms the real server produces, card reads can be failed per
//! column or delayed, writes can be rejected, and every transmitted write payload
//! is recorded.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::BoardApi;
use crate::error::AppError;
use crate::models::{
    Board, Card, CardPatch, Column, ColumnPatch, NewCard, NewColumn, Project,
};

/// How read and create responses are wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseShape {
    /// A bare JSON array (or bare object for creates).
    #[default]
    Bare,
    /// `{ "data": ... }`.
    Envelope,
    /// Card reads with exactly one card return that card as a bare object;
    /// everything else is enveloped.
    Compact,
}

/// A write as it was transmitted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub operation: &'static str,
    pub target: String,
    pub payload: Value,
}

#[derive(Default)]
struct MemoryBoard {
    projects: Vec<Project>,
    boards: Vec<Board>,
    columns: Vec<Column>,
    cards: Vec<Card>,
    shape: ResponseShape,
    failing_columns: HashSet<String>,
    failing_listings: bool,
    reject_writes: bool,
    fetch_delays: VecDeque<Duration>,
    card_fetches: usize,
    writes: Vec<RecordedWrite>,
}

#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryBoard>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// One project, one board, the given columns (in the given order values) and no cards.
    pub async fn with_board(columns: &[(&str, i64)]) -> Self {
        let backend = Self::new();
        backend
            .add_project(Project {
                id: "project-1".into(),
                name: "Project".into(),
            })
            .await;
        backend
            .add_board(Board {
                id: "board-1".into(),
                project_id: Some("project-1".into()),
                title: "Board".into(),
                description: String::new(),
                is_private: false,
                created_at: Some(Utc::now()),
                updated_at: Some(Utc::now()),
            })
            .await;
        for (id, order) in columns {
            backend
                .add_column(Column {
                    id: id.to_string(),
                    board_id: Some("board-1".into()),
                    title: id.to_string(),
                    status: Default::default(),
                    order: *order,
                })
                .await;
        }
        backend
    }

    pub async fn add_project(&self, project: Project) {
        self.state.lock().await.projects.push(project);
    }

    pub async fn add_board(&self, board: Board) {
        self.state.lock().await.boards.push(board);
    }

    pub async fn add_column(&self, column: Column) {
        self.state.lock().await.columns.push(column);
    }

    /// Adds a card with the given title to `column_id` and returns its id.
    pub async fn add_card(&self, column_id: &str, title: &str) -> String {
        let mut card = Card::placeholder(&Uuid::new_v4().to_string(), "");
        card.column_id = column_id.to_string();
        card.title = title.to_string();
        card.created_at = Some(Utc::now());
        card.updated_at = card.created_at;
        let id = card.id.clone();
        self.insert_card(card).await;
        id
    }

    pub async fn insert_card(&self, card: Card) {
        self.state.lock().await.cards.push(card);
    }

    pub async fn remove_card(&self, card_id: &str) {
        self.state.lock().await.cards.retain(|c| c.id != card_id);
    }

    pub async fn set_shape(&self, shape: ResponseShape) {
        self.state.lock().await.shape = shape;
    }

    pub async fn fail_cards_for(&self, column_id: &str) {
        self.state
            .lock()
            .await
            .failing_columns
            .insert(column_id.to_string());
    }

    pub async fn recover_cards_for(&self, column_id: &str) {
        self.state.lock().await.failing_columns.remove(column_id);
    }

    /// Fails project, board and column reads.
    pub async fn fail_listings(&self, fail: bool) {
        self.state.lock().await.failing_listings = fail;
    }

    pub async fn reject_writes(&self, reject: bool) {
        self.state.lock().await.reject_writes = reject;
    }

    /// Delays the next card read by `delay`. Queued delays apply one per read.
    pub async fn push_fetch_delay(&self, delay: Duration) {
        self.state.lock().await.fetch_delays.push_back(delay);
    }

    pub async fn cards(&self) -> Vec<Card> {
        self.state.lock().await.cards.clone()
    }

    pub async fn columns(&self) -> Vec<Column> {
        self.state.lock().await.columns.clone()
    }

    pub async fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().await.writes.clone()
    }

    pub async fn card_fetches(&self) -> usize {
        self.state.lock().await.card_fetches
    }
}

impl MemoryBoard {
    fn ensure_listable(&self, what: &str) -> Result<(), AppError> {
        if self.failing_listings {
            return Err(AppError::NetworkFailure(format!(
                "GET {} failed with 503 Service Unavailable",
                what
            )));
        }
        Ok(())
    }

    fn collection<T: Serialize>(&self, items: &[T]) -> Result<Value, AppError> {
        let items = serde_json::to_value(items)?;
        Ok(match self.shape {
            ResponseShape::Bare => items,
            ResponseShape::Envelope | ResponseShape::Compact => json!({ "data": items }),
        })
    }

    fn single<T: Serialize>(&self, item: &T) -> Result<Value, AppError> {
        let item = serde_json::to_value(item)?;
        Ok(match self.shape {
            ResponseShape::Bare | ResponseShape::Compact => item,
            ResponseShape::Envelope => json!({ "data": item }),
        })
    }

    fn record<T: Serialize>(
        &mut self,
        operation: &'static str,
        target: &str,
        payload: &T,
    ) -> Result<(), AppError> {
        self.writes.push(RecordedWrite {
            operation,
            target: target.to_string(),
            payload: serde_json::to_value(payload)?,
        });
        if self.reject_writes {
            return Err(AppError::NetworkFailure(format!(
                "{} rejected with 500 Internal Server Error",
                operation
            )));
        }
        Ok(())
    }

    fn card_mut(&mut self, card_id: &str) -> Result<&mut Card, AppError> {
        self.cards
            .iter_mut()
            .find(|c| c.id == card_id)
            .ok_or_else(|| AppError::NotFound(format!("Card {} not found", card_id)))
    }
}

#[async_trait]
impl BoardApi for InMemoryBackend {
    async fn list_projects(&self) -> Result<Value, AppError> {
        let state = self.state.lock().await;
        state.ensure_listable("/projects")?;
        state.collection(&state.projects)
    }

    async fn list_boards(&self, project_id: &str) -> Result<Value, AppError> {
        let state = self.state.lock().await;
        state.ensure_listable("/boards")?;
        let boards: Vec<&Board> = state
            .boards
            .iter()
            .filter(|b| b.project_id.as_deref().map_or(true, |p| p == project_id))
            .collect();
        state.collection(&boards)
    }

    async fn list_columns(&self, board_id: &str) -> Result<Value, AppError> {
        let state = self.state.lock().await;
        state.ensure_listable("/columns")?;
        let columns: Vec<&Column> = state
            .columns
            .iter()
            .filter(|c| c.board_id.as_deref().map_or(true, |b| b == board_id))
            .collect();
        state.collection(&columns)
    }

    async fn list_cards(&self, column_id: &str) -> Result<Value, AppError> {
        // The response is taken before the delay so a delayed read returns the
        // data as it was when the request was issued.
        let (response, delay) = {
            let mut state = self.state.lock().await;
            state.card_fetches += 1;
            let delay = state.fetch_delays.pop_front();
            let response = if state.failing_columns.contains(column_id) {
                Err(AppError::NetworkFailure(format!(
                    "GET /cards?column_id={} failed with 502 Bad Gateway",
                    column_id
                )))
            } else {
                let cards: Vec<&Card> = state
                    .cards
                    .iter()
                    .filter(|c| c.column_id == column_id)
                    .collect();
                if state.shape == ResponseShape::Compact && cards.len() == 1 {
                    state.single(cards[0])
                } else {
                    state.collection(&cards)
                }
            };
            (response, delay)
        };
        if let Some(delay) = delay {
            debug!("Delaying card read for {} by {:?}", column_id, delay);
            tokio::time::sleep(delay).await;
        }
        response
    }

    async fn create_card(&self, column_id: &str, payload: &NewCard) -> Result<Value, AppError> {
        let mut state = self.state.lock().await;
        state.record("cards.create", column_id, payload)?;
        if !state.columns.iter().any(|c| c.id == column_id) {
            return Err(AppError::NotFound(format!("Column {} not found", column_id)));
        }

        let now = Utc::now();
        let card = Card {
            id: Uuid::new_v4().to_string(),
            column_id: column_id.to_string(),
            title: payload.title.clone(),
            description: payload.description.clone(),
            priority: payload.priority,
            position: payload.position,
            assigned_to: payload.assigned_to.iter().cloned().collect(),
            due_date: payload.due_date,
            labels: payload.labels.clone(),
            checklist: payload.checklist.clone(),
            comments: Vec::new(),
            attachments: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        let response = state.single(&card);
        state.cards.push(card);
        response
    }

    async fn move_card(&self, card_id: &str, target_column_id: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.record(
            "cards.move",
            card_id,
            &json!({ "target_column_id": target_column_id }),
        )?;
        let card = state.card_mut(card_id)?;
        card.column_id = target_column_id.to_string();
        card.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn update_card(&self, card_id: &str, payload: &CardPatch) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.record("cards.update", card_id, payload)?;
        let card = state.card_mut(card_id)?;
        if let Some(title) = &payload.title {
            card.title = title.clone();
        }
        if let Some(description) = &payload.description {
            card.description = description.clone();
        }
        if let Some(priority) = payload.priority {
            card.priority = priority;
        }
        if let Some(position) = payload.position {
            card.position = Some(position);
        }
        if let Some(column_id) = &payload.column_id {
            card.column_id = column_id.clone();
        }
        card.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.record("cards.delete", card_id, &Value::Null)?;
        let before = state.cards.len();
        state.cards.retain(|c| c.id != card_id);
        if state.cards.len() == before {
            return Err(AppError::NotFound(format!("Card {} not found", card_id)));
        }
        Ok(())
    }

    async fn create_column(&self, board_id: &str, payload: &NewColumn) -> Result<Value, AppError> {
        let mut state = self.state.lock().await;
        state.record("columns.create", board_id, payload)?;
        let column = Column {
            id: Uuid::new_v4().to_string(),
            board_id: Some(board_id.to_string()),
            title: payload.title.clone(),
            status: payload.status,
            order: payload.order,
        };
        let response = state.single(&column);
        state.columns.push(column);
        response
    }

    async fn update_column(&self, column_id: &str, payload: &ColumnPatch) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.record("columns.update", column_id, payload)?;
        let column = state
            .columns
            .iter_mut()
            .find(|c| c.id == column_id)
            .ok_or_else(|| AppError::NotFound(format!("Column {} not found", column_id)))?;
        if let Some(title) = &payload.title {
            column.title = title.clone();
        }
        if let Some(status) = payload.status {
            column.status = status;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CardDraft;

    #[tokio::test]
    async fn test_compact_shape_returns_single_object() {
        let backend = InMemoryBackend::with_board(&[("todo", 0)]).await;
        backend.set_shape(ResponseShape::Compact).await;

        backend.add_card("todo", "Only").await;
        let single = backend.list_cards("todo").await.unwrap();
        assert_eq!(single["title"], "Only");

        backend.add_card("todo", "Second").await;
        let enveloped = backend.list_cards("todo").await.unwrap();
        assert_eq!(enveloped["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_writes_are_still_recorded() {
        let backend = InMemoryBackend::with_board(&[("todo", 0)]).await;
        backend.reject_writes(true).await;

        let payload = CardDraft::titled("Nope").sanitize("todo").unwrap();
        assert!(backend.create_card("todo", &payload).await.is_err());
        assert!(backend.cards().await.is_empty());

        let writes = backend.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].operation, "cards.create");
        assert_eq!(writes[0].payload["title"], "Nope");
    }

    #[tokio::test]
    async fn test_failing_column() {
        let backend = InMemoryBackend::with_board(&[("todo", 0), ("done", 1)]).await;
        backend.fail_cards_for("todo").await;
        assert!(backend.list_cards("todo").await.is_err());
        assert!(backend.list_cards("done").await.is_ok());

        backend.recover_cards_for("todo").await;
        assert!(backend.list_cards("todo").await.is_ok());
        assert_eq!(backend.card_fetches().await, 3);
    }
}
