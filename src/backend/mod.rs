//! Backend-access collaborator.
//!
//! `BoardApi` is the raw, injected transport: it returns responses exactly as the
//! server shapes them. `BackendClient` wraps it, applies a bounded timeout to every
//! request and normalizes every response into typed sequences.

pub mod memory;
pub mod normalize;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde_json::Value;

use crate::error::AppError;
use crate::models::{Board, Card, CardPatch, Column, ColumnPatch, NewCard, NewColumn, Project};

pub use memory::{InMemoryBackend, RecordedWrite, ResponseShape};

/// Raw backend operations. Reads return the undecoded response body.
#[async_trait]
pub trait BoardApi: Send + Sync {
    async fn list_projects(&self) -> Result<Value, AppError>;
    async fn list_boards(&self, project_id: &str) -> Result<Value, AppError>;
    async fn list_columns(&self, board_id: &str) -> Result<Value, AppError>;
    async fn list_cards(&self, column_id: &str) -> Result<Value, AppError>;
    async fn create_card(&self, column_id: &str, payload: &NewCard) -> Result<Value, AppError>;
    async fn move_card(&self, card_id: &str, target_column_id: &str) -> Result<(), AppError>;
    async fn update_card(&self, card_id: &str, payload: &CardPatch) -> Result<(), AppError>;
    async fn delete_card(&self, card_id: &str) -> Result<(), AppError>;
    async fn create_column(&self, board_id: &str, payload: &NewColumn) -> Result<Value, AppError>;
    async fn update_column(&self, column_id: &str, payload: &ColumnPatch) -> Result<(), AppError>;
}

/// Typed, time-bounded view of a `BoardApi`.
#[derive(Clone)]
pub struct BackendClient {
    api: Arc<dyn BoardApi>,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(api: Arc<dyn BoardApi>, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    async fn bounded<T, F>(&self, what: &str, request: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(elapsed) => {
                warn!("{} did not complete within {:?}", what, self.timeout);
                Err(elapsed.into())
            }
        }
    }

    pub async fn projects(&self) -> Result<Vec<Project>, AppError> {
        let raw = self.bounded("projects.getAll", self.api.list_projects()).await?;
        let entries = normalize::into_entries(raw, "project", false);
        Ok(normalize::decode_entries(entries, "project", |_| {}))
    }

    pub async fn boards(&self, project_id: &str) -> Result<Vec<Board>, AppError> {
        let raw = self
            .bounded("boards.getByProject", self.api.list_boards(project_id))
            .await?;
        let entries = normalize::into_entries(raw, "board", false);
        Ok(normalize::decode_entries(entries, "board", |_| {}))
    }

    pub async fn columns(&self, board_id: &str) -> Result<Vec<Column>, AppError> {
        let raw = self
            .bounded("columns.getByBoard", self.api.list_columns(board_id))
            .await?;
        let entries = normalize::into_entries(raw, "column", false);
        Ok(normalize::decode_entries(entries, "column", |_| {}))
    }

    pub async fn cards(&self, column_id: &str) -> Result<Vec<Card>, AppError> {
        let raw = self
            .bounded("cards.getAll", self.api.list_cards(column_id))
            .await?;
        let entries = normalize::into_entries(raw, "card", true);
        Ok(normalize::decode_entries(
            entries,
            "card",
            normalize::card_fixup(Some(column_id)),
        ))
    }

    /// Creates a card. Returns the created card when the response carried a usable one.
    pub async fn create_card(&self, payload: &NewCard) -> Result<Option<Card>, AppError> {
        let raw = self
            .bounded(
                "cards.create",
                self.api.create_card(&payload.column_id, payload),
            )
            .await?;
        let entries = normalize::into_entries(raw, "created card", true);
        let mut created: Vec<Card> = normalize::decode_entries(
            entries,
            "created card",
            normalize::card_fixup(Some(&payload.column_id)),
        );
        Ok(if created.is_empty() {
            None
        } else {
            Some(created.swap_remove(0))
        })
    }

    pub async fn move_card(&self, card_id: &str, target_column_id: &str) -> Result<(), AppError> {
        self.bounded("cards.move", self.api.move_card(card_id, target_column_id))
            .await
    }

    pub async fn update_card(&self, card_id: &str, payload: &CardPatch) -> Result<(), AppError> {
        self.bounded("cards.update", self.api.update_card(card_id, payload))
            .await
    }

    pub async fn delete_card(&self, card_id: &str) -> Result<(), AppError> {
        self.bounded("cards.delete", self.api.delete_card(card_id))
            .await
    }

    pub async fn create_column(
        &self,
        board_id: &str,
        payload: &NewColumn,
    ) -> Result<Option<Column>, AppError> {
        let raw = self
            .bounded("columns.create", self.api.create_column(board_id, payload))
            .await?;
        let entries = normalize::into_entries(raw, "created column", true);
        let mut created: Vec<Column> = normalize::decode_entries(entries, "created column", |_| {});
        Ok(if created.is_empty() {
            None
        } else {
            Some(created.swap_remove(0))
        })
    }

    pub async fn update_column(&self, column_id: &str, payload: &ColumnPatch) -> Result<(), AppError> {
        self.bounded("columns.update", self.api.update_column(column_id, payload))
            .await
    }
}
