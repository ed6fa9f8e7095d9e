//! Permission-gated board commands.
//!
//! Every command re-evaluates the caller's capabilities first; a denied command is
//! a logged no-op. Payloads are sanitized before anything is sent, and a successful
//! write is always followed by a reconciliation so the mirror reflects the server.
//! A failed write surfaces its error once and leaves the mirror as it was.

use log::{debug, error, warn};

use crate::backend::BackendClient;
use crate::error::AppError;
use crate::models::{CardChanges, CardDraft, ColumnPatch, ColumnStatus, NewColumn};
use crate::permissions::{Capability, CapabilitySet};
use crate::session::Session;
use crate::sync::{ReconcileReport, SyncEngine};

/// Result of a command that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The write went through. Carries the follow-up reconciliation when it ran.
    Applied {
        reconciliation: Option<ReconcileReport>,
    },
    /// Applied to the mirror only; nothing was sent.
    AppliedLocally { reassigned_cards: usize },
    /// The caller lacks the capability. Nothing happened.
    Denied,
    /// The command would not change anything. Nothing was sent.
    Unchanged,
}

pub struct MutationGateway {
    backend: BackendClient,
    session: Session,
    engine: SyncEngine,
}

impl MutationGateway {
    pub fn new(backend: BackendClient, session: Session, engine: SyncEngine) -> Self {
        Self {
            backend,
            session,
            engine,
        }
    }

    /// Current capabilities. Role and assignment may change between calls.
    pub fn capabilities(&self) -> CapabilitySet {
        self.session.snapshot().capabilities()
    }

    /// Creates a card in `column_id`, or in the first column when none is given.
    pub async fn create_card(
        &self,
        column_id: Option<&str>,
        draft: CardDraft,
    ) -> Result<CommandOutcome, AppError> {
        const COMMAND: &str = "createCard";
        if !self.authorize(COMMAND, Capability::CreateCard) {
            return Ok(CommandOutcome::Denied);
        }

        let mirror = self.engine.mirror().await;
        let column = match column_id {
            Some(id) => mirror.column(id),
            None => mirror.first_column(),
        };
        let column = match column {
            Some(column) => column,
            None => {
                return self.reject(
                    COMMAND,
                    AppError::ValidationError("Choose a column for the new card.".into()),
                )
            }
        };
        let payload = match draft.sanitize(&column.id) {
            Ok(payload) => payload,
            Err(e) => return self.reject(COMMAND, e),
        };

        match self.backend.create_card(&payload).await {
            Ok(created) => {
                if let Some(card) = created {
                    debug!("Showing created card {} until reconciliation", card.id);
                    self.engine.apply_optimistic_card(card).await;
                }
                Ok(self.reconcile_cards(COMMAND).await)
            }
            Err(e) => self.reject(COMMAND, e),
        }
    }

    /// Sends the allow-listed subset of `changes` for `card_id`.
    pub async fn edit_card(&self, card_id: &str, changes: CardChanges) -> Result<CommandOutcome, AppError> {
        const COMMAND: &str = "editCard";
        if !self.authorize(COMMAND, Capability::EditCard) {
            return Ok(CommandOutcome::Denied);
        }

        let mirror = self.engine.mirror().await;
        if mirror.card(card_id).is_none() {
            return self.reject(COMMAND, card_not_found(card_id));
        }
        let patch = match changes.sanitize() {
            Ok(patch) => patch,
            Err(e) => return self.reject(COMMAND, e),
        };
        if patch.is_empty() {
            return Ok(CommandOutcome::Unchanged);
        }
        if let Some(target) = &patch.column_id {
            if mirror.column(target).is_none() {
                return self.reject(COMMAND, unknown_destination(target));
            }
        }

        match self.backend.update_card(card_id, &patch).await {
            Ok(()) => Ok(self.reconcile_cards(COMMAND).await),
            Err(e) => self.reject(COMMAND, e),
        }
    }

    pub async fn delete_card(&self, card_id: &str) -> Result<CommandOutcome, AppError> {
        const COMMAND: &str = "deleteCard";
        if !self.authorize(COMMAND, Capability::DeleteCard) {
            return Ok(CommandOutcome::Denied);
        }
        if self.engine.mirror().await.card(card_id).is_none() {
            return self.reject(COMMAND, card_not_found(card_id));
        }

        match self.backend.delete_card(card_id).await {
            Ok(()) => Ok(self.reconcile_cards(COMMAND).await),
            Err(e) => self.reject(COMMAND, e),
        }
    }

    /// Moves a card to another column. Moving to its current column does nothing.
    pub async fn move_card(&self, card_id: &str, target_column_id: &str) -> Result<CommandOutcome, AppError> {
        const COMMAND: &str = "moveCard";
        if !self.authorize(COMMAND, Capability::DragCard) {
            return Ok(CommandOutcome::Denied);
        }

        let mirror = self.engine.mirror().await;
        let card = match mirror.card(card_id) {
            Some(card) => card,
            None => return self.reject(COMMAND, card_not_found(card_id)),
        };
        if card.column_id == target_column_id {
            return Ok(CommandOutcome::Unchanged);
        }
        if mirror.column(target_column_id).is_none() {
            return self.reject(COMMAND, unknown_destination(target_column_id));
        }

        match self.backend.move_card(card_id, target_column_id).await {
            Ok(()) => Ok(self.reconcile_cards(COMMAND).await),
            Err(e) => self.reject(COMMAND, e),
        }
    }

    /// Appends a column after the current last one.
    pub async fn create_column(&self, title: &str, status: ColumnStatus) -> Result<CommandOutcome, AppError> {
        const COMMAND: &str = "createColumn";
        if !self.authorize(COMMAND, Capability::CreateColumn) {
            return Ok(CommandOutcome::Denied);
        }

        let mirror = self.engine.mirror().await;
        let board_id = match &mirror.board {
            Some(board) => board.id.clone(),
            None => {
                return self.reject(
                    COMMAND,
                    AppError::ValidationError("The board has not been loaded yet.".into()),
                )
            }
        };
        let order = mirror
            .columns
            .iter()
            .map(|column| column.order)
            .max()
            .map_or(0, |last| last + 1);
        let payload = match NewColumn::sanitized(title, status, order) {
            Ok(payload) => payload,
            Err(e) => return self.reject(COMMAND, e),
        };

        match self.backend.create_column(&board_id, &payload).await {
            Ok(created) => {
                if let Some(column) = created {
                    self.engine.apply_optimistic_column(column).await;
                }
                Ok(self.reconcile_columns(COMMAND).await)
            }
            Err(e) => self.reject(COMMAND, e),
        }
    }

    pub async fn edit_column(&self, column_id: &str, patch: ColumnPatch) -> Result<CommandOutcome, AppError> {
        const COMMAND: &str = "editColumn";
        if !self.authorize(COMMAND, Capability::EditColumn) {
            return Ok(CommandOutcome::Denied);
        }
        if self.engine.mirror().await.column(column_id).is_none() {
            return self.reject(
                COMMAND,
                AppError::NotFound(format!("Column {} not found", column_id)),
            );
        }
        let patch = match patch.sanitized() {
            Ok(patch) => patch,
            Err(e) => return self.reject(COMMAND, e),
        };
        if patch.is_empty() {
            return Ok(CommandOutcome::Unchanged);
        }

        match self.backend.update_column(column_id, &patch).await {
            Ok(()) => Ok(self.reconcile_columns(COMMAND).await),
            Err(e) => self.reject(COMMAND, e),
        }
    }

    /// Removes a column from the mirror and moves its cards to the first remaining column.
    ///
    /// The backend delete is owned by the host application; this only updates local state.
    /// Card reloads fetch only the columns still in the mirror, so the reassigned cards
    /// disappear after the next card write unless the host has moved them server-side.
    /// A column reload brings the column back while the server still has it.
    pub async fn delete_column(&self, column_id: &str) -> Result<CommandOutcome, AppError> {
        const COMMAND: &str = "deleteColumn";
        if !self.authorize(COMMAND, Capability::DeleteColumn) {
            return Ok(CommandOutcome::Denied);
        }
        match self.engine.remove_column_locally(column_id).await {
            Ok(reassigned_cards) => Ok(CommandOutcome::AppliedLocally { reassigned_cards }),
            Err(e) => self.reject(COMMAND, e),
        }
    }

    fn authorize(&self, command: &str, capability: Capability) -> bool {
        let session = self.session.snapshot();
        match session.capabilities().require(capability) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "{} ignored for {} (role {}, assigned {}): {}",
                    command,
                    session.member_id.as_deref().unwrap_or("anonymous"),
                    session.role,
                    session.is_assigned_to_project,
                    e
                );
                false
            }
        }
    }

    fn reject(&self, command: &str, e: AppError) -> Result<CommandOutcome, AppError> {
        error!("{} failed: {}", command, e);
        Err(e)
    }

    async fn reconcile_cards(&self, command: &str) -> CommandOutcome {
        let reconciliation = match self.engine.reload_cards().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Reconciliation after {} failed: {}", command, e);
                None
            }
        };
        CommandOutcome::Applied { reconciliation }
    }

    async fn reconcile_columns(&self, command: &str) -> CommandOutcome {
        let reconciliation = match self.engine.reload_columns().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Reconciliation after {} failed: {}", command, e);
                None
            }
        };
        CommandOutcome::Applied { reconciliation }
    }
}

fn card_not_found(card_id: &str) -> AppError {
    AppError::NotFound(format!("Card {} not found", card_id))
}

fn unknown_destination(column_id: &str) -> AppError {
    AppError::ValidationError(format!("Column {} is not on this board.", column_id))
}
