//! Board mirror and the load/reconciliation state machine.
//!
//! The engine walks `projects -> board -> columns -> cards`, taking the first project
//! and the first board. Cards are fetched per column; a failing column is logged and
//! skipped, and the resulting card list replaces the mirror wholesale. Every pass
//! takes a new epoch, and a pass that completes after a newer one has started is
//! discarded instead of applied.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::backend::BackendClient;
use crate::cache::OfflineCache;
use crate::config::Config;
use crate::error::AppError;
use crate::models::board::sort_columns;
use crate::models::{Board, Card, Column, Project};
use crate::session::Session;

/// Stage of the load chain, used to report where a load stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Projects,
    Board,
    Columns,
    Cards,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Unauthenticated,
    LoadingProjects,
    LoadingBoard,
    LoadingColumns,
    LoadingCards,
    Ready,
    /// A load stopped or partially failed; the last good mirror is kept.
    ErrorPartial { stage: LoadStage, error: AppError },
}

/// Client-held reflection of the board. Columns are kept sorted by `order`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mirror {
    pub project: Option<Project>,
    pub board: Option<Board>,
    pub columns: Vec<Column>,
    pub cards: Vec<Card>,
}

impl Mirror {
    /// Cards placed in `column_id`, derived from `Card::column_id`.
    pub fn cards_in_column(&self, column_id: &str) -> Vec<&Card> {
        self.cards
            .iter()
            .filter(|card| card.column_id == column_id)
            .collect()
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == card_id)
    }

    /// The card, or a placeholder describing why it could not be shown.
    pub fn card_or_placeholder(&self, card_id: &str) -> Card {
        self.card(card_id).cloned().unwrap_or_else(|| {
            Card::placeholder(
                card_id,
                &format!("Card {} does not exist or has not been loaded yet.", card_id),
            )
        })
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.id == column_id)
    }

    pub fn first_column(&self) -> Option<&Column> {
        self.columns.first()
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub epoch: u64,
    /// False when the pass was superseded or cancelled and its results dropped.
    pub applied: bool,
    pub loaded_columns: Vec<String>,
    pub failed_columns: Vec<String>,
    pub card_count: usize,
}

impl ReconcileReport {
    fn discarded(epoch: u64) -> Self {
        Self {
            epoch,
            applied: false,
            loaded_columns: Vec::new(),
            failed_columns: Vec::new(),
            card_count: 0,
        }
    }

    /// `PartialLoadFailure` when some columns failed in this pass.
    pub fn partial_failure(&self) -> Option<AppError> {
        if self.failed_columns.is_empty() {
            None
        } else {
            Some(AppError::PartialLoadFailure {
                failed_columns: self.failed_columns.clone(),
            })
        }
    }
}

struct EngineInner {
    backend: BackendClient,
    session: Session,
    cache: OfflineCache,
    settle_delay: Duration,
    fetch_concurrency: usize,
    mirror: RwLock<Mirror>,
    state: RwLock<SyncState>,
    epoch: AtomicU64,
    authenticated: AtomicBool,
}

/// Owns the mirror. Cheap to clone; clones share the same mirror.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(backend: BackendClient, session: Session, cache: OfflineCache, config: &Config) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                backend,
                session,
                cache,
                settle_delay: config.settle_delay,
                fetch_concurrency: config.fetch_concurrency.max(1),
                mirror: RwLock::new(Mirror::default()),
                state: RwLock::new(SyncState::Unauthenticated),
                epoch: AtomicU64::new(0),
                authenticated: AtomicBool::new(false),
            }),
        }
    }

    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub async fn mirror(&self) -> Mirror {
        self.inner.mirror.read().await.clone()
    }

    pub async fn cards_in_column(&self, column_id: &str) -> Vec<Card> {
        self.inner
            .mirror
            .read()
            .await
            .cards_in_column(column_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn state(&self) -> SyncState {
        self.inner.state.read().await.clone()
    }

    /// Engine startup.
    ///
    /// Signed out: the offline cache is purged and the mirror starts empty.
    /// Signed in: the cached cards seed the mirror, then the full load runs.
    pub async fn start(&self) -> Result<ReconcileReport, AppError> {
        if !self.inner.session.is_authenticated() {
            self.teardown().await;
            return Err(AppError::Unauthorized("not signed in".into()));
        }
        self.inner.authenticated.store(true, Ordering::SeqCst);

        let cached = self.inner.cache.load().await;
        if !cached.is_empty() {
            debug!("Seeding mirror with {} cached card(s)", cached.len());
            self.inner.mirror.write().await.cards = dedupe_cards(cached);
        }
        self.load().await
    }

    /// Reacts to authentication edges observed on the session.
    pub async fn handle_session_change(&self) -> Result<(), AppError> {
        let now = self.inner.session.is_authenticated();
        let before = self.inner.authenticated.swap(now, Ordering::SeqCst);
        match (before, now) {
            (true, false) => {
                info!("Authentication lost, clearing board mirror");
                self.teardown().await;
            }
            (false, true) => {
                self.start().await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Follows the session until every sender is gone.
    pub async fn follow_session(&self) {
        let mut changes = self.inner.session.subscribe();
        loop {
            if let Err(e) = self.handle_session_change().await {
                warn!("Board load after session change failed: {}", e);
            }
            if changes.changed().await.is_err() {
                break;
            }
        }
    }

    /// Leaving the board view: pending settle delays and in-flight passes are dropped.
    pub fn detach(&self) {
        let epoch = self.begin_pass();
        debug!("Board view detached at epoch {}", epoch);
    }

    /// Clears the mirror and purges the offline cache.
    pub async fn teardown(&self) {
        self.begin_pass();
        self.inner.authenticated.store(false, Ordering::SeqCst);
        *self.inner.mirror.write().await = Mirror::default();
        *self.inner.state.write().await = SyncState::Unauthenticated;
        self.inner.cache.purge().await;
    }

    /// Full load chain: first project, first board, its columns, then cards.
    pub async fn load(&self) -> Result<ReconcileReport, AppError> {
        self.ensure_authenticated()?;
        let epoch = self.begin_pass();
        if !self.settle(epoch).await {
            return Ok(ReconcileReport::discarded(epoch));
        }

        self.enter(epoch, SyncState::LoadingProjects).await;
        let project = match self.inner.backend.projects().await.and_then(|p| first(p, "project")) {
            Ok(project) => project,
            Err(e) => return self.fail(epoch, LoadStage::Projects, e).await,
        };

        self.enter(epoch, SyncState::LoadingBoard).await;
        let board = match self
            .inner
            .backend
            .boards(&project.id)
            .await
            .and_then(|b| first(b, "board"))
        {
            Ok(board) => board,
            Err(e) => return self.fail(epoch, LoadStage::Board, e).await,
        };

        self.enter(epoch, SyncState::LoadingColumns).await;
        let columns = match self.inner.backend.columns(&board.id).await {
            Ok(columns) => prepare_columns(columns),
            Err(e) => return self.fail(epoch, LoadStage::Columns, e).await,
        };

        {
            let mut mirror = self.inner.mirror.write().await;
            if !self.is_current(epoch) {
                debug!("Discarding superseded load at epoch {}", epoch);
                return Ok(ReconcileReport::discarded(epoch));
            }
            mirror.project = Some(project);
            mirror.board = Some(board);
            mirror.columns = columns.clone();
        }

        self.cards_phase(epoch, columns).await
    }

    /// Re-reads the columns of the loaded board, then runs the cards phase.
    pub async fn reload_columns(&self) -> Result<ReconcileReport, AppError> {
        self.ensure_authenticated()?;
        let board_id = self
            .inner
            .mirror
            .read()
            .await
            .board
            .as_ref()
            .map(|board| board.id.clone());
        let board_id = match board_id {
            Some(id) => id,
            None => return self.load().await,
        };

        let epoch = self.begin_pass();
        self.enter(epoch, SyncState::LoadingColumns).await;
        let columns = match self.inner.backend.columns(&board_id).await {
            Ok(columns) => prepare_columns(columns),
            Err(e) => return self.fail(epoch, LoadStage::Columns, e).await,
        };
        {
            let mut mirror = self.inner.mirror.write().await;
            if !self.is_current(epoch) {
                return Ok(ReconcileReport::discarded(epoch));
            }
            mirror.columns = columns.clone();
        }
        self.cards_phase(epoch, columns).await
    }

    /// Reconciliation: re-fetches cards for every known column and replaces the card mirror.
    pub async fn reload_cards(&self) -> Result<ReconcileReport, AppError> {
        self.ensure_authenticated()?;
        let epoch = self.begin_pass();
        let columns = self.inner.mirror.read().await.columns.clone();
        self.cards_phase(epoch, columns).await
    }

    async fn cards_phase(&self, epoch: u64, columns: Vec<Column>) -> Result<ReconcileReport, AppError> {
        if !self.settle(epoch).await {
            return Ok(ReconcileReport::discarded(epoch));
        }
        self.enter(epoch, SyncState::LoadingCards).await;

        let backend = &self.inner.backend;
        // `buffered` yields in input order, so merging stays column-ordered.
        let results: Vec<(String, Result<Vec<Card>, AppError>)> = stream::iter(columns)
            .map(|column| async move {
                let fetched = backend.cards(&column.id).await;
                (column.id, fetched)
            })
            .buffered(self.inner.fetch_concurrency)
            .collect()
            .await;

        let mut cards = Vec::new();
        let mut seen = HashSet::new();
        let mut loaded_columns = Vec::new();
        let mut failed_columns = Vec::new();
        for (column_id, fetched) in results {
            match fetched {
                Ok(column_cards) => {
                    for card in column_cards {
                        if seen.insert(card.id.clone()) {
                            cards.push(card);
                        } else {
                            warn!("Dropping duplicate card {} from column {}", card.id, column_id);
                        }
                    }
                    loaded_columns.push(column_id);
                }
                Err(e) => {
                    warn!("Failed to load cards for column {}: {}", column_id, e);
                    failed_columns.push(column_id);
                }
            }
        }

        let report = ReconcileReport {
            epoch,
            applied: true,
            loaded_columns,
            failed_columns,
            card_count: cards.len(),
        };

        // Held until the snapshot is written; teardown purges only after taking it.
        let mut mirror = self.inner.mirror.write().await;
        if !self.is_current(epoch) || !self.inner.session.is_authenticated() {
            debug!("Discarding superseded card pass at epoch {}", epoch);
            return Ok(ReconcileReport::discarded(epoch));
        }
        *self.inner.state.write().await = match report.partial_failure() {
            Some(error) => SyncState::ErrorPartial {
                stage: LoadStage::Cards,
                error,
            },
            None => SyncState::Ready,
        };
        info!(
            "Reconciled {} card(s) from {} column(s) at epoch {} ({} failed)",
            report.card_count,
            report.loaded_columns.len(),
            epoch,
            report.failed_columns.len()
        );
        self.inner.cache.save(&cards).await;
        mirror.cards = cards;
        Ok(report)
    }

    /// False once the session has been torn down. Checked under the mirror lock.
    fn accepts_writes(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst) && self.inner.session.is_authenticated()
    }

    /// Appends a card returned by a create call, unless its id is already present.
    pub(crate) async fn apply_optimistic_card(&self, card: Card) {
        let mut mirror = self.inner.mirror.write().await;
        if !self.accepts_writes() {
            debug!("Dropping created card {}: session ended", card.id);
            return;
        }
        if mirror.card(&card.id).is_none() {
            mirror.cards.push(card);
        }
    }

    pub(crate) async fn apply_optimistic_column(&self, column: Column) {
        let mut mirror = self.inner.mirror.write().await;
        if !self.accepts_writes() {
            debug!("Dropping created column {}: session ended", column.id);
            return;
        }
        if mirror.column(&column.id).is_none() {
            mirror.columns.push(column);
            sort_columns(&mut mirror.columns);
        }
    }

    /// Removes a column from the mirror, moving its cards to the first remaining column.
    ///
    /// Returns how many cards were moved. The last column cannot be removed.
    pub(crate) async fn remove_column_locally(&self, column_id: &str) -> Result<usize, AppError> {
        let mut mirror = self.inner.mirror.write().await;
        let index = mirror
            .columns
            .iter()
            .position(|column| column.id == column_id)
            .ok_or_else(|| AppError::NotFound(format!("Column {} not found", column_id)))?;
        if mirror.columns.len() == 1 {
            return Err(AppError::ValidationError(
                "The last column of a board cannot be deleted.".into(),
            ));
        }

        mirror.columns.remove(index);
        let target = mirror.columns[0].id.clone();
        let mut moved = 0;
        for card in mirror.cards.iter_mut().filter(|card| card.column_id == column_id) {
            card.column_id = target.clone();
            moved += 1;
        }
        debug!(
            "Removed column {} locally, moved {} card(s) to {}",
            column_id, moved, target
        );
        Ok(moved)
    }

    /// Also records the signed-in state so a later sign-out is seen as a falling edge.
    fn ensure_authenticated(&self) -> Result<(), AppError> {
        if self.inner.session.is_authenticated() {
            self.inner.authenticated.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(AppError::Unauthorized("not signed in".into()))
        }
    }

    fn begin_pass(&self) -> u64 {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Debounce before talking to the backend. False when the pass was superseded meanwhile.
    async fn settle(&self, epoch: u64) -> bool {
        if !self.inner.settle_delay.is_zero() {
            tokio::time::sleep(self.inner.settle_delay).await;
        }
        self.is_current(epoch)
    }

    async fn enter(&self, epoch: u64, state: SyncState) {
        if self.is_current(epoch) {
            debug!("Sync state -> {:?} (epoch {})", state, epoch);
            *self.inner.state.write().await = state;
        }
    }

    async fn fail(&self, epoch: u64, stage: LoadStage, error: AppError) -> Result<ReconcileReport, AppError> {
        warn!("Board load stopped at {:?}: {}", stage, error);
        if self.is_current(epoch) {
            *self.inner.state.write().await = SyncState::ErrorPartial {
                stage,
                error: error.clone(),
            };
        }
        Err(error)
    }
}

fn first<T>(items: Vec<T>, kind: &str) -> Result<T, AppError> {
    items
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("No {} available", kind)))
}

fn prepare_columns(mut columns: Vec<Column>) -> Vec<Column> {
    let mut seen = HashSet::new();
    columns.retain(|column| {
        let fresh = seen.insert(column.id.clone());
        if !fresh {
            warn!("Dropping duplicate column {}", column.id);
        }
        fresh
    });
    sort_columns(&mut columns);
    columns
}

fn dedupe_cards(mut cards: Vec<Card>) -> Vec<Card> {
    let mut seen = HashSet::new();
    cards.retain(|card| seen.insert(card.id.clone()));
    cards
}
