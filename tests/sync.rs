use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use boardsync::backend::{BackendClient, InMemoryBackend, ResponseShape};
use boardsync::cache::{CacheStorage, MemoryStorage, OfflineCache};
use boardsync::config::Config;
use boardsync::models::Card;
use boardsync::permissions::Role;
use boardsync::session::Session;
use boardsync::sync::LoadStage;
use boardsync::{AppError, Mirror, SyncEngine, SyncState};

// Helper struct bundling the collaborators of one engine
struct TestBoard {
    backend: Arc<InMemoryBackend>,
    session: Session,
    cache: OfflineCache,
    engine: SyncEngine,
}

async fn board_with(columns: &[(&str, i64)], config: Config) -> TestBoard {
    board_with_cache(columns, config, OfflineCache::in_memory()).await
}

async fn board_with_cache(columns: &[(&str, i64)], config: Config, cache: OfflineCache) -> TestBoard {
    let backend = Arc::new(InMemoryBackend::with_board(columns).await);
    let session = Session::default();
    session.sign_in("m1", Role::Member, true);
    let client = BackendClient::new(backend.clone(), config.request_timeout);
    let engine = SyncEngine::new(client, session.clone(), cache.clone(), &config);
    TestBoard {
        backend,
        session,
        cache,
        engine,
    }
}

async fn board(columns: &[(&str, i64)]) -> TestBoard {
    board_with(columns, Config::immediate()).await
}

// Storage whose writes take a while to land
#[derive(Default)]
struct SlowStorage {
    inner: MemoryStorage,
}

#[async_trait]
impl CacheStorage for SlowStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), AppError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.write(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.inner.remove(key).await
    }
}

fn titles(cards: &[Card]) -> Vec<String> {
    let mut titles: Vec<String> = cards.iter().map(|c| c.title.clone()).collect();
    titles.sort();
    titles
}

fn column_ids(mirror: &Mirror) -> Vec<&str> {
    mirror.columns.iter().map(|c| c.id.as_str()).collect()
}

#[test_log::test(tokio::test)]
async fn test_load_chain_populates_mirror() {
    let t = board(&[("done", 2), ("todo", 0), ("doing", 1)]).await;
    t.backend.add_card("todo", "Plan").await;
    t.backend.add_card("doing", "Build").await;
    t.backend.add_card("done", "Ship").await;

    let report = t.engine.load().await.unwrap();
    assert!(report.applied);
    assert_eq!(report.card_count, 3);
    assert!(report.failed_columns.is_empty());
    assert_eq!(t.engine.state().await, SyncState::Ready);

    let mirror = t.engine.mirror().await;
    assert_eq!(mirror.project.as_ref().unwrap().id, "project-1");
    assert_eq!(mirror.board.as_ref().unwrap().id, "board-1");
    assert_eq!(column_ids(&mirror), vec!["todo", "doing", "done"]);

    // The snapshot was written after the pass
    assert_eq!(titles(&t.cache.load().await), titles(&mirror.cards));
}

#[tokio::test]
async fn test_derived_lists_partition_the_mirror() {
    let t = board(&[("a", 0), ("b", 1), ("c", 2)]).await;
    for (column, count) in [("a", 3), ("b", 1), ("c", 0)] {
        for i in 0..count {
            t.backend.add_card(column, &format!("{}-{}", column, i)).await;
        }
    }
    t.engine.load().await.unwrap();

    let mirror = t.engine.mirror().await;
    let mut seen = HashSet::new();
    for column in &mirror.columns {
        let derived = t.engine.cards_in_column(&column.id).await;
        let expected: Vec<&Card> = mirror
            .cards
            .iter()
            .filter(|c| c.column_id == column.id)
            .collect();
        assert_eq!(derived.iter().collect::<Vec<_>>(), expected);
        for card in derived {
            assert!(seen.insert(card.id), "card listed in two columns");
        }
    }
    assert_eq!(seen.len(), mirror.cards.len());
}

#[tokio::test]
async fn test_every_response_shape_yields_the_same_mirror() {
    let mut mirrors = Vec::new();
    for shape in [ResponseShape::Bare, ResponseShape::Envelope, ResponseShape::Compact] {
        let t = board(&[("todo", 0), ("done", 1)]).await;
        t.backend.set_shape(shape).await;
        t.backend.add_card("todo", "Alone in todo").await;
        t.backend.add_card("done", "First done").await;
        t.backend.add_card("done", "Second done").await;
        t.engine.load().await.unwrap();

        let mirror = t.engine.mirror().await;
        mirrors.push((column_ids(&mirror).join(","), titles(&mirror.cards)));
    }
    assert_eq!(mirrors[0], mirrors[1]);
    assert_eq!(mirrors[1], mirrors[2]);
    assert_eq!(mirrors[0].1.len(), 3);
}

#[tokio::test]
async fn test_reconciliation_is_idempotent() {
    let t = board(&[("todo", 0), ("done", 1)]).await;
    t.backend.add_card("todo", "One").await;
    t.backend.add_card("done", "Two").await;
    t.engine.load().await.unwrap();

    t.engine.reload_cards().await.unwrap();
    let first = t.engine.mirror().await;
    t.engine.reload_cards().await.unwrap();
    let second = t.engine.mirror().await;

    assert_eq!(first, second);
}

#[test_log::test(tokio::test)]
async fn test_partial_failure_replaces_wholesale() {
    let t = board(&[("a", 0), ("b", 1)]).await;
    t.backend.add_card("a", "A1").await;
    t.backend.add_card("a", "A2").await;
    t.backend.add_card("b", "B1").await;
    t.engine.load().await.unwrap();
    assert_eq!(t.engine.mirror().await.cards.len(), 3);

    t.backend.fail_cards_for("a").await;
    let report = t.engine.reload_cards().await.unwrap();

    assert!(report.applied);
    assert_eq!(report.failed_columns, vec!["a".to_string()]);
    assert_eq!(report.loaded_columns, vec!["b".to_string()]);
    assert_eq!(titles(&t.engine.mirror().await.cards), vec!["B1"]);
    assert_eq!(
        t.engine.state().await,
        SyncState::ErrorPartial {
            stage: LoadStage::Cards,
            error: AppError::PartialLoadFailure {
                failed_columns: vec!["a".into()]
            },
        }
    );

    // Recovery brings the column back on the next pass
    t.backend.recover_cards_for("a").await;
    t.engine.reload_cards().await.unwrap();
    assert_eq!(t.engine.mirror().await.cards.len(), 3);
    assert_eq!(t.engine.state().await, SyncState::Ready);
}

#[tokio::test]
async fn test_load_failure_keeps_last_good_mirror() {
    let t = board(&[("todo", 0)]).await;
    t.backend.add_card("todo", "Keep me").await;
    t.engine.load().await.unwrap();
    let before = t.engine.mirror().await;

    t.backend.fail_listings(true).await;
    let err = t.engine.load().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(t.engine.mirror().await, before);
    match t.engine.state().await {
        SyncState::ErrorPartial { stage, .. } => assert_eq!(stage, LoadStage::Projects),
        other => panic!("Unexpected state: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_entries_are_dropped() {
    let t = board(&[("todo", 0)]).await;
    t.backend.add_card("todo", "Valid").await;
    let mut nameless = Card::placeholder("", "");
    nameless.column_id = "todo".into();
    t.backend.insert_card(nameless).await;

    let report = t.engine.load().await.unwrap();
    assert_eq!(report.card_count, 1);
    assert_eq!(titles(&t.engine.mirror().await.cards), vec!["Valid"]);
}

#[tokio::test]
async fn test_sign_out_clears_mirror_and_cache() {
    let t = board(&[("todo", 0)]).await;
    t.backend.add_card("todo", "Secret").await;
    t.engine.start().await.unwrap();
    assert_eq!(t.cache.load().await.len(), 1);

    t.session.sign_out();
    t.engine.handle_session_change().await.unwrap();

    assert_eq!(t.engine.mirror().await, Mirror::default());
    assert_eq!(t.engine.state().await, SyncState::Unauthenticated);
    assert!(t.cache.load().await.is_empty());
    assert!(matches!(t.engine.reload_cards().await, Err(AppError::Unauthorized(_))));

    // Signing back in reloads
    t.session.sign_in("m1", Role::Member, true);
    t.engine.handle_session_change().await.unwrap();
    assert_eq!(titles(&t.engine.mirror().await.cards), vec!["Secret"]);
}

#[tokio::test]
async fn test_start_signed_out_purges_cache() {
    let t = board(&[("todo", 0)]).await;
    let mut stale = Card::placeholder("stale", "");
    stale.column_id = "todo".into();
    t.cache.save(&[stale]).await;

    t.session.sign_out();
    assert!(matches!(t.engine.start().await, Err(AppError::Unauthorized(_))));
    assert!(t.cache.load().await.is_empty());
    assert!(t.engine.mirror().await.cards.is_empty());
    assert_eq!(t.backend.card_fetches().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_seeds_mirror_until_network_completes() {
    let config = Config {
        settle_delay: Duration::from_millis(100),
        ..Config::default()
    };
    let t = board_with(&[("todo", 0)], config).await;
    t.backend.add_card("todo", "From server").await;
    let mut cached = Card::placeholder("cached-1", "");
    cached.column_id = "todo".into();
    cached.title = "From cache".into();
    t.cache.save(&[cached]).await;

    let engine = t.engine.clone();
    let handle = tokio::spawn(async move { engine.start().await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(titles(&t.engine.mirror().await.cards), vec!["From cache"]);
    assert_eq!(t.backend.card_fetches().await, 0);

    handle.await.unwrap().unwrap();
    assert_eq!(titles(&t.engine.mirror().await.cards), vec!["From server"]);
    assert_eq!(titles(&t.cache.load().await), vec!["From server"]);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_stale_pass_is_discarded() {
    let t = board(&[("todo", 0)]).await;
    t.backend.add_card("todo", "Original").await;
    t.engine.load().await.unwrap();

    // The first pass reads now but answers late
    t.backend.push_fetch_delay(Duration::from_millis(200)).await;
    let engine = t.engine.clone();
    let slow = tokio::spawn(async move { engine.reload_cards().await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    t.backend.add_card("todo", "Newer").await;
    let fast = t.engine.reload_cards().await.unwrap();
    assert!(fast.applied);

    let stale = slow.await.unwrap().unwrap();
    assert!(!stale.applied);
    assert!(stale.epoch < fast.epoch);
    assert_eq!(
        titles(&t.engine.mirror().await.cards),
        vec!["Newer", "Original"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_detach_drops_in_flight_results() {
    let t = board(&[("todo", 0)]).await;
    t.engine.load().await.unwrap();
    let before = t.engine.mirror().await;

    t.backend.add_card("todo", "Arrives after detach").await;
    t.backend.push_fetch_delay(Duration::from_millis(50)).await;
    let engine = t.engine.clone();
    let in_flight = tokio::spawn(async move { engine.reload_cards().await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    t.engine.detach();
    let report = in_flight.await.unwrap().unwrap();
    assert!(!report.applied);
    assert_eq!(t.engine.mirror().await, before);
}

#[tokio::test(start_paused = true)]
async fn test_settle_delay_precedes_requests() {
    let config = Config {
        settle_delay: Duration::from_millis(50),
        ..Config::default()
    };
    let t = board_with(&[("todo", 0)], config).await;
    let engine = t.engine.clone();
    let handle = tokio::spawn(async move { engine.load().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(t.engine.state().await, SyncState::Unauthenticated);

    handle.await.unwrap().unwrap();
    assert_eq!(t.engine.state().await, SyncState::Ready);
    assert_eq!(t.backend.card_fetches().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_fetches_merge_in_column_order() {
    let config = Config {
        fetch_concurrency: 3,
        ..Config::immediate()
    };
    let t = board_with(&[("a", 0), ("b", 1), ("c", 2)], config).await;
    t.backend.add_card("c", "c-card").await;
    t.backend.add_card("b", "b-card").await;
    t.backend.add_card("a", "a-card").await;
    // Earlier columns answer later
    for ms in [30, 20, 10] {
        t.backend.push_fetch_delay(Duration::from_millis(ms)).await;
    }

    t.engine.load().await.unwrap();
    let order: Vec<String> = t
        .engine
        .mirror()
        .await
        .cards
        .into_iter()
        .map(|c| c.column_id)
        .collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_column_times_out_without_blocking_others() {
    let config = Config {
        request_timeout: Duration::from_millis(100),
        ..Config::immediate()
    };
    let t = board_with(&[("slow", 0), ("fast", 1)], config).await;
    t.backend.add_card("slow", "Never arrives").await;
    t.backend.add_card("fast", "Arrives").await;
    t.backend.push_fetch_delay(Duration::from_secs(60)).await;

    let report = t.engine.load().await.unwrap();
    assert_eq!(report.failed_columns, vec!["slow".to_string()]);
    assert_eq!(titles(&t.engine.mirror().await.cards), vec!["Arrives"]);
}

#[tokio::test]
async fn test_sign_out_after_plain_load_clears_everything() {
    let t = board(&[("todo", 0)]).await;
    t.backend.add_card("todo", "Private").await;
    t.engine.load().await.unwrap();
    assert_eq!(t.cache.load().await.len(), 1);

    t.session.sign_out();
    t.engine.handle_session_change().await.unwrap();

    assert_eq!(t.engine.mirror().await, Mirror::default());
    assert!(t.cache.load().await.is_empty());
    assert_eq!(t.engine.state().await, SyncState::Unauthenticated);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_sign_out_during_cache_write_still_purges() {
    let cache = OfflineCache::new(Arc::new(SlowStorage::default()));
    let t = board_with_cache(&[("todo", 0)], Config::immediate(), cache).await;
    t.backend.add_card("todo", "Private").await;
    t.engine.load().await.unwrap();

    let engine = t.engine.clone();
    let pass = tokio::spawn(async move { engine.reload_cards().await });
    // The pass is now writing its snapshot
    tokio::time::sleep(Duration::from_millis(10)).await;

    t.session.sign_out();
    t.engine.handle_session_change().await.unwrap();
    pass.await.unwrap().unwrap();

    assert!(t.cache.load().await.is_empty());
    assert_eq!(t.engine.mirror().await, Mirror::default());
    assert_eq!(t.engine.state().await, SyncState::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn test_follow_session_reacts_to_sign_out_and_back_in() {
    let t = board(&[("todo", 0)]).await;
    t.backend.add_card("todo", "Shared").await;
    t.engine.start().await.unwrap();

    let engine = t.engine.clone();
    let follower = tokio::spawn(async move { engine.follow_session().await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    t.session.sign_out();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(t.engine.mirror().await, Mirror::default());
    assert!(t.cache.load().await.is_empty());
    assert_eq!(t.engine.state().await, SyncState::Unauthenticated);

    t.session.sign_in("m1", Role::Member, true);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(titles(&t.engine.mirror().await.cards), vec!["Shared"]);
    assert_eq!(t.engine.state().await, SyncState::Ready);

    follower.abort();
}

#[tokio::test(start_paused = true)]
async fn test_detach_cancels_pending_settle_delay() {
    let config = Config {
        settle_delay: Duration::from_millis(50),
        ..Config::default()
    };
    let t = board_with(&[("todo", 0)], config).await;
    t.backend.add_card("todo", "Never fetched").await;

    let engine = t.engine.clone();
    let pending = tokio::spawn(async move { engine.load().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    t.engine.detach();
    let report = pending.await.unwrap().unwrap();
    assert!(!report.applied);
    assert_eq!(t.backend.card_fetches().await, 0);
    assert!(t.engine.mirror().await.cards.is_empty());
    assert_eq!(t.engine.state().await, SyncState::Unauthenticated);
}
