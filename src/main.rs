use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{error, info};

use boardsync::backend::{BackendClient, InMemoryBackend};
use boardsync::cache::{FileStorage, OfflineCache};
use boardsync::config::Config;
use boardsync::filter::{filter_cards, DueDateFilter, Facets};
use boardsync::models::{Card, CardDraft, Column, ColumnStatus, Priority};
use boardsync::permissions::Role;
use boardsync::session::Session;
use boardsync::{MutationGateway, SyncEngine};

async fn seed(backend: &InMemoryBackend) {
    let todo = "todo";
    backend.add_card(todo, "Draft release notes").await;
    let mut urgent = Card::placeholder("seed-urgent", "");
    urgent.column_id = todo.into();
    urgent.title = "Fix login redirect".into();
    urgent.priority = Priority::Urgent;
    urgent.due_date = Some(Utc::now() + Duration::days(2));
    urgent.assigned_to.insert("member-1".into());
    backend.insert_card(urgent).await;
    backend.add_card("doing", "Migrate board storage").await;
    backend.add_card("done", "Set up CI").await;
}

fn print_board(columns: &[Column], cards: &[Card]) {
    for column in columns {
        println!("[{}]", column.title);
        for card in cards.iter().filter(|c| c.column_id == column.id) {
            println!("  - {} ({})", card.title, card.priority.as_str());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), boardsync::AppError> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::from_env()?;

    let backend = Arc::new(InMemoryBackend::with_board(&[("todo", 0), ("doing", 1), ("done", 2)]).await);
    seed(&backend).await;

    let session = Session::default();
    session.sign_in("member-1", Role::Member, true);

    let client = BackendClient::new(backend.clone(), config.request_timeout);
    let cache = OfflineCache::new(Arc::new(FileStorage::new(config.cache_dir.clone())));
    let engine = SyncEngine::new(client.clone(), session.clone(), cache, &config);
    let gateway = MutationGateway::new(client, session.clone(), engine.clone());

    let report = engine.start().await?;
    info!("Loaded {} card(s)", report.card_count);

    if let Err(e) = gateway
        .create_card(None, CardDraft::titled("Write onboarding guide"))
        .await
    {
        error!("{}", e.user_message().unwrap_or_default());
    }
    let mirror = engine.mirror().await;
    if let Some(card) = mirror.cards.iter().find(|c| c.title == "Draft release notes") {
        if let Err(e) = gateway.move_card(&card.id, "doing").await {
            error!("{}", e.user_message().unwrap_or_default());
        }
    }
    if let Err(e) = gateway.create_column("Review", ColumnStatus::Review).await {
        error!("{}", e.user_message().unwrap_or_default());
    }

    let mirror = engine.mirror().await;
    print_board(&mirror.columns, &mirror.cards);

    let due_soon = filter_cards(
        &mirror.cards,
        "",
        &Facets {
            due_date: Some(DueDateFilter::ThisWeek),
            ..Facets::default()
        },
        Utc::now(),
    );
    println!("Due this week: {}", due_soon.len());

    session.sign_out();
    engine.handle_session_change().await?;
    info!("Signed out; mirror holds {} card(s)", engine.mirror().await.cards.len());
    Ok(())
}
