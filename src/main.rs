//! Fastbreak session-engine binary.
//!
//! Wires a room store (CouchDB when configured, in-memory otherwise) under
//! the storage supervisor, then runs a scripted two-seat exhibition game as a
//! deployment smoke test: a host and a bot guest play a short match, vote to
//! replay, and leave.

use std::sync::Arc;

use anyhow::Context;
use rand::seq::IndexedRandom;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use fastbreak_back::{
    config::AppConfig,
    dao::{
        models::{GameTypeEntity, RoomStatusEntity},
        room_store::memory::MemoryRoomStore,
    },
    dto::{
        events::SessionEvent,
        requests::{CreateRoomRequest, JoinRoomRequest},
    },
    services::{
        question_bank::SampleQuestionBank,
        session::{self, SessionCommand, SessionHandle},
    },
    state::{AppState, SharedState},
};

/// Games the exhibition plays before the seats leave.
const EXHIBITION_GAMES: usize = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let state = AppState::with_reference_collaborators(config);

    wire_store(&state).await;

    // Wait for a store before opening the exhibition room.
    let mut degraded = state.degraded_watcher();
    while *degraded.borrow() {
        degraded
            .changed()
            .await
            .context("degraded watcher closed")?;
    }

    tokio::select! {
        result = run_exhibition(&state) => result?,
        _ = shutdown_signal() => info!("shutting down"),
    }

    Ok(())
}

/// Install the configured storage backend: CouchDB via the supervisor when
/// `COUCH_BASE_URL` is set, the in-memory store otherwise.
async fn wire_store(state: &SharedState) {
    #[cfg(feature = "couch-store")]
    if std::env::var_os("COUCH_BASE_URL").is_some() {
        use fastbreak_back::{
            dao::room_store::{
                RoomStore,
                couchdb::{CouchConfig, CouchRoomStore},
            },
            services::store_supervisor,
        };

        info!("using CouchDB room store");
        tokio::spawn(store_supervisor::run(state.clone(), || async {
            let config = CouchConfig::from_env()?;
            let store = CouchRoomStore::connect(config).await?;
            Ok(Arc::new(store) as Arc<dyn RoomStore>)
        }));
        return;
    }

    info!("using in-memory room store");
    state
        .install_room_store(Arc::new(MemoryRoomStore::new()))
        .await;
}

/// Host a short match between two scripted seats against the live store.
async fn run_exhibition(state: &SharedState) -> anyhow::Result<()> {
    let host_id = Uuid::new_v4();
    let guest_id = Uuid::new_v4();

    let host = session::host_session(
        state,
        host_id,
        CreateRoomRequest {
            host_name: "Coach".into(),
            game_type: GameTypeEntity::PlayerCard,
            question_count: Some(3),
            timer_seconds: Some(5),
            max_players: Some(2),
        },
    )
    .await
    .context("hosting exhibition room")?;

    info!(code = host.join_code(), "exhibition room open");

    let guest = session::join_session(
        state,
        guest_id,
        JoinRoomRequest {
            code: host.join_code().into(),
            player_name: "Bench Bot".into(),
        },
    )
    .await
    .context("joining exhibition room")?;

    let host_seat = tokio::spawn(autoplay("coach", host, true));
    let guest_seat = tokio::spawn(autoplay("bench-bot", guest, false));
    tokio::try_join!(host_seat, guest_seat)?;

    info!("exhibition complete");
    Ok(())
}

/// Drive one seat: guess a plausible roster name each round, vote to replay
/// after the first finish, leave after the last.
async fn autoplay(label: &'static str, mut handle: SessionHandle, is_host: bool) {
    let names = SampleQuestionBank::roster_names();
    let mut finishes = 0usize;

    while let Some(event) = handle.next_event().await {
        match event {
            SessionEvent::RoomUpdated { snapshot } => {
                if is_host
                    && snapshot.status == RoomStatusEntity::Waiting
                    && snapshot.players.len() == 2
                {
                    // Idempotent: duplicate starts resolve as no-ops.
                    handle.send(SessionCommand::StartGame).await;
                }
            }
            SessionEvent::RoundBegan { round, .. } => {
                let guess = names
                    .choose(&mut rand::rng())
                    .copied()
                    .unwrap_or("LeBron James");
                info!(seat = label, round, guess, "submitting");
                handle.send(SessionCommand::SubmitGuess(guess.into())).await;
            }
            SessionEvent::RoundRevealed { reveal } => {
                info!(
                    seat = label,
                    round = reveal.round,
                    correct = reveal.correct,
                    points = reveal.points_awarded,
                    expected = %reveal.expected_answer,
                    "round revealed"
                );
            }
            SessionEvent::GameFinished { scoreboard } => {
                finishes += 1;
                for entry in &scoreboard {
                    info!(
                        seat = label,
                        player = %entry.name,
                        score = entry.score,
                        correct = entry.correct_count,
                        "final standing"
                    );
                }
                let command = if finishes < EXHIBITION_GAMES {
                    SessionCommand::VotePlayAgain
                } else {
                    SessionCommand::Leave
                };
                handle.send(command).await;
            }
            SessionEvent::SessionEnded { reason } => {
                info!(seat = label, ?reason, "seat done");
                break;
            }
            _ => {}
        }
    }

    if finishes < EXHIBITION_GAMES {
        warn!(seat = label, finishes, "seat ended early");
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the exhibition down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
