//! End-to-end session flows over the in-memory store.

use std::{sync::Arc, time::Duration};

use uuid::Uuid;

use fastbreak_back::{
    config::{AppConfig, RoomDefaults, TimingConfig},
    dao::{
        models::{GameTypeEntity, RoomStatusEntity},
        room_store::memory::MemoryRoomStore,
    },
    dto::{
        events::{EndReason, SessionEvent},
        requests::{CreateRoomRequest, JoinRoomRequest},
    },
    services::{consensus, room_service, round_service, session},
    state::{AppState, SharedState},
};

async fn test_state() -> SharedState {
    let state = AppState::with_reference_collaborators(AppConfig::default());
    state
        .install_room_store(Arc::new(MemoryRoomStore::new()))
        .await;
    state
}

/// State for driving the services directly, with a lease long enough that a
/// slow test runner can never lose leadership mid-script.
async fn scripted_state() -> SharedState {
    let state = AppState::with_reference_collaborators(AppConfig::new(
        TimingConfig {
            poll_interval: Duration::from_secs(3),
            reveal_grace: Duration::from_secs(5),
            lease_ttl: Duration::from_secs(3600),
        },
        RoomDefaults {
            question_count: 5,
            timer_seconds: 15,
            max_players: 2,
        },
    ));
    state
        .install_room_store(Arc::new(MemoryRoomStore::new()))
        .await;
    state
}

fn create_request(question_count: usize, timer_seconds: u32) -> CreateRoomRequest {
    CreateRoomRequest {
        host_name: "host".into(),
        game_type: GameTypeEntity::PlayerCard,
        question_count: Some(question_count),
        timer_seconds: Some(timer_seconds),
        max_players: Some(2),
    }
}

fn join_request(code: &str) -> JoinRoomRequest {
    JoinRoomRequest {
        code: code.into(),
        player_name: "guest".into(),
    }
}

/// Correct name for the question the room is currently playing.
async fn current_answer(state: &SharedState, room_id: Uuid) -> String {
    let store = state.require_store().await.unwrap();
    let room = store.find_room(room_id).await.unwrap().unwrap().room;
    let round = room.current_question.expect("room is playing");
    room.questions[round].answer_name().to_string()
}

/// Wait for the first event matching the predicate, skipping the rest.
async fn wait_for<F>(handle: &mut session::SessionHandle, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = handle
                .next_event()
                .await
                .expect("controller ended before the expected event");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event was never emitted")
}

fn is_round_began(event: &SessionEvent) -> bool {
    matches!(event, SessionEvent::RoundBegan { .. })
}

fn is_game_finished(event: &SessionEvent) -> bool {
    matches!(event, SessionEvent::GameFinished { .. })
}

/// Five rounds, both players correct with five seconds remaining every time:
/// each finishes on 5 x (100 + floor(5/15 x 50)) = 580 points.
#[tokio::test]
async fn two_players_all_correct_finish_on_580() {
    let state = scripted_state().await;
    let host_id = Uuid::new_v4();
    let guest_id = Uuid::new_v4();

    let created = room_service::create_room(&state, host_id, create_request(5, 15))
        .await
        .unwrap();
    let room_id = created.room.id;
    room_service::join_room(&state, guest_id, join_request(&created.room.join_code))
        .await
        .unwrap();
    room_service::start_game(&state, room_id, host_id).await.unwrap();

    for round in 0..5 {
        let answer = current_answer(&state, room_id).await;
        let host_resolution = round_service::commit_answer(
            &state,
            room_id,
            host_id,
            round,
            Some(answer.clone()),
            5,
        )
        .await
        .unwrap();
        assert!(host_resolution.correct);
        assert_eq!(host_resolution.points_awarded, 116);

        round_service::commit_answer(&state, room_id, guest_id, round, Some(answer), 5)
            .await
            .unwrap();
        round_service::advance_round(&state, room_id, host_id, round)
            .await
            .unwrap();
    }

    let store = state.require_store().await.unwrap();
    let room = store.find_room(room_id).await.unwrap().unwrap().room;
    assert_eq!(room.status, RoomStatusEntity::Finished);
    assert!(room.players.iter().all(|player| player.score == 580));
}

/// Both players vote after the finish: the room returns to waiting with all
/// per-game state cleared.
#[tokio::test]
async fn unanimous_replay_vote_resets_the_room() {
    let state = scripted_state().await;
    let host_id = Uuid::new_v4();
    let guest_id = Uuid::new_v4();

    let created = room_service::create_room(&state, host_id, create_request(1, 15))
        .await
        .unwrap();
    let room_id = created.room.id;
    room_service::join_room(&state, guest_id, join_request(&created.room.join_code))
        .await
        .unwrap();
    room_service::start_game(&state, room_id, host_id).await.unwrap();

    let answer = current_answer(&state, room_id).await;
    round_service::commit_answer(&state, room_id, host_id, 0, Some(answer), 5)
        .await
        .unwrap();
    round_service::commit_answer(&state, room_id, guest_id, 0, None, 0)
        .await
        .unwrap();
    round_service::advance_round(&state, room_id, host_id, 0)
        .await
        .unwrap();

    consensus::cast_vote(&state, room_id, host_id).await.unwrap();
    consensus::cast_vote(&state, room_id, guest_id).await.unwrap();
    consensus::reset_room(&state, room_id, host_id).await.unwrap();

    let store = state.require_store().await.unwrap();
    let room = store.find_room(room_id).await.unwrap().unwrap().room;
    assert_eq!(room.status, RoomStatusEntity::Waiting);
    assert!(room.questions.is_empty());
    assert!(room.play_again_votes.is_empty());
    assert!(room.players.iter().all(|player| player.score == 0));
    assert!(room.players.iter().all(|player| player.answers.is_empty()));
}

/// Full controller flow: host and guest play a two-round game through their
/// session controllers, replay once, and leave.
#[tokio::test(start_paused = true)]
async fn controllers_play_replay_and_leave() {
    let state = test_state().await;
    let host_id = Uuid::new_v4();
    let guest_id = Uuid::new_v4();

    let mut host = session::host_session(&state, host_id, create_request(2, 15))
        .await
        .unwrap();
    let mut guest = session::join_session(&state, guest_id, join_request(host.join_code()))
        .await
        .unwrap();
    let room_id = host.room_id();

    host.send(session::SessionCommand::StartGame).await;

    for _ in 0..2 {
        wait_for(&mut host, is_round_began).await;
        wait_for(&mut guest, is_round_began).await;

        let answer = current_answer(&state, room_id).await;
        host.send(session::SessionCommand::SubmitGuess(answer.clone()))
            .await;
        guest
            .send(session::SessionCommand::SubmitGuess("nobody famous".into()))
            .await;

        let reveal = wait_for(&mut host, |event| {
            matches!(event, SessionEvent::RoundRevealed { .. })
        })
        .await;
        if let SessionEvent::RoundRevealed { reveal } = reveal {
            assert!(reveal.correct);
            assert!(reveal.points_awarded >= 100);
        }

        host.send(session::SessionCommand::Advance).await;
    }

    let finished = wait_for(&mut host, is_game_finished).await;
    if let SessionEvent::GameFinished { scoreboard } = finished {
        assert_eq!(scoreboard.len(), 2);
        assert_eq!(scoreboard[0].correct_count, 2);
        assert_eq!(scoreboard[1].score, 0);
    }
    wait_for(&mut guest, is_game_finished).await;

    host.send(session::SessionCommand::VotePlayAgain).await;
    guest.send(session::SessionCommand::VotePlayAgain).await;

    wait_for(&mut host, |event| {
        matches!(event, SessionEvent::ReturnedToLobby)
    })
    .await;
    wait_for(&mut guest, |event| {
        matches!(event, SessionEvent::ReturnedToLobby)
    })
    .await;

    guest.send(session::SessionCommand::Leave).await;
    let ended = wait_for(&mut guest, |event| {
        matches!(event, SessionEvent::SessionEnded { .. })
    })
    .await;
    assert!(matches!(
        ended,
        SessionEvent::SessionEnded {
            reason: EndReason::Left
        }
    ));
}

/// Nobody answers: countdowns force incorrect submissions, the grace timer
/// advances every round, and the game finishes with zero scores.
#[tokio::test(start_paused = true)]
async fn idle_rounds_time_out_and_finish() {
    let state = test_state().await;
    let host_id = Uuid::new_v4();
    let guest_id = Uuid::new_v4();

    let mut host = session::host_session(&state, host_id, create_request(2, 5))
        .await
        .unwrap();
    let mut guest = session::join_session(&state, guest_id, join_request(host.join_code()))
        .await
        .unwrap();

    host.send(session::SessionCommand::StartGame).await;

    for _ in 0..2 {
        let reveal = wait_for(&mut host, |event| {
            matches!(event, SessionEvent::RoundRevealed { .. })
        })
        .await;
        if let SessionEvent::RoundRevealed { reveal } = reveal {
            assert!(!reveal.correct);
            assert_eq!(reveal.points_awarded, 0);
            assert!(reveal.guess.is_empty());
        }
    }

    let finished = wait_for(&mut host, is_game_finished).await;
    if let SessionEvent::GameFinished { scoreboard } = finished {
        assert!(scoreboard.iter().all(|entry| entry.score == 0));
    }
    wait_for(&mut guest, is_game_finished).await;
}

/// The host leaving a waiting room deletes it; the guest's session ends.
#[tokio::test(start_paused = true)]
async fn host_leaving_lobby_closes_the_guest_session() {
    let state = test_state().await;
    let host_id = Uuid::new_v4();
    let guest_id = Uuid::new_v4();

    let host = session::host_session(&state, host_id, create_request(2, 15))
        .await
        .unwrap();
    let mut guest = session::join_session(&state, guest_id, join_request(host.join_code()))
        .await
        .unwrap();

    host.send(session::SessionCommand::Leave).await;

    let ended = wait_for(&mut guest, |event| {
        matches!(event, SessionEvent::SessionEnded { .. })
    })
    .await;
    assert!(matches!(
        ended,
        SessionEvent::SessionEnded {
            reason: EndReason::RoomClosed
        }
    ));
}

/// A vanished host stalls nothing: the lease expires, the guest claims it,
/// and the game still runs to completion.
///
/// Runs in real time because lease expiry is wall-clock arithmetic shared
/// through the document, not a tokio timer.
#[tokio::test]
async fn guest_takes_over_when_the_host_vanishes() {
    let state = AppState::with_reference_collaborators(AppConfig::new(
        TimingConfig {
            poll_interval: Duration::from_millis(500),
            reveal_grace: Duration::from_millis(500),
            lease_ttl: Duration::from_secs(1),
        },
        RoomDefaults {
            question_count: 2,
            timer_seconds: 30,
            max_players: 2,
        },
    ));
    state
        .install_room_store(Arc::new(MemoryRoomStore::new()))
        .await;
    let host_id = Uuid::new_v4();
    let guest_id = Uuid::new_v4();

    let mut host = session::host_session(&state, host_id, create_request(2, 30))
        .await
        .unwrap();
    let mut guest = session::join_session(&state, guest_id, join_request(host.join_code()))
        .await
        .unwrap();
    let room_id = host.room_id();

    host.send(session::SessionCommand::StartGame).await;
    wait_for(&mut guest, is_round_began).await;

    // Host process dies without leaving; its lease runs out.
    host.abort();

    let answer = current_answer(&state, room_id).await;
    guest
        .send(session::SessionCommand::SubmitGuess(answer))
        .await;

    // Second round: answer wrong immediately so the test never waits out a
    // full countdown.
    wait_for(&mut guest, is_round_began).await;
    guest
        .send(session::SessionCommand::SubmitGuess("nobody famous".into()))
        .await;

    let finished = wait_for(&mut guest, is_game_finished).await;
    if let SessionEvent::GameFinished { scoreboard } = finished {
        let guest_entry = scoreboard
            .iter()
            .find(|entry| entry.player_id == guest_id)
            .expect("guest on the scoreboard");
        assert!(guest_entry.score >= 100);
        let host_entry = scoreboard
            .iter()
            .find(|entry| entry.player_id == host_id)
            .expect("host still on the scoreboard");
        assert_eq!(host_entry.score, 0);
    }
}
