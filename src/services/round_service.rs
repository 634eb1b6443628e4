//! Round resolution: answer commits and the shared index advance.

use std::time::SystemTime;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::models::{AnswerEntity, RoomStatusEntity},
    error::ServiceError,
    services::{
        resolver::{self, Mutation},
        scoring::round_points,
    },
    state::SharedState,
};

/// Everything the reveal view needs about one resolved round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResolution {
    /// Round that resolved.
    pub round: usize,
    /// Question the answer was recorded against.
    pub question_id: Uuid,
    /// Name the question expected.
    pub expected_answer: String,
    /// Submitted text; empty on a forced timeout.
    pub guess: String,
    /// Whether the matcher accepted the guess.
    pub correct: bool,
    /// Points the round added.
    pub points_awarded: u32,
    /// Cumulative score after the round.
    pub total_score: u32,
}

/// How an advance request resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The shared index moved to the given round.
    Advanced {
        /// The round now being played.
        round: usize,
    },
    /// The advanced round was the last one; the game is finished.
    Finished,
    /// The index had already moved past the requested round.
    AlreadyMoved,
}

/// Record a participant's answer for the given round and apply its score.
///
/// `guess` of `None` is a forced submission after countdown expiry, scored
/// incorrect with no time remaining. Committing twice for the same question
/// is idempotent: the stored answer wins and its resolution is replayed.
pub async fn commit_answer(
    state: &SharedState,
    room_id: Uuid,
    player_id: Uuid,
    round: usize,
    guess: Option<String>,
    remaining_seconds: u32,
) -> Result<RoundResolution, ServiceError> {
    let store = state.require_store().await?;
    let matcher = state.matcher().clone();

    let (_, resolution) = resolver::update_room(&store, room_id, move |room| {
        if room.status != RoomStatusEntity::Playing {
            return Err(ServiceError::InvalidState("no game in progress".into()));
        }
        if room.current_question != Some(round) {
            return Err(ServiceError::InvalidState(format!(
                "round {round} is no longer being played"
            )));
        }

        let Some(question) = room.question_at(round) else {
            return Err(ServiceError::InvalidState(format!(
                "round {round} has no question"
            )));
        };
        let question_id = question.id;
        let expected_answer = question.answer_name().to_string();
        let timer_seconds = room.timer_seconds;

        let Some(player) = room.player_mut(player_id) else {
            return Err(ServiceError::InvalidState(
                "player is not on the roster".into(),
            ));
        };

        if let Some(existing) = player
            .answers
            .iter()
            .find(|answer| answer.question_id == question_id)
        {
            let remaining = timer_seconds.saturating_sub(existing.time_taken_seconds);
            let resolution = RoundResolution {
                round,
                question_id,
                expected_answer,
                guess: existing.guess.clone(),
                correct: existing.correct,
                points_awarded: round_points(existing.correct, remaining, timer_seconds),
                total_score: player.score,
            };
            return Ok(Mutation::Skip(resolution));
        }

        let submitted = guess.clone().unwrap_or_default();
        let correct = guess
            .as_deref()
            .is_some_and(|text| matcher.matches(text, &expected_answer));
        let remaining = if guess.is_some() { remaining_seconds } else { 0 };
        let points = round_points(correct, remaining, timer_seconds);

        player.score += points;
        let total_score = player.score;
        player.answers.push(AnswerEntity {
            question_id,
            guess: submitted.clone(),
            correct,
            time_taken_seconds: timer_seconds.saturating_sub(remaining),
        });

        Ok(Mutation::Write(RoundResolution {
            round,
            question_id,
            expected_answer,
            guess: submitted,
            correct,
            points_awarded: points,
            total_score,
        }))
    })
    .await?;

    debug!(
        room = %room_id,
        player = %player_id,
        round,
        correct = resolution.correct,
        points = resolution.points_awarded,
        "answer committed"
    );
    Ok(resolution)
}

/// Move the shared question index past `from_round`, or finish the game when
/// it was the last round.
///
/// Single-writer: only the current lease holder commits; every other client
/// observes the moved index. Requests against an index that already moved are
/// no-ops so duplicate triggers (grace timer plus explicit acknowledge) are
/// harmless.
pub async fn advance_round(
    state: &SharedState,
    room_id: Uuid,
    player_id: Uuid,
    from_round: usize,
) -> Result<AdvanceOutcome, ServiceError> {
    let store = state.require_store().await?;

    let (_, outcome) = resolver::update_room(&store, room_id, move |room| {
        match room.status {
            RoomStatusEntity::Finished => return Ok(Mutation::Skip(AdvanceOutcome::AlreadyMoved)),
            RoomStatusEntity::Waiting => {
                return Err(ServiceError::InvalidState("no game in progress".into()));
            }
            RoomStatusEntity::Playing => {}
        }
        if room.current_question != Some(from_round) {
            return Ok(Mutation::Skip(AdvanceOutcome::AlreadyMoved));
        }
        if !room.holds_lease(player_id, SystemTime::now()) {
            return Err(ServiceError::InvalidState(
                "only the leader may advance the game".into(),
            ));
        }

        let next = from_round + 1;
        if next < room.questions.len() {
            room.current_question = Some(next);
            Ok(Mutation::Write(AdvanceOutcome::Advanced { round: next }))
        } else {
            room.status = RoomStatusEntity::Finished;
            room.current_question = None;
            Ok(Mutation::Write(AdvanceOutcome::Finished))
        }
    })
    .await?;

    if let AdvanceOutcome::Finished = outcome {
        info!(room = %room_id, "game finished");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::GameTypeEntity, room_store::memory::MemoryRoomStore},
        dto::requests::{CreateRoomRequest, JoinRoomRequest},
        services::room_service,
        state::{AppState, SharedState},
    };
    use std::sync::Arc;

    struct Fixture {
        state: SharedState,
        room_id: Uuid,
        host_id: Uuid,
        guest_id: Uuid,
    }

    async fn started_game() -> Fixture {
        let state = AppState::with_reference_collaborators(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;

        let host_id = Uuid::new_v4();
        let guest_id = Uuid::new_v4();
        let created = room_service::create_room(
            &state,
            host_id,
            CreateRoomRequest {
                host_name: "host".into(),
                game_type: GameTypeEntity::PlayerCard,
                question_count: Some(2),
                timer_seconds: Some(15),
                max_players: Some(2),
            },
        )
        .await
        .unwrap();

        room_service::join_room(
            &state,
            guest_id,
            JoinRoomRequest {
                code: created.room.join_code.clone(),
                player_name: "guest".into(),
            },
        )
        .await
        .unwrap();
        room_service::start_game(&state, created.room.id, host_id)
            .await
            .unwrap();

        Fixture {
            state,
            room_id: created.room.id,
            host_id,
            guest_id,
        }
    }

    async fn answer_for(fixture: &Fixture, round: usize) -> String {
        let store = fixture.state.require_store().await.unwrap();
        let room = store
            .find_room(fixture.room_id)
            .await
            .unwrap()
            .unwrap()
            .room;
        room.questions[round].answer_name().to_string()
    }

    #[tokio::test]
    async fn correct_answer_scores_base_plus_bonus() {
        let fixture = started_game().await;
        let answer = answer_for(&fixture, 0).await;

        let resolution = commit_answer(
            &fixture.state,
            fixture.room_id,
            fixture.host_id,
            0,
            Some(answer),
            10,
        )
        .await
        .unwrap();

        assert!(resolution.correct);
        assert_eq!(resolution.points_awarded, 133);
        assert_eq!(resolution.total_score, 133);
    }

    #[tokio::test]
    async fn forced_timeout_scores_nothing() {
        let fixture = started_game().await;

        let resolution = commit_answer(
            &fixture.state,
            fixture.room_id,
            fixture.guest_id,
            0,
            None,
            15,
        )
        .await
        .unwrap();

        assert!(!resolution.correct);
        assert_eq!(resolution.points_awarded, 0);
        assert!(resolution.guess.is_empty());
    }

    #[tokio::test]
    async fn double_commit_replays_the_stored_answer() {
        let fixture = started_game().await;
        let answer = answer_for(&fixture, 0).await;

        let first = commit_answer(
            &fixture.state,
            fixture.room_id,
            fixture.host_id,
            0,
            Some(answer),
            10,
        )
        .await
        .unwrap();

        // The racing countdown commit lands second and must not double-score.
        let second = commit_answer(
            &fixture.state,
            fixture.room_id,
            fixture.host_id,
            0,
            None,
            0,
        )
        .await
        .unwrap();

        assert_eq!(second, first);

        let store = fixture.state.require_store().await.unwrap();
        let room = store
            .find_room(fixture.room_id)
            .await
            .unwrap()
            .unwrap()
            .room;
        assert_eq!(room.player(fixture.host_id).unwrap().score, 133);
        assert_eq!(room.player(fixture.host_id).unwrap().answers.len(), 1);
    }

    #[tokio::test]
    async fn leader_advances_and_finishes() {
        let fixture = started_game().await;

        let advanced = advance_round(&fixture.state, fixture.room_id, fixture.host_id, 0)
            .await
            .unwrap();
        assert_eq!(advanced, AdvanceOutcome::Advanced { round: 1 });

        // Duplicate trigger for the already-advanced round.
        let repeat = advance_round(&fixture.state, fixture.room_id, fixture.host_id, 0)
            .await
            .unwrap();
        assert_eq!(repeat, AdvanceOutcome::AlreadyMoved);

        let finished = advance_round(&fixture.state, fixture.room_id, fixture.host_id, 1)
            .await
            .unwrap();
        assert_eq!(finished, AdvanceOutcome::Finished);

        let store = fixture.state.require_store().await.unwrap();
        let room = store
            .find_room(fixture.room_id)
            .await
            .unwrap()
            .unwrap()
            .room;
        assert_eq!(room.status, RoomStatusEntity::Finished);
        assert_eq!(room.current_question, None);
    }

    #[tokio::test]
    async fn non_leader_cannot_advance() {
        let fixture = started_game().await;

        let err = advance_round(&fixture.state, fixture.room_id, fixture.guest_id, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn late_answers_for_past_rounds_are_rejected() {
        let fixture = started_game().await;
        advance_round(&fixture.state, fixture.room_id, fixture.host_id, 0)
            .await
            .unwrap();

        let err = commit_answer(
            &fixture.state,
            fixture.room_id,
            fixture.guest_id,
            0,
            Some("anyone".into()),
            5,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
