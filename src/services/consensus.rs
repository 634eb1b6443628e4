//! End-of-game play-again consensus: vote union and the single-writer reset.

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::RoomStatusEntity,
    error::ServiceError,
    services::resolver::{self, Mutation},
    state::SharedState,
};

/// Vote progress after a cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    /// Votes recorded so far.
    pub votes: usize,
    /// Roster size the votes are measured against.
    pub roster: usize,
    /// Whether every roster member has voted.
    pub complete: bool,
}

/// How a reset request resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The room returned to the waiting lobby.
    Reset,
    /// Not every roster member has voted yet; nothing changed.
    VotesOutstanding,
    /// The room was no longer finished; a concurrent reset already ran.
    AlreadyReset,
}

/// Record a play-again vote for the given player.
///
/// The vote set is idempotent under union: casting twice leaves the tally
/// unchanged.
pub async fn cast_vote(
    state: &SharedState,
    room_id: Uuid,
    player_id: Uuid,
) -> Result<VoteTally, ServiceError> {
    let store = state.require_store().await?;

    let (_, tally) = resolver::update_room(&store, room_id, move |room| {
        if room.status != RoomStatusEntity::Finished {
            return Err(ServiceError::InvalidState(
                "play-again votes only count after the game finishes".into(),
            ));
        }
        if !room.contains_player(player_id) {
            return Err(ServiceError::InvalidState(
                "player is not on the roster".into(),
            ));
        }

        let inserted = room.record_vote(player_id);
        let tally = VoteTally {
            votes: room.play_again_votes.len(),
            roster: room.players.len(),
            complete: room.votes_complete(),
        };
        if inserted {
            Ok(Mutation::Write(tally))
        } else {
            Ok(Mutation::Skip(tally))
        }
    })
    .await?;

    Ok(tally)
}

/// Reset a finished room back to the waiting lobby once the vote is
/// unanimous.
///
/// Single-writer: only the lease holder commits. The vote count is
/// re-validated against the fetched document inside every CAS attempt, and
/// the revision guard makes a double reset impossible.
pub async fn reset_room(
    state: &SharedState,
    room_id: Uuid,
    player_id: Uuid,
) -> Result<ResetOutcome, ServiceError> {
    let store = state.require_store().await?;

    let (_, outcome) = resolver::update_room(&store, room_id, move |room| {
        if room.status != RoomStatusEntity::Finished {
            return Ok(Mutation::Skip(ResetOutcome::AlreadyReset));
        }
        if !room.votes_complete() {
            return Ok(Mutation::Skip(ResetOutcome::VotesOutstanding));
        }
        if !room.holds_lease(player_id, SystemTime::now()) {
            return Err(ServiceError::InvalidState(
                "only the leader may reset the room".into(),
            ));
        }

        room.reset_for_replay();
        Ok(Mutation::Write(ResetOutcome::Reset))
    })
    .await?;

    if let ResetOutcome::Reset = outcome {
        info!(room = %room_id, "room reset for another game");
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
        services::{room_service, round_service},
        state::{AppState, SharedState},
    };
    use std::sync::Arc;

    struct Fixture {
        state: SharedState,
        room_id: Uuid,
        host_id: Uuid,
        guest_id: Uuid,
    }

    async fn finished_game() -> Fixture {
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
                game_type: GameTypeEntity::CareerPath,
                question_count: Some(1),
                timer_seconds: Some(15),
                max_players: Some(2),
            },
        )
        .await
        .unwrap();
        let room_id = created.room.id;

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
        room_service::start_game(&state, room_id, host_id).await.unwrap();

        round_service::commit_answer(&state, room_id, host_id, 0, Some("nobody".into()), 5)
            .await
            .unwrap();
        round_service::commit_answer(&state, room_id, guest_id, 0, None, 0)
            .await
            .unwrap();
        round_service::advance_round(&state, room_id, host_id, 0)
            .await
            .unwrap();

        Fixture {
            state,
            room_id,
            host_id,
            guest_id,
        }
    }

    #[tokio::test]
    async fn double_votes_leave_the_tally_unchanged() {
        let fixture = finished_game().await;

        let first = cast_vote(&fixture.state, fixture.room_id, fixture.host_id)
            .await
            .unwrap();
        assert_eq!(first.votes, 1);
        assert!(!first.complete);

        let second = cast_vote(&fixture.state, fixture.room_id, fixture.host_id)
            .await
            .unwrap();
        assert_eq!(second.votes, 1);
    }

    #[tokio::test]
    async fn unanimous_votes_complete_the_tally() {
        let fixture = finished_game().await;

        cast_vote(&fixture.state, fixture.room_id, fixture.host_id)
            .await
            .unwrap();
        let tally = cast_vote(&fixture.state, fixture.room_id, fixture.guest_id)
            .await
            .unwrap();

        assert_eq!(tally.votes, 2);
        assert!(tally.complete);
    }

    #[tokio::test]
    async fn reset_waits_for_every_vote() {
        let fixture = finished_game().await;
        cast_vote(&fixture.state, fixture.room_id, fixture.host_id)
            .await
            .unwrap();

        let outcome = reset_room(&fixture.state, fixture.room_id, fixture.host_id)
            .await
            .unwrap();
        assert_eq!(outcome, ResetOutcome::VotesOutstanding);
    }

    #[tokio::test]
    async fn unanimous_reset_clears_the_game() {
        let fixture = finished_game().await;
        cast_vote(&fixture.state, fixture.room_id, fixture.host_id)
            .await
            .unwrap();
        cast_vote(&fixture.state, fixture.room_id, fixture.guest_id)
            .await
            .unwrap();

        let outcome = reset_room(&fixture.state, fixture.room_id, fixture.host_id)
            .await
            .unwrap();
        assert_eq!(outcome, ResetOutcome::Reset);

        let store = fixture.state.require_store().await.unwrap();
        let room = store
            .find_room(fixture.room_id)
            .await
            .unwrap()
            .unwrap()
            .room;
        assert_eq!(room.status, RoomStatusEntity::Waiting);
        assert!(room.questions.is_empty());
        assert!(room.play_again_votes.is_empty());
        assert!(room.players.iter().all(|player| player.score == 0));
        assert!(room.players.iter().all(|player| player.answers.is_empty()));

        // A duplicate trigger observes the already-reset room.
        let repeat = reset_room(&fixture.state, fixture.room_id, fixture.host_id)
            .await
            .unwrap();
        assert_eq!(repeat, ResetOutcome::AlreadyReset);
    }

    #[tokio::test]
    async fn votes_before_the_game_ends_are_rejected() {
        let state = AppState::with_reference_collaborators(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        let host_id = Uuid::new_v4();
        let created = room_service::create_room(
            &state,
            host_id,
            CreateRoomRequest {
                host_name: "host".into(),
                game_type: GameTypeEntity::PlayerCard,
                question_count: Some(1),
                timer_seconds: Some(15),
                max_players: Some(2),
            },
        )
        .await
        .unwrap();

        let err = cast_vote(&state, created.room.id, host_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn non_leader_cannot_reset() {
        let fixture = finished_game().await;
        cast_vote(&fixture.state, fixture.room_id, fixture.host_id)
            .await
            .unwrap();
        cast_vote(&fixture.state, fixture.room_id, fixture.guest_id)
            .await
            .unwrap();

        let err = reset_room(&fixture.state, fixture.room_id, fixture.guest_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
