//! Room lifecycle: create, join, leave, start.

use std::time::SystemTime;

use rand::seq::IndexedRandom;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{PlayerEntity, RoomEntity, RoomStatusEntity},
        room_store::RevisionedRoom,
    },
    dto::{
        requests::{CreateRoomRequest, JoinRoomRequest},
        validation::{JOIN_CODE_ALPHABET, JOIN_CODE_LENGTH},
    },
    error::ServiceError,
    services::resolver::{self, Mutation},
    state::{SharedState, room::RoomOptions},
};

/// Attempts at drawing an unused join code before giving up.
const CODE_ATTEMPTS: usize = 8;

/// How a leave call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The player was removed; the room lives on.
    Departed,
    /// The room was deleted along with the departure.
    RoomDeleted,
}

/// Open a new waiting room hosted by `host_id`.
pub async fn create_room(
    state: &SharedState,
    host_id: Uuid,
    request: CreateRoomRequest,
) -> Result<RevisionedRoom, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;

    let options: RoomOptions = request.room_options(state.config().room_defaults());

    let mut join_code = None;
    for _ in 0..CODE_ATTEMPTS {
        let candidate = generate_join_code();
        if store.find_room_by_code(candidate.clone()).await?.is_none() {
            join_code = Some(candidate);
            break;
        }
    }
    let Some(join_code) = join_code else {
        return Err(ServiceError::Contention);
    };

    let room = RoomEntity::hosted_by(
        PlayerEntity::joining(host_id, request.host_name.clone()),
        join_code,
        options,
        state.config().timing().lease_ttl,
        SystemTime::now(),
    );

    let created = store.create_room(room).await?;
    info!(room = %created.room.id, code = %created.room.join_code, "room created");
    Ok(created)
}

/// Join a waiting room by code.
///
/// Re-joining a room the player already occupies is a successful no-op; the
/// host entering their own code, a full roster, or a started game are
/// rejections that leave the caller in the pre-join view.
pub async fn join_room(
    state: &SharedState,
    player_id: Uuid,
    request: JoinRoomRequest,
) -> Result<RevisionedRoom, ServiceError> {
    let request = request.normalized();
    request.validate()?;
    let store = state.require_store().await?;

    let Some(found) = store.find_room_by_code(request.code.clone()).await? else {
        return Err(ServiceError::RoomNotFound(request.code));
    };
    let room_id = found.room.id;

    let (joined, _) = resolver::update_room(&store, room_id, |room| {
        if room.host_id == player_id {
            return Err(ServiceError::SelfJoin);
        }
        if room.contains_player(player_id) {
            return Ok(Mutation::Skip(()));
        }
        if room.status != RoomStatusEntity::Waiting {
            return Err(ServiceError::AlreadyStarted);
        }
        if room.is_full() {
            return Err(ServiceError::RoomFull {
                capacity: room.max_players,
            });
        }
        room.seat_player(PlayerEntity::joining(player_id, request.player_name.clone()));
        Ok(Mutation::Write(()))
    })
    .await?;

    Ok(joined)
}

/// Remove a player from a room.
///
/// The host leaving while the room is still waiting deletes the room; other
/// watchers observe the deletion through their feeds. A departing lease
/// holder expires the lease immediately so a successor can claim it without
/// waiting out the TTL.
pub async fn leave_room(
    state: &SharedState,
    room_id: Uuid,
    player_id: Uuid,
) -> Result<LeaveOutcome, ServiceError> {
    let store = state.require_store().await?;

    let Some(current) = store.find_room(room_id).await? else {
        return Ok(LeaveOutcome::RoomDeleted);
    };

    if current.room.host_id == player_id && current.room.status == RoomStatusEntity::Waiting {
        resolver::delete_room(&store, room_id).await?;
        info!(room = %room_id, "room deleted by departing host");
        return Ok(LeaveOutcome::RoomDeleted);
    }

    let (remaining, _) = resolver::update_room(&store, room_id, |room| {
        if !room.contains_player(player_id) {
            return Ok(Mutation::Skip(()));
        }
        room.unseat_player(player_id);
        if room.lease.holder_id == player_id {
            room.lease.expires_at = SystemTime::now();
        }
        Ok(Mutation::Write(()))
    })
    .await?;

    if remaining.room.players.is_empty() {
        if let Err(err) = resolver::delete_room(&store, room_id).await {
            warn!(room = %room_id, error = %err, "failed to delete emptied room");
        }
        return Ok(LeaveOutcome::RoomDeleted);
    }

    Ok(LeaveOutcome::Departed)
}

/// Start the game: draw questions once and flip the room into playing.
///
/// Single-writer: only the current lease holder may start. A concurrent
/// duplicate start resolves as a no-op once the room is observed playing.
pub async fn start_game(
    state: &SharedState,
    room_id: Uuid,
    player_id: Uuid,
) -> Result<RevisionedRoom, ServiceError> {
    let store = state.require_store().await?;

    let Some(current) = store.find_room(room_id).await? else {
        return Err(ServiceError::RoomNotFound(room_id.to_string()));
    };
    if current.room.status == RoomStatusEntity::Playing {
        return Ok(current);
    }

    let questions = state
        .question_bank()
        .draw(current.room.game_type, current.room.question_count)
        .await?;

    let (started, _) = resolver::update_room(&store, room_id, |room| {
        match room.status {
            RoomStatusEntity::Playing => return Ok(Mutation::Skip(())),
            RoomStatusEntity::Finished => {
                return Err(ServiceError::InvalidState(
                    "finished rooms restart through the play-again vote".into(),
                ));
            }
            RoomStatusEntity::Waiting => {}
        }
        if !room.holds_lease(player_id, SystemTime::now()) {
            return Err(ServiceError::InvalidState(
                "only the leader may start the game".into(),
            ));
        }
        room.begin_game(questions.clone());
        Ok(Mutation::Write(()))
    })
    .await?;

    info!(room = %room_id, questions = started.room.questions.len(), "game started");
    Ok(started)
}

fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LENGTH)
        .map(|_| {
            let byte = JOIN_CODE_ALPHABET
                .choose(&mut rng)
                .copied()
                .unwrap_or(b'A');
            char::from(byte)
        })
        .collect()
}
