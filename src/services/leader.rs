//! Leader lease maintenance.
//!
//! The room creator holds the opening lease. Every participant heartbeats;
//! the holder renews before expiry and any roster member may claim an expired
//! lease. The compare-and-swap replace guarantees a single winner when
//! several claimants race.

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::resolver::{self, Mutation},
    state::SharedState,
};

/// Outcome of one heartbeat round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    /// The caller holds the lease and it is still fresh; no write issued.
    Held,
    /// The caller holds the lease and extended it.
    Renewed,
    /// The previous lease expired and the caller took it over.
    Claimed,
    /// Someone else holds an unexpired lease.
    Follower,
}

/// Renew or claim the room lease for the given participant.
pub async fn heartbeat(
    state: &SharedState,
    room_id: Uuid,
    player_id: Uuid,
) -> Result<LeaseStatus, ServiceError> {
    let store = state.require_store().await?;
    let ttl = state.config().timing().lease_ttl;

    let (_, status) = resolver::update_room(&store, room_id, move |room| {
        if !room.contains_player(player_id) {
            return Ok(Mutation::Skip(LeaseStatus::Follower));
        }

        let now = SystemTime::now();
        if room.lease.holder_id == player_id {
            let fresh = room
                .lease
                .expires_at
                .duration_since(now)
                .is_ok_and(|remaining| remaining > ttl * 2 / 3);
            if fresh {
                return Ok(Mutation::Skip(LeaseStatus::Held));
            }
            room.grant_lease(player_id, ttl, now);
            return Ok(Mutation::Write(LeaseStatus::Renewed));
        }

        if room.lease_expired(now) {
            room.grant_lease(player_id, ttl, now);
            return Ok(Mutation::Write(LeaseStatus::Claimed));
        }

        Ok(Mutation::Skip(LeaseStatus::Follower))
    })
    .await?;

    if let LeaseStatus::Claimed = status {
        info!(room = %room_id, player = %player_id, "lease claimed from expired holder");
    }
    Ok(status)
}
