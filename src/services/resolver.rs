//! Fetch → compute → compare-and-swap discipline for room mutations.
//!
//! Every write to a room document goes through [`update_room`]: the current
//! snapshot is fetched, the mutation closure recomputes the successor
//! document against it, and the replace is guarded by the fetched revision.
//! Losing the race refetches and recomputes, so checks such as the roster cap
//! re-run against the state that will actually be replaced.

use std::{sync::Arc, time::SystemTime};

use tokio::task::yield_now;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::RoomEntity,
        room_store::{RevisionedRoom, RoomStore},
        storage::StorageError,
    },
    error::ServiceError,
};

/// CAS attempts before the mutation is abandoned as contended. Staleness
/// self-heals on the next poll or push delivery, so giving up is safe.
const MAX_CAS_ATTEMPTS: usize = 5;

/// What a mutation closure decided to do with the fetched document.
pub enum Mutation<T> {
    /// Replace the document and yield the value.
    Write(T),
    /// The mutation was already applied (or is a no-op); yield without writing.
    Skip(T),
}

/// Apply a mutation to a room document under the CAS discipline.
///
/// The closure may be invoked several times, once per attempt, and must be
/// side-effect free apart from editing the borrowed document. Errors from the
/// closure abort the operation immediately (capacity rejections and state
/// guards are re-validated on every attempt).
pub async fn update_room<T, F>(
    store: &Arc<dyn RoomStore>,
    room_id: Uuid,
    mut mutate: F,
) -> Result<(RevisionedRoom, T), ServiceError>
where
    F: FnMut(&mut RoomEntity) -> Result<Mutation<T>, ServiceError>,
{
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let Some(current) = store.find_room(room_id).await? else {
            return Err(ServiceError::RoomNotFound(room_id.to_string()));
        };

        let mut room = current.room.clone();
        match mutate(&mut room)? {
            Mutation::Skip(value) => return Ok((current, value)),
            Mutation::Write(value) => {
                room.touch(SystemTime::now());
                match store.replace_room(current.revision, room).await {
                    Ok(replaced) => return Ok((replaced, value)),
                    Err(StorageError::Conflict { .. }) => {
                        debug!(room = %room_id, attempt, "room write lost the revision race; retrying");
                        yield_now().await;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    warn!(room = %room_id, attempts = MAX_CAS_ATTEMPTS, "room update abandoned under contention");
    Err(ServiceError::Contention)
}

/// Delete a room under the same CAS discipline, refetching on conflict.
pub async fn delete_room(store: &Arc<dyn RoomStore>, room_id: Uuid) -> Result<(), ServiceError> {
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let Some(current) = store.find_room(room_id).await? else {
            // Someone else already deleted it; the intended end state holds.
            return Ok(());
        };

        match store.delete_room(room_id, current.revision).await {
            Ok(()) => return Ok(()),
            Err(StorageError::Conflict { .. }) => {
                debug!(room = %room_id, attempt, "room delete lost the revision race; retrying");
                yield_now().await;
            }
            Err(StorageError::Missing { .. }) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }

    warn!(room = %room_id, attempts = MAX_CAS_ATTEMPTS, "room delete abandoned under contention");
    Err(ServiceError::Contention)
}
