//! In-process room store used by tests and local play.
//!
//! Documents live in a [`DashMap`]; the revision is a per-document sequence
//! number rendered as a string so the trait contract matches the remote
//! backends. Change notifications fan out over a tokio broadcast channel.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::dao::{
    models::RoomEntity,
    room_store::{Revision, RevisionedRoom, RoomChange, RoomFeed, RoomStore},
    storage::{StorageError, StorageResult},
};

const CHANGES_CAPACITY: usize = 32;
const FEED_BUFFER: usize = 16;

#[derive(Debug)]
struct StoredRoom {
    sequence: u64,
    room: RoomEntity,
}

impl StoredRoom {
    fn revisioned(&self) -> RevisionedRoom {
        RevisionedRoom {
            revision: self.sequence.to_string(),
            room: self.room.clone(),
        }
    }
}

/// Shared in-memory implementation of [`RoomStore`].
#[derive(Clone)]
pub struct MemoryRoomStore {
    inner: Arc<Inner>,
}

struct Inner {
    rooms: DashMap<Uuid, StoredRoom>,
    changes: broadcast::Sender<(Uuid, RoomChange)>,
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _receiver) = broadcast::channel(CHANGES_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                rooms: DashMap::new(),
                changes,
            }),
        }
    }

    fn publish(&self, room_id: Uuid, change: RoomChange) {
        let _ = self.inner.changes.send((room_id, change));
    }
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore for MemoryRoomStore {
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<RevisionedRoom>> {
        let store = self.clone();
        Box::pin(async move {
            let room_id = room.id;
            let stored = match store.inner.rooms.entry(room_id) {
                Entry::Occupied(_) => return Err(StorageError::conflict(room_id)),
                Entry::Vacant(slot) => {
                    let stored = StoredRoom { sequence: 1, room };
                    let revisioned = stored.revisioned();
                    slot.insert(stored);
                    revisioned
                }
            };
            store.publish(room_id, RoomChange::Updated(stored.clone()));
            Ok(stored)
        })
    }

    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RevisionedRoom>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.rooms.get(&id).map(|entry| entry.revisioned())) })
    }

    fn find_room_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RevisionedRoom>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .rooms
                .iter()
                .find(|entry| entry.room.join_code == code)
                .map(|entry| entry.revisioned()))
        })
    }

    fn replace_room(
        &self,
        revision: Revision,
        room: RoomEntity,
    ) -> BoxFuture<'static, StorageResult<RevisionedRoom>> {
        let store = self.clone();
        Box::pin(async move {
            let room_id = room.id;
            let replaced = {
                let Some(mut entry) = store.inner.rooms.get_mut(&room_id) else {
                    return Err(StorageError::missing(room_id));
                };
                if entry.sequence.to_string() != revision {
                    return Err(StorageError::conflict(room_id));
                }
                entry.sequence += 1;
                entry.room = room;
                entry.revisioned()
            };
            store.publish(room_id, RoomChange::Updated(replaced.clone()));
            Ok(replaced)
        })
    }

    fn delete_room(&self, id: Uuid, revision: Revision) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let removed = store
                .inner
                .rooms
                .remove_if(&id, |_, stored| stored.sequence.to_string() == revision);
            match removed {
                Some(_) => {
                    store.publish(id, RoomChange::Deleted);
                    Ok(())
                }
                None if store.inner.rooms.contains_key(&id) => Err(StorageError::conflict(id)),
                None => Err(StorageError::missing(id)),
            }
        })
    }

    fn watch_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<RoomFeed>> {
        let store = self.clone();
        Box::pin(async move {
            let mut changes = store.inner.changes.subscribe();
            let (tx, rx) = mpsc::channel(FEED_BUFFER);
            let task = tokio::spawn(async move {
                loop {
                    match changes.recv().await {
                        Ok((room_id, change)) if room_id == id => {
                            if tx.send(change).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => continue,
                        // Skip lagged deliveries; every snapshot is complete.
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            Ok(RoomFeed::new(rx, task))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{GameTypeEntity, LeaseEntity, PlayerEntity, RoomStatusEntity};
    use std::time::{Duration, SystemTime};

    fn sample_room() -> RoomEntity {
        let host_id = Uuid::new_v4();
        let now = SystemTime::now();
        RoomEntity {
            id: Uuid::new_v4(),
            join_code: "BBALL1".into(),
            host_id,
            guest_id: None,
            game_type: GameTypeEntity::PlayerCard,
            question_count: 5,
            timer_seconds: 15,
            max_players: 4,
            status: RoomStatusEntity::Waiting,
            players: vec![PlayerEntity {
                id: host_id,
                name: "host".into(),
                score: 0,
                answers: Vec::new(),
            }],
            questions: Vec::new(),
            current_question: None,
            play_again_votes: Default::default(),
            lease: LeaseEntity {
                holder_id: host_id,
                expires_at: now + Duration::from_secs(10),
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let store = MemoryRoomStore::new();
        let room = sample_room();
        let created = store.create_room(room.clone()).await.unwrap();
        assert_eq!(created.revision, "1");

        let found = store.find_room(room.id).await.unwrap().unwrap();
        assert_eq!(found.room, room);

        let by_code = store
            .find_room_by_code("BBALL1".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_code.room.id, room.id);
    }

    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let store = MemoryRoomStore::new();
        let room = sample_room();
        let created = store.create_room(room.clone()).await.unwrap();

        let mut updated = room.clone();
        updated.max_players = 6;
        let replaced = store
            .replace_room(created.revision.clone(), updated)
            .await
            .unwrap();
        assert_eq!(replaced.revision, "2");

        let err = store
            .replace_room(created.revision, room)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn delete_requires_matching_revision() {
        let store = MemoryRoomStore::new();
        let room = sample_room();
        let created = store.create_room(room.clone()).await.unwrap();

        let err = store
            .delete_room(room.id, "999".into())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        store.delete_room(room.id, created.revision).await.unwrap();
        assert!(store.find_room(room.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn watch_delivers_updates_and_deletion() {
        let store = MemoryRoomStore::new();
        let room = sample_room();
        let created = store.create_room(room.clone()).await.unwrap();

        let mut feed = store.watch_room(room.id).await.unwrap();

        let mut updated = room.clone();
        updated.timer_seconds = 30;
        let replaced = store
            .replace_room(created.revision, updated)
            .await
            .unwrap();

        match feed.next().await.unwrap() {
            RoomChange::Updated(snapshot) => {
                assert_eq!(snapshot.room.timer_seconds, 30);
            }
            other => panic!("expected update, got {other:?}"),
        }

        store
            .delete_room(room.id, replaced.revision)
            .await
            .unwrap();
        assert!(matches!(feed.next().await, Some(RoomChange::Deleted)));
    }

    #[tokio::test]
    async fn watch_ignores_other_rooms() {
        let store = MemoryRoomStore::new();
        let watched = sample_room();
        let mut other = sample_room();
        other.join_code = "BBALL2".into();

        store.create_room(watched.clone()).await.unwrap();
        let other_created = store.create_room(other.clone()).await.unwrap();

        let mut feed = store.watch_room(watched.id).await.unwrap();
        store
            .delete_room(other.id, other_created.revision)
            .await
            .unwrap();

        let outcome =
            tokio::time::timeout(std::time::Duration::from_millis(50), feed.next()).await;
        assert!(outcome.is_err(), "unrelated change must not be delivered");
    }
}
