#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use futures::future::BoxFuture;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::dao::{models::RoomEntity, storage::StorageResult};

/// Opaque per-document revision used to guard replaces.
///
/// Backends choose their own encoding (CouchDB `_rev` strings, a counter for
/// the in-memory store); callers only pass it back verbatim.
pub type Revision = String;

/// A room document together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionedRoom {
    /// Revision to present when replacing this document.
    pub revision: Revision,
    /// The document itself.
    pub room: RoomEntity,
}

/// One delivery on a room change feed.
#[derive(Debug, Clone)]
pub enum RoomChange {
    /// The document was replaced; carries the full new snapshot.
    Updated(RevisionedRoom),
    /// The document was deleted.
    Deleted,
}

/// Push subscription to a single room's mutations.
///
/// Delivery is best-effort: a slow consumer may observe gaps, but every
/// delivered snapshot is complete, so skipping intermediate states is
/// harmless. Dropping the feed cancels the backing forwarder task.
pub struct RoomFeed {
    receiver: mpsc::Receiver<RoomChange>,
    _guard: WatchGuard,
}

impl RoomFeed {
    pub(crate) fn new(receiver: mpsc::Receiver<RoomChange>, task: JoinHandle<()>) -> Self {
        Self {
            receiver,
            _guard: WatchGuard(task),
        }
    }

    /// Wait for the next change; `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<RoomChange> {
        self.receiver.recv().await
    }
}

struct WatchGuard(JoinHandle<()>);

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Abstraction over the persistence layer for room documents.
///
/// Mutations are whole-document compare-and-swap replacements: callers fetch
/// a [`RevisionedRoom`], compute the successor document, and replace it under
/// the fetched revision. A stale revision yields
/// [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict).
pub trait RoomStore: Send + Sync {
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<RevisionedRoom>>;
    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RevisionedRoom>>>;
    fn find_room_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RevisionedRoom>>>;
    fn replace_room(
        &self,
        revision: Revision,
        room: RoomEntity,
    ) -> BoxFuture<'static, StorageResult<RevisionedRoom>>;
    fn delete_room(&self, id: Uuid, revision: Revision) -> BoxFuture<'static, StorageResult<()>>;
    fn watch_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<RoomFeed>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
