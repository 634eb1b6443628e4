use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde_json::{from_value, json};
use tokio::{sync::mpsc, time::sleep};
use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    models::RoomEntity,
    room_store::{Revision, RevisionedRoom, RoomChange, RoomFeed, RoomStore},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        ChangesResponse, CouchRoomDocument, FindResponse, WriteResponse, room_doc_id, seq_to_param,
    },
};

/// Server-side long-poll timeout for the `_changes` feed, kept below common
/// proxy idle limits.
const CHANGES_TIMEOUT_MS: u64 = 55_000;
/// Pause before re-issuing a `_changes` request after a transport failure.
const CHANGES_RETRY_DELAY: Duration = Duration::from_secs(1);
const FEED_BUFFER: usize = 16;

#[derive(Clone)]
pub struct CouchRoomStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchRoomStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        let builder = self.client.request(method, url);
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);
        let mut builder = self.client.get(&url);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
        }

        let response = builder
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let mut builder = self.client.put(&url);
                if let Some((ref user, ref pass)) = self.auth {
                    builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
                }
                let create =
                    builder
                        .send()
                        .await
                        .map_err(|source| CouchDaoError::DatabaseCreate {
                            database: database.clone(),
                            source,
                        })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    /// Write a room document, mapping CouchDB's revision rejection onto the
    /// store-level conflict error.
    async fn put_room(&self, doc: &CouchRoomDocument) -> StorageResult<RevisionedRoom> {
        let response = self
            .request(Method::PUT, &doc.id)
            .json(doc)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc.id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(StorageError::conflict(doc.room.id)),
            StatusCode::NOT_FOUND => Err(StorageError::missing(doc.room.id)),
            status if status.is_success() => {
                let write: WriteResponse =
                    response
                        .json()
                        .await
                        .map_err(|source| CouchDaoError::DecodeResponse {
                            path: doc.id.clone(),
                            source,
                        })?;
                Ok(RevisionedRoom {
                    revision: write.rev,
                    room: doc.room.clone(),
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc.id.clone(),
                status: other,
            }
            .into()),
        }
    }

    async fn get_room(&self, doc_id: &str) -> StorageResult<Option<RevisionedRoom>> {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let doc: CouchRoomDocument =
                    response
                        .json()
                        .await
                        .map_err(|source| CouchDaoError::DecodeResponse {
                            path: doc_id.to_string(),
                            source,
                        })?;
                Ok(Some(doc.into_revisioned()?))
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }
            .into()),
        }
    }

    /// One `_changes` long-poll round for a single document.
    async fn poll_changes(
        &self,
        doc_id: &str,
        since: &str,
    ) -> CouchResult<ChangesResponse> {
        const CHANGES: &str = "_changes";
        let timeout = CHANGES_TIMEOUT_MS.to_string();
        let query = [
            ("feed", "longpoll"),
            ("include_docs", "true"),
            ("filter", "_doc_ids"),
            ("since", since),
            ("timeout", timeout.as_str()),
        ];

        let response = self
            .request(Method::POST, CHANGES)
            .query(&query)
            .json(&json!({ "doc_ids": [doc_id] }))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: CHANGES.to_string(),
                status: response.status(),
            });
        }

        response
            .json()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: CHANGES.to_string(),
                source,
            })
    }
}

impl RoomStore for CouchRoomStore {
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<RevisionedRoom>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchRoomDocument::new(room, None);
            store.put_room(&doc).await
        })
    }

    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RevisionedRoom>>> {
        let store = self.clone();
        Box::pin(async move { store.get_room(&room_doc_id(id)).await })
    }

    fn find_room_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<RevisionedRoom>>> {
        let store = self.clone();
        Box::pin(async move {
            const FIND: &str = "_find";
            let response = store
                .request(Method::POST, FIND)
                .json(&json!({
                    "selector": { "join_code": { "$eq": code } },
                    "limit": 1,
                }))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: FIND.to_string(),
                    source,
                })?;

            if !response.status().is_success() {
                return Err(CouchDaoError::RequestStatus {
                    path: FIND.to_string(),
                    status: response.status(),
                }
                .into());
            }

            let payload: FindResponse =
                response
                    .json()
                    .await
                    .map_err(|source| CouchDaoError::DecodeResponse {
                        path: FIND.to_string(),
                        source,
                    })?;

            let Some(doc) = payload.docs.into_iter().next() else {
                return Ok(None);
            };
            let doc: CouchRoomDocument =
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: FIND.to_string(),
                    source,
                })?;
            Ok(Some(doc.into_revisioned()?))
        })
    }

    fn replace_room(
        &self,
        revision: Revision,
        room: RoomEntity,
    ) -> BoxFuture<'static, StorageResult<RevisionedRoom>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchRoomDocument::new(room, Some(revision));
            store.put_room(&doc).await
        })
    }

    fn delete_room(&self, id: Uuid, revision: Revision) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = room_doc_id(id);
            let response = store
                .request(Method::DELETE, &doc_id)
                .query(&[("rev", revision.as_str())])
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: doc_id.clone(),
                    source,
                })?;

            match response.status() {
                StatusCode::CONFLICT => Err(StorageError::conflict(id)),
                StatusCode::NOT_FOUND => Err(StorageError::missing(id)),
                status if status.is_success() => Ok(()),
                other => Err(CouchDaoError::RequestStatus {
                    path: doc_id,
                    status: other,
                }
                .into()),
            }
        })
    }

    fn watch_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<RoomFeed>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = room_doc_id(id);
            let (tx, rx) = mpsc::channel(FEED_BUFFER);

            let task = tokio::spawn(async move {
                let mut since = String::from("now");
                loop {
                    let payload = match store.poll_changes(&doc_id, &since).await {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(room = %doc_id, error = %err, "room changes poll failed");
                            sleep(CHANGES_RETRY_DELAY).await;
                            continue;
                        }
                    };

                    since = seq_to_param(&payload.last_seq);

                    for row in payload.results {
                        let change = if row.deleted {
                            RoomChange::Deleted
                        } else if let Some(doc) = row.doc {
                            match from_value::<CouchRoomDocument>(doc)
                                .map_err(|source| CouchDaoError::DeserializeValue {
                                    path: doc_id.clone(),
                                    source,
                                })
                                .and_then(CouchRoomDocument::into_revisioned)
                            {
                                Ok(snapshot) => RoomChange::Updated(snapshot),
                                Err(err) => {
                                    warn!(room = %doc_id, error = %err, "skipping malformed change");
                                    continue;
                                }
                            }
                        } else {
                            continue;
                        };

                        if tx.send(change).await.is_err() {
                            return;
                        }
                    }
                }
            });

            Ok(RoomFeed::new(rx, task))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let mut builder = store.client.get(&url);
            if let Some((ref user, ref pass)) = store.auth {
                builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
            }

            let response = builder
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
