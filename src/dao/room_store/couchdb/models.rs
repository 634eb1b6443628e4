use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::{
    models::RoomEntity,
    room_store::{RevisionedRoom, couchdb::error::CouchDaoError},
};

pub const ROOM_PREFIX: &str = "room::";

/// Room document as stored in CouchDB, wrapping the shared entity with the
/// `_id`/`_rev` bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub room: RoomEntity,
}

impl CouchRoomDocument {
    pub fn new(room: RoomEntity, rev: Option<String>) -> Self {
        Self {
            id: room_doc_id(room.id),
            rev,
            room,
        }
    }

    pub fn into_revisioned(self) -> Result<RevisionedRoom, CouchDaoError> {
        let rev = self.rev.ok_or(CouchDaoError::InvalidDocId {
            doc_id: self.id,
            kind: "missing revision",
        })?;
        Ok(RevisionedRoom {
            revision: rev,
            room: self.room,
        })
    }
}

/// Response to a document write (`PUT`/`DELETE`), carrying the new revision.
#[derive(Debug, Deserialize)]
pub struct WriteResponse {
    pub rev: String,
}

/// Response body of a Mango `_find` query.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
}

/// Response body of a `_changes` long-poll round.
#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    pub results: Vec<ChangeRow>,
    pub last_seq: Value,
}

/// One row of a `_changes` response.
#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<Value>,
}

pub fn room_doc_id(id: Uuid) -> String {
    format!("{}{}", ROOM_PREFIX, id)
}

/// Render a `_changes` sequence token back into a query parameter. CouchDB 2+
/// uses opaque strings, older servers plain numbers.
pub fn seq_to_param(seq: &Value) -> String {
    match seq {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
