//! CouchDB-backed room store.
//!
//! CouchDB's revision model is the native expression of the store contract:
//! `_rev` is the compare-and-swap token and the `_changes` feed supplies the
//! push subscription.

mod config;
mod error;
mod models;
mod store;

pub use config::CouchConfig;
pub use error::{CouchDaoError, CouchResult};
pub use store::CouchRoomStore;
