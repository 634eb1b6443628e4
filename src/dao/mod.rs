/// Database model definitions.
pub mod models;
/// Room document storage and change-feed operations.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
