/// End-of-game play-again consensus.
pub mod consensus;
/// Leader lease maintenance.
pub mod leader;
/// Name matching for submitted guesses.
pub mod matcher;
/// Question sourcing for new games.
pub mod question_bank;
/// Compare-and-swap update discipline for room documents.
pub mod resolver;
/// Room lifecycle operations.
pub mod room_service;
/// Round resolution and the shared index advance.
pub mod round_service;
/// Scoring for resolved rounds.
pub mod scoring;
/// Per-participant session controllers.
pub mod session;
/// Per-player statistics hand-off.
pub mod stats;
/// Storage backend supervision and degraded mode.
pub mod store_supervisor;
