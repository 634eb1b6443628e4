pub mod room;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    error::ServiceError,
    services::{
        matcher::{FuzzyNameMatcher, NameMatcher},
        question_bank::{QuestionBank, SampleQuestionBank},
        stats::{StatsSink, TracingStatsSink},
    },
};

pub use self::state_machine::{
    AbortError, ApplyError, Plan, PlanError, PlanId, RoundEvent, RoundPhase, RoundStateMachine,
    Snapshot,
};

/// Cheaply clonable handle to the shared application state.
pub type SharedState = Arc<AppState>;

/// Central application state holding the store handle, degraded flag, and the
/// collaborator seams every session shares.
pub struct AppState {
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    question_bank: Arc<dyn QuestionBank>,
    matcher: Arc<dyn NameMatcher>,
    stats: Arc<dyn StatsSink>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is
    /// installed.
    pub fn new(
        config: AppConfig,
        question_bank: Arc<dyn QuestionBank>,
        matcher: Arc<dyn NameMatcher>,
        stats: Arc<dyn StatsSink>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            room_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            question_bank,
            matcher,
            stats,
        })
    }

    /// State wired with the reference collaborators: the embedded question
    /// bank, the fuzzy matcher, and the logging stats sink.
    pub fn with_reference_collaborators(config: AppConfig) -> SharedState {
        Self::new(
            config,
            Arc::new(SampleQuestionBank),
            Arc::new(FuzzyNameMatcher),
            Arc::new(TracingStatsSink),
        )
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Room store handle, or the degraded-mode error when none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.room_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Question source used at game start.
    pub fn question_bank(&self) -> &Arc<dyn QuestionBank> {
        &self.question_bank
    }

    /// Matcher consulted for every submission.
    pub fn matcher(&self) -> &Arc<dyn NameMatcher> {
        &self.matcher
    }

    /// Statistics sink notified at game finish.
    pub fn stats(&self) -> &Arc<dyn StatsSink> {
        &self.stats
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub(crate) async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        let _ = self.degraded.send(value);
    }
}
