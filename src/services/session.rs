//! Per-participant session controller.
//!
//! One controller task runs for every seated participant. It subscribes to
//! the room's change feed, keeps a fixed-interval poll as the fallback
//! channel, and replaces its whole local view with every delivered snapshot
//! (last-writer-wins, no partial merges). The round state machine is driven
//! off the reconciled view, so repeated delivery of the same state is
//! harmless by construction.

use std::{
    ops::ControlFlow,
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{
    select,
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{RoomEntity, RoomStatusEntity},
        room_store::{RevisionedRoom, RoomChange, RoomFeed, RoomStore},
    },
    dto::{
        events::{EndReason, SessionEvent},
        requests::{CreateRoomRequest, JoinRoomRequest},
        snapshot::{RevealView, scoreboard},
    },
    error::ServiceError,
    services::{consensus, leader, room_service, round_service, stats::GameResult},
    state::{RoundEvent, RoundPhase, RoundStateMachine, SharedState},
};

const COMMAND_BUFFER: usize = 16;
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Instructions the embedding view layer can send into a running session.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Start the game (leader only; everyone else is ignored with a log).
    StartGame,
    /// Submit a guess for the current round; blank text is ignored.
    SubmitGuess(String),
    /// Acknowledge the reveal and ask for the next round.
    Advance,
    /// Cast the play-again vote.
    VotePlayAgain,
    /// Leave the room and end the session.
    Leave,
}

/// Handle to a running session: commands in, events out.
///
/// Dropping the handle (or calling [`SessionHandle::abort`]) tears the
/// controller down, cancelling its countdown and its change-feed
/// subscription; in-flight writes are not cancelled, only superseded.
pub struct SessionHandle {
    room_id: Uuid,
    join_code: String,
    commands: mpsc::Sender<SessionCommand>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Room this session is seated in.
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Code other participants can join with.
    pub fn join_code(&self) -> &str {
        &self.join_code
    }

    /// Send a command to the controller; `false` once it has shut down.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Wait for the next session event; `None` once the controller is gone.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Tear the controller down without leaving the room.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait until the controller task has fully stopped.
    pub async fn finished(self) {
        let _ = self.task.await;
    }
}

/// Create a room and run a hosting session for it.
pub async fn host_session(
    state: &SharedState,
    host_id: Uuid,
    request: CreateRoomRequest,
) -> Result<SessionHandle, ServiceError> {
    let created = room_service::create_room(state, host_id, request).await?;
    spawn_controller(state.clone(), host_id, created).await
}

/// Join a room by code and run a session for the new seat.
pub async fn join_session(
    state: &SharedState,
    player_id: Uuid,
    request: JoinRoomRequest,
) -> Result<SessionHandle, ServiceError> {
    let joined = room_service::join_room(state, player_id, request).await?;
    spawn_controller(state.clone(), player_id, joined).await
}

async fn spawn_controller(
    state: SharedState,
    player_id: Uuid,
    initial: RevisionedRoom,
) -> Result<SessionHandle, ServiceError> {
    let store = state.require_store().await?;
    let room_id = initial.room.id;
    let join_code = initial.room.join_code.clone();
    let feed = store.watch_room(room_id).await?;

    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let controller = ControllerTask {
        state,
        store,
        player_id,
        room_id,
        view: initial,
        machine: RoundStateMachine::new(),
        countdown: None,
        grace_from: None,
        stats_recorded: false,
        last_lease_attempt: None,
        events: event_tx,
    };
    let task = tokio::spawn(controller.run(feed, command_rx));

    Ok(SessionHandle {
        room_id,
        join_code,
        commands: command_tx,
        events: event_rx,
        task,
    })
}

struct Countdown {
    round: usize,
    remaining: u32,
}

struct ControllerTask {
    state: SharedState,
    store: Arc<dyn RoomStore>,
    player_id: Uuid,
    room_id: Uuid,
    view: RevisionedRoom,
    machine: RoundStateMachine,
    countdown: Option<Countdown>,
    grace_from: Option<Instant>,
    stats_recorded: bool,
    last_lease_attempt: Option<Instant>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ControllerTask {
    async fn run(mut self, mut feed: RoomFeed, mut commands: mpsc::Receiver<SessionCommand>) {
        let timing = self.state.config().timing();
        let mut poll = interval(timing.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticker = interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.emit(SessionEvent::RoomUpdated {
            snapshot: (&self.view.room).into(),
        });
        let initial_status = self.view.room.status;
        self.reconcile(initial_status).await;

        loop {
            let flow = select! {
                change = feed.next() => self.on_change(change).await,
                _ = poll.tick() => self.on_poll().await,
                _ = ticker.tick() => self.on_tick().await,
                command = commands.recv() => self.on_command(command).await,
            };
            if flow.is_break() {
                break;
            }
        }

        debug!(room = %self.room_id, player = %self.player_id, "session controller stopped");
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn on_change(&mut self, change: Option<RoomChange>) -> ControlFlow<()> {
        match change {
            Some(RoomChange::Updated(snapshot)) => self.apply_snapshot(snapshot).await,
            Some(RoomChange::Deleted) => {
                info!(room = %self.room_id, "room deleted; ending session");
                self.emit(SessionEvent::SessionEnded {
                    reason: EndReason::RoomClosed,
                });
                ControlFlow::Break(())
            }
            None => {
                // Push feed died; the poll loop keeps the session alive.
                warn!(room = %self.room_id, "change feed closed; relying on polling");
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_poll(&mut self) -> ControlFlow<()> {
        match self.store.find_room(self.room_id).await {
            Ok(Some(current)) => {
                if current.revision != self.view.revision {
                    self.apply_snapshot(current).await
                } else {
                    ControlFlow::Continue(())
                }
            }
            Ok(None) => {
                info!(room = %self.room_id, "room no longer exists; ending session");
                self.emit(SessionEvent::SessionEnded {
                    reason: EndReason::RoomClosed,
                });
                ControlFlow::Break(())
            }
            Err(err) => {
                warn!(room = %self.room_id, error = %err, "poll fetch failed; keeping prior view");
                ControlFlow::Continue(())
            }
        }
    }

    /// Replace the whole local view with a delivered snapshot and derive the
    /// dependent transitions. Re-delivery of an already-seen revision is a
    /// no-op.
    async fn apply_snapshot(&mut self, snapshot: RevisionedRoom) -> ControlFlow<()> {
        if snapshot.revision == self.view.revision {
            return ControlFlow::Continue(());
        }

        let changed = volatile_fields_changed(&self.view.room, &snapshot.room);
        let old_status = self.view.room.status;
        self.view = snapshot;

        if changed {
            self.emit(SessionEvent::RoomUpdated {
                snapshot: (&self.view.room).into(),
            });
        }

        self.reconcile(old_status).await;
        ControlFlow::Continue(())
    }

    /// Drive the local machine toward the authoritative view. Transitions are
    /// idempotent: reconciling the same status twice applies nothing new.
    async fn reconcile(&mut self, old_status: RoomStatusEntity) {
        match self.view.room.status {
            RoomStatusEntity::Waiting => {
                if matches!(self.machine.phase(), RoundPhase::Finished) {
                    self.machine_apply(RoundEvent::SessionReset);
                    self.stats_recorded = false;
                    self.emit(SessionEvent::ReturnedToLobby);
                } else if !matches!(self.machine.phase(), RoundPhase::Idle) {
                    // Mid-game state observed against a waiting room means the
                    // replica is irrecoverably stale; resynchronize from idle.
                    debug!(room = %self.room_id, "resynchronizing machine against waiting room");
                    self.machine = RoundStateMachine::new();
                    self.countdown = None;
                    self.grace_from = None;
                    self.stats_recorded = false;
                    if old_status == RoomStatusEntity::Finished {
                        self.emit(SessionEvent::ReturnedToLobby);
                    }
                }
            }
            RoomStatusEntity::Playing => {
                let Some(current) = self.view.room.current_question else {
                    return;
                };
                match self.machine.phase() {
                    RoundPhase::Idle => {
                        if self.machine_apply(RoundEvent::GameStarted {
                            round: current,
                            total_rounds: self.view.room.question_count,
                        }) {
                            self.start_round(current);
                        }
                    }
                    RoundPhase::Answering { round } | RoundPhase::Revealed { round }
                        if current > round =>
                    {
                        if self.machine_apply(RoundEvent::RoundAdvanced { round: current }) {
                            self.start_round(current);
                        }
                    }
                    // The reset that preceded this game was never observed
                    // (dropped feed plus a slow poll); start over from idle.
                    RoundPhase::Finished => {
                        self.machine = RoundStateMachine::new();
                        self.stats_recorded = false;
                        self.emit(SessionEvent::ReturnedToLobby);
                        if self.machine_apply(RoundEvent::GameStarted {
                            round: current,
                            total_rounds: self.view.room.question_count,
                        }) {
                            self.start_round(current);
                        }
                    }
                    _ => {}
                }
            }
            RoomStatusEntity::Finished => {
                self.countdown = None;
                self.grace_from = None;

                // A replica still answering when the game finished resolves
                // its round locally; the game is over, so nothing is written.
                if matches!(self.machine.phase(), RoundPhase::Answering { .. }) {
                    self.machine_apply(RoundEvent::CountdownExpired);
                }
                if matches!(self.machine.phase(), RoundPhase::Revealed { .. }) {
                    self.machine_apply(RoundEvent::GameCompleted);
                }

                if !self.stats_recorded {
                    self.stats_recorded = true;
                    if let Some(player) = self.view.room.player(self.player_id) {
                        let result = GameResult::for_player(player);
                        self.state.stats().record_result(result).await;
                    }
                    self.emit(SessionEvent::GameFinished {
                        scoreboard: scoreboard(&self.view.room),
                    });
                }

                self.maybe_reset().await;
            }
        }
    }

    /// Apply a machine event immediately, logging and skipping events the
    /// current phase cannot accept (double deliveries land here).
    fn machine_apply(&mut self, event: RoundEvent) -> bool {
        let plan = match self.machine.plan(event) {
            Ok(plan) => plan,
            Err(err) => {
                debug!(room = %self.room_id, error = ?err, "skipping inapplicable round event");
                return false;
            }
        };
        match self.machine.apply(plan.id) {
            Ok(_) => true,
            Err(err) => {
                debug!(room = %self.room_id, error = ?err, "failed to apply round event");
                false
            }
        }
    }

    fn start_round(&mut self, round: usize) {
        self.grace_from = None;
        let Some(question) = self.view.room.question_at(round) else {
            warn!(room = %self.room_id, round, "playing room has no question at index");
            return;
        };
        self.countdown = Some(Countdown {
            round,
            remaining: self.view.room.timer_seconds,
        });
        self.emit(SessionEvent::RoundBegan {
            round,
            prompt: question.into(),
            timer_seconds: self.view.room.timer_seconds,
        });
    }

    async fn on_tick(&mut self) -> ControlFlow<()> {
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.remaining = countdown.remaining.saturating_sub(1);
            let (round, remaining) = (countdown.round, countdown.remaining);
            self.emit(SessionEvent::CountdownTick {
                round,
                remaining_seconds: remaining,
            });
            if remaining == 0 {
                // One forced attempt only; if the write fails the next
                // reconciled snapshot moves the session along instead.
                self.countdown = None;
                self.resolve_round(None).await;
            }
        }

        if let Some(since) = self.grace_from {
            if since.elapsed() >= self.state.config().timing().reveal_grace {
                self.try_advance().await;
            }
        }

        self.maybe_heartbeat().await;
        ControlFlow::Continue(())
    }

    async fn on_command(&mut self, command: Option<SessionCommand>) -> ControlFlow<()> {
        let Some(command) = command else {
            // The embedding view dropped the handle; stop without a leave
            // write and let the lease expire naturally.
            debug!(room = %self.room_id, "session handle dropped; stopping controller");
            return ControlFlow::Break(());
        };

        match command {
            SessionCommand::StartGame => {
                if let Err(err) =
                    room_service::start_game(&self.state, self.room_id, self.player_id).await
                {
                    warn!(room = %self.room_id, error = %err, "start request failed");
                }
                ControlFlow::Continue(())
            }
            SessionCommand::SubmitGuess(text) => {
                if text.trim().is_empty() {
                    debug!(room = %self.room_id, "ignoring empty guess");
                } else {
                    self.resolve_round(Some(text)).await;
                }
                ControlFlow::Continue(())
            }
            SessionCommand::Advance => {
                self.try_advance().await;
                ControlFlow::Continue(())
            }
            SessionCommand::VotePlayAgain => {
                match consensus::cast_vote(&self.state, self.room_id, self.player_id).await {
                    Ok(tally) if tally.complete => self.maybe_reset().await,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(room = %self.room_id, error = %err, "vote failed");
                    }
                }
                ControlFlow::Continue(())
            }
            SessionCommand::Leave => {
                if let Err(err) =
                    room_service::leave_room(&self.state, self.room_id, self.player_id).await
                {
                    warn!(room = %self.room_id, error = %err, "leave write failed");
                }
                self.emit(SessionEvent::SessionEnded {
                    reason: EndReason::Left,
                });
                ControlFlow::Break(())
            }
        }
    }

    /// Resolve the current round with a manual guess or a forced timeout.
    ///
    /// The machine phase is the guard: whichever of the two racing paths
    /// plans first wins, and the loser's event is rejected as an invalid
    /// transition. The store write happens between plan and apply so a failed
    /// write degrades to "retain prior view".
    async fn resolve_round(&mut self, guess: Option<String>) {
        let RoundPhase::Answering { round } = self.machine.phase() else {
            debug!(room = %self.room_id, "no round awaiting an answer");
            return;
        };
        let remaining = self
            .countdown
            .as_ref()
            .map(|countdown| countdown.remaining)
            .unwrap_or(0);

        let event = if guess.is_some() {
            RoundEvent::GuessSubmitted
        } else {
            RoundEvent::CountdownExpired
        };
        let plan = match self.machine.plan(event) {
            Ok(plan) => plan,
            Err(err) => {
                debug!(room = %self.room_id, error = ?err, "round already resolved");
                return;
            }
        };

        match round_service::commit_answer(
            &self.state,
            self.room_id,
            self.player_id,
            round,
            guess,
            remaining,
        )
        .await
        {
            Ok(resolution) => {
                if let Err(err) = self.machine.apply(plan.id) {
                    debug!(room = %self.room_id, error = ?err, "could not apply resolved round");
                    return;
                }
                self.countdown = None;
                self.grace_from = Some(Instant::now());
                self.emit(SessionEvent::RoundRevealed {
                    reveal: RevealView {
                        round,
                        expected_answer: resolution.expected_answer,
                        guess: resolution.guess,
                        correct: resolution.correct,
                        points_awarded: resolution.points_awarded,
                        total_score: resolution.total_score,
                    },
                });
            }
            Err(err) => {
                warn!(room = %self.room_id, error = %err, "failed to commit answer; keeping prior view");
                if let Err(abort_err) = self.machine.abort(plan.id) {
                    debug!(room = %self.room_id, error = ?abort_err, "failed to abort round plan");
                }
            }
        }
    }

    /// Ask for the next round. Only the lease holder commits the shared
    /// index; everyone else waits to observe it move.
    async fn try_advance(&mut self) {
        let RoundPhase::Revealed { round } = self.machine.phase() else {
            self.grace_from = None;
            return;
        };

        if !self
            .view
            .room
            .holds_lease(self.player_id, SystemTime::now())
        {
            debug!(room = %self.room_id, "awaiting the leader to advance");
            return;
        }

        match round_service::advance_round(&self.state, self.room_id, self.player_id, round).await
        {
            // The moved index comes back through the feed or the next poll.
            Ok(_) => {}
            Err(err) => {
                debug!(room = %self.room_id, error = %err, "advance attempt failed");
            }
        }
    }

    /// Commit the unanimous-vote reset when this replica leads.
    async fn maybe_reset(&mut self) {
        let now = SystemTime::now();
        if !self.view.room.votes_complete() || !self.view.room.holds_lease(self.player_id, now) {
            return;
        }
        if let Err(err) = consensus::reset_room(&self.state, self.room_id, self.player_id).await {
            warn!(room = %self.room_id, error = %err, "reset attempt failed");
        }
    }

    /// Renew or claim the leader lease, throttled to a third of the TTL.
    async fn maybe_heartbeat(&mut self) {
        let ttl = self.state.config().timing().lease_ttl;
        let due = self
            .last_lease_attempt
            .is_none_or(|last| last.elapsed() >= ttl / 3);
        if !due {
            return;
        }
        self.last_lease_attempt = Some(Instant::now());

        if let Err(err) = leader::heartbeat(&self.state, self.room_id, self.player_id).await {
            debug!(room = %self.room_id, error = %err, "lease heartbeat failed");
        }
    }
}

/// Volatile fields the poller compares before re-emitting a view update, so
/// unchanged re-deliveries do not churn the presentation layer.
fn volatile_fields_changed(old: &RoomEntity, new: &RoomEntity) -> bool {
    let score_sum = |room: &RoomEntity| -> u64 {
        room.players.iter().map(|player| u64::from(player.score)).sum()
    };
    old.status != new.status
        || old.players.len() != new.players.len()
        || old.current_question != new.current_question
        || old.play_again_votes.len() != new.play_again_votes.len()
        || score_sum(old) != score_sum(new)
}
