use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// Phases of one participant's view of game progression.
///
/// Every client runs an identical machine; transitions that mutate the shared
/// room document are additionally gated by the leader lease, so replicas
/// converge by observing the document rather than by coordinating directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundPhase {
    /// No game is running locally; the lobby view is showing.
    Idle,
    /// Counting down and accepting a guess for the given round.
    Answering {
        /// Index of the question being answered.
        round: usize,
    },
    /// Showing correctness and the expected answer for the given round.
    Revealed {
        /// Index of the question just resolved.
        round: usize,
    },
    /// Final scoreboard is displayed until the roster votes to replay.
    Finished,
}

/// Events that can be applied to the round state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEvent {
    /// The room was observed Playing; carries the opening round and the
    /// declared question count for the game.
    GameStarted {
        /// Round the game opens on (0 unless rejoining mid-game).
        round: usize,
        /// Number of questions this game runs.
        total_rounds: usize,
    },
    /// The player committed a non-empty guess for the current round.
    GuessSubmitted,
    /// The countdown hit zero before any manual submission.
    CountdownExpired,
    /// The shared question index was observed to move to a later round.
    RoundAdvanced {
        /// The round the shared index now points at.
        round: usize,
    },
    /// The final round's reveal was acknowledged.
    GameCompleted,
    /// The room returned to waiting after a unanimous replay vote.
    SessionReset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: RoundPhase,
    /// The event that cannot be applied from this phase.
    pub event: RoundEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: RoundPhase,
        /// Current phase.
        actual: RoundPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
///
/// Transitions that straddle an asynchronous store write (committing an
/// answer, for instance) plan first, perform the write, then apply or abort,
/// so a failed write never leaves the local view half-transitioned.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: RoundPhase,
    /// Phase the state machine will transition to.
    pub to: RoundPhase,
    /// Event that triggered this transition.
    pub event: RoundEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: RoundPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<RoundPhase>,
}

/// State machine driving one participant's round progression.
#[derive(Debug, Clone)]
pub struct RoundStateMachine {
    phase: RoundPhase,
    version: usize,
    rounds_total: Option<usize>,
    pending: Option<Plan>,
}

impl Default for RoundStateMachine {
    fn default() -> Self {
        Self {
            phase: RoundPhase::Idle,
            version: 0,
            rounds_total: None,
            pending: None,
        }
    }
}

impl RoundStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase.clone()
    }

    /// Round currently being answered or revealed, if any.
    pub fn current_round(&self) -> Option<usize> {
        match self.phase {
            RoundPhase::Answering { round } | RoundPhase::Revealed { round } => Some(round),
            _ => None,
        }
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase.clone(),
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to.clone()),
        }
    }

    /// Plan a transition by validating that the event can be applied from the
    /// current phase. Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: RoundEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event.clone())
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase.clone(),
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RoundPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase.clone(),
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        match &plan.event {
            RoundEvent::GameStarted { total_rounds, .. } => {
                self.rounds_total = Some(*total_rounds);
            }
            RoundEvent::SessionReset => {
                self.rounds_total = None;
            }
            _ => {}
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        self.pending = None;

        Ok(self.phase.clone())
    }

    /// Abort a planned transition without applying it, returning the state
    /// machine to its previous state.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: RoundEvent) -> Result<RoundPhase, InvalidTransition> {
        let next = match (self.phase.clone(), event) {
            (RoundPhase::Idle, RoundEvent::GameStarted { round, total_rounds })
                if round < total_rounds =>
            {
                RoundPhase::Answering { round }
            }
            (RoundPhase::Answering { round }, RoundEvent::GuessSubmitted) => {
                RoundPhase::Revealed { round }
            }
            (RoundPhase::Answering { round }, RoundEvent::CountdownExpired) => {
                RoundPhase::Revealed { round }
            }
            // A lagged replica can observe the shared index skipping ahead
            // while it is still answering; resynchronize onto the new round.
            (RoundPhase::Answering { round }, RoundEvent::RoundAdvanced { round: next })
                if next > round && self.in_bounds(next) =>
            {
                RoundPhase::Answering { round: next }
            }
            (RoundPhase::Revealed { round }, RoundEvent::RoundAdvanced { round: next })
                if next > round && self.in_bounds(next) =>
            {
                RoundPhase::Answering { round: next }
            }
            (RoundPhase::Revealed { round }, RoundEvent::GameCompleted)
                if self.is_last_round(round) =>
            {
                RoundPhase::Finished
            }
            (RoundPhase::Finished, RoundEvent::SessionReset) => RoundPhase::Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }

    fn in_bounds(&self, round: usize) -> bool {
        self.rounds_total.is_some_and(|total| round < total)
    }

    fn is_last_round(&self, round: usize) -> bool {
        self.rounds_total
            .is_some_and(|total| round + 1 == total)
    }
}
