//! Domain behaviour layered over the persisted room document.
//!
//! The store deals in whole [`RoomEntity`] documents; the methods here hold
//! the room invariants (roster uniqueness, guest promotion, vote-set
//! completeness, lease arithmetic) so services and the session controller
//! never poke at fields directly.

use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::dao::models::{
    GameTypeEntity, LeaseEntity, PlayerEntity, QuestionEntity, RoomEntity, RoomStatusEntity,
};

/// Caller-tunable knobs for a new room, bounded by request validation.
#[derive(Debug, Clone, Copy)]
pub struct RoomOptions {
    /// Trivia variant to play.
    pub game_type: GameTypeEntity,
    /// Questions per game.
    pub question_count: usize,
    /// Seconds allowed per question.
    pub timer_seconds: u32,
    /// Roster cap.
    pub max_players: usize,
}

impl PlayerEntity {
    /// Fresh roster entry with no score or answers.
    pub fn joining(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            score: 0,
            answers: Vec::new(),
        }
    }
}

impl RoomEntity {
    /// Build a waiting room hosted by the given participant, who also holds
    /// the opening leader lease.
    pub fn hosted_by(
        host: PlayerEntity,
        join_code: String,
        options: RoomOptions,
        lease_ttl: Duration,
        now: SystemTime,
    ) -> Self {
        let host_id = host.id;
        Self {
            id: Uuid::new_v4(),
            join_code,
            host_id,
            guest_id: None,
            game_type: options.game_type,
            question_count: options.question_count,
            timer_seconds: options.timer_seconds,
            max_players: options.max_players,
            status: RoomStatusEntity::Waiting,
            players: vec![host],
            questions: Vec::new(),
            current_question: None,
            play_again_votes: Default::default(),
            lease: LeaseEntity {
                holder_id: host_id,
                expires_at: now + lease_ttl,
            },
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the given participant is on the roster.
    pub fn contains_player(&self, id: Uuid) -> bool {
        self.players.iter().any(|player| player.id == id)
    }

    /// Roster entry for the given participant.
    pub fn player(&self, id: Uuid) -> Option<&PlayerEntity> {
        self.players.iter().find(|player| player.id == id)
    }

    /// Mutable roster entry for the given participant.
    pub fn player_mut(&mut self, id: Uuid) -> Option<&mut PlayerEntity> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    /// Whether the roster has reached the configured cap.
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// Add a player to the roster, seating them as guest when the seat is
    /// vacant. Capacity and duplicate checks are the caller's business.
    pub fn seat_player(&mut self, player: PlayerEntity) {
        if self.guest_id.is_none() && player.id != self.host_id {
            self.guest_id = Some(player.id);
        }
        self.players.push(player);
    }

    /// Remove a player, promoting the next non-host joiner into the guest
    /// seat when the departing player held it.
    pub fn unseat_player(&mut self, id: Uuid) {
        self.players.retain(|player| player.id != id);
        self.play_again_votes.shift_remove(&id);

        if self.guest_id == Some(id) {
            self.guest_id = self
                .players
                .iter()
                .map(|player| player.id)
                .find(|candidate| *candidate != self.host_id);
        }
    }

    /// Record a play-again vote; returns false when the vote was already
    /// present (idempotent union).
    pub fn record_vote(&mut self, id: Uuid) -> bool {
        self.play_again_votes.insert(id)
    }

    /// Whether every roster member has voted to play again.
    pub fn votes_complete(&self) -> bool {
        !self.players.is_empty() && self.play_again_votes.len() == self.players.len()
    }

    /// Question at the shared index, while playing.
    pub fn question_at(&self, round: usize) -> Option<&QuestionEntity> {
        self.questions.get(round)
    }

    /// Whether the player already has an answer recorded for the question.
    pub fn has_answered(&self, player_id: Uuid, question_id: Uuid) -> bool {
        self.player(player_id).is_some_and(|player| {
            player
                .answers
                .iter()
                .any(|answer| answer.question_id == question_id)
        })
    }

    /// Whether the lease can currently be claimed by someone else.
    pub fn lease_expired(&self, now: SystemTime) -> bool {
        self.lease.expires_at <= now
    }

    /// Whether the participant holds an unexpired lease.
    pub fn holds_lease(&self, id: Uuid, now: SystemTime) -> bool {
        self.lease.holder_id == id && !self.lease_expired(now)
    }

    /// Hand the lease to a participant for one TTL from now.
    pub fn grant_lease(&mut self, id: Uuid, lease_ttl: Duration, now: SystemTime) {
        self.lease = LeaseEntity {
            holder_id: id,
            expires_at: now + lease_ttl,
        };
    }

    /// Populate questions and flip into the playing state.
    pub fn begin_game(&mut self, questions: Vec<QuestionEntity>) {
        self.questions = questions;
        self.current_question = Some(0);
        self.status = RoomStatusEntity::Playing;
    }

    /// Clear all per-game state and return to the waiting lobby, keeping the
    /// roster intact.
    pub fn reset_for_replay(&mut self) {
        for player in &mut self.players {
            player.score = 0;
            player.answers.clear();
        }
        self.questions.clear();
        self.current_question = None;
        self.play_again_votes.clear();
        self.status = RoomStatusEntity::Waiting;
    }

    /// Stamp the document as mutated now.
    pub fn touch(&mut self, now: SystemTime) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    fn waiting_room() -> (RoomEntity, Uuid) {
        let host_id = Uuid::new_v4();
        let room = RoomEntity::hosted_by(
            PlayerEntity::joining(host_id, "host"),
            "BBALL1".into(),
            RoomOptions {
                game_type: GameTypeEntity::PlayerCard,
                question_count: 5,
                timer_seconds: 15,
                max_players: 3,
            },
            TTL,
            SystemTime::now(),
        );
        (room, host_id)
    }

    #[test]
    fn first_joiner_takes_the_guest_seat() {
        let (mut room, host_id) = waiting_room();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        room.seat_player(PlayerEntity::joining(first, "first"));
        room.seat_player(PlayerEntity::joining(second, "second"));

        assert_eq!(room.guest_id, Some(first));
        assert!(room.contains_player(host_id));
        assert!(room.is_full());
    }

    #[test]
    fn departing_guest_promotes_next_joiner() {
        let (mut room, _host) = waiting_room();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        room.seat_player(PlayerEntity::joining(first, "first"));
        room.seat_player(PlayerEntity::joining(second, "second"));

        room.unseat_player(first);

        assert_eq!(room.guest_id, Some(second));
        assert!(!room.contains_player(first));
    }

    #[test]
    fn guest_seat_empties_when_no_candidate_remains() {
        let (mut room, _host) = waiting_room();
        let first = Uuid::new_v4();
        room.seat_player(PlayerEntity::joining(first, "first"));

        room.unseat_player(first);

        assert_eq!(room.guest_id, None);
    }

    #[test]
    fn votes_are_idempotent_and_complete_with_roster() {
        let (mut room, host_id) = waiting_room();
        let guest = Uuid::new_v4();
        room.seat_player(PlayerEntity::joining(guest, "guest"));

        assert!(room.record_vote(host_id));
        assert!(!room.record_vote(host_id));
        assert_eq!(room.play_again_votes.len(), 1);
        assert!(!room.votes_complete());

        room.record_vote(guest);
        assert!(room.votes_complete());
    }

    #[test]
    fn leaving_retracts_the_vote() {
        let (mut room, host_id) = waiting_room();
        let guest = Uuid::new_v4();
        room.seat_player(PlayerEntity::joining(guest, "guest"));
        room.record_vote(guest);

        room.unseat_player(guest);

        assert!(room.play_again_votes.is_empty());
        assert!(room.contains_player(host_id));
    }

    #[test]
    fn reset_clears_game_state_but_keeps_roster() {
        let (mut room, host_id) = waiting_room();
        let guest = Uuid::new_v4();
        room.seat_player(PlayerEntity::joining(guest, "guest"));
        room.begin_game(Vec::new());
        room.player_mut(host_id).unwrap().score = 300;
        room.record_vote(host_id);
        room.record_vote(guest);
        room.status = RoomStatusEntity::Finished;

        room.reset_for_replay();

        assert_eq!(room.status, RoomStatusEntity::Waiting);
        assert_eq!(room.player(host_id).unwrap().score, 0);
        assert!(room.play_again_votes.is_empty());
        assert!(room.questions.is_empty());
        assert_eq!(room.current_question, None);
        assert_eq!(room.players.len(), 2);
    }

    #[test]
    fn lease_expiry_gates_takeover() {
        let (mut room, host_id) = waiting_room();
        let guest = Uuid::new_v4();
        let now = SystemTime::now();

        assert!(room.holds_lease(host_id, now));
        assert!(!room.lease_expired(now));

        let later = now + TTL + Duration::from_secs(1);
        assert!(room.lease_expired(later));
        assert!(!room.holds_lease(host_id, later));

        room.grant_lease(guest, TTL, later);
        assert!(room.holds_lease(guest, later));
    }
}
