//! View models derived from the authoritative room document.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    dao::models::{
        GameTypeEntity, QuestionEntity, QuestionKindEntity, RoomEntity, RoomStatusEntity,
    },
    dto::format_system_time,
};

/// Whole-room view pushed to the presentation layer on every reconciled
/// change.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Room identifier.
    pub id: Uuid,
    /// Code other participants join with.
    pub join_code: String,
    /// Lifecycle status.
    pub status: RoomStatusEntity,
    /// Trivia variant being played.
    pub game_type: GameTypeEntity,
    /// Questions per game.
    pub question_count: usize,
    /// Seconds allowed per question.
    pub timer_seconds: u32,
    /// Roster cap.
    pub max_players: usize,
    /// Shared question index, while playing.
    pub current_question: Option<usize>,
    /// Roster in join order.
    pub players: Vec<PlayerSummary>,
    /// Play-again votes cast so far.
    pub votes: usize,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

/// Roster entry inside a [`RoomSnapshot`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlayerSummary {
    /// Player identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Cumulative score.
    pub score: u32,
    /// Whether this player created the room.
    pub is_host: bool,
    /// Whether this player holds the guest seat.
    pub is_guest: bool,
}

impl From<&RoomEntity> for RoomSnapshot {
    fn from(room: &RoomEntity) -> Self {
        Self {
            id: room.id,
            join_code: room.join_code.clone(),
            status: room.status,
            game_type: room.game_type,
            question_count: room.question_count,
            timer_seconds: room.timer_seconds,
            max_players: room.max_players,
            current_question: room.current_question,
            players: room
                .players
                .iter()
                .map(|player| PlayerSummary {
                    id: player.id,
                    name: player.name.clone(),
                    score: player.score,
                    is_host: player.id == room.host_id,
                    is_guest: Some(player.id) == room.guest_id,
                })
                .collect(),
            votes: room.play_again_votes.len(),
            created_at: format_system_time(room.created_at),
        }
    }
}

/// Question as shown while answering; the expected name never leaves the
/// document layer before the reveal.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionPrompt {
    /// Portrait-and-stats prompt.
    PlayerCard {
        /// Portrait lookup key for the presentation layer.
        subject_id: u32,
        /// Team the stat line was recorded with.
        team: String,
        /// Listed position.
        position: String,
        /// Points / rebounds / assists per game.
        stat_line: StatLineView,
    },
    /// Career-teams prompt.
    CareerPath {
        /// Franchises in the order the player joined them.
        teams: Vec<String>,
    },
}

/// Stat triple shown with a player-card prompt.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatLineView {
    pub points: f32,
    pub rebounds: f32,
    pub assists: f32,
}

impl From<&QuestionEntity> for QuestionPrompt {
    fn from(question: &QuestionEntity) -> Self {
        match &question.kind {
            QuestionKindEntity::PlayerCard {
                subject_id,
                team,
                position,
                stat_line,
                ..
            } => QuestionPrompt::PlayerCard {
                subject_id: *subject_id,
                team: team.clone(),
                position: position.clone(),
                stat_line: StatLineView {
                    points: stat_line.points,
                    rebounds: stat_line.rebounds,
                    assists: stat_line.assists,
                },
            },
            QuestionKindEntity::CareerPath { teams, .. } => QuestionPrompt::CareerPath {
                teams: teams.clone(),
            },
        }
    }
}

/// Post-submission view of one resolved round.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RevealView {
    /// Round the reveal belongs to.
    pub round: usize,
    /// Name the question expected.
    pub expected_answer: String,
    /// Text the player submitted; empty on a forced timeout.
    pub guess: String,
    /// Whether the matcher accepted the guess.
    pub correct: bool,
    /// Points this round added to the player's score.
    pub points_awarded: u32,
    /// Player's cumulative score after the round.
    pub total_score: u32,
}

/// Final standing for one player.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScoreboardEntry {
    /// Player identifier.
    pub player_id: Uuid,
    /// Display name.
    pub name: String,
    /// Final score.
    pub score: u32,
    /// Rounds answered correctly.
    pub correct_count: usize,
}

/// Standings sorted best-first.
pub fn scoreboard(room: &RoomEntity) -> Vec<ScoreboardEntry> {
    let mut entries: Vec<ScoreboardEntry> = room
        .players
        .iter()
        .map(|player| ScoreboardEntry {
            player_id: player.id,
            name: player.name.clone(),
            score: player.score,
            correct_count: player
                .answers
                .iter()
                .filter(|answer| answer.correct)
                .count(),
        })
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}
