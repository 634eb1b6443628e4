use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Aggregate room document persisted by the storage layer.
///
/// The whole document is read and replaced as a unit; partial updates are
/// never issued against individual fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Primary key of the room.
    pub id: Uuid,
    /// Short code participants type to join (6 uppercase alphanumerics).
    pub join_code: String,
    /// Identifier of the participant who created the room.
    pub host_id: Uuid,
    /// Identifier of the participant currently holding the guest seat.
    pub guest_id: Option<Uuid>,
    /// Which trivia variant this room plays.
    pub game_type: GameTypeEntity,
    /// Number of questions a game of this room runs.
    pub question_count: usize,
    /// Seconds allowed to answer each question.
    pub timer_seconds: u32,
    /// Hard cap on the roster size.
    pub max_players: usize,
    /// Lifecycle status of the room.
    pub status: RoomStatusEntity,
    /// Participating players in join order.
    pub players: Vec<PlayerEntity>,
    /// Questions for the running game; empty while waiting.
    pub questions: Vec<QuestionEntity>,
    /// Index of the question currently being played, while playing.
    pub current_question: Option<usize>,
    /// Players who voted to play again, in vote order.
    pub play_again_votes: IndexSet<Uuid>,
    /// Leadership lease gating single-writer commits.
    pub lease: LeaseEntity,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the room document was replaced.
    pub updated_at: SystemTime,
}

/// Lifecycle status stored on the room document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatusEntity {
    /// Roster is forming; joins and leaves are allowed.
    Waiting,
    /// A game is in progress.
    Playing,
    /// The last round has been acknowledged; scoreboard is final.
    Finished,
}

/// Trivia variant played by a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameTypeEntity {
    /// Guess the player from their portrait and a per-game stat line.
    PlayerCard,
    /// Guess the player from the ordered sequence of teams they played for.
    CareerPath,
}

/// Representation of a player stored inside the room document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identifier for the player.
    pub id: Uuid,
    /// Display name chosen for the player.
    pub name: String,
    /// Cumulative score; never decremented between resets.
    pub score: u32,
    /// Answers recorded this game, in round order.
    pub answers: Vec<AnswerEntity>,
}

/// One recorded answer for one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Question this answer belongs to.
    pub question_id: Uuid,
    /// Text the player submitted; empty when the countdown expired.
    pub guess: String,
    /// Whether the matcher accepted the guess.
    pub correct: bool,
    /// Seconds elapsed between round start and submission.
    pub time_taken_seconds: u32,
}

/// Question entry inside a room document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier answers reference.
    pub id: Uuid,
    /// Variant payload, tagged by game type.
    #[serde(flatten)]
    pub kind: QuestionKindEntity,
}

/// Closed tagged union of question payloads, validated at the document
/// boundary by serde rather than trusted as loose JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionKindEntity {
    /// Portrait-and-stats prompt; `name` is the expected answer.
    PlayerCard {
        /// Identifier used by the presentation layer to fetch the portrait.
        subject_id: u32,
        /// Full name of the pictured player.
        name: String,
        /// Team the stat line was recorded with.
        team: String,
        /// Listed position.
        position: String,
        /// Per-game averages shown alongside the portrait.
        stat_line: StatLineEntity,
    },
    /// Career-teams prompt; `answer` is the expected name.
    CareerPath {
        /// Franchises in the order the player joined them.
        teams: Vec<String>,
        /// Full name of the player who followed that path.
        answer: String,
    },
}

/// Per-game averages displayed with a player-card question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatLineEntity {
    pub points: f32,
    pub rebounds: f32,
    pub assists: f32,
}

impl PartialEq for StatLineEntity {
    fn eq(&self, other: &Self) -> bool {
        self.points.to_bits() == other.points.to_bits()
            && self.rebounds.to_bits() == other.rebounds.to_bits()
            && self.assists.to_bits() == other.assists.to_bits()
    }
}

impl Eq for StatLineEntity {}

/// Leadership lease recorded on the room document.
///
/// Single-writer commits (start, advance, finish, reset) are only issued by
/// the holder while the lease is unexpired; an expired lease may be claimed
/// by any roster member through the same compare-and-swap discipline as
/// every other mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseEntity {
    /// Player currently entitled to single-writer commits.
    pub holder_id: Uuid,
    /// Instant after which the lease may be taken over.
    pub expires_at: SystemTime,
}

impl QuestionEntity {
    /// Reference name the matcher compares guesses against.
    pub fn answer_name(&self) -> &str {
        match &self.kind {
            QuestionKindEntity::PlayerCard { name, .. } => name,
            QuestionKindEntity::CareerPath { answer, .. } => answer,
        }
    }
}
