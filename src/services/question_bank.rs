//! Question sourcing for new games.

use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{GameTypeEntity, QuestionEntity, QuestionKindEntity, StatLineEntity};

/// Failures raised while drawing questions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    /// The bank cannot supply the requested number of questions.
    #[error("question bank exhausted: wanted {wanted}, only {available} available")]
    Exhausted {
        /// Questions the game asked for.
        wanted: usize,
        /// Questions the bank can actually produce.
        available: usize,
    },
}

/// Supplies freshly drawn questions for a game.
///
/// Called exactly once at game start; the engine treats the implementation as
/// opaque content generation.
pub trait QuestionBank: Send + Sync {
    fn draw(
        &self,
        game_type: GameTypeEntity,
        count: usize,
    ) -> BoxFuture<'static, Result<Vec<QuestionEntity>, BankError>>;
}

struct RosterEntry {
    name: &'static str,
    team: &'static str,
    position: &'static str,
    points: f32,
    rebounds: f32,
    assists: f32,
    career: &'static [&'static str],
}

/// Built-in roster shipped with the binary so local games work without an
/// external content service.
const ROSTER: &[RosterEntry] = &[
    RosterEntry {
        name: "LeBron James",
        team: "Lakers",
        position: "SF",
        points: 27.1,
        rebounds: 7.5,
        assists: 7.4,
        career: &["Cavaliers", "Heat", "Cavaliers", "Lakers"],
    },
    RosterEntry {
        name: "Stephen Curry",
        team: "Warriors",
        position: "PG",
        points: 24.7,
        rebounds: 4.7,
        assists: 6.4,
        career: &["Warriors"],
    },
    RosterEntry {
        name: "Kevin Durant",
        team: "Suns",
        position: "PF",
        points: 27.3,
        rebounds: 7.0,
        assists: 4.4,
        career: &["SuperSonics", "Thunder", "Warriors", "Nets", "Suns"],
    },
    RosterEntry {
        name: "Giannis Antetokounmpo",
        team: "Bucks",
        position: "PF",
        points: 23.4,
        rebounds: 9.9,
        assists: 4.9,
        career: &["Bucks"],
    },
    RosterEntry {
        name: "Chris Paul",
        team: "Spurs",
        position: "PG",
        points: 17.5,
        rebounds: 4.5,
        assists: 9.4,
        career: &["Hornets", "Clippers", "Rockets", "Thunder", "Suns", "Warriors", "Spurs"],
    },
    RosterEntry {
        name: "James Harden",
        team: "Clippers",
        position: "SG",
        points: 24.1,
        rebounds: 5.6,
        assists: 7.1,
        career: &["Thunder", "Rockets", "Nets", "76ers", "Clippers"],
    },
    RosterEntry {
        name: "Nikola Jokic",
        team: "Nuggets",
        position: "C",
        points: 20.9,
        rebounds: 10.7,
        assists: 6.9,
        career: &["Nuggets"],
    },
    RosterEntry {
        name: "Kawhi Leonard",
        team: "Clippers",
        position: "SF",
        points: 19.9,
        rebounds: 6.4,
        assists: 3.0,
        career: &["Spurs", "Raptors", "Clippers"],
    },
    RosterEntry {
        name: "Russell Westbrook",
        team: "Nuggets",
        position: "PG",
        points: 21.7,
        rebounds: 7.1,
        assists: 8.1,
        career: &["Thunder", "Rockets", "Wizards", "Lakers", "Clippers", "Nuggets"],
    },
    RosterEntry {
        name: "Damian Lillard",
        team: "Bucks",
        position: "PG",
        points: 25.1,
        rebounds: 4.2,
        assists: 6.7,
        career: &["Trail Blazers", "Bucks"],
    },
    RosterEntry {
        name: "Jayson Tatum",
        team: "Celtics",
        position: "SF",
        points: 23.1,
        rebounds: 7.2,
        assists: 3.6,
        career: &["Celtics"],
    },
    RosterEntry {
        name: "Jimmy Butler",
        team: "Warriors",
        position: "SF",
        points: 18.3,
        rebounds: 5.4,
        assists: 4.4,
        career: &["Bulls", "Timberwolves", "76ers", "Heat", "Warriors"],
    },
    RosterEntry {
        name: "Kyrie Irving",
        team: "Mavericks",
        position: "PG",
        points: 23.5,
        rebounds: 4.0,
        assists: 5.7,
        career: &["Cavaliers", "Celtics", "Nets", "Mavericks"],
    },
    RosterEntry {
        name: "Paul George",
        team: "76ers",
        position: "SF",
        points: 20.8,
        rebounds: 6.3,
        assists: 3.7,
        career: &["Pacers", "Thunder", "Clippers", "76ers"],
    },
    RosterEntry {
        name: "Anthony Davis",
        team: "Mavericks",
        position: "PF",
        points: 24.1,
        rebounds: 10.7,
        assists: 2.6,
        career: &["Pelicans", "Lakers", "Mavericks"],
    },
    RosterEntry {
        name: "Devin Booker",
        team: "Suns",
        position: "SG",
        points: 24.2,
        rebounds: 4.1,
        assists: 4.9,
        career: &["Suns"],
    },
];

/// Reference bank drawing from the embedded roster without repeats within a
/// single game.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleQuestionBank;

impl SampleQuestionBank {
    /// Names the bank can answer with; handy for demo participants guessing
    /// plausibly.
    pub fn roster_names() -> Vec<&'static str> {
        ROSTER.iter().map(|entry| entry.name).collect()
    }

    fn build_question(game_type: GameTypeEntity, index: usize) -> QuestionEntity {
        let entry = &ROSTER[index];
        let kind = match game_type {
            GameTypeEntity::PlayerCard => QuestionKindEntity::PlayerCard {
                subject_id: index as u32,
                name: entry.name.to_string(),
                team: entry.team.to_string(),
                position: entry.position.to_string(),
                stat_line: StatLineEntity {
                    points: entry.points,
                    rebounds: entry.rebounds,
                    assists: entry.assists,
                },
            },
            GameTypeEntity::CareerPath => QuestionKindEntity::CareerPath {
                teams: entry.career.iter().map(ToString::to_string).collect(),
                answer: entry.name.to_string(),
            },
        };

        QuestionEntity {
            id: Uuid::new_v4(),
            kind,
        }
    }
}

impl QuestionBank for SampleQuestionBank {
    fn draw(
        &self,
        game_type: GameTypeEntity,
        count: usize,
    ) -> BoxFuture<'static, Result<Vec<QuestionEntity>, BankError>> {
        Box::pin(async move {
            if count > ROSTER.len() {
                return Err(BankError::Exhausted {
                    wanted: count,
                    available: ROSTER.len(),
                });
            }

            let mut indices: Vec<usize> = (0..ROSTER.len()).collect();
            indices.shuffle(&mut rand::rng());

            Ok(indices
                .into_iter()
                .take(count)
                .map(|index| Self::build_question(game_type, index))
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn draw_produces_unique_questions_of_the_requested_kind() {
        let questions = SampleQuestionBank
            .draw(GameTypeEntity::CareerPath, 5)
            .await
            .unwrap();

        assert_eq!(questions.len(), 5);
        let mut answers: Vec<&str> = questions
            .iter()
            .map(|question| question.answer_name())
            .collect();
        answers.sort_unstable();
        answers.dedup();
        assert_eq!(answers.len(), 5, "draws must not repeat players");
        assert!(questions
            .iter()
            .all(|question| matches!(question.kind, QuestionKindEntity::CareerPath { .. })));
    }

    #[tokio::test]
    async fn overdrawing_the_roster_is_an_error() {
        let err = SampleQuestionBank
            .draw(GameTypeEntity::PlayerCard, ROSTER.len() + 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BankError::Exhausted { .. }));
    }
}
