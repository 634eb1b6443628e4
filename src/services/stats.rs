//! Per-player statistics hand-off at game finish.

use futures::future::BoxFuture;
use tracing::info;
use uuid::Uuid;

use crate::dao::models::PlayerEntity;

/// Final per-player figures pushed to the statistics collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    /// Player the figures belong to.
    pub player_id: Uuid,
    /// Display name at the time the game finished.
    pub player_name: String,
    /// Cumulative score for the game.
    pub score: u32,
    /// Rounds answered correctly.
    pub correct_count: usize,
    /// Rounds with any recorded answer, including forced timeouts.
    pub questions_answered: usize,
    /// Total seconds spent across all rounds.
    pub time_taken_seconds: u32,
}

impl GameResult {
    /// Derive the figures from a player's roster entry.
    pub fn for_player(player: &PlayerEntity) -> Self {
        Self {
            player_id: player.id,
            player_name: player.name.clone(),
            score: player.score,
            correct_count: player
                .answers
                .iter()
                .filter(|answer| answer.correct)
                .count(),
            questions_answered: player.answers.len(),
            time_taken_seconds: player
                .answers
                .iter()
                .map(|answer| answer.time_taken_seconds)
                .sum(),
        }
    }
}

/// Fire-and-forget sink called once per player when a game finishes; the
/// engine never reads anything back.
pub trait StatsSink: Send + Sync {
    fn record_result(&self, result: GameResult) -> BoxFuture<'static, ()>;
}

/// Reference sink that logs the figures.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn record_result(&self, result: GameResult) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            info!(
                player = %result.player_id,
                name = %result.player_name,
                score = result.score,
                correct = result.correct_count,
                answered = result.questions_answered,
                seconds = result.time_taken_seconds,
                "game result recorded"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::AnswerEntity;

    #[test]
    fn result_aggregates_answers() {
        let player = PlayerEntity {
            id: Uuid::new_v4(),
            name: "host".into(),
            score: 249,
            answers: vec![
                AnswerEntity {
                    question_id: Uuid::new_v4(),
                    guess: "lebron".into(),
                    correct: true,
                    time_taken_seconds: 5,
                },
                AnswerEntity {
                    question_id: Uuid::new_v4(),
                    guess: String::new(),
                    correct: false,
                    time_taken_seconds: 15,
                },
            ],
        };

        let result = GameResult::for_player(&player);
        assert_eq!(result.score, 249);
        assert_eq!(result.correct_count, 1);
        assert_eq!(result.questions_answered, 2);
        assert_eq!(result.time_taken_seconds, 20);
    }
}
