//! Validated inputs for room operations.

use serde::Deserialize;
use validator::Validate;

use crate::{
    config::RoomDefaults,
    dao::models::GameTypeEntity,
    dto::validation::validate_join_code,
    state::room::RoomOptions,
};

/// Request to open a new room.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoomRequest {
    /// Display name of the hosting participant.
    #[validate(length(min = 1, max = 24))]
    pub host_name: String,
    /// Trivia variant the room will play.
    pub game_type: GameTypeEntity,
    /// Questions per game; the configured default applies when unset.
    #[validate(range(min = 1, max = 16))]
    pub question_count: Option<usize>,
    /// Seconds per question; the configured default applies when unset.
    #[validate(range(min = 5, max = 60))]
    pub timer_seconds: Option<u32>,
    /// Roster cap; the configured default applies when unset.
    #[validate(range(min = 2, max = 8))]
    pub max_players: Option<usize>,
}

impl CreateRoomRequest {
    /// Resolve the optional knobs against the configured defaults.
    pub fn room_options(&self, defaults: RoomDefaults) -> RoomOptions {
        RoomOptions {
            game_type: self.game_type,
            question_count: self.question_count.unwrap_or(defaults.question_count),
            timer_seconds: self.timer_seconds.unwrap_or(defaults.timer_seconds),
            max_players: self.max_players.unwrap_or(defaults.max_players),
        }
    }
}

/// Request to join an existing room by code.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JoinRoomRequest {
    /// Code shown to the host when the room was created.
    #[validate(custom(function = validate_join_code))]
    pub code: String,
    /// Display name of the joining participant.
    #[validate(length(min = 1, max = 24))]
    pub player_name: String,
}

impl JoinRoomRequest {
    /// Uppercase and trim the code before validation so hand-typed input in
    /// any case is accepted.
    pub fn normalized(mut self) -> Self {
        self.code = self.code.trim().to_uppercase();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn create_request_applies_defaults() {
        let request = CreateRoomRequest {
            host_name: "host".into(),
            game_type: GameTypeEntity::PlayerCard,
            question_count: None,
            timer_seconds: Some(30),
            max_players: None,
        };
        request.validate().unwrap();

        let options = request.room_options(AppConfig::default().room_defaults());
        assert_eq!(options.question_count, 5);
        assert_eq!(options.timer_seconds, 30);
        assert_eq!(options.max_players, 4);
    }

    #[test]
    fn create_request_rejects_out_of_range_knobs() {
        let request = CreateRoomRequest {
            host_name: "host".into(),
            game_type: GameTypeEntity::CareerPath,
            question_count: Some(0),
            timer_seconds: None,
            max_players: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn join_request_normalizes_hand_typed_codes() {
        let request = JoinRoomRequest {
            code: "  bball7 ".into(),
            player_name: "guest".into(),
        }
        .normalized();

        assert_eq!(request.code, "BBALL7");
        request.validate().unwrap();
    }

    #[test]
    fn join_request_rejects_blank_names() {
        let request = JoinRoomRequest {
            code: "BBALL7".into(),
            player_name: String::new(),
        };
        assert!(request.validate().is_err());
    }
}
