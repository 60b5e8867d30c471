//! Session bootstrap payloads and projections shared with clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::{
    ParticipantEntity, RiddleEntity, SessionEntity, SessionStatus, SpriteKind,
};
use crate::dto::format_system_time;

/// Payload used to bootstrap a brand-new game session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// User creating (and hosting) the session.
    pub host_id: Uuid,
    /// Display name for the host's participant row.
    #[validate(length(min = 1, max = 64))]
    pub host_name: String,
    /// Riddles asked in order; at least one is required.
    #[validate(length(min = 1), nested)]
    pub riddles: Vec<RiddleInput>,
    /// Advisory per-question time budget, in seconds.
    #[serde(default = "default_seconds_per_question")]
    #[validate(range(min = 5, max = 300))]
    pub seconds_per_question: u32,
    /// Optional category tag for the whole session.
    #[serde(default)]
    pub category: Option<String>,
    /// When true, a bot participant is seeded into the session.
    #[serde(default)]
    pub with_bot: bool,
    /// Difficulty level driving bot stat scaling.
    #[serde(default = "default_bot_difficulty")]
    #[validate(range(min = 1, max = 10))]
    pub bot_difficulty: u32,
}

fn default_seconds_per_question() -> u32 {
    30
}

fn default_bot_difficulty() -> u32 {
    1
}

/// One riddle supplied at session creation.
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct RiddleInput {
    /// Question text shown to players.
    #[validate(length(min = 1))]
    pub prompt: String,
    /// Canonical answer used by the judge.
    #[validate(length(min = 1))]
    pub answer: String,
    /// Optional category tag.
    #[serde(default)]
    pub category: Option<String>,
    /// Optional difficulty tag.
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl RiddleInput {
    /// Materialize the input into a persistable entity with a fresh id.
    pub fn into_entity(self) -> RiddleEntity {
        RiddleEntity {
            id: Uuid::new_v4(),
            prompt: self.prompt,
            answer: self.answer,
            category: self.category,
            difficulty: self.difficulty,
        }
    }
}

/// Public projection of a participant exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    /// Owning user.
    pub user_id: Uuid,
    /// Display name.
    pub display_name: String,
    /// True for bot participants.
    pub is_bot: bool,
    /// Cumulative score.
    pub score: i64,
    /// Readiness flag.
    pub is_ready: bool,
    /// Current HP.
    pub hp: i32,
    /// HP ceiling.
    pub max_hp: i32,
    /// Whether a shield is raised.
    pub shield_active: bool,
    /// Banked charge power.
    pub charge_power: i32,
    /// Selected archetype.
    pub sprite: SpriteKind,
    /// Current energy.
    pub energy: i32,
}

impl From<ParticipantEntity> for ParticipantSummary {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            user_id: value.user_id,
            display_name: value.display_name,
            is_bot: value.is_bot,
            score: value.score,
            is_ready: value.is_ready,
            hp: value.hp,
            max_hp: value.max_hp,
            shield_active: value.shield_active,
            charge_power: value.charge_power,
            sprite: value.sprite,
            energy: value.energy,
        }
    }
}

/// Summary returned after a session has been created or looked up.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id used by the `join` message.
    pub id: Uuid,
    /// Human-shareable join code.
    pub code: String,
    /// Hosting user.
    pub host_id: Uuid,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Number of questions in the fixed order.
    pub question_count: usize,
    /// Index of the question currently being asked.
    pub current_question_index: usize,
    /// Advisory per-question time budget.
    pub seconds_per_question: u32,
    /// Optional category tag.
    pub category: Option<String>,
    /// Live participants (left ones are excluded).
    pub participants: Vec<ParticipantSummary>,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
}

impl SessionSummary {
    /// Project a session entity and its participant rows into a summary.
    pub fn project(session: SessionEntity, participants: Vec<ParticipantEntity>) -> Self {
        Self {
            id: session.id,
            code: session.code,
            host_id: session.host_id,
            status: session.status,
            question_count: session.riddle_order.len(),
            current_question_index: session.current_question_index,
            seconds_per_question: session.seconds_per_question,
            category: session.category,
            participants: participants
                .into_iter()
                .filter(|p| p.is_active())
                .map(Into::into)
                .collect(),
            created_at: format_system_time(session.created_at),
        }
    }
}

/// Question projection broadcast to clients. Never includes the answer.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiddleSnapshot {
    /// Riddle id.
    pub id: Uuid,
    /// Question text.
    pub prompt: String,
    /// Optional category tag.
    pub category: Option<String>,
    /// Optional difficulty tag.
    pub difficulty: Option<String>,
}

impl From<RiddleEntity> for RiddleSnapshot {
    fn from(value: RiddleEntity) -> Self {
        Self {
            id: value.id,
            prompt: value.prompt,
            category: value.category,
            difficulty: value.difficulty,
        }
    }
}

/// One row of the final ranking.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based rank, best score first.
    pub position: usize,
    /// Ranked user.
    pub user_id: Uuid,
    /// Display name.
    pub display_name: String,
    /// Final score.
    pub score: i64,
    /// Correct answers over the match.
    pub correct_count: u32,
    /// HP remaining at the end.
    pub hp: i32,
}

/// Rank participants by descending score. The sort is stable, so ties keep
/// join order.
pub fn build_leaderboard(mut participants: Vec<ParticipantEntity>) -> Vec<LeaderboardEntry> {
    participants.sort_by_key(|p| std::cmp::Reverse(p.score));
    participants
        .into_iter()
        .enumerate()
        .map(|(index, p)| LeaderboardEntry {
            position: index + 1,
            user_id: p.user_id,
            display_name: p.display_name,
            score: p.score,
            correct_count: p.correct_count,
            hp: p.hp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn participant(name: &str, score: i64) -> ParticipantEntity {
        ParticipantEntity {
            session_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            display_name: name.into(),
            is_bot: false,
            score,
            correct_count: 0,
            answered_count: 0,
            is_ready: true,
            hp: 100,
            max_hp: 100,
            shield_active: false,
            charge_power: 0,
            last_action: None,
            sprite: SpriteKind::Balanced,
            energy: 50,
            joined_at: SystemTime::now(),
            left_at: None,
        }
    }

    #[test]
    fn leaderboard_sorts_by_score_with_one_based_positions() {
        let board = build_leaderboard(vec![
            participant("low", 120),
            participant("high", 480),
            participant("mid", 300),
        ]);
        assert_eq!(
            board.iter().map(|e| e.display_name.as_str()).collect::<Vec<_>>(),
            vec!["high", "mid", "low"]
        );
        assert_eq!(board.iter().map(|e| e.position).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn leaderboard_ties_keep_input_order() {
        let first = participant("first", 200);
        let second = participant("second", 200);
        let (first_id, second_id) = (first.user_id, second.user_id);
        let board = build_leaderboard(vec![first, second]);
        assert_eq!(board[0].user_id, first_id);
        assert_eq!(board[1].user_id, second_id);
    }

    #[test]
    fn create_request_defaults_are_applied() {
        let request: CreateSessionRequest = serde_json::from_str(
            r#"{"hostId":"00000000-0000-0000-0000-000000000001","hostName":"quizmaster",
                "riddles":[{"prompt":"what has keys but no locks","answer":"a keyboard"}]}"#,
        )
        .unwrap();
        assert_eq!(request.seconds_per_question, 30);
        assert_eq!(request.bot_difficulty, 1);
        assert!(!request.with_bot);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn create_request_rejects_empty_riddles() {
        let request: CreateSessionRequest = serde_json::from_str(
            r#"{"hostId":"00000000-0000-0000-0000-000000000001","hostName":"quizmaster","riddles":[]}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn create_request_rejects_blank_riddle_fields() {
        let request: CreateSessionRequest = serde_json::from_str(
            r#"{"hostId":"00000000-0000-0000-0000-000000000001","hostName":"quizmaster",
                "riddles":[{"prompt":"","answer":"a keyboard"}]}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());
    }
}
