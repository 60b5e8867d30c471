//! Database model definitions.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Named sprite archetypes a participant can play as.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SpriteKind {
    /// High energy gain on correct answers, below-average HP.
    BigBrain,
    /// Big rewards, big penalties.
    RiskTaker,
    /// Large HP pool, small bonuses.
    Tank,
    /// The only archetype whose shield returns attack damage.
    Reflector,
    /// Middle of the road on every stat.
    Balanced,
}

impl SpriteKind {
    /// Every archetype, in a stable order.
    pub const ALL: [SpriteKind; 5] = [
        SpriteKind::BigBrain,
        SpriteKind::RiskTaker,
        SpriteKind::Tank,
        SpriteKind::Reflector,
        SpriteKind::Balanced,
    ];
}

/// Battle actions a participant can take while a match is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BattleAction {
    /// Deal damage to the opposing participant.
    Attack,
    /// Raise a shield that absorbs the next attack.
    Shield,
    /// Raise a shield; on a reflecting archetype it returns the damage.
    Reflect,
    /// Bank extra damage for the next attack.
    Charge,
}

/// Lifecycle status of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Participants are joining and marking themselves ready.
    Waiting,
    /// Questions are being asked and battle actions exchanged.
    Active,
    /// Terminal; the leaderboard has been computed and broadcast.
    Finished,
}

/// One multiplayer match, persisted for history and leaderboards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Human-shareable join code.
    pub code: String,
    /// User who created the session.
    pub host_id: Uuid,
    /// Lifecycle status; only ever moves forward.
    pub status: SessionStatus,
    /// Ordered riddle ids, fixed at creation time.
    pub riddle_order: Vec<Uuid>,
    /// Index of the question currently being asked.
    pub current_question_index: usize,
    /// Advisory per-question time budget broadcast to clients.
    pub seconds_per_question: u32,
    /// Optional category/difficulty tag for the whole session.
    pub category: Option<String>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Set when the session transitions to active.
    pub started_at: Option<SystemTime>,
    /// Set when the session transitions to finished.
    pub finished_at: Option<SystemTime>,
}

/// One user's (or bot's) membership and live battle state within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Session this row belongs to.
    pub session_id: Uuid,
    /// Owning user; unique per session.
    pub user_id: Uuid,
    /// Display name shown to other participants.
    pub display_name: String,
    /// True for synthetic bot participants.
    pub is_bot: bool,
    /// Cumulative score.
    pub score: i64,
    /// Number of correctly answered questions.
    pub correct_count: u32,
    /// Number of questions answered at all.
    pub answered_count: u32,
    /// Readiness flag gating the game start.
    pub is_ready: bool,
    /// Current HP, clamped to `[0, max_hp]`.
    pub hp: i32,
    /// Upper HP bound for the selected archetype.
    pub max_hp: i32,
    /// Whether a shield (plain or reflecting) is raised.
    pub shield_active: bool,
    /// Damage bonus banked by `charge` actions, spent on the next attack.
    pub charge_power: i32,
    /// Most recent battle action taken.
    pub last_action: Option<BattleAction>,
    /// Selected sprite archetype.
    pub sprite: SpriteKind,
    /// Current energy, clamped at 0.
    pub energy: i32,
    /// When the participant joined.
    pub joined_at: SystemTime,
    /// Set when the participant leaves; the row itself is kept.
    pub left_at: Option<SystemTime>,
}

impl ParticipantEntity {
    /// Whether this participant still counts towards answer gates and
    /// attack targeting.
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// One submitted answer to one question by one participant. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerEntity {
    /// Session the answer was submitted in.
    pub session_id: Uuid,
    /// Submitting participant.
    pub user_id: Uuid,
    /// Riddle the answer targets.
    pub riddle_id: Uuid,
    /// Position of the riddle in the session order.
    pub question_index: usize,
    /// Raw submitted text; blank means the client timed out.
    pub submitted_text: String,
    /// Correctness verdict recorded at scoring time.
    pub is_correct: bool,
    /// Seconds between the question broadcast and this submission.
    pub seconds_to_answer: f64,
    /// Submission timestamp.
    pub submitted_at: SystemTime,
}

impl AnswerEntity {
    /// A blank submission is a timeout, scored without consulting the judge.
    pub fn is_timeout(&self) -> bool {
        self.submitted_text.trim().is_empty()
    }
}

/// A riddle with its canonical answer, persisted at session creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiddleEntity {
    /// Primary key of the riddle.
    pub id: Uuid,
    /// Question text shown to players.
    pub prompt: String,
    /// Canonical answer used by the judge; never broadcast before a miss.
    pub answer: String,
    /// Optional category tag.
    pub category: Option<String>,
    /// Optional difficulty tag.
    pub difficulty: Option<String>,
}
