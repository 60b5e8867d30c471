//! WebSocket message catalogue: client intents and server events.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{BattleAction, SpriteKind};
use crate::dto::game::{LeaderboardEntry, RiddleSnapshot, SessionSummary};

/// Messages accepted from game WebSocket clients.
///
/// The `type` discriminator is matched exhaustively; an unrecognized type
/// deserializes to [`ClientMessage::Unknown`] and is answered with an error
/// event rather than dropped.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Bind this socket to a user and session. Must be the first message.
    Join {
        /// Joining user.
        user_id: Uuid,
        /// Session to subscribe to.
        session_id: Uuid,
        /// Name shown to other participants.
        #[serde(default)]
        display_name: Option<String>,
    },
    /// Mark the joined participant as ready.
    Ready,
    /// Host asks to start; re-checks the readiness gate.
    StartGame,
    /// Submit an answer for the current question. Blank text means timeout.
    SubmitAnswer {
        /// Submitted free-text answer.
        answer: String,
        /// Seconds the participant took to answer.
        time_to_answer_seconds: f64,
        /// Index the client believes is current.
        question_index: usize,
    },
    /// Take a battle action against the opposing participant.
    BattleAction {
        /// The action to resolve.
        action: BattleAction,
    },
    /// Select (or re-select) a sprite archetype.
    SelectSprite {
        /// The archetype to switch to.
        sprite_type: SpriteKind,
    },
    /// Catch-all for unrecognized message types.
    #[serde(other)]
    Unknown,
}

/// One HP/energy consequence of a scored answer.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BattleEffect {
    /// Affected participant.
    pub user_id: Uuid,
    /// `hp-loss` or `energy-gain`.
    pub effect: EffectKind,
    /// Magnitude of the change, always positive.
    pub amount: i32,
    /// Human-readable reason, e.g. "Time Ran Out" or "Wrong Answer".
    pub reason: String,
}

/// Kind of stat change carried by a [`BattleEffect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    /// HP decreased.
    HpLoss,
    /// Energy increased.
    EnergyGain,
}

/// Events pushed to game WebSocket clients, both broadcast and direct.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A participant joined the session.
    UserJoined {
        /// The joining user.
        user_id: Uuid,
        /// Session state after the join.
        session: SessionSummary,
    },
    /// A participant marked themselves ready.
    PlayerReady {
        /// The user who is now ready.
        user_id: Uuid,
        /// Whether every participant is ready.
        all_ready: bool,
        /// Session state after the readiness change.
        session: SessionSummary,
    },
    /// The session transitioned to active and the first question is out.
    GameStarted {
        /// Question at index 0.
        current_question: RiddleSnapshot,
        /// Always 0 on start.
        question_index: usize,
        /// Advisory per-question time budget, in seconds.
        time_per_question: u32,
    },
    /// A participant's answer was scored.
    AnswerSubmitted {
        /// The answering user.
        user_id: Uuid,
        /// Correctness verdict.
        is_correct: bool,
        /// The submitted text, echoed back.
        user_answer: String,
        /// Canonical answer; only present when the submission was incorrect.
        #[serde(skip_serializing_if = "Option::is_none")]
        correct_answer: Option<String>,
        /// Index the answer was recorded for.
        question_index: usize,
        /// HP/energy consequences of this answer.
        battle_effects: Vec<BattleEffect>,
    },
    /// Consolidated effects from every answer of the finished round.
    BattleMoves {
        /// Effects from all participants' answers, in submission order.
        moves: Vec<BattleEffect>,
        /// The round the moves belong to.
        question_index: usize,
    },
    /// The next question is out.
    NextQuestion {
        /// The question now being asked.
        current_question: RiddleSnapshot,
        /// New current index.
        question_index: usize,
        /// Canonical answer of the question just closed.
        correct_answer: String,
    },
    /// The session reached its final question and is finished.
    GameFinished {
        /// Final ranking, best score first, positions starting at 1.
        leaderboard: Vec<LeaderboardEntry>,
        /// Canonical answer of the last question.
        correct_answer: String,
    },
    /// Outcome of an `attack` resolution.
    BattleResult {
        /// The attacking participant.
        attacker_id: Uuid,
        /// The participant the attack targeted.
        target_id: Uuid,
        /// Always [`BattleAction::Attack`].
        action: BattleAction,
        /// Damage actually applied (0 when absorbed by a shield).
        damage: i32,
        /// Present and true when a plain shield soaked the attack.
        #[serde(skip_serializing_if = "Option::is_none")]
        shield_broken: Option<bool>,
        /// Present and true when the damage bounced back to the attacker.
        #[serde(skip_serializing_if = "Option::is_none")]
        reflected: Option<bool>,
        /// Target HP after resolution.
        target_hp: i32,
        /// Attacker HP after resolution; present on a reflect.
        #[serde(skip_serializing_if = "Option::is_none")]
        attacker_hp: Option<i32>,
    },
    /// Direct acknowledgement of a battle action to its sender.
    BattleActionConfirmed {
        /// The action that was applied.
        action: BattleAction,
    },
    /// A participant took a non-attack action (broadcast to the session).
    ParticipantAction {
        /// The acting participant.
        user_id: Uuid,
        /// The action taken.
        action: BattleAction,
    },
    /// A participant selected a sprite archetype.
    SpriteSelected {
        /// The selecting participant.
        user_id: Uuid,
        /// The chosen archetype.
        sprite_type: SpriteKind,
    },
    /// A participant's socket closed.
    UserLeft {
        /// The departing user.
        user_id: Uuid,
    },
    /// Something went wrong handling a message from this socket.
    Error {
        /// Human-readable description.
        message: String,
    },
}

/// Outbound frame wrapping a [`ServerEvent`] with a send timestamp.
#[derive(Debug, Serialize, ToSchema)]
pub struct OutboundFrame {
    /// The event payload, flattened next to the timestamp.
    #[serde(flatten)]
    pub event: ServerEvent,
    /// RFC 3339 instant the frame was serialized at.
    pub timestamp: String,
}

impl OutboundFrame {
    /// Stamp an event with the current time.
    pub fn now(event: ServerEvent) -> Self {
        Self {
            event,
            timestamp: crate::dto::now_timestamp(),
        }
    }
}
