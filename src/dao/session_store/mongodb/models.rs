//! BSON document shapes for the session collections.
//!
//! Uuids are stored as native BSON uuid binaries (`bson::Uuid`) so filters
//! and stored values always agree on representation.

use mongodb::bson::{DateTime, Document, Uuid as BsonUuid, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    AnswerEntity, BattleAction, ParticipantEntity, RiddleEntity, SessionEntity, SessionStatus,
    SpriteKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: BsonUuid,
    code: String,
    host_id: BsonUuid,
    status: SessionStatus,
    riddle_order: Vec<BsonUuid>,
    current_question_index: u64,
    seconds_per_question: u32,
    category: Option<String>,
    created_at: DateTime,
    started_at: Option<DateTime>,
    finished_at: Option<DateTime>,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: bson_uuid(value.id),
            code: value.code,
            host_id: bson_uuid(value.host_id),
            status: value.status,
            riddle_order: value.riddle_order.into_iter().map(bson_uuid).collect(),
            current_question_index: value.current_question_index as u64,
            seconds_per_question: value.seconds_per_question,
            category: value.category,
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            finished_at: value.finished_at.map(DateTime::from_system_time),
        }
    }
}

impl From<MongoSessionDocument> for SessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            id: native_uuid(value.id),
            code: value.code,
            host_id: native_uuid(value.host_id),
            status: value.status,
            riddle_order: value.riddle_order.into_iter().map(native_uuid).collect(),
            current_question_index: value.current_question_index as usize,
            seconds_per_question: value.seconds_per_question,
            category: value.category,
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(|at| at.to_system_time()),
            finished_at: value.finished_at.map(|at| at.to_system_time()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    session_id: BsonUuid,
    user_id: BsonUuid,
    display_name: String,
    is_bot: bool,
    score: i64,
    correct_count: u32,
    answered_count: u32,
    is_ready: bool,
    hp: i32,
    max_hp: i32,
    shield_active: bool,
    charge_power: i32,
    last_action: Option<BattleAction>,
    sprite: SpriteKind,
    energy: i32,
    joined_at: DateTime,
    left_at: Option<DateTime>,
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            session_id: bson_uuid(value.session_id),
            user_id: bson_uuid(value.user_id),
            display_name: value.display_name,
            is_bot: value.is_bot,
            score: value.score,
            correct_count: value.correct_count,
            answered_count: value.answered_count,
            is_ready: value.is_ready,
            hp: value.hp,
            max_hp: value.max_hp,
            shield_active: value.shield_active,
            charge_power: value.charge_power,
            last_action: value.last_action,
            sprite: value.sprite,
            energy: value.energy,
            joined_at: DateTime::from_system_time(value.joined_at),
            left_at: value.left_at.map(DateTime::from_system_time),
        }
    }
}

impl From<MongoParticipantDocument> for ParticipantEntity {
    fn from(value: MongoParticipantDocument) -> Self {
        Self {
            session_id: native_uuid(value.session_id),
            user_id: native_uuid(value.user_id),
            display_name: value.display_name,
            is_bot: value.is_bot,
            score: value.score,
            correct_count: value.correct_count,
            answered_count: value.answered_count,
            is_ready: value.is_ready,
            hp: value.hp,
            max_hp: value.max_hp,
            shield_active: value.shield_active,
            charge_power: value.charge_power,
            last_action: value.last_action,
            sprite: value.sprite,
            energy: value.energy,
            joined_at: value.joined_at.to_system_time(),
            left_at: value.left_at.map(|at| at.to_system_time()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    session_id: BsonUuid,
    user_id: BsonUuid,
    riddle_id: BsonUuid,
    question_index: u64,
    submitted_text: String,
    is_correct: bool,
    seconds_to_answer: f64,
    submitted_at: DateTime,
}

impl From<AnswerEntity> for MongoAnswerDocument {
    fn from(value: AnswerEntity) -> Self {
        Self {
            session_id: bson_uuid(value.session_id),
            user_id: bson_uuid(value.user_id),
            riddle_id: bson_uuid(value.riddle_id),
            question_index: value.question_index as u64,
            submitted_text: value.submitted_text,
            is_correct: value.is_correct,
            seconds_to_answer: value.seconds_to_answer,
            submitted_at: DateTime::from_system_time(value.submitted_at),
        }
    }
}

impl From<MongoAnswerDocument> for AnswerEntity {
    fn from(value: MongoAnswerDocument) -> Self {
        Self {
            session_id: native_uuid(value.session_id),
            user_id: native_uuid(value.user_id),
            riddle_id: native_uuid(value.riddle_id),
            question_index: value.question_index as usize,
            submitted_text: value.submitted_text,
            is_correct: value.is_correct,
            seconds_to_answer: value.seconds_to_answer,
            submitted_at: value.submitted_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRiddleDocument {
    #[serde(rename = "_id")]
    id: BsonUuid,
    prompt: String,
    answer: String,
    category: Option<String>,
    difficulty: Option<String>,
}

impl From<RiddleEntity> for MongoRiddleDocument {
    fn from(value: RiddleEntity) -> Self {
        Self {
            id: bson_uuid(value.id),
            prompt: value.prompt,
            answer: value.answer,
            category: value.category,
            difficulty: value.difficulty,
        }
    }
}

impl From<MongoRiddleDocument> for RiddleEntity {
    fn from(value: MongoRiddleDocument) -> Self {
        Self {
            id: native_uuid(value.id),
            prompt: value.prompt,
            answer: value.answer,
            category: value.category,
            difficulty: value.difficulty,
        }
    }
}

pub fn bson_uuid(id: Uuid) -> BsonUuid {
    BsonUuid::from_bytes(id.into_bytes())
}

fn native_uuid(id: BsonUuid) -> Uuid {
    Uuid::from_bytes(id.bytes())
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": bson_uuid(id)}
}

pub fn participant_key(session_id: Uuid, user_id: Uuid) -> Document {
    doc! {
        "session_id": bson_uuid(session_id),
        "user_id": bson_uuid(user_id),
    }
}
