//! Session persistence abstraction and its backends.

/// In-memory backend used by tests and storage-less deployments.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    AnswerEntity, BattleAction, ParticipantEntity, RiddleEntity, SessionEntity, SpriteKind,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for sessions, participants,
/// answers, and riddles.
///
/// Every method is an independent, non-transactional call; callers that
/// read-modify-write across several of them accept last-write-wins
/// semantics.
pub trait SessionStore: Send + Sync {
    /// Persist a new session together with its riddle list.
    fn create_session(
        &self,
        session: SessionEntity,
        riddles: Vec<RiddleEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Resolve a join code to its session.
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;

    /// Fetch a session and all of its participant rows.
    fn session_with_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<(SessionEntity, Vec<ParticipantEntity>)>>>;

    /// Upsert a participant row keyed by `(session_id, user_id)`.
    fn join_session(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Set a participant's readiness flag.
    fn mark_ready(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Move a session to `active` and stamp `started_at`.
    fn start_session(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;

    /// Persist a new current question index.
    fn advance_question_index(
        &self,
        session_id: Uuid,
        index: usize,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Move a session to `finished` and stamp `finished_at`.
    fn finish_session(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;

    /// Record a submitted answer. Answers are append-only.
    fn save_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>>;

    /// Set a participant's score and answer counters.
    fn update_score(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        score: i64,
        correct_count: u32,
        answered_count: u32,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Set a participant's HP pool.
    fn update_hp(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        hp: i32,
        max_hp: i32,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Raise or clear a participant's shield flag.
    fn update_shield(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        active: bool,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Set a participant's banked charge power.
    fn update_charge(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        charge_power: i32,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Record the most recent battle action a participant took.
    fn update_last_action(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        action: BattleAction,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Set a participant's selected sprite archetype.
    fn update_sprite(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        sprite: SpriteKind,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Set a participant's energy.
    fn update_energy(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        energy: i32,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Stamp `left_at` on a participant row without deleting it.
    fn mark_left(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// All answers recorded for one question index of a session.
    fn answers_for_question(
        &self,
        session_id: Uuid,
        question_index: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;

    /// Fetch a riddle by id.
    fn riddle_by_id(
        &self,
        riddle_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RiddleEntity>>>;

    /// Verify the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Attempt to re-establish a lost backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Short name of the backend, reported by the health route.
    fn backend_name(&self) -> &'static str;
}
