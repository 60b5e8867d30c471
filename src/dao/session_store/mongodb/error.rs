use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB DAO operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save session `{id}`")]
    SaveSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load session `{id}`")]
    LoadSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to look up session code `{code}`")]
    LookupCode {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save participant `{user_id}` in session `{session_id}`")]
    SaveParticipant {
        session_id: Uuid,
        user_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load participants of session `{session_id}`")]
    LoadParticipants {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save answer for session `{session_id}`")]
    SaveAnswer {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load answers of session `{session_id}`")]
    LoadAnswers {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save riddle `{id}`")]
    SaveRiddle {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load riddle `{id}`")]
    LoadRiddle {
        id: Uuid,
        #[source]
        source: MongoError,
    },
}
