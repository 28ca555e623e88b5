use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate user_id '{user_id}' in account table")]
    DuplicateUser { user_id: String },

    #[error("Column '{column}' holds unparseable value '{value}'")]
    InvalidColumn { column: &'static str, value: String },

    #[error("Account table is empty; nothing to score")]
    EmptyPopulation,

    #[error("Master join is missing the {stage} row for user '{user_id}'")]
    IncompleteJoin { user_id: String, stage: &'static str },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
