use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum NutriError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Unanswered questions: {}", .0.join(", "))]
    IncompleteAnswers(Vec<String>),

    #[error("Invalid answer: {0}")]
    InvalidAnswer(String),

    #[error("No job is waiting for answers")]
    NotWaitingForAnswers,

    /// The watch moved on while the request was in flight; its job was dropped.
    #[error("Request superseded by a newer watch")]
    Superseded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NutriError {
    /// Text for the error modal; API errors use the backend's own detail.
    pub fn user_message(&self) -> String {
        match self {
            NutriError::Api(e) => e.user_message(),
            NutriError::IncompleteAnswers(_) => {
                "Responda todas as perguntas para continuar.".to_string()
            }
            other => other.to_string(),
        }
    }
}
