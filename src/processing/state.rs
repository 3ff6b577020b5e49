use std::fmt;

use crate::api::{JobId, JobResponse, JobStatus, MealId};

use super::question::Question;

/// Message shown when a failed job carries no `erro` of its own.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Erro na análise";

/// The states of the processing screen.
///
/// A watch flows: PROCESSING → (WAITING_USER → PROCESSING)* → DONE | ERROR
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingState {
    /// Nothing is being watched.
    Idle,
    Processing {
        job_id: JobId,
        stage: Option<String>,
    },
    /// Polling is paused until answers are submitted.
    WaitingUser {
        job_id: JobId,
        meal_id: MealId,
        questions: Vec<Question>,
    },
    Done {
        job_id: JobId,
        meal_id: MealId,
        result: Option<serde_json::Value>,
    },
    /// Terminal. Recovery restarts the whole flow from the entry point.
    Error { message: String },
}

impl ProcessingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Done { .. } | ProcessingState::Error { .. })
    }

    /// True once the poller is no longer running for the current watch.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ProcessingState::Processing { .. })
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingState::Idle => write!(f, "IDLE"),
            ProcessingState::Processing { .. } => write!(f, "PROCESSING"),
            ProcessingState::WaitingUser { .. } => write!(f, "WAITING_USER"),
            ProcessingState::Done { .. } => write!(f, "DONE"),
            ProcessingState::Error { .. } => write!(f, "ERROR"),
        }
    }
}

/// What a single job snapshot means for the processing screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Still running; keep polling.
    Continue(Option<String>),
    /// The backend needs answers before it can go on.
    AwaitAnswers(Vec<Question>),
    Done(Option<serde_json::Value>),
    Fail(String),
}

impl Transition {
    /// Every transition except `Continue` ends the current poll loop.
    pub fn stops_polling(&self) -> bool {
        !matches!(self, Transition::Continue(_))
    }

    /// The state this transition leads to for the given watch.
    pub fn into_state(self, job_id: JobId, meal_id: MealId) -> ProcessingState {
        match self {
            Transition::Continue(stage) => ProcessingState::Processing { job_id, stage },
            Transition::AwaitAnswers(questions) => ProcessingState::WaitingUser {
                job_id,
                meal_id,
                questions,
            },
            Transition::Done(result) => ProcessingState::Done {
                job_id,
                meal_id,
                result,
            },
            Transition::Fail(message) => ProcessingState::Error { message },
        }
    }
}

/// Maps job snapshots to transitions.
pub struct ProcessingMachine;

impl ProcessingMachine {
    /// Compute the transition for a freshly fetched job.
    ///
    /// - `completed` → `Done` with the final result.
    /// - `failed` → `Fail` with the server message, or a default.
    /// - `waiting_user` → `AwaitAnswers` with the questions (possibly none).
    /// - anything else is in progress.
    pub fn on_job(job: &JobResponse) -> Transition {
        match job.status {
            JobStatus::Completed => Transition::Done(job.resultado_final.clone()),
            JobStatus::Failed => Transition::Fail(
                job.erro
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            ),
            JobStatus::WaitingUser => {
                Transition::AwaitAnswers(job.questions.clone().unwrap_or_default())
            }
            JobStatus::Received
            | JobStatus::Running
            | JobStatus::Processing
            | JobStatus::Other => Transition::Continue(job.etapa_atual.clone()),
        }
    }
}
