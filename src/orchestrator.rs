use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::api::{AnalysisMode, ApiClient, JobId, MealDetail, MealId};
use crate::error::NutriError;
use crate::feedback::{FeedbackDraft, FeedbackKind, FeedbackStore};
use crate::poller::JobPoller;
use crate::processing::{AnswerSheet, ProcessingState, Question};

/// Title of the error modal shown when an analysis cannot finish.
pub const FAILURE_TITLE: &str = "Ops! Tivemos um probleminha";

/// Collects answers when a job stops in `waiting_user`.
pub trait Prompter {
    fn answer(&mut self, questions: &[Question]) -> impl Future<Output = io::Result<AnswerSheet>>;
}

/// How a processing flow ended.
#[derive(Debug)]
pub enum Outcome {
    /// The job completed and the meal's result view was loaded.
    Done { job_id: JobId, meal: MealDetail },
    /// The job failed or a request broke; an error modal is showing.
    Failed { message: String },
    /// The watch was cancelled before it settled.
    Cancelled,
}

/// Drives the whole "upload → analyze → processing → result" flow.
pub struct AnalysisOrchestrator {
    client: Arc<ApiClient>,
    poller: JobPoller<ApiClient>,
    feedback: FeedbackStore,
    retry_requested: Arc<AtomicBool>,
}

impl AnalysisOrchestrator {
    pub fn new(client: Arc<ApiClient>, interval: Duration, feedback: FeedbackStore) -> Self {
        let poller = JobPoller::new(Arc::clone(&client), interval);
        Self {
            client,
            poller,
            feedback,
            retry_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn poller(&self) -> &JobPoller<ApiClient> {
        &self.poller
    }

    /// Upload a photo, start its analysis and follow it to the end.
    pub async fn analyze_image(
        &self,
        image: &Path,
        meal_type: &str,
        mode: AnalysisMode,
        prompter: &mut impl Prompter,
        progress: impl Fn(&ProcessingState),
    ) -> Result<Outcome, NutriError> {
        let bytes = tokio::fs::read(image).await?;
        let file_name = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("refeicao.jpg");

        let upload = match self.client.upload_image(file_name, bytes, meal_type).await {
            Ok(upload) => upload,
            Err(e) => return Ok(self.fail(e.user_message())),
        };
        tracing::info!(meal_id = %upload.meal_id, "image uploaded");

        // A failed analyze request is published as `Error` by the poller.
        if let Err(e) = self.poller.start_analysis(upload.meal_id, mode).await {
            tracing::warn!(meal_id = %upload.meal_id, error = %e, "analysis request failed");
        }
        self.drive(prompter, progress).await
    }

    /// Follow an existing job, as when reopening the processing screen.
    pub async fn watch_job(
        &self,
        job_id: JobId,
        meal_id: MealId,
        prompter: &mut impl Prompter,
        progress: impl Fn(&ProcessingState),
    ) -> Result<Outcome, NutriError> {
        self.poller.watch(job_id, meal_id);
        self.drive(prompter, progress).await
    }

    /// Show the error modal. Its primary action asks for a fresh start.
    pub fn show_failure(&self, message: &str) {
        let retry = Arc::clone(&self.retry_requested);
        let draft = FeedbackDraft {
            title: Some(FAILURE_TITLE.to_string()),
            action: Some(self.feedback.closing_action("Tentar Novamente", move || {
                retry.store(true, Ordering::SeqCst);
            })),
            secondary_action: Some(self.feedback.closing_action("Sair", || {})),
            ..FeedbackDraft::new(FeedbackKind::Error, message)
        };
        self.feedback.show_feedback(draft);
    }

    /// Whether the user picked "Tentar Novamente" since the last call.
    pub fn take_retry(&self) -> bool {
        self.retry_requested.swap(false, Ordering::SeqCst)
    }

    fn fail(&self, message: String) -> Outcome {
        self.show_failure(&message);
        Outcome::Failed { message }
    }

    async fn drive(
        &self,
        prompter: &mut impl Prompter,
        progress: impl Fn(&ProcessingState),
    ) -> Result<Outcome, NutriError> {
        let mut rx = self.poller.subscribe();

        loop {
            let state = rx.borrow_and_update().clone();
            progress(&state);

            match state {
                ProcessingState::Processing { .. } => {
                    if rx.changed().await.is_err() {
                        return Ok(Outcome::Cancelled);
                    }
                }
                ProcessingState::WaitingUser { questions, .. } => {
                    let sheet = prompter.answer(&questions).await?;
                    match self.poller.submit_answers(&sheet).await {
                        Ok(job_id) => tracing::info!(%job_id, "answers submitted"),
                        // The poller has already published the state that follows.
                        Err(NutriError::Api(_) | NutriError::Superseded) => {}
                        Err(NutriError::IncompleteAnswers(missing)) => {
                            tracing::warn!(?missing, "answers incomplete, asking again");
                        }
                        Err(e) => return Err(e),
                    }
                }
                ProcessingState::Done {
                    job_id, meal_id, ..
                } => {
                    return match self.client.get_meal(meal_id).await {
                        Ok(meal) => Ok(Outcome::Done { job_id, meal }),
                        Err(e) => Ok(self.fail(e.user_message())),
                    };
                }
                ProcessingState::Error { message } => return Ok(self.fail(message)),
                ProcessingState::Idle => return Ok(Outcome::Cancelled),
            }
        }
    }
}
