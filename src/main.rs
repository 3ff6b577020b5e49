use std::cell::RefCell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use nutrivision::api::{AnalysisMode, ApiClient, JobApi, JobId, JobStatus, MealId};
use nutrivision::cli::{Cli, Command};
use nutrivision::config::ClientConfig;
use nutrivision::error::NutriError;
use nutrivision::feedback::{FeedbackDraft, FeedbackKind, FeedbackStore};
use nutrivision::orchestrator::{AnalysisOrchestrator, Outcome};
use nutrivision::processing::ProcessingState;
use nutrivision::ui::{self, FeedbackModal, ProcessingView, TerminalInput, TerminalPrompter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "nutrivision=debug"
    } else {
        "nutrivision=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let feedback = FeedbackStore::new();
    let _modal = FeedbackModal::attach(&feedback);

    match run(cli, &feedback).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            let message = match e.downcast_ref::<NutriError>() {
                Some(err) => err.user_message(),
                None => format!("{e:#}"),
            };
            feedback.show_error(message, None, None);
            if let Err(e) = acknowledge(&feedback).await {
                tracing::warn!(error = %e, "could not read confirmation");
            }
            ExitCode::FAILURE
        }
    }
}

/// What the processing flow starts from.
enum Flow {
    Analyze {
        image: PathBuf,
        meal_type: String,
        mode: AnalysisMode,
    },
    Watch {
        job_id: JobId,
        meal_id: MealId,
    },
}

async fn run(cli: Cli, feedback: &FeedbackStore) -> Result<bool> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if let Some(token) = cli.token {
        config.token = token;
    }
    if let Some(ms) = cli.interval_ms {
        config.poll_interval_ms = ms;
    }

    let client = Arc::new(
        ApiClient::with_timeouts(
            &config.api_url,
            config.bearer_token(),
            config.connect_timeout(),
            config.request_timeout(),
        )
        .context("failed to build HTTP client")?,
    );
    tracing::debug!(api_url = client.base_url(), "client ready");

    match cli.command {
        Command::Analyze {
            image,
            meal_type,
            mode,
        } => {
            let flow = Flow::Analyze {
                image,
                meal_type: meal_type.unwrap_or_else(|| config.meal_type.clone()),
                mode: mode.map(AnalysisMode::from).unwrap_or(config.mode),
            };
            follow(client, &config, feedback, flow).await
        }
        Command::Watch { job_id, meal } => {
            let flow = Flow::Watch {
                job_id: JobId(job_id),
                meal_id: MealId(meal),
            };
            follow(client, &config, feedback, flow).await
        }
        Command::Job { job_id } => {
            let job = client.get_job(JobId(job_id)).await.map_err(NutriError::from)?;
            let bold = Style::new().bold();
            println!("{} #{} · {}", bold.apply_to("Job"), job.id, job.status);
            if let Some(stage) = &job.etapa_atual {
                println!("  Etapa: {stage}");
            }
            if let Some(erro) = &job.erro {
                println!("  Erro: {erro}");
            }
            for (i, question) in job.questions.iter().flatten().enumerate() {
                println!("  {}. {}", i + 1, question.prompt());
                for option in question.options() {
                    println!("     - {option}");
                }
            }
            if job.status == JobStatus::Completed {
                match job.analysis() {
                    Some(Ok(analysis)) => ui::print_analysis(&analysis),
                    Some(Err(e)) => tracing::warn!(error = %e, "unreadable resultado_final"),
                    None => {}
                }
            }
            Ok(job.status != JobStatus::Failed)
        }
        Command::Meal { meal_id } => {
            let meal = client
                .get_meal(MealId(meal_id))
                .await
                .map_err(NutriError::from)?;
            ui::print_meal(&meal);
            Ok(true)
        }
    }
}

/// Run a processing flow until it settles, restarting it for as long as the
/// user picks "Tentar Novamente" on the error modal.
async fn follow(
    client: Arc<ApiClient>,
    config: &ClientConfig,
    feedback: &FeedbackStore,
    flow: Flow,
) -> Result<bool> {
    let orch = AnalysisOrchestrator::new(client, config.poll_interval(), feedback.clone());
    let spinner = Spinner::default();
    let progress = |state: &ProcessingState| spinner.show(state);

    loop {
        let mut prompter = TerminalPrompter;
        let run = async {
            match &flow {
                Flow::Analyze {
                    image,
                    meal_type,
                    mode,
                } => {
                    orch.analyze_image(image, meal_type, *mode, &mut prompter, progress)
                        .await
                }
                Flow::Watch { job_id, meal_id } => {
                    orch.watch_job(*job_id, *meal_id, &mut prompter, progress).await
                }
            }
        };

        let outcome = tokio::select! {
            outcome = run => outcome,
            _ = tokio::signal::ctrl_c() => {
                orch.poller().cancel();
                Ok(Outcome::Cancelled)
            }
        };
        spinner.stop();

        match outcome? {
            Outcome::Done { job_id, meal } => {
                tracing::info!(%job_id, meal_id = %meal.id, "analysis finished");
                feedback.show_feedback(FeedbackDraft {
                    title: Some("Sucesso".to_string()),
                    persistent: Some(false),
                    ..FeedbackDraft::new(FeedbackKind::Success, "Análise concluída!")
                });
                ui::print_meal(&meal);
                return Ok(true);
            }
            Outcome::Failed { .. } => {
                // Closed input means nobody can choose "Tentar Novamente".
                if let Err(e) = acknowledge(feedback).await {
                    tracing::warn!(error = %e, "no answer to the error modal");
                    return Ok(false);
                }
                if !orch.take_retry() {
                    return Ok(false);
                }
                tracing::info!("retrying from the start");
            }
            Outcome::Cancelled => {
                feedback.show_feedback(FeedbackDraft {
                    persistent: Some(false),
                    ..FeedbackDraft::new(FeedbackKind::Info, "Análise cancelada.")
                });
                return Ok(false);
            }
        }
    }
}

async fn acknowledge(feedback: &FeedbackStore) -> Result<()> {
    let store = feedback.clone();
    tokio::task::spawn_blocking(move || ui::acknowledge(&store, &mut TerminalInput::new())).await??;
    Ok(())
}

/// Shows the spinner only while the job is being processed.
#[derive(Default)]
struct Spinner(RefCell<Option<ProcessingView>>);

impl Spinner {
    fn show(&self, state: &ProcessingState) {
        let mut slot = self.0.borrow_mut();
        if matches!(state, ProcessingState::Processing { .. }) {
            slot.get_or_insert_with(ProcessingView::start).update(state);
        } else if let Some(view) = slot.take() {
            view.finish();
        }
    }

    fn stop(&self) {
        if let Some(view) = self.0.borrow_mut().take() {
            view.finish();
        }
    }
}
