//! Fixed-interval job poller driving the processing screen.
//!
//! Each call to [`JobPoller::watch`] starts a new *generation*. Poll results
//! are tagged with the generation and job id they were issued for, and are
//! dropped unless both still match the current watch. Superseding a watch
//! aborts its timer together with its in-flight fetches.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::api::{AnalysisMode, ApiError, JobApi, JobId, JobResponse, MealId};
use crate::error::NutriError;
use crate::processing::{AnswerSheet, ProcessingMachine, ProcessingState};

/// Cadence used by the web client for job status.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Identity of one poll attempt: the watch generation and the job it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTag {
    pub generation: u64,
    pub job_id: JobId,
}

/// What happened to a poll result handed to [`Inner::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    /// The result belonged to a superseded or already settled watch.
    Stale,
    Continue,
    Stop,
}

struct Watch {
    tag: PollTag,
    meal_id: MealId,
    timer: Option<AbortHandle>,
    settled: bool,
    /// Sequence number of the newest tick applied so far.
    last_seq: u64,
}

#[derive(Default)]
struct Shared {
    generation: u64,
    current: Option<Watch>,
    submitting: bool,
}

struct Inner<A> {
    api: Arc<A>,
    interval: Duration,
    shared: Mutex<Shared>,
    state: watch::Sender<ProcessingState>,
    live_timers: AtomicUsize,
}

/// Polls a backend job until it settles and publishes the resulting
/// [`ProcessingState`].
///
/// Methods that start polling spawn onto the current Tokio runtime.
pub struct JobPoller<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for JobPoller<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: JobApi> JobPoller<A> {
    pub fn new(api: Arc<A>, interval: Duration) -> Self {
        let (state, _) = watch::channel(ProcessingState::Idle);
        Self {
            inner: Arc::new(Inner {
                api,
                interval,
                shared: Mutex::new(Shared::default()),
                state,
                live_timers: AtomicUsize::new(0),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> ProcessingState {
        self.inner.state.borrow().clone()
    }

    /// Tag of the watch currently in effect, if any.
    pub fn current_tag(&self) -> Option<PollTag> {
        self.inner.lock().current.as_ref().map(|w| w.tag)
    }

    /// Number of poll loops still alive. At most one once superseded loops
    /// have been torn down.
    pub fn active_timers(&self) -> usize {
        self.inner.live_timers.load(Ordering::SeqCst)
    }

    /// Start watching `job_id`, superseding any previous watch.
    ///
    /// The old timer is aborted under the same lock that arms the new one.
    pub fn watch(&self, job_id: JobId, meal_id: MealId) -> PollTag {
        let mut shared = self.inner.lock();
        self.arm(&mut shared, job_id, meal_id)
    }

    fn arm(&self, shared: &mut Shared, job_id: JobId, meal_id: MealId) -> PollTag {
        shared.generation += 1;
        let tag = PollTag {
            generation: shared.generation,
            job_id,
        };

        if let Some(old) = shared.current.take() {
            if let Some(timer) = old.timer {
                timer.abort();
            }
            tracing::debug!(
                old_job = %old.tag.job_id,
                old_generation = old.tag.generation,
                "superseded previous watch"
            );
        }

        self.inner
            .state
            .send_replace(ProcessingState::Processing { job_id, stage: None });

        let handle = tokio::spawn(poll_loop(Arc::clone(&self.inner), tag));
        shared.current = Some(Watch {
            tag,
            meal_id,
            timer: Some(handle.abort_handle()),
            settled: false,
            last_seq: 0,
        });
        tracing::info!(%job_id, %meal_id, generation = tag.generation, "watching job");
        tag
    }

    /// Stop polling and forget the current watch. Late results are ignored.
    pub fn cancel(&self) {
        let mut shared = self.inner.lock();
        shared.generation += 1;
        shared.submitting = false;
        if let Some(old) = shared.current.take() {
            if let Some(timer) = old.timer {
                timer.abort();
            }
            tracing::info!(job_id = %old.tag.job_id, "watch cancelled");
        }
        self.inner.state.send_replace(ProcessingState::Idle);
    }

    /// Ask the backend to analyze `meal_id` and watch the job it creates.
    pub async fn start_analysis(
        &self,
        meal_id: MealId,
        mode: AnalysisMode,
    ) -> Result<JobId, NutriError> {
        self.cancel();
        let generation = self.inner.lock().generation;

        match self.inner.api.analyze(meal_id, mode).await {
            Ok(ticket) => self.arm_if_current(generation, ticket.job_id, meal_id),
            Err(e) => {
                self.inner.fail_if_current(generation, &e);
                Err(e.into())
            }
        }
    }

    /// Submit answers for the job currently waiting on the user and watch the
    /// new job the backend creates for them.
    pub async fn submit_answers(&self, sheet: &AnswerSheet) -> Result<JobId, NutriError> {
        let (meal_id, request, generation) = {
            let mut shared = self.inner.lock();
            if shared.submitting {
                return Err(NutriError::NotWaitingForAnswers);
            }
            let (meal_id, questions) = match &*self.inner.state.borrow() {
                ProcessingState::WaitingUser {
                    meal_id, questions, ..
                } => (*meal_id, questions.clone()),
                _ => return Err(NutriError::NotWaitingForAnswers),
            };
            if !sheet.is_complete(&questions) {
                let missing = sheet
                    .missing(&questions)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                return Err(NutriError::IncompleteAnswers(missing));
            }
            shared.submitting = true;
            (meal_id, sheet.to_request(&questions), shared.generation)
        };

        let result = self.inner.api.submit_answers(meal_id, &request).await;
        self.inner.lock().submitting = false;

        match result {
            Ok(ticket) => self.arm_if_current(generation, ticket.job_id, meal_id),
            Err(e) => {
                self.inner.fail_if_current(generation, &e);
                Err(e.into())
            }
        }
    }

    /// Watch the job a request created, unless the watch was superseded or
    /// cancelled while that request was in flight.
    fn arm_if_current(
        &self,
        generation: u64,
        job_id: JobId,
        meal_id: MealId,
    ) -> Result<JobId, NutriError> {
        let mut shared = self.inner.lock();
        if shared.generation != generation {
            tracing::debug!(
                %job_id,
                generation,
                current_generation = shared.generation,
                "dropping job created for a superseded watch"
            );
            return Err(NutriError::Superseded);
        }
        self.arm(&mut shared, job_id, meal_id);
        Ok(job_id)
    }

    /// Wait until the current watch leaves `Processing`.
    pub async fn settled(&self) -> ProcessingState {
        let mut rx = self.subscribe();
        match rx.wait_for(ProcessingState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}

impl<A: JobApi> Inner<A> {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one poll result, unless it belongs to a superseded or already
    /// settled watch.
    ///
    /// Overlapping ticks may complete out of order; an in-progress result
    /// older than one already applied is skipped so the stage never goes
    /// backwards. Settling results are applied whatever their order.
    fn apply(&self, tag: PollTag, seq: u64, result: Result<JobResponse, ApiError>) -> Applied {
        let mut shared = self.lock();
        let watch = match shared.current.as_mut() {
            Some(w) if w.tag == tag && !w.settled => w,
            _ => {
                tracing::debug!(
                    job_id = %tag.job_id,
                    generation = tag.generation,
                    "discarding stale poll result"
                );
                return Applied::Stale;
            }
        };

        let state = match result {
            Ok(job) => {
                tracing::debug!(job_id = %job.id, status = %job.status, "job status");
                ProcessingMachine::on_job(&job).into_state(tag.job_id, watch.meal_id)
            }
            Err(e) => {
                tracing::warn!(job_id = %tag.job_id, error = %e, "job poll failed");
                ProcessingState::Error {
                    message: e.user_message(),
                }
            }
        };

        let stop = state.is_settled();
        if !stop && seq < watch.last_seq {
            tracing::debug!(
                job_id = %tag.job_id,
                seq,
                last_seq = watch.last_seq,
                "skipping out-of-order poll result"
            );
            return Applied::Continue;
        }
        watch.last_seq = watch.last_seq.max(seq);
        if stop {
            watch.settled = true;
            watch.timer = None;
            tracing::info!(job_id = %tag.job_id, state = %state, "job settled");
        }
        self.state.send_replace(state);

        if stop { Applied::Stop } else { Applied::Continue }
    }

    /// Publish an `Error` for a failed request, unless the watch moved on
    /// while it was in flight.
    fn fail_if_current(&self, generation: u64, error: &ApiError) {
        let shared = self.lock();
        if shared.generation == generation {
            tracing::warn!(error = %error, "request failed");
            self.state.send_replace(ProcessingState::Error {
                message: error.user_message(),
            });
        }
    }
}

/// Decrements the live-timer count when a poll loop ends or is aborted.
struct LiveTimer<'a>(&'a AtomicUsize);

impl<'a> LiveTimer<'a> {
    fn register(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveTimer<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn poll_loop<A: JobApi>(inner: Arc<Inner<A>>, tag: PollTag) {
    let _live = LiveTimer::register(&inner.live_timers);
    let mut ticker = tokio::time::interval(inner.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Dropping the set aborts whatever is still in flight.
    let mut in_flight = JoinSet::new();
    let mut seq = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                seq += 1;
                tracing::trace!(job_id = %tag.job_id, generation = tag.generation, seq, "poll tick");
                let api = Arc::clone(&inner.api);
                let tick = seq;
                in_flight.spawn(async move { (tick, api.get_job(tag.job_id).await) });
            }
            Some(joined) = in_flight.join_next() => {
                let (tick, result) = match joined {
                    Ok(polled) => polled,
                    Err(e) => {
                        tracing::error!(job_id = %tag.job_id, error = %e, "poll task died");
                        continue;
                    }
                };
                match inner.apply(tag, tick, result) {
                    Applied::Continue => {}
                    Applied::Stop | Applied::Stale => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};

    use super::*;
    use crate::api::{AnswersRequest, JobTicket};
    use crate::processing::Question;

    enum Reply {
        Job(serde_json::Value),
        Fail(u16, &'static str),
    }

    /// In-memory backend. Each job replays its script in order and then
    /// repeats the last reply.
    #[derive(Default)]
    struct FakeApi {
        scripts: Mutex<HashMap<u64, VecDeque<Reply>>>,
        delays: Mutex<HashMap<u64, Duration>>,
        analyze_delays: Mutex<HashMap<u64, Duration>>,
        answers_delay: Mutex<Option<Duration>>,
        calls: Mutex<Vec<JobId>>,
        submitted: Mutex<Vec<AnswersRequest>>,
        next_ticket: Mutex<VecDeque<u64>>,
    }

    impl FakeApi {
        fn script(self, job_id: u64, replies: Vec<Reply>) -> Self {
            self.scripts.lock().unwrap().insert(job_id, replies.into());
            self
        }

        fn delay(self, job_id: u64, delay: Duration) -> Self {
            self.delays.lock().unwrap().insert(job_id, delay);
            self
        }

        fn analyze_delay(self, meal_id: u64, delay: Duration) -> Self {
            self.analyze_delays.lock().unwrap().insert(meal_id, delay);
            self
        }

        fn answers_delay(self, delay: Duration) -> Self {
            *self.answers_delay.lock().unwrap() = Some(delay);
            self
        }

        fn tickets(self, ids: &[u64]) -> Self {
            self.next_ticket.lock().unwrap().extend(ids.iter().copied());
            self
        }

        fn calls_for(&self, job_id: u64) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|id| id.0 == job_id)
                .count()
        }

        fn next_reply(&self, job_id: u64) -> Result<JobResponse, ApiError> {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.get_mut(&job_id).expect("unscripted job");
            let reply = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                match script.front().unwrap() {
                    Reply::Job(v) => Reply::Job(v.clone()),
                    Reply::Fail(s, d) => Reply::Fail(*s, *d),
                }
            };
            match reply {
                Reply::Job(v) => Ok(serde_json::from_value(v).unwrap()),
                Reply::Fail(status, detail) => Err(ApiError::Status {
                    status,
                    detail: detail.into(),
                }),
            }
        }

        fn ticket(&self) -> Result<JobTicket, ApiError> {
            let id = self.next_ticket.lock().unwrap().pop_front().expect("no ticket");
            Ok(JobTicket { job_id: JobId(id) })
        }
    }

    impl JobApi for FakeApi {
        async fn get_job(&self, job_id: JobId) -> Result<JobResponse, ApiError> {
            self.calls.lock().unwrap().push(job_id);
            let delay = self.delays.lock().unwrap().get(&job_id.0).copied();
            let reply = self.next_reply(job_id.0);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            reply
        }

        async fn analyze(&self, meal_id: MealId, _mode: AnalysisMode) -> Result<JobTicket, ApiError> {
            let ticket = self.ticket();
            let delay = self.analyze_delays.lock().unwrap().get(&meal_id.0).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            ticket
        }

        async fn submit_answers(
            &self,
            _meal_id: MealId,
            answers: &AnswersRequest,
        ) -> Result<JobTicket, ApiError> {
            self.submitted.lock().unwrap().push(answers.clone());
            let ticket = self.ticket();
            let delay = *self.answers_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            ticket
        }
    }

    fn running(id: u64) -> Reply {
        Reply::Job(serde_json::json!({"id": id, "status": "running", "etapa_atual": "Analisando"}))
    }

    fn completed(id: u64) -> Reply {
        Reply::Job(serde_json::json!({
            "id": id, "status": "completed", "resultado_final": {"confianca": "alta"}
        }))
    }

    fn waiting(id: u64) -> Reply {
        Reply::Job(serde_json::json!({
            "id": id,
            "status": "waiting_user",
            "questions": [{"id": "q1", "question": "Picante?", "options": ["Sim", "Não"]}]
        }))
    }

    fn poller(api: FakeApi) -> (JobPoller<FakeApi>, Arc<FakeApi>) {
        let api = Arc::new(api);
        (JobPoller::new(Arc::clone(&api), DEFAULT_POLL_INTERVAL), api)
    }

    async fn idle_for(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn completed_job_is_done_and_polling_stops() {
        let (poller, api) = poller(FakeApi::default().script(1, vec![running(1), running(1), completed(1)]));

        poller.watch(JobId(1), MealId(10));
        let state = poller.settled().await;

        match state {
            ProcessingState::Done { job_id, meal_id, result } => {
                assert_eq!(job_id, JobId(1));
                assert_eq!(meal_id, MealId(10));
                assert!(result.is_some());
            }
            other => panic!("expected Done, got {other:?}"),
        }
        assert_eq!(api.calls_for(1), 3);

        idle_for(30).await;
        assert_eq!(api.calls_for(1), 3, "no ticks after a terminal state");
        assert_eq!(poller.active_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_shows_server_message_and_stops() {
        let failed = Reply::Job(serde_json::json!({
            "id": 42, "status": "failed", "erro": "Falha ao processar imagem"
        }));
        let (poller, api) = poller(FakeApi::default().script(42, vec![failed]));

        poller.watch(JobId(42), MealId(1));
        let state = poller.settled().await;

        assert_eq!(
            state,
            ProcessingState::Error {
                message: "Falha ao processar imagem".into()
            }
        );
        idle_for(30).await;
        assert_eq!(api.calls_for(42), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_user_pauses_with_one_choice_question() {
        let (poller, api) = poller(FakeApi::default().script(42, vec![waiting(42)]));

        poller.watch(JobId(42), MealId(1));
        let state = poller.settled().await;

        let questions = match state {
            ProcessingState::WaitingUser { questions, .. } => questions,
            other => panic!("expected WaitingUser, got {other:?}"),
        };
        assert_eq!(questions.len(), 1);
        assert!(matches!(&questions[0], Question::Choice { options, .. } if options.len() == 2));

        let mut sheet = AnswerSheet::new();
        assert!(!sheet.is_complete(&questions));
        sheet.choose(&questions[0], 0).unwrap();
        assert!(sheet.is_complete(&questions));

        idle_for(30).await;
        assert_eq!(api.calls_for(42), 1, "polling paused while waiting on the user");
    }

    #[tokio::test(start_paused = true)]
    async fn submitting_answers_restarts_on_new_job() {
        let api = FakeApi::default()
            .script(42, vec![waiting(42)])
            .script(43, vec![running(43), completed(43)])
            .tickets(&[43]);
        let (poller, api) = poller(api);

        poller.watch(JobId(42), MealId(7));
        poller.settled().await;

        let mut sheet = AnswerSheet::new();
        sheet.set("q1", "Sim");
        let new_id = poller.submit_answers(&sheet).await.unwrap();
        assert_eq!(new_id, JobId(43));
        assert_eq!(poller.current_tag().unwrap().job_id, JobId(43));

        let state = poller.settled().await;
        assert!(matches!(state, ProcessingState::Done { job_id: JobId(43), meal_id: MealId(7), .. }));
        assert_eq!(api.calls_for(42), 1);
        assert_eq!(api.submitted.lock().unwrap()[0].answers["q1"], "Sim");
    }

    #[tokio::test(start_paused = true)]
    async fn incomplete_answers_are_refused_without_a_request() {
        let (poller, api) = poller(FakeApi::default().script(42, vec![waiting(42)]));
        poller.watch(JobId(42), MealId(7));
        poller.settled().await;

        let err = poller.submit_answers(&AnswerSheet::new()).await.unwrap_err();
        match err {
            NutriError::IncompleteAnswers(missing) => assert_eq!(missing, vec!["q1".to_string()]),
            other => panic!("expected IncompleteAnswers, got {other:?}"),
        }
        assert!(api.submitted.lock().unwrap().is_empty());
        assert!(matches!(poller.state(), ProcessingState::WaitingUser { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn answers_outside_waiting_user_are_refused() {
        let (poller, _api) = poller(FakeApi::default().script(1, vec![running(1)]));
        poller.watch(JobId(1), MealId(1));

        let err = poller.submit_answers(&AnswerSheet::new()).await.unwrap_err();
        assert!(matches!(err, NutriError::NotWaitingForAnswers));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_error_is_terminal_without_retry() {
        let (poller, api) = poller(
            FakeApi::default().script(5, vec![running(5), Reply::Fail(500, "Erro interno")]),
        );

        poller.watch(JobId(5), MealId(1));
        let state = poller.settled().await;

        assert_eq!(
            state,
            ProcessingState::Error {
                message: "Erro interno".into()
            }
        );
        idle_for(30).await;
        assert_eq!(api.calls_for(5), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_result_does_not_touch_newer_watch() {
        let api = FakeApi::default()
            .script(1, vec![running(1)])
            .script(2, vec![running(2)]);
        let (poller, _api) = poller(api);

        let tag_a = poller.watch(JobId(1), MealId(1));
        let tag_b = poller.watch(JobId(2), MealId(1));
        assert_ne!(tag_a, tag_b);

        let late: JobResponse = serde_json::from_value(serde_json::json!({
            "id": 1, "status": "completed", "resultado_final": {}
        }))
        .unwrap();
        assert_eq!(poller.inner.apply(tag_a, 1, Ok(late)), Applied::Stale);
        assert_eq!(
            poller.state(),
            ProcessingState::Processing {
                job_id: JobId(2),
                stage: None
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_leaves_a_single_timer() {
        let api = FakeApi::default()
            .script(1, vec![running(1)])
            .script(2, vec![running(2)]);
        let (poller, api) = poller(api);

        poller.watch(JobId(1), MealId(1));
        idle_for(4).await;
        assert_eq!(poller.active_timers(), 1);

        poller.watch(JobId(2), MealId(1));
        idle_for(1).await;
        assert_eq!(poller.active_timers(), 1);

        let calls_a = api.calls_for(1);
        idle_for(30).await;
        assert_eq!(api.calls_for(1), calls_a, "old watch issues no more ticks");
        assert!(api.calls_for(2) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_result_for_old_job_is_dropped() {
        let api = FakeApi::default()
            .script(1, vec![completed(1)])
            .delay(1, Duration::from_secs(5))
            .script(2, vec![running(2)]);
        let (poller, _api) = poller(api);

        poller.watch(JobId(1), MealId(1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        poller.watch(JobId(2), MealId(1));

        idle_for(10).await;
        assert!(matches!(
            poller.state(),
            ProcessingState::Processing { job_id: JobId(2), .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_slow_fetches_are_tolerated() {
        let api = FakeApi::default()
            .script(3, vec![running(3), completed(3)])
            .delay(3, Duration::from_secs(4));
        let (poller, api) = poller(api);

        poller.watch(JobId(3), MealId(1));
        let state = poller.settled().await;

        assert!(matches!(state, ProcessingState::Done { job_id: JobId(3), .. }));
        let calls = api.calls_for(3);
        assert!(calls >= 2, "ticks keep firing while fetches are slow");
        idle_for(30).await;
        assert_eq!(api.calls_for(3), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_goes_idle_and_stops_ticks() {
        let (poller, api) = poller(FakeApi::default().script(1, vec![running(1)]));

        poller.watch(JobId(1), MealId(1));
        idle_for(2).await;
        poller.cancel();
        idle_for(1).await;

        assert_eq!(poller.state(), ProcessingState::Idle);
        assert_eq!(poller.active_timers(), 0);
        assert!(poller.current_tag().is_none());
        let calls = api.calls_for(1);
        idle_for(30).await;
        assert_eq!(api.calls_for(1), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn start_analysis_watches_the_returned_job() {
        let api = FakeApi::default()
            .script(9, vec![running(9), completed(9)])
            .tickets(&[9]);
        let (poller, _api) = poller(api);

        let job_id = poller.start_analysis(MealId(4), AnalysisMode::Full).await.unwrap();
        assert_eq!(job_id, JobId(9));

        let state = poller.settled().await;
        assert!(matches!(state, ProcessingState::Done { job_id: JobId(9), meal_id: MealId(4), .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_analyze_reply_does_not_override_newer_analysis() {
        let api = FakeApi::default()
            .script(100, vec![running(100)])
            .script(200, vec![running(200)])
            .tickets(&[100, 200])
            .analyze_delay(1, Duration::from_secs(5));
        let (poller, api) = poller(api);

        let slow = tokio::spawn({
            let poller = poller.clone();
            async move { poller.start_analysis(MealId(1), AnalysisMode::Simple).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let job_id = poller.start_analysis(MealId(2), AnalysisMode::Simple).await.unwrap();
        assert_eq!(job_id, JobId(200));

        let err = slow.await.unwrap().unwrap_err();
        assert!(matches!(err, NutriError::Superseded));
        assert_eq!(poller.current_tag().unwrap().job_id, JobId(200));
        assert!(matches!(
            poller.state(),
            ProcessingState::Processing { job_id: JobId(200), .. }
        ));

        idle_for(10).await;
        assert_eq!(poller.active_timers(), 1);
        assert_eq!(api.calls_for(100), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_answer_submission_stays_idle() {
        let api = FakeApi::default()
            .script(42, vec![waiting(42)])
            .script(300, vec![running(300)])
            .tickets(&[300])
            .answers_delay(Duration::from_secs(5));
        let (poller, api) = poller(api);

        poller.watch(JobId(42), MealId(7));
        poller.settled().await;

        let mut sheet = AnswerSheet::new();
        sheet.set("q1", "Sim");
        let submit = tokio::spawn({
            let poller = poller.clone();
            async move { poller.submit_answers(&sheet).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.cancel();

        let err = submit.await.unwrap().unwrap_err();
        assert!(matches!(err, NutriError::Superseded));
        assert_eq!(poller.state(), ProcessingState::Idle);
        assert!(poller.current_tag().is_none());

        idle_for(10).await;
        assert_eq!(poller.active_timers(), 0);
        assert_eq!(api.calls_for(300), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn older_tick_cannot_roll_the_stage_back() {
        let (poller, _api) = poller(FakeApi::default().script(1, vec![running(1)]));
        let tag = poller.watch(JobId(1), MealId(1));

        let stage = |label: &str| -> Result<JobResponse, ApiError> {
            Ok(serde_json::from_value(serde_json::json!({
                "id": 1, "status": "running", "etapa_atual": label
            }))
            .unwrap())
        };

        assert_eq!(poller.inner.apply(tag, 100, stage("Calculando macros")), Applied::Continue);
        assert_eq!(poller.inner.apply(tag, 99, stage("Identificando alimentos")), Applied::Continue);
        assert_eq!(
            poller.state(),
            ProcessingState::Processing {
                job_id: JobId(1),
                stage: Some("Calculando macros".into())
            }
        );

        let done: JobResponse = serde_json::from_value(serde_json::json!({
            "id": 1, "status": "completed", "resultado_final": {}
        }))
        .unwrap();
        assert_eq!(poller.inner.apply(tag, 98, Ok(done)), Applied::Stop);
        assert!(matches!(poller.state(), ProcessingState::Done { .. }));
    }
}
