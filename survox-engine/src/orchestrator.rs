use crate::guard::TurnGuard;
use crate::input::{InputEvent, SpeechInputController};
use crate::output::{SpeakOutcome, SpeechOutputController};
use crate::traits::{MicFailure, ReportSink, SpeechRecognizer, SpeechSynth};
use std::sync::{Arc, Mutex, MutexGuard};
use survox_core::matcher::{MatchStrategy, contains_next_command};
use survox_core::{EngineConfig, QuestionBank, SessionState, SurveyResult, summarize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 64;

/// Whose turn it is. `MicUnavailable` is a latched state: the engine keeps
/// reading questions aloud but only accepts manual answers until
/// [`SurveyOrchestrator::retry_mic`] succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Speaking,
    Listening,
    Transitioning,
    MicUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurveyEvent {
    StateChanged { state: TurnState, active: usize },
    LiveTranscript { text: String },
    AnswerRecorded { index: usize, value: i32 },
    MicUnavailable { failure: MicFailure },
    Finished { result: SurveyResult },
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("session has not been started")]
    NotStarted,
    #[error("session is already finished")]
    AlreadyFinished,
    #[error("question {unanswered} has no answer yet")]
    Incomplete { unanswered: u32 },
    #[error("report submission failed: {0}")]
    Report(anyhow::Error),
}

struct Inner {
    session: SessionState,
    state: TurnState,
    started: bool,
    finished: bool,
    closed: bool,
    turn_generation: u64,
    turn_task: Option<JoinHandle<()>>,
    settle_task: Option<JoinHandle<()>>,
    pump_task: Option<JoinHandle<()>>,
}

/// Ties the question bank, matcher, speech output and speech input together
/// into the ask-listen-advance loop. All mutable state sits behind one
/// non-async mutex that is never held across an await.
pub struct SurveyOrchestrator {
    bank: Arc<QuestionBank>,
    matcher: Arc<dyn MatchStrategy>,
    output: Arc<SpeechOutputController>,
    input: Arc<SpeechInputController>,
    report: Arc<dyn ReportSink>,
    guard: Arc<TurnGuard>,
    cfg: EngineConfig,
    events: mpsc::Sender<SurveyEvent>,
    input_events: Mutex<Option<mpsc::Receiver<InputEvent>>>,
    inner: Mutex<Inner>,
}

impl SurveyOrchestrator {
    pub fn new(
        bank: Arc<QuestionBank>,
        matcher: Arc<dyn MatchStrategy>,
        synth: Arc<dyn SpeechSynth>,
        recognizer: Arc<dyn SpeechRecognizer>,
        report: Arc<dyn ReportSink>,
        cfg: EngineConfig,
    ) -> (Arc<Self>, mpsc::Receiver<SurveyEvent>) {
        let guard = TurnGuard::new();
        let output = Arc::new(SpeechOutputController::new(
            synth,
            Arc::clone(&guard),
            cfg.language.clone(),
            cfg.voice.clone(),
        ));
        let (input_tx, input_rx) = mpsc::channel(EVENT_CAPACITY);
        let input = SpeechInputController::new(
            recognizer,
            Arc::clone(&guard),
            cfg.clone(),
            input_tx,
        );
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        let question_count = bank.len();
        let orchestrator = Arc::new(Self {
            bank,
            matcher,
            output,
            input,
            report,
            guard,
            cfg,
            events: events_tx,
            input_events: Mutex::new(Some(input_rx)),
            inner: Mutex::new(Inner {
                session: SessionState::new(question_count),
                state: TurnState::Idle,
                started: false,
                finished: false,
                closed: false,
                turn_generation: 0,
                turn_task: None,
                settle_task: None,
                pump_task: None,
            }),
        });
        (orchestrator, events_rx)
    }

    /// Begins the session: warms the synthesizer, probes the microphone and
    /// reads the first administrable question. A failed probe latches
    /// microphone-unavailable but the session still runs by screen.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut inner = self.lock();
            if inner.started {
                return;
            }
            inner.started = true;
            let pump = {
                let mut slot = match self.input_events.lock() {
                    Ok(slot) => slot,
                    Err(poisoned) => poisoned.into_inner(),
                };
                slot.take()
            };
            if let Some(rx) = pump {
                let this = Arc::clone(self);
                inner.pump_task = Some(tokio::spawn(this.pump_input(rx)));
            }
        }

        self.output.prime().await;
        self.input.spawn();
        if let Err(failure) = self.input.probe().await {
            log::error!("microphone probe failed: {failure:?}");
            self.emit(SurveyEvent::MicUnavailable { failure });
        }

        let first = {
            let inner = self.lock();
            self.bank
                .first_administrable(&inner.session.answers)
                .unwrap_or(0)
        };
        self.begin_question(first);
    }

    /// Moves the session to `index` and runs its full turn: settle delay,
    /// read aloud, short gap, then open the microphone. Any turn already in
    /// flight is superseded.
    pub fn begin_question(self: &Arc<Self>, index: usize) {
        if self.bank.get(index).is_none() {
            return;
        }

        let generation;
        let first_turn;
        {
            let mut inner = self.lock();
            if inner.finished || inner.closed {
                return;
            }
            if let Some(task) = inner.turn_task.take() {
                task.abort();
            }
            inner.turn_generation += 1;
            generation = inner.turn_generation;
            first_turn = inner.session.answers.iter().all(Option::is_none)
                && self.bank.first_administrable(&inner.session.answers) == Some(index);
            inner.session.set_active(index);
            // Raise the transition flag before anything awaits so the mic
            // gate is already closed when the old turn unwinds.
            self.guard.set_transitioning(true);
            self.set_state_locked(&mut inner, TurnState::Idle);
        }
        self.input.interrupt();

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.run_turn(index, generation, first_turn).await;
        });
        let mut inner = self.lock();
        if inner.turn_generation == generation {
            inner.turn_task = Some(handle);
        } else {
            handle.abort();
        }
    }

    async fn run_turn(self: Arc<Self>, index: usize, generation: u64, first_turn: bool) {
        self.output.cancel().await;
        // cancel() drops the speaking flag; the transition flag is still up.
        tokio::time::sleep(self.cfg.question_delay(first_turn)).await;
        if !self.generation_current(generation) {
            return;
        }

        let Some(question) = self.bank.get(index) else {
            return;
        };
        self.set_state(TurnState::Speaking);
        let outcome = self.output.speak(&question.text, index).await;
        if outcome == SpeakOutcome::Superseded || !self.generation_current(generation) {
            return;
        }

        tokio::time::sleep(self.cfg.listen_delay()).await;
        if !self.generation_current(generation) {
            return;
        }

        if self.input.is_blocked() {
            self.set_state(TurnState::MicUnavailable);
        } else {
            self.set_state(TurnState::Listening);
            self.input.start_listening();
        }
    }

    async fn pump_input(self: Arc<Self>, mut rx: mpsc::Receiver<InputEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                InputEvent::Interim(text) => self.handle_transcript(&text, false),
                InputEvent::Final(text) => self.handle_transcript(&text, true),
                InputEvent::ListeningChanged(active) => {
                    log::debug!("recognition session active: {active}");
                }
                InputEvent::TerminalError(failure) => {
                    let mut inner = self.lock();
                    self.set_state_locked(&mut inner, TurnState::MicUnavailable);
                    drop(inner);
                    self.emit(SurveyEvent::MicUnavailable { failure });
                }
            }
        }
    }

    /// Applies one transcript to the active question. Transcripts are only
    /// honored while the engine is actually listening; anything arriving
    /// mid-speech or mid-transition is discarded.
    fn handle_transcript(self: &Arc<Self>, text: &str, is_final: bool) {
        if self.guard.blocks_listening() {
            return;
        }

        let mut inner = self.lock();
        if inner.finished || inner.state != TurnState::Listening {
            return;
        }
        inner.session.set_live_transcript(text);
        drop(inner);
        self.emit(SurveyEvent::LiveTranscript { text: text.to_string() });

        if !is_final {
            return;
        }

        let mut inner = self.lock();
        let active = inner.session.active;
        let Some(question) = self.bank.get(active) else {
            return;
        };

        let matched = self.matcher.match_answer(text, question.effective_options());
        let answer_updated = match matched {
            Some(value) => inner.session.set_answer(active, value),
            None => false,
        };
        let next = if contains_next_command(text)
            && (answer_updated || inner.session.answer(active).is_some())
        {
            self.bank.next_administrable(&inner.session.answers, active)
        } else {
            None
        };
        drop(inner);

        if answer_updated {
            if let Some(value) = matched {
                log::info!("question {active} answered by voice: {value}");
                self.emit(SurveyEvent::AnswerRecorded { index: active, value });
            }
        }
        if let Some(next) = next {
            let settle = if answer_updated {
                self.cfg.advance_settle()
            } else {
                std::time::Duration::ZERO
            };
            self.advance_after(next, settle);
        }
    }

    /// Schedules a transition to `index` after a settle delay, so the
    /// respondent sees their answer land before the next question starts.
    fn advance_after(self: &Arc<Self>, index: usize, settle: std::time::Duration) {
        if self.guard.is_transitioning() {
            return;
        }
        self.guard.set_transitioning(true);
        {
            let mut inner = self.lock();
            self.set_state_locked(&mut inner, TurnState::Transitioning);
        }
        self.input.interrupt();

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            this.begin_question(index);
        });

        let mut inner = self.lock();
        if inner.closed {
            handle.abort();
            return;
        }
        if let Some(stale) = inner.settle_task.replace(handle) {
            stale.abort();
        }
    }

    /// Manual (touch) answer. Stops any speech immediately, records the
    /// value and reopens the microphone on the same question; advancing
    /// stays explicit.
    pub async fn select_answer(self: &Arc<Self>, index: usize, value: i32) {
        {
            let mut inner = self.lock();
            if inner.finished || !inner.session.set_answer(index, value) {
                return;
            }
            if let Some(task) = inner.turn_task.take() {
                task.abort();
            }
        }
        self.output.cancel().await;
        self.guard.set_transitioning(false);
        self.emit(SurveyEvent::AnswerRecorded { index, value });

        if self.input.is_blocked() {
            self.set_state(TurnState::MicUnavailable);
        } else {
            self.set_state(TurnState::Listening);
            self.input.start_listening();
        }
    }

    /// Advances past the active question, skipping non-administrable ones.
    pub fn next(self: &Arc<Self>) {
        let target = {
            let inner = self.lock();
            self.bank
                .next_administrable(&inner.session.answers, inner.session.active)
        };
        if let Some(index) = target {
            self.begin_question(index);
        }
    }

    /// Steps back to the previous administrable question.
    pub fn previous(self: &Arc<Self>) {
        let target = {
            let inner = self.lock();
            self.bank
                .prev_administrable(&inner.session.answers, inner.session.active)
        };
        if let Some(index) = target {
            self.begin_question(index);
        }
    }

    /// Closes the session: every administrable question must carry an
    /// answer. Aggregates, submits the report and emits `Finished`.
    pub async fn finish(self: &Arc<Self>) -> Result<SurveyResult, OrchestratorError> {
        let (id, answers) = {
            let mut inner = self.lock();
            if !inner.started {
                return Err(OrchestratorError::NotStarted);
            }
            if inner.finished {
                return Err(OrchestratorError::AlreadyFinished);
            }
            for (index, question) in self.bank.iter().enumerate() {
                if self.bank.administrable(&inner.session.answers, index)
                    && inner.session.answer(index).is_none()
                {
                    return Err(OrchestratorError::Incomplete {
                        unanswered: question.id,
                    });
                }
            }
            inner.finished = true;
            if let Some(task) = inner.turn_task.take() {
                task.abort();
            }
            if let Some(task) = inner.settle_task.take() {
                task.abort();
            }
            self.set_state_locked(&mut inner, TurnState::Idle);
            (inner.session.id, inner.session.answers.clone())
        };

        self.input.stop_listening();
        self.output.cancel().await;
        self.guard.set_transitioning(false);

        let result = summarize(id, &self.bank, &answers);
        self.report
            .submit(&result)
            .await
            .map_err(OrchestratorError::Report)?;
        log::info!(
            "session {id} finished: {}/{} answered",
            result.answered_count,
            result.total_questions
        );
        self.emit(SurveyEvent::Finished {
            result: result.clone(),
        });
        Ok(result)
    }

    /// Re-checks the microphone after the respondent fixed permissions or
    /// plugged a device in. On success the active question is re-run so the
    /// listen turn comes back naturally.
    pub async fn retry_mic(self: &Arc<Self>) {
        match self.input.probe().await {
            Ok(()) => {
                self.input.clear_block();
                let active = self.lock().session.active;
                self.begin_question(active);
            }
            Err(failure) => {
                self.emit(SurveyEvent::MicUnavailable { failure });
            }
        }
    }

    /// Current answer sheet, for rendering.
    pub fn session_snapshot(&self) -> SessionState {
        self.lock().session.clone()
    }

    pub fn state(&self) -> TurnState {
        self.lock().state
    }

    /// Stops all audio and background tasks and bars any pending
    /// transition from restarting a turn. Idempotent.
    pub async fn shutdown(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
            if let Some(task) = inner.turn_task.take() {
                task.abort();
            }
            if let Some(task) = inner.settle_task.take() {
                task.abort();
            }
            if let Some(task) = inner.pump_task.take() {
                task.abort();
            }
        }
        self.input.shutdown();
        self.output.cancel().await;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn generation_current(&self, generation: u64) -> bool {
        self.lock().turn_generation == generation
    }

    fn set_state(&self, state: TurnState) {
        let mut inner = self.lock();
        self.set_state_locked(&mut inner, state);
    }

    fn set_state_locked(&self, inner: &mut Inner, state: TurnState) {
        if inner.state != state {
            log::info!("turn state {:?} -> {:?}", inner.state, state);
            inner.state = state;
            let active = inner.session.active;
            self.emit(SurveyEvent::StateChanged { state, active });
        }
    }

    fn emit(&self, event: SurveyEvent) {
        if self.events.try_send(event).is_err() {
            log::debug!("event listener lagging, dropped an event");
        }
    }
}
