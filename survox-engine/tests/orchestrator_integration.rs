use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use survox_core::matcher::KeywordMatcher;
use survox_core::question::{
    AnswerType, Dependency, DependencyValue, QuestionBank, QuestionRecord,
};
use survox_core::voice::VoiceInfo;
use survox_core::{EngineConfig, SurveyResult, UNKNOWN_ANSWER};
use survox_engine::guard::TurnGuard;
use survox_engine::input::{InputEvent, SpeechInputController};
use survox_engine::orchestrator::{OrchestratorError, SurveyEvent, SurveyOrchestrator, TurnState};
use survox_engine::traits::{
    RecognizerError, RecognizerEvent, ReportSink, SpeechRecognizer, SpeechSynth, UtteranceRequest,
};
use tokio::sync::mpsc;

struct TestSynth {
    spoken: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl SpeechSynth for TestSynth {
    async fn voices(&self) -> anyhow::Result<Vec<VoiceInfo>> {
        Ok(vec![VoiceInfo {
            name: "Yuna".into(),
            lang: "ko-KR".into(),
            is_default: true,
        }])
    }

    async fn speak(&self, req: &UtteranceRequest) -> anyhow::Result<()> {
        if req.volume > 0.0 {
            self.spoken.lock().unwrap().push(req.text.clone());
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(())
    }

    async fn cancel(&self) {}
}

type Script = Vec<(u64, RecognizerEvent)>;

/// Plays back one canned event script per opened session; once the scripts
/// run out, sessions stay open and silent.
struct ScriptRecognizer {
    probe_results: Mutex<VecDeque<Result<(), RecognizerError>>>,
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptRecognizer {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            probe_results: Mutex::new(VecDeque::new()),
            scripts: Mutex::new(scripts.into()),
        }
    }

    fn with_probe(self, results: Vec<Result<(), RecognizerError>>) -> Self {
        *self.probe_results.lock().unwrap() = results.into();
        self
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for ScriptRecognizer {
    async fn probe(&self) -> Result<(), RecognizerError> {
        self.probe_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn open_session(
        &self,
        _language: &str,
    ) -> Result<mpsc::Receiver<RecognizerEvent>, RecognizerError> {
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for (delay_ms, event) in script {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            // Keep the sender alive so the session looks idle, not ended.
            tx.closed().await;
        });
        Ok(rx)
    }
}

struct CaptureSink {
    submitted: Arc<Mutex<Vec<SurveyResult>>>,
}

#[async_trait::async_trait]
impl ReportSink for CaptureSink {
    async fn submit(&self, result: &SurveyResult) -> anyhow::Result<()> {
        self.submitted.lock().unwrap().push(result.clone());
        Ok(())
    }
}

fn scale_question(id: u32) -> QuestionRecord {
    QuestionRecord {
        id,
        category: "정신건강".into(),
        answer_type: AnswerType::Scale,
        text: format!("{id}. 최근 잠을 잘 주무셨습니까?"),
        options: Vec::new(),
        dependency: None,
        is_reverse: false,
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        first_question_delay_ms: 5,
        question_delay_ms: 5,
        listen_delay_ms: 2,
        restart_backoff_ms: 2,
        error_backoff_ms: 2,
        advance_settle_ms: 5,
        ..EngineConfig::default()
    }
}

#[allow(clippy::type_complexity)]
fn build_with(
    bank: QuestionBank,
    recognizer: ScriptRecognizer,
    cfg: EngineConfig,
) -> (
    Arc<SurveyOrchestrator>,
    mpsc::Receiver<SurveyEvent>,
    Arc<Mutex<Vec<String>>>,
    Arc<Mutex<Vec<SurveyResult>>>,
) {
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let (orchestrator, events) = SurveyOrchestrator::new(
        Arc::new(bank),
        Arc::new(KeywordMatcher),
        Arc::new(TestSynth {
            spoken: Arc::clone(&spoken),
        }),
        Arc::new(recognizer),
        Arc::new(CaptureSink {
            submitted: Arc::clone(&submitted),
        }),
        cfg,
    );
    (orchestrator, events, spoken, submitted)
}

#[allow(clippy::type_complexity)]
fn build(
    bank: QuestionBank,
    recognizer: ScriptRecognizer,
) -> (
    Arc<SurveyOrchestrator>,
    mpsc::Receiver<SurveyEvent>,
    Arc<Mutex<Vec<String>>>,
    Arc<Mutex<Vec<SurveyResult>>>,
) {
    build_with(bank, recognizer, test_config())
}

async fn wait_for(
    events: &mut mpsc::Receiver<SurveyEvent>,
    mut pred: impl FnMut(&SurveyEvent) -> bool,
) -> SurveyEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn voice_answer_records_and_advances() {
    let bank = QuestionBank::new(vec![scale_question(1), scale_question(2)]).unwrap();
    let recognizer = ScriptRecognizer::new(vec![
        vec![(5, RecognizerEvent::Final("2번 다음".into()))],
        vec![(5, RecognizerEvent::Final("3번".into()))],
    ]);
    let (orchestrator, mut events, spoken, _) = build(bank, recognizer);

    orchestrator.start().await;

    wait_for(&mut events, |e| {
        matches!(e, SurveyEvent::AnswerRecorded { index: 0, value: 2 })
    })
    .await;
    wait_for(&mut events, |e| {
        matches!(e, SurveyEvent::AnswerRecorded { index: 1, value: 3 })
    })
    .await;

    let snapshot = orchestrator.session_snapshot();
    assert_eq!(snapshot.answers, vec![Some(2), Some(3)]);

    let spoken = spoken.lock().unwrap();
    assert!(spoken.len() >= 2);
    assert!(spoken[0].starts_with("일번 문항, "));
    assert!(spoken[1].starts_with("이번 문항, "));

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn recognition_restarts_after_natural_end() {
    let bank = QuestionBank::new(vec![scale_question(1)]).unwrap();
    let recognizer = ScriptRecognizer::new(vec![
        vec![(2, RecognizerEvent::Ended)],
        vec![(2, RecognizerEvent::Final("1번".into()))],
    ]);
    let (orchestrator, mut events, _, _) = build(bank, recognizer);

    orchestrator.start().await;
    wait_for(&mut events, |e| {
        matches!(e, SurveyEvent::AnswerRecorded { index: 0, value: 1 })
    })
    .await;

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn transient_error_restarts_without_latching() {
    let bank = QuestionBank::new(vec![scale_question(1)]).unwrap();
    let recognizer = ScriptRecognizer::new(vec![
        vec![(
            2,
            RecognizerEvent::Errored(RecognizerError::Network("offline".into())),
        )],
        vec![(2, RecognizerEvent::Final("4번".into()))],
    ]);
    let (orchestrator, mut events, _, _) = build(bank, recognizer);

    orchestrator.start().await;
    wait_for(&mut events, |e| {
        matches!(e, SurveyEvent::AnswerRecorded { index: 0, value: 4 })
    })
    .await;
    assert_ne!(orchestrator.state(), TurnState::MicUnavailable);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn terminal_error_latches_until_retry_succeeds() {
    let bank = QuestionBank::new(vec![scale_question(1)]).unwrap();
    let recognizer = ScriptRecognizer::new(vec![
        vec![(2, RecognizerEvent::Errored(RecognizerError::NotAllowed))],
        vec![(2, RecognizerEvent::Final("5번".into()))],
    ]);
    let (orchestrator, mut events, _, _) = build(bank, recognizer);

    orchestrator.start().await;
    wait_for(&mut events, |e| matches!(e, SurveyEvent::MicUnavailable { .. })).await;
    assert_eq!(orchestrator.state(), TurnState::MicUnavailable);

    // Manual answering still works while the mic is latched off.
    orchestrator.select_answer(0, 3).await;
    assert_eq!(orchestrator.session_snapshot().answers, vec![Some(3)]);

    // Permission granted; the retry re-runs the question and listens again.
    orchestrator.retry_mic().await;
    wait_for(&mut events, |e| {
        matches!(e, SurveyEvent::AnswerRecorded { index: 0, value: 5 })
    })
    .await;

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn failed_probe_still_reads_questions_aloud() {
    let bank = QuestionBank::new(vec![scale_question(1)]).unwrap();
    let recognizer = ScriptRecognizer::new(vec![])
        .with_probe(vec![Err(RecognizerError::AudioCapture)]);
    let (orchestrator, mut events, spoken, _) = build(bank, recognizer);

    orchestrator.start().await;
    wait_for(&mut events, |e| matches!(e, SurveyEvent::MicUnavailable { .. })).await;
    wait_for(&mut events, |e| {
        matches!(
            e,
            SurveyEvent::StateChanged {
                state: TurnState::MicUnavailable,
                ..
            }
        )
    })
    .await;

    assert_eq!(spoken.lock().unwrap().len(), 1);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn finish_validates_and_aggregates() {
    let mut gated = scale_question(2);
    gated.dependency = Some(Dependency {
        target_id: 1,
        answer_value: DependencyValue::One(2),
    });
    let bank =
        QuestionBank::new(vec![scale_question(1), gated, scale_question(3)]).unwrap();
    let recognizer = ScriptRecognizer::new(vec![]);
    let (orchestrator, _events, _, submitted) = build(bank, recognizer);

    orchestrator.start().await;

    let err = orchestrator.finish().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Incomplete { unanswered: 1 }));

    // Question 2 stays gated off because question 1 was answered with 1.
    orchestrator.select_answer(0, 1).await;
    orchestrator.select_answer(2, UNKNOWN_ANSWER).await;

    let result = orchestrator.finish().await.unwrap();
    assert_eq!(result.total_questions, 3);
    assert_eq!(result.answered_count, 2);
    assert_eq!(result.sum, 1);
    assert_eq!(result.mean, Some(1.0));
    assert_eq!(result.raw_answers, vec![Some(1), None, Some(UNKNOWN_ANSWER)]);
    assert_eq!(submitted.lock().unwrap().len(), 1);

    assert!(matches!(
        orchestrator.finish().await.unwrap_err(),
        OrchestratorError::AlreadyFinished
    ));

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn shutdown_cancels_pending_voice_advance() {
    let bank = QuestionBank::new(vec![scale_question(1), scale_question(2)]).unwrap();
    let recognizer =
        ScriptRecognizer::new(vec![vec![(5, RecognizerEvent::Final("1번 다음".into()))]]);
    let mut cfg = test_config();
    cfg.advance_settle_ms = 150;
    let (orchestrator, mut events, spoken, _) = build_with(bank, recognizer, cfg);

    orchestrator.start().await;
    wait_for(&mut events, |e| {
        matches!(e, SurveyEvent::AnswerRecorded { index: 0, value: 1 })
    })
    .await;

    // Tear down inside the settle window; the queued transition must die
    // with the session instead of reading the next question.
    orchestrator.shutdown().await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(spoken.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn interrupt_tears_down_session_under_send_backpressure() {
    let guard = TurnGuard::new();
    let recognizer = Arc::new(ScriptRecognizer::new(vec![vec![
        (5, RecognizerEvent::Interim("응".into())),
        (60, RecognizerEvent::Final("2번".into())),
    ]]));
    // One-slot channel: the session-active marker fills it, so the interim
    // forward blocks and the interrupt lands mid-send.
    let (tx, mut rx) = mpsc::channel(1);
    let input = SpeechInputController::new(recognizer, Arc::clone(&guard), test_config(), tx);
    input.spawn();
    input.start_listening();

    tokio::time::sleep(Duration::from_millis(30)).await;
    input.interrupt();

    let mut received = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(200), rx.recv()).await
    {
        received.push(event);
    }
    assert!(received.iter().any(|e| matches!(e, InputEvent::Interim(_))));
    assert!(
        !received.iter().any(|e| matches!(e, InputEvent::Final(_))),
        "final transcript from the superseded session leaked through"
    );

    input.shutdown();
}

#[tokio::test]
async fn manual_then_voice_same_value_is_idempotent() {
    let bank = QuestionBank::new(vec![scale_question(1)]).unwrap();
    let recognizer = ScriptRecognizer::new(vec![vec![(
        20,
        RecognizerEvent::Final("2번".into()),
    )]]);
    let (orchestrator, mut events, _, _) = build(bank, recognizer);

    orchestrator.start().await;
    wait_for(&mut events, |e| {
        matches!(
            e,
            SurveyEvent::StateChanged {
                state: TurnState::Listening,
                ..
            }
        )
    })
    .await;

    orchestrator.select_answer(0, 2).await;
    wait_for(&mut events, |e| {
        matches!(e, SurveyEvent::AnswerRecorded { index: 0, value: 2 })
    })
    .await;

    // The voice transcript lands after the manual pick; same value, no churn.
    wait_for(&mut events, |e| {
        matches!(e, SurveyEvent::AnswerRecorded { index: 0, value: 2 })
    })
    .await;
    assert_eq!(orchestrator.session_snapshot().answers, vec![Some(2)]);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn input_controller_drops_transcripts_while_guard_raised() {
    let guard = TurnGuard::new();
    let recognizer = Arc::new(ScriptRecognizer::new(vec![vec![
        (2, RecognizerEvent::Interim("네".into())),
        (30, RecognizerEvent::Final("2번".into())),
    ]]));
    let (tx, mut rx) = mpsc::channel(16);
    let input = SpeechInputController::new(recognizer, Arc::clone(&guard), test_config(), tx);
    input.spawn();
    input.start_listening();

    // The interim arrives while the guard is clear.
    let interim = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await.expect("input channel closed") {
                InputEvent::Interim(text) => return text,
                _ => continue,
            }
        }
    })
    .await
    .expect("no interim transcript");
    assert_eq!(interim, "네");

    // Speech starts before the final lands; the final must be swallowed.
    guard.begin_speaking();
    tokio::time::sleep(Duration::from_millis(80)).await;
    while let Ok(event) = rx.try_recv() {
        assert!(!matches!(event, InputEvent::Final(_)));
    }

    input.shutdown();
}
