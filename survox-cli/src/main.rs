use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use survox_core::matcher::KeywordMatcher;
use survox_core::question::{
    AnswerOption, AnswerType, Dependency, DependencyValue, QuestionBank, QuestionRecord,
};
use survox_core::voice::VoiceInfo;
use survox_core::{EngineConfig, SurveyResult};
use survox_engine::orchestrator::{SurveyEvent, SurveyOrchestrator};
use survox_engine::traits::{
    RecognizerError, RecognizerEvent, ReportSink, SpeechRecognizer, SpeechSynth, UtteranceRequest,
};
use tokio::sync::mpsc;

struct ConsoleSynth;

#[async_trait::async_trait]
impl SpeechSynth for ConsoleSynth {
    async fn voices(&self) -> anyhow::Result<Vec<VoiceInfo>> {
        Ok(vec![VoiceInfo {
            name: "Yuna (Natural)".into(),
            lang: "ko-KR".into(),
            is_default: true,
        }])
    }

    async fn speak(&self, req: &UtteranceRequest) -> anyhow::Result<()> {
        if req.volume > 0.0 {
            println!("[tts] {}", req.text);
        }
        // Roughly real reading pace, compressed for a demo run.
        tokio::time::sleep(Duration::from_millis(10 * req.text.chars().count() as u64)).await;
        Ok(())
    }

    async fn cancel(&self) {}
}

/// Plays back canned respondent utterances, one per recognition session, as
/// if an elderly respondent were answering out loud.
struct ScriptedRespondent {
    lines: Mutex<VecDeque<&'static str>>,
}

#[async_trait::async_trait]
impl SpeechRecognizer for ScriptedRespondent {
    async fn probe(&self) -> Result<(), RecognizerError> {
        Ok(())
    }

    async fn open_session(
        &self,
        _language: &str,
    ) -> Result<mpsc::Receiver<RecognizerEvent>, RecognizerError> {
        let line = self.lines.lock().unwrap().pop_front();
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let Some(line) = line else {
                tx.closed().await;
                return;
            };
            tokio::time::sleep(Duration::from_millis(600)).await;
            println!("[respondent] {line}");
            let _ = tx.send(RecognizerEvent::Interim(line.into())).await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(RecognizerEvent::Final(line.into())).await;
            // End the session like a silence timeout would, so the engine's
            // restart path runs between utterances.
            let _ = tx.send(RecognizerEvent::Ended).await;
        });
        Ok(rx)
    }
}

struct ConsoleReport;

#[async_trait::async_trait]
impl ReportSink for ConsoleReport {
    async fn submit(&self, result: &SurveyResult) -> anyhow::Result<()> {
        println!("[report] {}", serde_json::to_string_pretty(result)?);
        Ok(())
    }
}

fn scale(id: u32, text: &str) -> QuestionRecord {
    QuestionRecord {
        id,
        category: "정신건강".into(),
        answer_type: AnswerType::Scale,
        text: text.into(),
        options: Vec::new(),
        dependency: None,
        is_reverse: false,
    }
}

fn demo_bank() -> anyhow::Result<QuestionBank> {
    let smoking = QuestionRecord {
        id: 1,
        category: "생활습관".into(),
        answer_type: AnswerType::YesNo,
        text: "1. 현재 담배를 피우고 계십니까?".into(),
        options: vec![
            AnswerOption::new(1, "전혀 피우지 않음"),
            AnswerOption::new(2, "네, 매일 피움"),
        ],
        dependency: None,
        is_reverse: false,
    };
    let mut amount = QuestionRecord {
        id: 2,
        category: "생활습관".into(),
        answer_type: AnswerType::Select,
        text: "2. 하루에 어느 정도 피우십니까?".into(),
        options: vec![
            AnswerOption::new(1, "반 갑 이하"),
            AnswerOption::new(2, "한 갑 정도"),
            AnswerOption::new(3, "한 갑 이상"),
        ],
        dependency: None,
        is_reverse: false,
    };
    amount.dependency = Some(Dependency {
        target_id: 1,
        answer_value: DependencyValue::One(2),
    });

    Ok(QuestionBank::new(vec![
        smoking,
        amount,
        scale(3, "3. 최근 일주일간 잠을 잘 주무셨습니까?"),
        scale(4, "4. 최근 우울하거나 희망이 없다고 느끼셨습니까?"),
    ])?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let bank = Arc::new(demo_bank()?);

    let respondent = ScriptedRespondent {
        lines: Mutex::new(VecDeque::from([
            "네 피웁니다",
            "다음",
            "두번째요",
            "다음",
            "세번째요 다음",
            "잘 모르겠어요 다음",
        ])),
    };

    let (orchestrator, mut events) = SurveyOrchestrator::new(
        Arc::clone(&bank),
        Arc::new(KeywordMatcher),
        Arc::new(ConsoleSynth),
        Arc::new(respondent),
        Arc::new(ConsoleReport),
        EngineConfig::default(),
    );

    orchestrator.start().await;

    let total = bank.len();
    let mut answered = 0usize;
    while let Some(event) = events.recv().await {
        match event {
            SurveyEvent::StateChanged { state, active } => {
                println!("[state] q{} {:?}", active + 1, state);
            }
            SurveyEvent::LiveTranscript { text } => {
                println!("[heard] {text}");
            }
            SurveyEvent::AnswerRecorded { index, value } => {
                println!("[answer] q{} = {value}", index + 1);
                answered += 1;
            }
            SurveyEvent::MicUnavailable { failure } => {
                println!("[mic] unavailable: {failure:?}");
            }
            SurveyEvent::Finished { .. } => break,
        }

        // Every question the scripted respondent can reach has an answer;
        // close the session.
        if answered == total {
            let result = orchestrator.finish().await?;
            println!(
                "[done] {}/{} answered, mean {:?}",
                result.answered_count, result.total_questions, result.mean
            );
            break;
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}
