use crate::voice::VoicePreferences;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and language knobs for the turn-taking loop. Delays are tuned for
/// elderly respondents; tests shrink them to keep runs fast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub language: String,
    pub voice: VoicePreferences,

    /// Pause before reading the first question, so the respondent settles.
    pub first_question_delay_ms: u64,
    /// Pause before reading every later question.
    pub question_delay_ms: u64,
    /// Gap between finishing speech and opening the microphone.
    pub listen_delay_ms: u64,
    /// Restart backoff after a recognition session ends naturally.
    pub restart_backoff_ms: u64,
    /// Restart backoff after a transient recognition error.
    pub error_backoff_ms: u64,
    /// Settle time before advancing once a voice answer lands.
    pub advance_settle_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: "ko-KR".to_string(),
            voice: VoicePreferences::default(),
            first_question_delay_ms: 800,
            question_delay_ms: 500,
            listen_delay_ms: 100,
            restart_backoff_ms: 200,
            error_backoff_ms: 500,
            advance_settle_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn question_delay(&self, first: bool) -> Duration {
        if first {
            Duration::from_millis(self.first_question_delay_ms)
        } else {
            Duration::from_millis(self.question_delay_ms)
        }
    }

    pub fn listen_delay(&self) -> Duration {
        Duration::from_millis(self.listen_delay_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn advance_settle(&self) -> Duration {
        Duration::from_millis(self.advance_settle_ms)
    }
}
