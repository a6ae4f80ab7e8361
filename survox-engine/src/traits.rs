use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use survox_core::SurveyResult;
use survox_core::voice::VoiceInfo;
use thiserror::Error;
use tokio::sync::mpsc;

/// One utterance handed to the synthesis backend, already shaped for speech.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceRequest {
    pub text: String,
    pub lang: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

#[async_trait]
pub trait SpeechSynth: Send + Sync {
    async fn voices(&self) -> anyhow::Result<Vec<VoiceInfo>>;

    /// Speaks the utterance to completion. Must return early (without error)
    /// when interrupted by `cancel`.
    async fn speak(&self, req: &UtteranceRequest) -> anyhow::Result<()>;

    /// Stops any in-flight utterance. Idempotent.
    async fn cancel(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognizerError {
    #[error("microphone permission denied")]
    NotAllowed,
    #[error("no usable audio capture device")]
    AudioCapture,
    #[error("speech service refused the request")]
    ServiceNotAllowed,
    #[error("network failure: {0}")]
    Network(String),
    #[error("recognizer error: {0}")]
    Other(String),
}

/// Why the microphone became unusable, as surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicFailure {
    PermissionDenied,
    NoMicrophone,
    ServiceBlocked,
}

impl RecognizerError {
    /// Terminal errors latch the engine into manual-input mode; everything
    /// else is retried with backoff.
    pub fn as_terminal(&self) -> Option<MicFailure> {
        match self {
            RecognizerError::NotAllowed => Some(MicFailure::PermissionDenied),
            RecognizerError::AudioCapture => Some(MicFailure::NoMicrophone),
            RecognizerError::ServiceNotAllowed => Some(MicFailure::ServiceBlocked),
            RecognizerError::Network(_) | RecognizerError::Other(_) => None,
        }
    }
}

/// Event stream from one open recognition session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Partial hypothesis; superseded by later events.
    Interim(String),
    /// Finalized transcript segment.
    Final(String),
    /// The session ended on its own (silence timeout, stream close).
    Ended,
    Errored(RecognizerError),
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Checks that a microphone is present and permitted, without opening a
    /// full session.
    async fn probe(&self) -> Result<(), RecognizerError>;

    /// Opens a recognition session. The session runs until it emits `Ended`
    /// or `Errored`, or until the receiver is dropped, which must tear the
    /// session down.
    async fn open_session(
        &self,
        language: &str,
    ) -> Result<mpsc::Receiver<RecognizerEvent>, RecognizerError>;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn submit(&self, result: &SurveyResult) -> anyhow::Result<()>;
}
