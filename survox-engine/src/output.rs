use crate::guard::TurnGuard;
use crate::traits::{SpeechSynth, UtteranceRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use survox_core::voice::{VoicePreferences, choose_voice, shape_utterance};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Completed,
    /// A newer speak or cancel took over while this utterance ran; the caller
    /// must not continue its turn sequence.
    Superseded,
}

/// Drives the synthesis backend and owns the speaking half of the turn guard.
/// Every utterance carries a generation stamp so a cancelled or replaced
/// utterance can never clear the guard out from under its successor.
pub struct SpeechOutputController {
    synth: Arc<dyn SpeechSynth>,
    guard: Arc<TurnGuard>,
    language: String,
    prefs: VoicePreferences,
    generation: AtomicU64,
    primed: AtomicBool,
}

impl SpeechOutputController {
    pub fn new(
        synth: Arc<dyn SpeechSynth>,
        guard: Arc<TurnGuard>,
        language: String,
        prefs: VoicePreferences,
    ) -> Self {
        Self {
            synth,
            guard,
            language,
            prefs,
            generation: AtomicU64::new(0),
            primed: AtomicBool::new(false),
        }
    }

    /// Warms the synthesis engine with a muted utterance. Some backends drop
    /// the first real utterance unless they have spoken once already. Runs at
    /// most once per controller.
    pub async fn prime(&self) {
        if self.primed.swap(true, Ordering::SeqCst) {
            return;
        }
        let req = UtteranceRequest {
            text: "안녕하세요".to_string(),
            lang: self.language.clone(),
            voice: None,
            rate: self.prefs.rate,
            pitch: self.prefs.pitch,
            volume: 0.0,
        };
        if let Err(err) = self.synth.speak(&req).await {
            log::warn!("synth priming failed: {err:#}");
        }
    }

    /// Reads one question aloud. The turn guard is raised before the first
    /// await so no transcript can slip in between scheduling and audio.
    /// Synthesis errors are logged and treated as a completed (silent) turn
    /// so the session can continue by screen.
    pub async fn speak(&self, text: &str, question_index: usize) -> SpeakOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.guard.begin_speaking();

        self.synth.cancel().await;

        let voices = match self.synth.voices().await {
            Ok(voices) => voices,
            Err(err) => {
                log::warn!("voice enumeration failed: {err:#}");
                Vec::new()
            }
        };
        let voice = choose_voice(&voices, &self.prefs).map(|v| v.name.clone());

        let req = UtteranceRequest {
            text: shape_utterance(text, question_index),
            lang: self.language.clone(),
            voice,
            rate: self.prefs.rate,
            pitch: self.prefs.pitch,
            volume: 1.0,
        };
        log::info!("speaking question {}", question_index + 1);
        if let Err(err) = self.synth.speak(&req).await {
            log::warn!("speech synthesis failed: {err:#}");
        }

        if self.generation.load(Ordering::SeqCst) == generation {
            self.guard.end_speaking();
            SpeakOutcome::Completed
        } else {
            SpeakOutcome::Superseded
        }
    }

    /// Silences any in-flight utterance and releases the speaking flag.
    /// Safe to call at any time, from any task.
    pub async fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.synth.cancel().await;
        self.guard.end_speaking();
    }
}
