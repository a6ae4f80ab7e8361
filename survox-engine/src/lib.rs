pub mod guard;
pub mod input;
pub mod orchestrator;
pub mod output;
pub mod traits;

pub use guard::TurnGuard;
pub use input::{InputEvent, SpeechInputController};
pub use orchestrator::{OrchestratorError, SurveyEvent, SurveyOrchestrator, TurnState};
pub use output::{SpeakOutcome, SpeechOutputController};
pub use traits::{
    MicFailure, RecognizerError, RecognizerEvent, ReportSink, SpeechRecognizer, SpeechSynth,
    UtteranceRequest,
};
