use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag pair that keeps the speaker and the microphone mutually
/// exclusive. Both flags are updated synchronously before any await point,
/// so there is never a window in which speech output is audible while the
/// recognizer would accept a transcript.
#[derive(Debug, Default)]
pub struct TurnGuard {
    speaking: AtomicBool,
    transitioning: AtomicBool,
}

impl TurnGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Marks the start of speech output. Speaking is raised before the
    /// transition flag drops so the two never leave a gap.
    pub fn begin_speaking(&self) {
        self.speaking.store(true, Ordering::SeqCst);
        self.transitioning.store(false, Ordering::SeqCst);
    }

    pub fn end_speaking(&self) {
        self.speaking.store(false, Ordering::SeqCst);
    }

    pub fn set_transitioning(&self, value: bool) {
        self.transitioning.store(value, Ordering::SeqCst);
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning.load(Ordering::SeqCst)
    }

    /// True whenever transcripts must be discarded and new recognition
    /// sessions must not open.
    pub fn blocks_listening(&self) -> bool {
        self.is_speaking() || self.is_transitioning()
    }
}
