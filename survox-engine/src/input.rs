use crate::guard::TurnGuard;
use crate::traits::{MicFailure, RecognizerError, RecognizerEvent, SpeechRecognizer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use survox_core::EngineConfig;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

/// Microphone-side events, already filtered through the turn guard.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Interim(String),
    Final(String),
    ListeningChanged(bool),
    TerminalError(MicFailure),
}

/// Owns the continuous-listening loop: opens recognition sessions, restarts
/// them with backoff when they end, and tears them down the moment speech
/// output or a transition begins. Transcripts that arrive while the guard is
/// raised are dropped here, before anyone else sees them.
pub struct SpeechInputController {
    recognizer: Arc<dyn SpeechRecognizer>,
    guard: Arc<TurnGuard>,
    cfg: EngineConfig,
    events: mpsc::Sender<InputEvent>,
    enabled: AtomicBool,
    mic_blocked: AtomicBool,
    wake: Notify,
    interrupt: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechInputController {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        guard: Arc<TurnGuard>,
        cfg: EngineConfig,
        events: mpsc::Sender<InputEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            recognizer,
            guard,
            cfg,
            events,
            enabled: AtomicBool::new(false),
            mic_blocked: AtomicBool::new(false),
            wake: Notify::new(),
            interrupt: Notify::new(),
            task: Mutex::new(None),
        })
    }

    /// Starts the background listening loop. Idempotent.
    pub fn spawn(self: &Arc<Self>) {
        let mut slot = match self.task.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_none() {
            let this = Arc::clone(self);
            *slot = Some(tokio::spawn(this.run()));
        }
    }

    pub async fn probe(&self) -> Result<(), MicFailure> {
        match self.recognizer.probe().await {
            Ok(()) => Ok(()),
            Err(err) => match err.as_terminal() {
                Some(failure) => {
                    self.mic_blocked.store(true, Ordering::SeqCst);
                    Err(failure)
                }
                // Transient probe failures do not block the mic.
                None => {
                    log::warn!("mic probe failed transiently: {err}");
                    Ok(())
                }
            },
        }
    }

    pub fn start_listening(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn stop_listening(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.interrupt.notify_waiters();
    }

    /// Tears down the current recognition session without disabling the
    /// loop; it reopens once the guard clears.
    pub fn interrupt(&self) {
        self.interrupt.notify_waiters();
    }

    /// Nudges the loop to re-evaluate its gate immediately.
    pub fn kick(&self) {
        self.wake.notify_one();
    }

    pub fn is_blocked(&self) -> bool {
        self.mic_blocked.load(Ordering::SeqCst)
    }

    pub fn clear_block(&self) {
        self.mic_blocked.store(false, Ordering::SeqCst);
    }

    pub fn shutdown(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.interrupt.notify_waiters();
        let mut slot = match self.task.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            if !self.enabled.load(Ordering::SeqCst) || self.is_blocked() {
                self.wake.notified().await;
                continue;
            }
            if self.guard.blocks_listening() {
                // Speech in progress. Poll rather than subscribe; the guard
                // is a plain atomic with no waiters list.
                let _ = tokio::time::timeout(Duration::from_millis(25), self.wake.notified()).await;
                continue;
            }

            let mut session = match self.recognizer.open_session(&self.cfg.language).await {
                Ok(session) => session,
                Err(err) => {
                    if self.latch_if_terminal(&err).await {
                        continue;
                    }
                    log::warn!("recognition session failed to open: {err}");
                    tokio::time::sleep(self.cfg.error_backoff()).await;
                    continue;
                }
            };

            let _ = self.events.send(InputEvent::ListeningChanged(true)).await;
            let backoff = self.pump_session(&mut session).await;
            drop(session);
            let _ = self.events.send(InputEvent::ListeningChanged(false)).await;

            if let Some(backoff) = backoff {
                tokio::time::sleep(backoff).await;
            }
        }
    }

    /// Consumes one session until it ends, errors, or is interrupted.
    /// Returns the backoff to apply before the next session, if any.
    async fn pump_session(&self, session: &mut mpsc::Receiver<RecognizerEvent>) -> Option<Duration> {
        // Register as an interrupt waiter for the whole session. An
        // interrupt that fires while this loop is busy forwarding an event
        // must still be observed on the next pass, and notify_waiters
        // stores no permit for futures created later.
        let interrupted = self.interrupt.notified();
        tokio::pin!(interrupted);
        interrupted.as_mut().enable();
        loop {
            tokio::select! {
                _ = interrupted.as_mut() => return None,
                event = session.recv() => match event {
                    None | Some(RecognizerEvent::Ended) => {
                        return Some(self.cfg.restart_backoff());
                    }
                    Some(RecognizerEvent::Interim(text)) => {
                        if self.accepting() {
                            let _ = self.events.send(InputEvent::Interim(text)).await;
                        }
                    }
                    Some(RecognizerEvent::Final(text)) => {
                        if self.accepting() {
                            let _ = self.events.send(InputEvent::Final(text)).await;
                        }
                    }
                    Some(RecognizerEvent::Errored(err)) => {
                        if self.latch_if_terminal(&err).await {
                            return None;
                        }
                        log::warn!("recognition error, will restart: {err}");
                        return Some(self.cfg.error_backoff());
                    }
                },
            }
        }
    }

    fn accepting(&self) -> bool {
        self.enabled.load(Ordering::SeqCst) && !self.guard.blocks_listening()
    }

    async fn latch_if_terminal(&self, err: &RecognizerError) -> bool {
        let Some(failure) = err.as_terminal() else {
            return false;
        };
        log::error!("microphone unavailable: {err}");
        self.mic_blocked.store(true, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
        let _ = self.events.send(InputEvent::TerminalError(failure)).await;
        true
    }
}
