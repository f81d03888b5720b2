//! Conversation orchestrator: one model reply per user utterance.
//!
//! Each turn is a small state machine:
//!
//! ```text
//!   Idle → Interrupting → Streaming → Draining → Idle
//!     ▲                       │ (completion error)
//!     └───────────────────────┘
//! ```
//!
//! Interruption, not waiting, separates turns: a new utterance first calls
//! [`PlaybackController::interrupt`] and then streams the next reply straight
//! into the queue, whatever the previous turn was still saying.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::backend::{CompletionProvider, CompletionStream};
use crate::config::{LanguagePolicy, OrchestratorConfig};
use crate::controller::PlaybackController;
use crate::error::VoiceError;
use crate::language::{LanguageTag, detect};
use crate::segment::{ReasoningFilter, StreamSegmenter, clean_for_speech, segment};

// ── Turn state machine ─────────────────────────────────────────────

/// Where the orchestrator is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    /// Waiting for a finalized utterance.
    Idle,

    /// Silencing the previous reply.
    Interrupting,

    /// Reading the model stream and enqueueing complete sentences.
    Streaming,

    /// Stream ended; flushing the trailing partial sentence.
    Draining,
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSummary {
    /// Language detected from the utterance.
    pub language: LanguageTag,

    /// Number of chunks handed to the playback queue.
    pub chunks_enqueued: usize,

    /// Full reply text as streamed by the model, reasoning blocks removed.
    pub reply: String,
}

/// Events emitted by the orchestrator to the UI / application layer.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    StateChanged(TurnState),

    /// A new turn began for `utterance`.
    TurnStarted {
        utterance: String,
        language: LanguageTag,
    },

    /// Reply text as it arrives from the model, reasoning blocks removed.
    ReplyFragment(String),

    TurnCompleted(TurnSummary),

    /// The turn was aborted by an error; the orchestrator is Idle again.
    TurnFailed(String),

    /// A newer utterance arrived before this turn's reply finished streaming.
    TurnSuperseded { utterance: String },
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Drives model replies into the playback queue.
pub struct ConversationOrchestrator {
    completion: Arc<dyn CompletionProvider>,
    playback: Arc<PlaybackController>,
    config: OrchestratorConfig,
    state: TurnState,
    event_tx: mpsc::UnboundedSender<ConversationEvent>,
}

impl ConversationOrchestrator {
    /// Create an orchestrator over an already started controller.
    ///
    /// Returns the orchestrator and a receiver for [`ConversationEvent`]s.
    #[must_use]
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        playback: Arc<PlaybackController>,
        config: OrchestratorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            completion,
            playback,
            config,
            state: TurnState::Idle,
            event_tx,
        };
        (orchestrator, event_rx)
    }

    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    /// The controller this orchestrator feeds.
    #[must_use]
    pub fn playback(&self) -> &Arc<PlaybackController> {
        &self.playback
    }

    /// Speak `text` without asking the model (e.g. an opening greeting).
    ///
    /// Returns the number of chunks enqueued.
    pub fn greet(&self, text: &str) -> Result<usize, VoiceError> {
        let language = detect(text);
        let mut enqueued = 0;
        for chunk in segment(text) {
            if self.speak(&chunk, language)? {
                enqueued += 1;
            }
        }
        tracing::debug!(enqueued, language = %language, "Greeting enqueued");
        Ok(enqueued)
    }

    /// Run one full turn for a finalized user utterance.
    ///
    /// On a completion error the turn ends early and the orchestrator returns
    /// to Idle; chunks already enqueued keep playing.
    pub async fn run_turn(&mut self, utterance: &str) -> Result<TurnSummary, VoiceError> {
        self.set_state(TurnState::Interrupting);
        self.playback.interrupt().await;

        let language = detect(utterance);
        self.emit(ConversationEvent::TurnStarted {
            utterance: utterance.to_string(),
            language,
        });
        tracing::info!(language = %language, "Turn started");

        self.set_state(TurnState::Streaming);
        let result = self.stream_reply(utterance, language).await;
        self.set_state(TurnState::Idle);

        match &result {
            Ok(summary) => {
                tracing::info!(chunks = summary.chunks_enqueued, "Turn completed");
                self.emit(ConversationEvent::TurnCompleted(summary.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turn aborted");
                self.emit(ConversationEvent::TurnFailed(e.to_string()));
            }
        }
        result
    }

    /// Consume utterances until the channel closes.
    ///
    /// An utterance that arrives while a reply is still streaming supersedes
    /// it: the unfinished turn is dropped and the new one begins by
    /// interrupting playback. Turn errors are reported as events and do not
    /// end the session.
    pub async fn run_session(&mut self, mut utterances: mpsc::Receiver<String>) {
        let mut next = utterances.recv().await;

        while let Some(utterance) = next.take() {
            let mut open = true;
            let superseded = {
                let turn = self.run_turn(&utterance);
                tokio::pin!(turn);
                loop {
                    tokio::select! {
                        biased;
                        incoming = utterances.recv(), if open => match incoming {
                            Some(newer) => break Some(newer),
                            None => open = false,
                        },
                        _ = &mut turn => break None,
                    }
                }
            };

            match superseded {
                Some(newer) => {
                    tracing::info!("Reply superseded by new utterance");
                    self.set_state(TurnState::Idle);
                    self.emit(ConversationEvent::TurnSuperseded { utterance });
                    next = Some(newer);
                }
                None if open => next = utterances.recv().await,
                None => {}
            }
        }

        tracing::debug!("Utterance source closed");
    }

    // ── Internal helpers ───────────────────────────────────────────

    async fn stream_reply(
        &mut self,
        utterance: &str,
        language: LanguageTag,
    ) -> Result<TurnSummary, VoiceError> {
        // One bound covers opening the stream and its first fragment.
        let mut wait = self.config.first_fragment_timeout;
        let mut deadline = Instant::now() + wait;
        let mut stream = self.open_stream(utterance, deadline).await?;

        let mut reasoning = ReasoningFilter::new();
        let mut segmenter = StreamSegmenter::new();
        let mut summary = TurnSummary {
            language,
            chunks_enqueued: 0,
            reply: String::new(),
        };

        loop {
            let fragment = match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(Some(Ok(fragment))) => fragment,
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) => break,
                Err(_) => return Err(timeout("completion stream", wait)),
            };
            wait = self.config.idle_timeout;
            deadline = Instant::now() + wait;

            let visible = reasoning.push(&fragment);
            self.feed(&mut segmenter, &mut summary, &visible)?;
        }

        self.set_state(TurnState::Draining);
        let rest = reasoning.finish();
        self.feed(&mut segmenter, &mut summary, &rest)?;
        if let Some(tail) = segmenter.finish() {
            if self.speak(&tail, summary.language)? {
                summary.chunks_enqueued += 1;
            }
        }

        Ok(summary)
    }

    /// Pass speakable reply text on to the UI and the segmenter.
    fn feed(
        &self,
        segmenter: &mut StreamSegmenter,
        summary: &mut TurnSummary,
        text: &str,
    ) -> Result<(), VoiceError> {
        if text.is_empty() {
            return Ok(());
        }
        self.emit(ConversationEvent::ReplyFragment(text.to_string()));
        summary.reply.push_str(text);

        for chunk in segmenter.push(text) {
            if self.speak(&chunk, summary.language)? {
                summary.chunks_enqueued += 1;
            }
        }
        Ok(())
    }

    async fn open_stream(
        &self,
        utterance: &str,
        deadline: Instant,
    ) -> Result<CompletionStream, VoiceError> {
        tokio::time::timeout_at(
            deadline,
            self.completion.stream(&self.config.system_prompt, utterance),
        )
        .await
        .map_err(|_| timeout("completion request", self.config.first_fragment_timeout))?
    }

    /// Clean and enqueue one chunk. Returns whether anything was queued.
    fn speak(&self, chunk: &str, turn_language: LanguageTag) -> Result<bool, VoiceError> {
        let text = clean_for_speech(chunk);
        if text.is_empty() {
            return Ok(false);
        }
        let language = match self.config.language_policy {
            LanguagePolicy::Utterance => turn_language,
            LanguagePolicy::PerChunk => detect(&text),
        };
        self.playback.enqueue(text, language)?;
        Ok(true)
    }

    fn set_state(&mut self, new_state: TurnState) {
        if self.state != new_state {
            tracing::debug!(old = ?self.state, new = ?new_state, "Turn state transition");
            self.state = new_state;
            self.emit(ConversationEvent::StateChanged(new_state));
        }
    }

    /// Emit an event (best-effort; a dropped receiver is not an error).
    fn emit(&self, event: ConversationEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("Conversation event receiver dropped");
        }
    }
}

const fn timeout(operation: &'static str, elapsed: Duration) -> VoiceError {
    VoiceError::Timeout { operation, elapsed }
}
