//! Playback controller: ordered speech queue with barge-in.
//!
//! The controller owns the queue, the cancellation state and the synthesis
//! worker task. Callers only see four operations: [`enqueue`], [`interrupt`],
//! [`shutdown`] and the read-only queries.
//!
//! # Interrupt ordering
//!
//! Queue contents, the current epoch and the epoch's [`CancellationToken`]
//! all live behind one `std::sync::Mutex`. `interrupt()` drains the queue,
//! cancels the token and installs a fresh one in a single critical section,
//! so every chunk dequeued before the call carries a cancelled token and
//! every chunk enqueued after it carries a live one. The mutex is never held
//! across an `.await`.
//!
//! [`enqueue`]: PlaybackController::enqueue
//! [`interrupt`]: PlaybackController::interrupt
//! [`shutdown`]: PlaybackController::shutdown

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{AudioOutput, SpeechSynthesizer};
use crate::config::PlaybackConfig;
use crate::error::VoiceError;
use crate::language::LanguageTag;
use crate::worker::SynthesisWorker;

// ── Queue items ────────────────────────────────────────────────────

/// One sentence-sized unit of text waiting to be spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechChunk {
    /// Enqueue order, unique per controller.
    pub seq: u64,
    pub text: String,
    pub language: LanguageTag,
}

enum QueueItem {
    Chunk(SpeechChunk),
    /// Sentinel pushed by `shutdown()`.
    Stop,
}

/// What the worker pulled off the queue.
pub(crate) enum Dequeued {
    Chunk {
        chunk: SpeechChunk,
        token: CancellationToken,
    },
    Stop,
}

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the controller and its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Audio for a chunk started playing.
    ChunkStarted { seq: u64, text: String },

    /// A chunk played to its natural end.
    ChunkFinished { seq: u64 },

    /// A chunk was dropped by a cancellation checkpoint before it played.
    ChunkSkipped { seq: u64 },

    /// A chunk was stopped partway through playback.
    ChunkAborted { seq: u64 },

    /// Synthesis, decoding or the device failed for a chunk.
    ChunkFailed { seq: u64, error: String },

    /// `interrupt()` completed; `dropped` pending chunks were discarded.
    Interrupted { dropped: usize },

    /// The worker left its loop.
    WorkerStopped,
}

// ── Cancellation flag ──────────────────────────────────────────────

/// Session-wide "interrupt in progress" flag.
///
/// While raised the worker starts no new playback and the queue hands out
/// no chunks. Only the controller raises and clears it.
#[derive(Debug, Default)]
pub struct CancellationFlag(AtomicBool);

impl CancellationFlag {
    fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Shared state ───────────────────────────────────────────────────

struct QueueState {
    items: VecDeque<QueueItem>,
    closed: bool,
    next_seq: u64,
    epoch: u64,
    token: CancellationToken,
    /// Epoch of the chunk the worker is processing, if any.
    in_flight: Option<u64>,
}

/// State shared between the controller and the worker task.
pub(crate) struct Shared {
    state: Mutex<QueueState>,
    flag: CancellationFlag,
    /// Signalled when an item is queued or the flag is cleared.
    available: Notify,
    /// Signalled whenever the worker finishes with a chunk.
    settled: Notify,
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

impl Shared {
    fn new(events: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
                next_seq: 0,
                epoch: 0,
                token: CancellationToken::new(),
                in_flight: None,
            }),
            flag: CancellationFlag::default(),
            available: Notify::new(),
            settled: Notify::new(),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the next queue item. Holds back while the flag is raised.
    pub(crate) async fn next(&self) -> Dequeued {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.available.notified().await;
        }
    }

    fn try_pop(&self) -> Option<Dequeued> {
        let mut state = self.lock();
        // The flag is raised under this lock, so checking it here cannot
        // race with a drain.
        if self.flag.is_set() {
            return None;
        }
        match state.items.pop_front()? {
            QueueItem::Chunk(chunk) => {
                state.in_flight = Some(state.epoch);
                Some(Dequeued::Chunk {
                    chunk,
                    token: state.token.clone(),
                })
            }
            QueueItem::Stop => Some(Dequeued::Stop),
        }
    }

    /// Worker is done with its current chunk, whatever the outcome.
    pub(crate) fn settle(&self) {
        self.lock().in_flight = None;
        self.settled.notify_one();
    }

    /// Cancellation checkpoint for a dequeued chunk.
    pub(crate) fn is_cancelled(&self, token: &CancellationToken) -> bool {
        token.is_cancelled() || self.flag.is_set()
    }

    /// Best-effort event emission; a dropped receiver is not an error.
    pub(crate) fn emit(&self, event: PlaybackEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Playback event receiver dropped");
        }
    }
}

// ── Controller ─────────────────────────────────────────────────────

/// Owns the speech queue and the single synthesis worker.
pub struct PlaybackController {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Serialises concurrent `interrupt()` calls.
    interrupt_lock: tokio::sync::Mutex<()>,
    config: PlaybackConfig,
}

impl PlaybackController {
    /// Spawn the worker on the current Tokio runtime.
    ///
    /// Returns the controller and a receiver for [`PlaybackEvent`]s.
    pub fn start(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        config: PlaybackConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(event_tx));

        let worker = SynthesisWorker::new(
            Arc::clone(&shared),
            synthesizer,
            output,
            config.voices.clone(),
            config.synthesis_timeout,
        );
        let handle = tokio::spawn(worker.run());

        tracing::info!("Playback controller started");
        let controller = Self {
            shared,
            worker: Mutex::new(Some(handle)),
            interrupt_lock: tokio::sync::Mutex::new(()),
            config,
        };
        (controller, event_rx)
    }

    /// Queue `text` for synthesis and playback. Never blocks.
    ///
    /// Blank text is ignored. Fails with [`VoiceError::QueueClosed`] after
    /// [`shutdown`](Self::shutdown), and with [`VoiceError::WorkerDied`] if
    /// the worker task is gone.
    pub fn enqueue(&self, text: impl Into<String>, language: LanguageTag) -> Result<(), VoiceError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Ok(());
        }
        if !self.is_running() && !self.shared.lock().closed {
            return Err(VoiceError::WorkerDied(
                "synthesis worker exited unexpectedly".to_string(),
            ));
        }

        let seq = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(VoiceError::QueueClosed);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.items.push_back(QueueItem::Chunk(SpeechChunk {
                seq,
                text,
                language,
            }));
            seq
        };

        tracing::debug!(seq, language = %language, "Chunk enqueued");
        self.shared.available.notify_one();
        Ok(())
    }

    /// Stop current speech and discard everything pending.
    ///
    /// Raises the cancellation flag, drains the queue, cancels the active
    /// chunk, waits (bounded by `interrupt_ack_timeout`) for the worker to
    /// let go of it, then clears the flag. Chunks enqueued after this
    /// returns are played normally. If the returned future is dropped
    /// early, the flag is still cleared.
    pub async fn interrupt(&self) {
        let _serial = self.interrupt_lock.lock().await;

        let (dropped, epoch) = {
            let mut state = self.shared.lock();
            self.shared.flag.raise();

            let before = state.items.len();
            state.items.retain(|item| matches!(item, QueueItem::Stop));
            let dropped = before - state.items.len();

            state.token.cancel();
            state.token = CancellationToken::new();
            state.epoch += 1;
            (dropped, state.epoch)
        };
        let release = FlagRelease(&self.shared);

        let confirmed = tokio::time::timeout(self.config.interrupt_ack_timeout, async {
            loop {
                let busy = self.shared.lock().in_flight.is_some_and(|e| e < epoch);
                if !busy {
                    break;
                }
                self.shared.settled.notified().await;
            }
        })
        .await;

        if confirmed.is_err() {
            tracing::warn!(
                timeout_ms = self.config.interrupt_ack_timeout.as_millis(),
                "Synthesis worker did not confirm interrupt in time"
            );
        }

        drop(release);

        tracing::info!(dropped, epoch, "Playback interrupted");
        self.shared.emit(PlaybackEvent::Interrupted { dropped });
    }

    /// Stop the worker after the chunks already queued.
    ///
    /// Pushes the stop sentinel behind any pending chunks and waits for the
    /// worker to exit. Call [`interrupt`](Self::interrupt) first to silence
    /// pending speech. Idempotent.
    pub async fn shutdown(&self) -> Result<(), VoiceError> {
        {
            let mut state = self.shared.lock();
            if !state.closed {
                state.closed = true;
                state.items.push_back(QueueItem::Stop);
                tracing::info!(pending = state.items.len() - 1, "Playback controller shutting down");
            }
        }
        self.shared.available.notify_one();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| VoiceError::WorkerDied(e.to_string())),
            None => Ok(()),
        }
    }

    /// Number of chunks waiting to be synthesized.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared
            .lock()
            .items
            .iter()
            .filter(|item| matches!(item, QueueItem::Chunk(_)))
            .count()
    }

    /// Whether an `interrupt()` is currently in progress.
    #[must_use]
    pub fn is_interrupting(&self) -> bool {
        self.shared.flag.is_set()
    }

    /// Whether the worker task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Clears the cancellation flag and wakes the worker when dropped.
struct FlagRelease<'a>(&'a Shared);

impl Drop for FlagRelease<'_> {
    fn drop(&mut self) {
        self.0.flag.clear();
        self.0.available.notify_one();
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        // Best-effort teardown when shutdown() was never awaited: silence the
        // active chunk and let the worker exit on its own.
        let mut state = self.shared.lock();
        if !state.closed {
            state.closed = true;
            state.items.clear();
            state.items.push_back(QueueItem::Stop);
            state.token.cancel();
            drop(state);
            self.shared.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> (Shared, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Shared::new(tx), rx)
    }

    fn push(shared: &Shared, text: &str) {
        let mut state = shared.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.items.push_back(QueueItem::Chunk(SpeechChunk {
            seq,
            text: text.to_string(),
            language: LanguageTag::EnUs,
        }));
    }

    #[test]
    fn try_pop_is_fifo_and_marks_in_flight() {
        let (shared, _rx) = shared();
        push(&shared, "one");
        push(&shared, "two");

        let Some(Dequeued::Chunk { chunk, .. }) = shared.try_pop() else {
            panic!("expected a chunk");
        };
        assert_eq!(chunk.text, "one");
        assert_eq!(shared.lock().in_flight, Some(0));

        shared.settle();
        assert_eq!(shared.lock().in_flight, None);

        let Some(Dequeued::Chunk { chunk, .. }) = shared.try_pop() else {
            panic!("expected a chunk");
        };
        assert_eq!(chunk.seq, 1);
    }

    #[test]
    fn raised_flag_holds_back_the_queue() {
        let (shared, _rx) = shared();
        push(&shared, "held");
        shared.flag.raise();
        assert!(shared.try_pop().is_none());
        shared.flag.clear();
        assert!(shared.try_pop().is_some());
    }

    #[test]
    fn checkpoint_sees_flag_and_token() {
        let (shared, _rx) = shared();
        let token = CancellationToken::new();
        assert!(!shared.is_cancelled(&token));

        shared.flag.raise();
        assert!(shared.is_cancelled(&token));
        shared.flag.clear();

        token.cancel();
        assert!(shared.is_cancelled(&token));
    }

    #[test]
    fn emit_survives_dropped_receiver() {
        let (shared, rx) = shared();
        drop(rx);
        shared.emit(PlaybackEvent::WorkerStopped);
    }
}
