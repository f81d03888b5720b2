//! Synthesis worker: the single consumer of the speech queue.
//!
//! Each chunk passes two cancellation checkpoints: before the synthesis
//! request and before playback starts. Both the synthesis request and the
//! playback wait are additionally raced against the chunk's cancellation
//! token, so an interrupt never waits for a slow service or a long sentence.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::{AudioOutput, SpeechSynthesizer};
use crate::controller::{Dequeued, PlaybackEvent, Shared, SpeechChunk};
use crate::error::VoiceError;
use crate::playback;
use crate::voice::VoiceProfiles;

/// How one chunk ended.
#[derive(Debug)]
enum ChunkOutcome {
    Played,
    /// Dropped at a checkpoint before any audio was heard.
    Skipped,
    /// Stopped mid-playback.
    Aborted,
    Failed(VoiceError),
}

pub(crate) struct SynthesisWorker {
    shared: Arc<Shared>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    voices: VoiceProfiles,
    synthesis_timeout: Duration,
}

impl SynthesisWorker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        voices: VoiceProfiles,
        synthesis_timeout: Duration,
    ) -> Self {
        Self {
            shared,
            synthesizer,
            output,
            voices,
            synthesis_timeout,
        }
    }

    /// Worker loop. Returns when the stop sentinel is dequeued.
    pub(crate) async fn run(self) {
        tracing::debug!("Synthesis worker running");

        loop {
            let (chunk, token) = match self.shared.next().await {
                Dequeued::Chunk { chunk, token } => (chunk, token),
                Dequeued::Stop => break,
            };

            let outcome = self.process(&chunk, &token).await;
            self.shared.settle();
            self.report(&chunk, outcome);
        }

        tracing::info!("Synthesis worker stopped");
        self.shared.emit(PlaybackEvent::WorkerStopped);
    }

    async fn process(&self, chunk: &SpeechChunk, token: &CancellationToken) -> ChunkOutcome {
        // Checkpoint 1: nothing to do for an interrupted epoch.
        if self.shared.is_cancelled(token) {
            return ChunkOutcome::Skipped;
        }

        let profile = self.voices.resolve(chunk.language);
        let request = tokio::time::timeout(
            self.synthesis_timeout,
            self.synthesizer.synthesize(&chunk.text, profile, chunk.language),
        );

        let encoded = tokio::select! {
            biased;
            () = token.cancelled() => return ChunkOutcome::Skipped,
            result = request => match result {
                Ok(Ok(audio)) => audio,
                Ok(Err(e)) => return ChunkOutcome::Failed(e),
                Err(_) => {
                    return ChunkOutcome::Failed(VoiceError::Timeout {
                        operation: "synthesis",
                        elapsed: self.synthesis_timeout,
                    });
                }
            },
        };

        let decoded = match playback::decode(&encoded) {
            Ok(decoded) => decoded,
            Err(e) => return ChunkOutcome::Failed(e),
        };

        // Checkpoint 2: the interrupt may have landed during synthesis.
        if self.shared.is_cancelled(token) {
            return ChunkOutcome::Skipped;
        }

        let mut active = match self.output.start(decoded) {
            Ok(active) => active,
            Err(e) => return ChunkOutcome::Failed(e),
        };
        self.shared.emit(PlaybackEvent::ChunkStarted {
            seq: chunk.seq,
            text: chunk.text.clone(),
        });

        let finished = tokio::select! {
            biased;
            () = token.cancelled() => None,
            result = active.wait_done() => Some(result),
        };

        // `active` is dropped on every path below, which releases the device.
        match finished {
            None => {
                active.stop();
                ChunkOutcome::Aborted
            }
            Some(Ok(())) => ChunkOutcome::Played,
            Some(Err(e)) => {
                active.stop();
                ChunkOutcome::Failed(e)
            }
        }
    }

    fn report(&self, chunk: &SpeechChunk, outcome: ChunkOutcome) {
        let seq = chunk.seq;
        match outcome {
            ChunkOutcome::Played => {
                tracing::debug!(seq, "Chunk played");
                self.shared.emit(PlaybackEvent::ChunkFinished { seq });
            }
            ChunkOutcome::Skipped => {
                tracing::debug!(seq, "Chunk skipped after interrupt");
                self.shared.emit(PlaybackEvent::ChunkSkipped { seq });
            }
            ChunkOutcome::Aborted => {
                tracing::debug!(seq, "Chunk playback aborted");
                self.shared.emit(PlaybackEvent::ChunkAborted { seq });
            }
            ChunkOutcome::Failed(error) => {
                let excerpt = &chunk.text[..floor_char_boundary(&chunk.text, 80)];
                if error.is_chunk_local() {
                    tracing::warn!(
                        seq,
                        language = %chunk.language,
                        chunk_text = excerpt,
                        error = %error,
                        "Failed to speak chunk, skipping"
                    );
                } else {
                    tracing::error!(seq, chunk_text = excerpt, error = %error, "Unexpected error while speaking chunk");
                }
                self.shared.emit(PlaybackEvent::ChunkFailed {
                    seq,
                    error: error.to_string(),
                });
            }
        }
    }
}

/// Largest char boundary `<= max` in `text`.
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0)
}
