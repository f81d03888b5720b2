//! Audio decode and local playback via `rodio`.
//!
//! `rodio::OutputStream` is `!Send` on some platforms (CoreAudio, etc.), so it
//! is confined to a dedicated `parley-audio` OS thread. [`RodioOutput`] is the
//! `Send + Sync` proxy the synthesis worker holds: it asks the audio thread
//! for a fresh `Sink` per chunk over a std channel and then drives that sink
//! directly (`Sink` itself is `Send`).

use crate::backend::{AudioEncoding, DecodedAudio, EncodedAudio};
use crate::error::VoiceError;

/// Decode a synthesis payload into interleaved f32 PCM.
pub fn decode(audio: &EncodedAudio) -> Result<DecodedAudio, VoiceError> {
    match audio.encoding {
        AudioEncoding::Linear16 { sample_rate } => decode_linear16(&audio.bytes, sample_rate),
        AudioEncoding::Mp3 | AudioEncoding::Wav => decode_container(audio),
    }
}

fn decode_linear16(bytes: &[u8], sample_rate: u32) -> Result<DecodedAudio, VoiceError> {
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::Decode(format!(
            "LINEAR16 payload has odd length {}",
            bytes.len()
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32_768.0)
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels: 1,
    })
}

#[cfg(feature = "rodio-output")]
fn decode_container(audio: &EncodedAudio) -> Result<DecodedAudio, VoiceError> {
    use rodio::Source;

    let cursor = std::io::Cursor::new(audio.bytes.clone());
    let decoder = rodio::Decoder::new(cursor)
        .map_err(|e| VoiceError::Decode(format!("{:?}: {e}", audio.encoding)))?;

    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples().collect();

    if samples.is_empty() {
        return Err(VoiceError::Decode("payload decoded to zero samples".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(not(feature = "rodio-output"))]
fn decode_container(audio: &EncodedAudio) -> Result<DecodedAudio, VoiceError> {
    Err(VoiceError::Decode(format!(
        "{:?} decoding requires the rodio-output feature",
        audio.encoding
    )))
}

#[cfg(feature = "rodio-output")]
pub use local::{RodioOutput, RodioPlayback};

#[cfg(feature = "rodio-output")]
mod local {
    use std::sync::{Arc, Mutex, PoisonError, mpsc};
    use std::thread;

    use async_trait::async_trait;
    use rodio::{OutputStream, Sink};

    use crate::backend::{ActivePlayback, AudioOutput, DecodedAudio};
    use crate::error::VoiceError;

    /// A command sent to the audio thread.
    enum AudioCommand {
        /// Create a sink on the default output device.
        OpenSink {
            reply: mpsc::Sender<Result<Sink, VoiceError>>,
        },

        /// Release the output stream and exit.
        Shutdown,
    }

    /// `Send + Sync` handle to the default output device.
    pub struct RodioOutput {
        cmd_tx: mpsc::Sender<AudioCommand>,
        thread: Mutex<Option<thread::JoinHandle<()>>>,
    }

    impl RodioOutput {
        /// Spawn the audio thread and open the default output device.
        ///
        /// Device errors are propagated back through a one-shot init channel.
        pub fn spawn() -> Result<Self, VoiceError> {
            let (cmd_tx, cmd_rx) = mpsc::channel::<AudioCommand>();
            let (init_tx, init_rx) = mpsc::channel::<Result<(), VoiceError>>();

            let thread = thread::Builder::new()
                .name("parley-audio".into())
                .spawn(move || Self::run(&cmd_rx, &init_tx))
                .map_err(|e| {
                    VoiceError::PlaybackDevice(format!("failed to spawn audio thread: {e}"))
                })?;

            init_rx.recv().map_err(|_| {
                VoiceError::PlaybackDevice("audio thread exited during init".to_string())
            })??;

            Ok(Self {
                cmd_tx,
                thread: Mutex::new(Some(thread)),
            })
        }

        /// Body of the audio thread. Owns the `OutputStream` for its whole life.
        fn run(cmd_rx: &mpsc::Receiver<AudioCommand>, init_tx: &mpsc::Sender<Result<(), VoiceError>>) {
            let (_stream, handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = init_tx.send(Err(VoiceError::PlaybackDevice(e.to_string())));
                    return;
                }
            };

            tracing::info!("Audio playback initialized on default output device");
            if init_tx.send(Ok(())).is_err() {
                return;
            }

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    AudioCommand::OpenSink { reply } => {
                        let sink = Sink::try_new(&handle)
                            .map_err(|e| VoiceError::PlaybackDevice(e.to_string()));
                        let _ = reply.send(sink);
                    }
                    AudioCommand::Shutdown => break,
                }
            }

            tracing::debug!("Audio thread shutting down");
        }

        fn open_sink(&self) -> Result<Sink, VoiceError> {
            let dead = || VoiceError::PlaybackDevice("audio thread is not running".to_string());
            let (tx, rx) = mpsc::channel();
            self.cmd_tx
                .send(AudioCommand::OpenSink { reply: tx })
                .map_err(|_| dead())?;
            recv_reply(&rx).map_err(|_| dead())?
        }
    }

    /// Wait for the audio thread's reply. On a multi-threaded runtime the
    /// wait is moved off the worker thread so other tasks keep running.
    pub(super) fn recv_reply<T>(rx: &mpsc::Receiver<T>) -> Result<T, mpsc::RecvError> {
        use tokio::runtime::{Handle, RuntimeFlavor};

        match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| rx.recv()),
            _ => rx.recv(),
        }
    }

    impl AudioOutput for RodioOutput {
        fn start(&self, audio: DecodedAudio) -> Result<Box<dyn ActivePlayback>, VoiceError> {
            if audio.channels == 0 || audio.sample_rate == 0 {
                return Err(VoiceError::PlaybackDevice(format!(
                    "unplayable buffer: {} channels at {} Hz",
                    audio.channels, audio.sample_rate
                )));
            }
            let sink = self.open_sink()?;
            let duration = audio.duration();
            sink.append(rodio::buffer::SamplesBuffer::new(
                audio.channels,
                audio.sample_rate,
                audio.samples,
            ));

            tracing::debug!(duration_ms = duration.as_millis(), "Audio playback started");
            Ok(Box::new(RodioPlayback {
                sink: Arc::new(sink),
                stopped: false,
            }))
        }
    }

    impl Drop for RodioOutput {
        fn drop(&mut self) {
            let _ = self.cmd_tx.send(AudioCommand::Shutdown);
            let handle = self
                .thread
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(handle) = handle {
                let _ = handle.join();
            }
        }
    }

    /// Playback of one chunk on its own sink. Stops the sink when dropped.
    pub struct RodioPlayback {
        sink: Arc<Sink>,
        stopped: bool,
    }

    #[async_trait]
    impl ActivePlayback for RodioPlayback {
        async fn wait_done(&mut self) -> Result<(), VoiceError> {
            let sink = Arc::clone(&self.sink);
            // sleep_until_end returns once the queue drains or stop() drops
            // the queued sources.
            tokio::task::spawn_blocking(move || sink.sleep_until_end())
                .await
                .map_err(|e| VoiceError::PlaybackDevice(format!("playback waiter failed: {e}")))
        }

        fn stop(&mut self) {
            if !self.stopped {
                self.sink.stop();
                self.stopped = true;
                tracing::debug!("Audio playback stopped");
            }
        }
    }

    impl Drop for RodioPlayback {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
