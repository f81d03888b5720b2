//! Mock collaborators shared by the integration tests.
//!
//! No audio hardware or network access is required: the synthesizer returns
//! silent LINEAR16 buffers whose length sets how long the mock device
//! "plays", and the completion provider replays a scripted reply.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parley_voice::{
    ActivePlayback, AudioEncoding, AudioOutput, CompletionProvider, CompletionStream,
    ConversationEvent, DecodedAudio, EncodedAudio, LanguageTag, PlaybackConfig, PlaybackController,
    PlaybackEvent, SpeechSynthesizer, VoiceError, VoiceProfile,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub const SAMPLE_RATE: u32 = 16_000;

/// Silent mono LINEAR16 audio lasting `duration`.
pub fn silence(duration: Duration) -> EncodedAudio {
    let samples = usize::try_from(duration.as_millis()).unwrap() * (SAMPLE_RATE as usize / 1000);
    EncodedAudio {
        bytes: vec![0u8; samples * 2].into(),
        encoding: AudioEncoding::Linear16 {
            sample_rate: SAMPLE_RATE,
        },
    }
}

// ── Synthesizer ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SynthCall {
    pub text: String,
    pub language: LanguageTag,
    pub voice: String,
}

/// Scripted synthesizer. Every chunk plays for `default_duration` unless the
/// text has its own entry.
#[derive(Default)]
pub struct MockTts {
    pub calls: Mutex<Vec<SynthCall>>,
    durations: HashMap<String, Duration>,
    latency: HashMap<String, Duration>,
    failing: Vec<String>,
    panicking: Vec<String>,
}

impl MockTts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio for `text` plays for `duration`.
    pub fn playing(mut self, text: &str, duration: Duration) -> Self {
        self.durations.insert(text.to_string(), duration);
        self
    }

    /// Synthesis of `text` takes `latency`.
    pub fn slow(mut self, text: &str, latency: Duration) -> Self {
        self.latency.insert(text.to_string(), latency);
        self
    }

    pub fn failing(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }

    pub fn panicking(mut self, text: &str) -> Self {
        self.panicking.push(text.to_string());
        self
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.text.clone())
            .collect()
    }

    pub fn languages(&self) -> Vec<LanguageTag> {
        self.calls.lock().unwrap().iter().map(|c| c.language).collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockTts {
    async fn synthesize(
        &self,
        text: &str,
        profile: &VoiceProfile,
        language: LanguageTag,
    ) -> Result<EncodedAudio, VoiceError> {
        self.calls.lock().unwrap().push(SynthCall {
            text: text.to_string(),
            language,
            voice: profile.voice_name.clone(),
        });

        if let Some(latency) = self.latency.get(text) {
            tokio::time::sleep(*latency).await;
        }
        assert!(!self.panicking.iter().any(|t| t == text), "synthesizer panicked on {text}");
        if self.failing.iter().any(|t| t == text) {
            return Err(VoiceError::Synthesis(format!("mock failure for {text}")));
        }

        let duration = self
            .durations
            .get(text)
            .copied()
            .unwrap_or(Duration::from_millis(10));
        Ok(silence(duration))
    }
}

// ── Output device ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DeviceStats {
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    /// Playback handles dropped, i.e. device released.
    pub released: AtomicUsize,
}

impl DeviceStats {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// An output device whose playback lasts exactly the buffer duration.
///
/// Failures are keyed by the zero-based index of the `start()` call.
#[derive(Default)]
pub struct MockOutput {
    pub stats: Arc<DeviceStats>,
    attempts: AtomicUsize,
    fail_start: Vec<usize>,
    fail_playback: Vec<usize>,
}

impl MockOutput {
    /// The `nth` call to `start()` fails to open the device.
    pub fn failing_start(mut self, nth: usize) -> Self {
        self.fail_start.push(nth);
        self
    }

    /// The `nth` playback fails halfway through.
    pub fn failing_playback(mut self, nth: usize) -> Self {
        self.fail_playback.push(nth);
        self
    }
}

impl AudioOutput for MockOutput {
    fn start(&self, audio: DecodedAudio) -> Result<Box<dyn ActivePlayback>, VoiceError> {
        let nth = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.contains(&nth) {
            return Err(VoiceError::PlaybackDevice("device unplugged".to_string()));
        }
        self.stats.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPlayback {
            duration: audio.duration(),
            fails: self.fail_playback.contains(&nth),
            stopped: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockPlayback {
    duration: Duration,
    fails: bool,
    stopped: bool,
    stats: Arc<DeviceStats>,
}

#[async_trait]
impl ActivePlayback for MockPlayback {
    async fn wait_done(&mut self) -> Result<(), VoiceError> {
        if self.fails {
            tokio::time::sleep(self.duration / 2).await;
            return Err(VoiceError::PlaybackDevice("stream underrun".to_string()));
        }
        tokio::time::sleep(self.duration).await;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.stats.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockPlayback {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Completion provider ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Step {
    Text(&'static str),
    Fail(&'static str),
    /// Pause before the next step.
    Wait(Duration),
}

/// Replays a scripted reply per utterance.
#[derive(Default)]
pub struct MockCompletion {
    scripts: HashMap<String, Vec<Step>>,
    refuse: Vec<String>,
    opening: HashMap<String, Duration>,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, utterance: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(utterance.to_string(), steps);
        self
    }

    /// Opening the stream for `utterance` fails outright.
    pub fn refusing(mut self, utterance: &str) -> Self {
        self.refuse.push(utterance.to_string());
        self
    }

    /// Opening the stream for `utterance` takes `latency`.
    pub fn opening_after(mut self, utterance: &str, latency: Duration) -> Self {
        self.opening.insert(utterance.to_string(), latency);
        self
    }
}

#[async_trait]
impl CompletionProvider for MockCompletion {
    async fn stream(
        &self,
        system_prompt: &str,
        utterance: &str,
    ) -> Result<CompletionStream, VoiceError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), utterance.to_string()));

        if let Some(latency) = self.opening.get(utterance) {
            tokio::time::sleep(*latency).await;
        }
        if self.refuse.iter().any(|u| u == utterance) {
            return Err(VoiceError::Completion("HTTP 503".to_string()));
        }

        let steps = self.scripts.get(utterance).cloned().unwrap_or_default();
        let stream = futures_util::stream::iter(steps)
            .then(|step| async move {
                match step {
                    Step::Text(text) => Some(Ok(text.to_string())),
                    Step::Fail(message) => Some(Err(VoiceError::Completion(message.to_string()))),
                    Step::Wait(pause) => {
                        tokio::time::sleep(pause).await;
                        None
                    }
                }
            })
            .filter_map(|item| async move { item });
        Ok(stream.boxed())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

pub fn start_controller(
    tts: Arc<MockTts>,
    output: Arc<MockOutput>,
    config: PlaybackConfig,
) -> (Arc<PlaybackController>, EventLog<PlaybackEvent>) {
    let (controller, rx) = PlaybackController::start(tts, output, config);
    (Arc::new(controller), EventLog::new(rx))
}

/// Records every event received so far.
pub struct EventLog<E> {
    rx: UnboundedReceiver<E>,
    pub seen: Vec<E>,
}

impl<E: std::fmt::Debug> EventLog<E> {
    pub fn new(rx: UnboundedReceiver<E>) -> Self {
        Self {
            rx,
            seen: Vec::new(),
        }
    }

    /// Receive events until one matches `pred`.
    pub async fn until(&mut self, mut pred: impl FnMut(&E) -> bool) {
        let wait = async {
            while let Some(event) = self.rx.recv().await {
                let hit = pred(&event);
                self.seen.push(event);
                if hit {
                    return;
                }
            }
            panic!("event channel closed; seen {:?}", self.seen);
        };
        tokio::time::timeout(Duration::from_secs(300), wait)
            .await
            .expect("timed out waiting for event");
    }

    /// Move everything already delivered into `seen`.
    pub fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.seen.push(event);
        }
    }
}

impl EventLog<PlaybackEvent> {
    pub fn started_texts(&self) -> Vec<String> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::ChunkStarted { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&PlaybackEvent) -> bool) -> usize {
        self.seen.iter().filter(|e| pred(e)).count()
    }
}

impl EventLog<ConversationEvent> {
    pub fn fragments(&self) -> String {
        self.seen
            .iter()
            .filter_map(|e| match e {
                ConversationEvent::ReplyFragment(f) => Some(f.as_str()),
                _ => None,
            })
            .collect()
    }
}
