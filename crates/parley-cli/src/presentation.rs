//! Terminal rendering of conversation events.

use std::io::{self, Write};

use parley_voice::{ConversationEvent, PlaybackEvent};
use tokio::sync::mpsc::UnboundedReceiver;

pub const PROMPT: &str = "You: ";

/// Print the reply as it streams in. Returns when the orchestrator is dropped.
pub async fn render_conversation(mut events: UnboundedReceiver<ConversationEvent>) {
    let mut out = io::stdout();
    while let Some(event) = events.recv().await {
        let text = match event {
            ConversationEvent::TurnStarted { language, .. } => format!("Assistant [{language}]: "),
            ConversationEvent::ReplyFragment(fragment) => fragment,
            ConversationEvent::TurnCompleted(_) => format!("\n{PROMPT}"),
            ConversationEvent::TurnSuperseded { .. } => " [interrupted]\n".to_string(),
            ConversationEvent::TurnFailed(error) => {
                eprintln!("\nError: {error}");
                PROMPT.to_string()
            }
            ConversationEvent::StateChanged(_) => continue,
        };
        // A closed stdout is not worth tearing the session down over.
        let _ = write!(out, "{text}");
        let _ = out.flush();
    }
}

/// Surface playback problems that the user would otherwise only notice as
/// silence.
pub async fn report_playback(mut events: UnboundedReceiver<PlaybackEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PlaybackEvent::ChunkFailed { seq, error } => {
                eprintln!("\n[speech] sentence {seq} could not be spoken: {error}");
            }
            PlaybackEvent::WorkerStopped => break,
            _ => {}
        }
    }
}
