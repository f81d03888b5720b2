//! Sentence segmentation for TTS.
//!
//! A chunk ends after `.`, `!` or `?` when the next character is
//! whitespace. [`segment`] works on a complete string; [`StreamSegmenter`]
//! applies the same rule to text that arrives in fragments and yields each
//! sentence as soon as its boundary has been seen.
//!
//! [`ReasoningFilter`] sits in front of the stream segmenter and removes
//! `<think>…</think>` style blocks, which usually span many fragments.

/// Whether `c` can end a sentence.
const fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Byte offset just past the first sentence terminator that is followed by
/// whitespace, if any.
fn next_boundary(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if is_terminator(c) && chars.peek().is_some_and(|&(_, next)| next.is_whitespace()) {
            return Some(i + c.len_utf8());
        }
    }
    None
}

/// Split `text` into trimmed, non-empty sentence chunks.
#[must_use]
pub fn segment(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while let Some(end) = next_boundary(rest) {
        push_trimmed(&mut chunks, &rest[..end]);
        rest = &rest[end..];
    }
    push_trimmed(&mut chunks, rest);

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        chunks.push(piece.to_string());
    }
}

/// Incremental segmenter for streamed model output.
///
/// Feeding the fragments of a string through [`push`](Self::push) and then
/// calling [`finish`](Self::finish) yields exactly `segment(&whole)`.
#[derive(Debug, Default)]
pub struct StreamSegmenter {
    buffer: String,
    /// Offset into `buffer` already known to hold no boundary.
    scanned: usize,
}

impl StreamSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every chunk it completed.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let mut complete = Vec::new();
        let mut consumed = 0;
        let mut from = self.scanned;
        while let Some(end) = next_boundary(&self.buffer[from..]) {
            let end = from + end;
            push_trimmed(&mut complete, &self.buffer[consumed..end]);
            consumed = end;
            from = end;
        }
        self.buffer.drain(..consumed);
        self.scanned = resume_offset(&self.buffer);

        complete
    }

    /// Flush the trailing partial chunk, even without terminal punctuation.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        let tail = std::mem::take(&mut self.buffer);
        let tail = tail.trim();
        (!tail.is_empty()).then(|| tail.to_string())
    }

    /// Text received but not yet emitted.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

/// Where the next scan must start: a trailing terminator still waits for
/// the character after it.
fn resume_offset(buffer: &str) -> usize {
    match buffer.chars().next_back() {
        Some(c) if is_terminator(c) => buffer.len() - c.len_utf8(),
        _ => buffer.len(),
    }
}

// ── Reasoning blocks ───────────────────────────────────────────────

/// Opening prefix and closing tag of each reasoning dialect, lowercase.
///
/// `<think` is a prefix so that `<think duration="5">` matches too.
const REASONING_TAGS: [(&str, &str); 4] = [
    ("<think", "</think>"),
    ("<reasoning>", "</reasoning>"),
    ("<seed:think>", "</seed:think>"),
    ("<|start_thinking|>", "<|end_thinking|>"),
];

/// Remove every complete reasoning block from `text`.
///
/// An opening tag without a matching close is left in place.
#[must_use]
pub fn strip_reasoning_blocks(text: &str) -> String {
    REASONING_TAGS
        .iter()
        .fold(text.to_string(), |acc, &(open, close)| strip_tag_pair(&acc, open, close))
}

fn strip_tag_pair(text: &str, open_prefix: &str, close_tag: &str) -> String {
    // ASCII lowercasing keeps byte offsets identical to `text`.
    let haystack = text.to_ascii_lowercase();
    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(found) = haystack[cursor..].find(open_prefix) {
        let open_at = cursor + found;
        let block_end = haystack[open_at..].find('>').and_then(|gt| {
            let body = open_at + gt + 1;
            haystack[body..]
                .find(close_tag)
                .map(|at| body + at + close_tag.len())
        });

        match block_end {
            Some(end) => {
                result.push_str(&text[cursor..open_at]);
                cursor = end;
            }
            None => {
                let past = open_at + open_prefix.len();
                result.push_str(&text[cursor..past]);
                cursor = past;
            }
        }
    }
    result.push_str(&text[cursor..]);
    result
}

/// Length of the longest suffix of `text` that is a proper prefix of one of
/// `tags`. That much text may still turn into a tag.
fn partial_tag_suffix<'a>(text: &str, tags: impl IntoIterator<Item = &'a str>) -> usize {
    tags.into_iter()
        .filter_map(|tag| (1..tag.len()).rev().find(|&n| text.ends_with(&tag[..n])))
        .max()
        .unwrap_or(0)
}

/// Streaming counterpart of [`strip_reasoning_blocks`].
///
/// Text that might be the start of a tag is held back until the next
/// fragment decides it. A block still open when the stream ends is dropped.
#[derive(Debug, Default)]
pub struct ReasoningFilter {
    pending: String,
    /// Closing tag of the block being skipped.
    inside: Option<&'static str>,
}

impl ReasoningFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the text that is safe to speak.
    pub fn push(&mut self, fragment: &str) -> String {
        self.pending.push_str(fragment);
        let mut visible = String::new();

        loop {
            let lower = self.pending.to_ascii_lowercase();

            if let Some(close) = self.inside {
                if let Some(at) = lower.find(close) {
                    self.pending.drain(..at + close.len());
                    self.inside = None;
                    continue;
                }
                let keep = partial_tag_suffix(&lower, [close]);
                self.pending.drain(..self.pending.len() - keep);
                return visible;
            }

            let opening = REASONING_TAGS
                .iter()
                .filter_map(|&(open, close)| lower.find(open).map(|at| (at, close)))
                .min_by_key(|&(at, _)| at);

            let Some((at, close)) = opening else {
                let keep = partial_tag_suffix(&lower, REASONING_TAGS.iter().map(|&(open, _)| open));
                let split = self.pending.len() - keep;
                visible.push_str(&self.pending[..split]);
                self.pending.drain(..split);
                return visible;
            };

            visible.push_str(&self.pending[..at]);
            match lower[at..].find('>') {
                Some(gt) => {
                    self.pending.drain(..at + gt + 1);
                    self.inside = Some(close);
                }
                // The opening tag itself is still arriving.
                None => {
                    self.pending.drain(..at);
                    return visible;
                }
            }
        }
    }

    /// Release held-back text at the end of the stream.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        if self.inside.take().is_some() {
            tracing::debug!(dropped = rest.len(), "Dropping unterminated reasoning block");
            return String::new();
        }
        rest
    }
}

// ── Speech cleanup ─────────────────────────────────────────────────

/// Remove text and markdown decoration that should not be read aloud.
///
/// Drops reasoning blocks, emphasis markers (`**`, `__`, `*`, `_`, `~~`),
/// backticks, leading heading and bullet markers, then collapses whitespace.
#[must_use]
pub fn clean_for_speech(text: &str) -> String {
    let text = strip_reasoning_blocks(text);
    let trimmed = text.trim_start();
    let trimmed = trimmed.trim_start_matches('#').trim_start();
    let trimmed = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
        .unwrap_or(trimmed);

    let stripped = trimmed
        .replace("**", "")
        .replace("__", "")
        .replace("~~", "")
        .replace(['*', '`'], "");

    collapse_whitespace(&strip_underscore_emphasis(&stripped))
}

/// Drop `_` used as emphasis (`_word_`), keeping it inside identifiers
/// such as `snake_case`.
fn strip_underscore_emphasis(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let word = |i: Option<usize>| i.and_then(|i| chars.get(i)).is_some_and(|c| c.is_alphanumeric());

    chars
        .iter()
        .enumerate()
        .filter(|&(i, &c)| c != '_' || (word(i.checked_sub(1)) && word(Some(i + 1))))
        .map(|(_, &c)| c)
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
