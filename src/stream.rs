//! Incremental rendering state for a streamed assistant reply.
//!
//! Fragments arrive in arbitrary sizes and a fragment boundary may fall in
//! the middle of a reasoning delimiter, so the display is always recomputed
//! from the entire accumulated buffer rather than the fragment alone. A tag
//! split across two fragments is recognized once both halves are present, and
//! an unterminated opening tag degrades to an open reasoning segment instead
//! of literal markup text.

use crate::events::ChatId;

/// Reserved delimiters for in-band generation errors on the push channel.
pub const ERROR_OPEN: &str = "<ERROR>";
pub const ERROR_CLOSE: &str = "</ERROR>";

const THINK_OPEN: &str = "<think";
const THINK_CLOSE: &str = "</think>";

/// Marker appended to the visible content when the user stops a generation.
pub const STOPPED_MARKER: &str = " *(stopped)*";

/// One run of assistant output: either primary answer text or a delimited
/// reasoning segment destined for secondary display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Main(String),
    Reasoning(String),
}

/// If `chunk` is wrapped in the reserved error delimiter, return the payload.
pub fn error_payload(chunk: &str) -> Option<&str> {
    chunk
        .strip_prefix(ERROR_OPEN)
        .map(|rest| rest.strip_suffix(ERROR_CLOSE).unwrap_or(rest))
}

/// Split accumulated assistant text into main and reasoning segments.
///
/// A complete `<think>` (or attribute-bearing `<think …>`) opens a reasoning
/// segment and `</think>` closes it. Opening a segment that is already open,
/// or closing one that is not, is a no-op: the tag is consumed and the state
/// machine stays put. A trailing prefix of an opening tag at the end of the
/// buffer already opens the segment; a trailing prefix of a closing tag is
/// withheld from display until the rest of it arrives. Both choices are
/// invisible in the final render of a balanced stream.
pub fn split_reasoning(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_reasoning = false;
    let mut rest = raw;

    let flush = |segments: &mut Vec<Segment>, text: &mut String, reasoning: bool| {
        if !text.is_empty() {
            let taken = std::mem::take(text);
            segments.push(if reasoning {
                Segment::Reasoning(taken)
            } else {
                Segment::Main(taken)
            });
        }
    };

    while let Some(lt) = rest.find('<') {
        let (before, tail) = rest.split_at(lt);
        current.push_str(before);

        match classify_tag(tail) {
            Tag::Open(len) => {
                if !in_reasoning {
                    flush(&mut segments, &mut current, in_reasoning);
                    in_reasoning = true;
                }
                rest = &tail[len..];
            }
            Tag::Close(len) => {
                if in_reasoning {
                    flush(&mut segments, &mut current, in_reasoning);
                    // An empty pair still renders an (empty) container.
                    if segments.is_empty()
                        || !matches!(segments.last(), Some(Segment::Reasoning(_)))
                    {
                        segments.push(Segment::Reasoning(String::new()));
                    }
                    in_reasoning = false;
                }
                rest = &tail[len..];
            }
            Tag::PartialOpen => {
                flush(&mut segments, &mut current, in_reasoning);
                in_reasoning = true;
                rest = "";
            }
            Tag::PartialClose => {
                // Hold the half-received closing tag back from display.
                rest = "";
            }
            Tag::NotATag => {
                current.push('<');
                rest = &tail[1..];
            }
        }
    }
    current.push_str(rest);

    if in_reasoning {
        // Unterminated segment: always surface the open container, even empty.
        let taken = std::mem::take(&mut current);
        segments.push(Segment::Reasoning(taken));
    } else {
        flush(&mut segments, &mut current, in_reasoning);
    }
    segments
}

enum Tag {
    /// Complete opening tag; argument is its byte length.
    Open(usize),
    /// Complete closing tag; argument is its byte length.
    Close(usize),
    /// The buffer ends inside an opening tag.
    PartialOpen,
    /// The buffer ends inside a closing tag.
    PartialClose,
    NotATag,
}

/// Classify the text starting at a `<`.
fn classify_tag(tail: &str) -> Tag {
    if let Some(after) = tail.strip_prefix(THINK_OPEN) {
        // `<think>` or `<think …>`: consume through the first `>`.
        return match after.find('>') {
            Some(gt) => Tag::Open(THINK_OPEN.len() + gt + 1),
            None => Tag::PartialOpen,
        };
    }
    if tail.starts_with(THINK_CLOSE) {
        return Tag::Close(THINK_CLOSE.len());
    }
    // The buffer may end mid-tag; a strict prefix of either delimiter at the
    // very end of the text counts as that tag in progress.
    if THINK_OPEN.len() > tail.len() && THINK_OPEN.starts_with(tail) {
        return Tag::PartialOpen;
    }
    if THINK_CLOSE.len() > tail.len() && THINK_CLOSE.starts_with(tail) {
        return Tag::PartialClose;
    }
    Tag::NotATag
}

/// Active-stream record: exists exactly while one generation is in progress.
///
/// Owns the raw accumulated text and remembers which transcript slot the
/// reply renders into. Created at generation start, torn down at completion,
/// error, or cancel; at most one exists per page session.
#[derive(Debug)]
pub struct StreamSession {
    chat_id: Option<ChatId>,
    message_index: usize,
    buffer: String,
    stopped: bool,
}

impl StreamSession {
    pub fn new(chat_id: Option<ChatId>, message_index: usize) -> Self {
        Self {
            chat_id,
            message_index,
            buffer: String::new(),
            stopped: false,
        }
    }

    /// Append one fragment to the raw buffer.
    pub fn push_chunk(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
    }

    pub fn raw(&self) -> &str {
        &self.buffer
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        self.chat_id
    }

    pub fn message_index(&self) -> usize {
        self.message_index
    }

    /// Recompute the display segmentation of the whole buffer.
    pub fn segments(&self) -> Vec<Segment> {
        split_reasoning(&self.buffer)
    }

    /// Append the stopped marker to the buffer. Returns false if the session
    /// was already marked, so the marker is applied exactly once.
    pub fn mark_stopped(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.stopped = true;
        self.buffer.push_str(STOPPED_MARKER);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_shot(text: &str) -> Vec<Segment> {
        split_reasoning(text)
    }

    fn streamed(text: &str, split_at: usize) -> Vec<Segment> {
        let mut session = StreamSession::new(None, 0);
        let mut cut = split_at;
        while !text.is_char_boundary(cut) {
            cut += 1;
        }
        session.push_chunk(&text[..cut]);
        let _ = session.segments(); // mid-stream render must not affect the final one
        session.push_chunk(&text[cut..]);
        session.segments()
    }

    #[test]
    fn plain_text_is_a_single_main_segment() {
        assert_eq!(
            one_shot("hello world"),
            vec![Segment::Main("hello world".into())]
        );
    }

    #[test]
    fn balanced_pair_splits_into_three_segments() {
        let segments = one_shot("before <think>pondering</think> after");
        assert_eq!(
            segments,
            vec![
                Segment::Main("before ".into()),
                Segment::Reasoning("pondering".into()),
                Segment::Main(" after".into()),
            ]
        );
    }

    #[test]
    fn split_at_any_point_matches_one_shot_render() {
        let text = "intro <think>step one\nstep two</think> **answer** <5 done";
        let expected = one_shot(text);
        for cut in 0..=text.len() {
            assert_eq!(
                streamed(text, cut),
                expected,
                "fragment boundary at byte {cut} changed the final render"
            );
        }
    }

    #[test]
    fn unterminated_open_tag_renders_as_open_container() {
        for partial in ["<t", "<thi", "<think", "<think>", "<think>half a tho"] {
            let text = format!("lead {partial}");
            let segments = split_reasoning(&text);
            assert!(
                matches!(segments.last(), Some(Segment::Reasoning(_))),
                "{partial:?} should open a reasoning segment"
            );
            for segment in &segments {
                let body = match segment {
                    Segment::Main(s) | Segment::Reasoning(s) => s,
                };
                assert!(!body.contains("<t"), "tag text leaked into {body:?}");
            }
        }
    }

    #[test]
    fn attribute_bearing_open_tag_is_recognized() {
        let segments = one_shot("<think depth=\"3\">hm</think>ok");
        assert_eq!(
            segments,
            vec![
                Segment::Reasoning("hm".into()),
                Segment::Main("ok".into())
            ]
        );
    }

    #[test]
    fn empty_pair_still_renders_a_container() {
        let segments = one_shot("<think></think>answer");
        assert_eq!(
            segments,
            vec![
                Segment::Reasoning(String::new()),
                Segment::Main("answer".into())
            ]
        );
    }

    #[test]
    fn stray_close_and_nested_open_are_no_ops() {
        assert_eq!(
            one_shot("a</think>b"),
            vec![Segment::Main("ab".into())]
        );
        assert_eq!(
            one_shot("<think>a<think>b</think>c"),
            vec![
                Segment::Reasoning("ab".into()),
                Segment::Main("c".into())
            ]
        );
    }

    #[test]
    fn literal_angle_brackets_survive() {
        assert_eq!(
            one_shot("if a < b then <tag> stays"),
            vec![Segment::Main("if a < b then <tag> stays".into())]
        );
    }

    #[test]
    fn partial_close_tag_is_withheld_mid_stream() {
        let segments = one_shot("<think>almost</thi");
        assert_eq!(segments, vec![Segment::Reasoning("almost".into())]);
    }

    #[test]
    fn error_payload_unwraps_delimited_chunks() {
        assert_eq!(
            error_payload("<ERROR>model unavailable</ERROR>"),
            Some("model unavailable")
        );
        assert_eq!(error_payload("<ERROR>cut off"), Some("cut off"));
        assert_eq!(error_payload("plain text"), None);
    }

    #[test]
    fn stopped_marker_is_applied_exactly_once() {
        let mut session = StreamSession::new(None, 3);
        session.push_chunk("partial answer");
        assert!(session.mark_stopped());
        assert!(!session.mark_stopped());
        let marker_count = session.raw().matches("(stopped)").count();
        assert_eq!(marker_count, 1);
        assert!(session.raw().ends_with(STOPPED_MARKER));
    }
}
