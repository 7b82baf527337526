use log::{trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decoder::Utf8ChunkDecoder;
use crate::error::AssemblerError;
use crate::types::completion::{extract_api_error_message, ChatCompletionChunk};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One line of the stream, classified before any JSON parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Comment,
    Blank,
    Data(&'a str),
    Done,
    /// Any line without the `data: ` prefix.
    Other,
}

impl<'a> Frame<'a> {
    /// `line` must already have its `\n` and optional trailing `\r` removed.
    pub fn classify(line: &'a str) -> Self {
        if line.is_empty() {
            return Frame::Blank;
        }
        if line.starts_with(':') {
            return Frame::Comment;
        }
        match line.strip_prefix(DATA_PREFIX) {
            Some(payload) if payload.trim() == DONE_SENTINEL => Frame::Done,
            Some(payload) => Frame::Data(payload),
            None => Frame::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Content delta of one data frame. May be empty.
    Delta(String),
    Done,
}

/// What to do with a complete data frame that can never parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedFramePolicy {
    /// Terminate the stream with `PayloadInvalid`.
    #[default]
    Fail,
    /// Log and drop the frame, keep reading.
    Skip,
}

/// Bounds on how long an incomplete payload is held for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderLimits {
    /// Continuation lines joined onto a pending payload before giving up.
    pub max_rebuffer_lines: usize,
    /// Largest pending payload, and largest unterminated line kept in the buffer.
    pub max_pending_bytes: usize,
    pub malformed_frame_policy: MalformedFramePolicy,
}

impl Default for ReaderLimits {
    fn default() -> Self {
        Self {
            max_rebuffer_lines: 8,
            max_pending_bytes: 256 * 1024,
            malformed_frame_policy: MalformedFramePolicy::Fail,
        }
    }
}

#[derive(Debug)]
struct PendingPayload {
    text: String,
    joined_lines: usize,
}

/// Incremental parser turning raw chunks into [`FrameEvent`]s.
///
/// Feed bytes with [`FrameReader::feed`], then drain with
/// [`FrameReader::next_event`] until it returns `None`. Call
/// [`FrameReader::finish`] once the underlying stream has closed so a trailing
/// unterminated line is processed too.
///
/// A data payload whose JSON ends early is held back and joined with the next
/// complete line instead of being dropped. Only plain continuation text is
/// joined: a new frame, a comment or a blank line ends the held payload,
/// which then counts as malformed. The retry is bounded by [`ReaderLimits`].
#[derive(Debug)]
pub struct FrameReader {
    decoder: Utf8ChunkDecoder,
    buffer: String,
    pending: Option<PendingPayload>,
    limits: ReaderLimits,
    eof: bool,
    done: bool,
    /// Dropping the rest of an oversized line up to its `\n`.
    discarding_line: bool,
}

impl FrameReader {
    pub fn new(limits: ReaderLimits) -> Self {
        Self {
            decoder: Utf8ChunkDecoder::new(),
            buffer: String::new(),
            pending: None,
            limits,
            eof: false,
            done: false,
            discarding_line: false,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        if self.done || self.eof {
            return;
        }
        let text = self.decoder.decode(bytes);
        self.buffer.push_str(&text);
    }

    pub fn finish(&mut self) {
        if self.eof {
            return;
        }
        let tail = self.decoder.finish();
        self.buffer.push_str(&tail);
        self.eof = true;
    }

    /// True once the `[DONE]` sentinel has been seen; later bytes are ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn next_event(&mut self) -> Option<Result<FrameEvent, AssemblerError>> {
        while !self.done {
            let Some(line) = self.take_line() else {
                if self.buffer.len() > self.limits.max_pending_bytes {
                    if let Some(event) = self.reject_oversized_line() {
                        self.done = true;
                        return Some(event);
                    }
                    continue;
                }
                return self.flush_pending_at_eof();
            };
            if let Some(event) = self.process_line(line) {
                if matches!(event, Ok(FrameEvent::Done) | Err(_)) {
                    self.done = true;
                }
                return Some(event);
            }
        }
        None
    }

    fn take_line(&mut self) -> Option<String> {
        if self.discarding_line {
            match self.buffer.find('\n') {
                Some(index) => {
                    self.buffer.drain(..=index);
                    self.discarding_line = false;
                }
                None => {
                    self.buffer.clear();
                    return None;
                }
            }
        }

        let line = match self.buffer.find('\n') {
            Some(index) => {
                let mut line: String = self.buffer.drain(..=index).collect();
                line.pop();
                line
            }
            None if self.eof && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
            None => return None,
        };
        Some(match line.strip_suffix('\r') {
            Some(stripped) => stripped.to_string(),
            None => line,
        })
    }

    fn process_line(&mut self, line: String) -> Option<Result<FrameEvent, AssemblerError>> {
        if let Some(pending) = self.pending.take() {
            if Frame::classify(&line) == Frame::Other {
                let joined = format!("{}\n{}", pending.text, line);
                return self.parse_payload(joined, pending.joined_lines + 1);
            }
            let interrupted = self.malformed(
                "payload interrupted by the next frame".to_string(),
                pending.text,
            );
            if interrupted.is_some() {
                return interrupted;
            }
        }

        match Frame::classify(&line) {
            Frame::Comment | Frame::Blank => None,
            Frame::Other => {
                trace!("Ignoring non-data line: {:?}", line);
                None
            }
            Frame::Done => Some(Ok(FrameEvent::Done)),
            Frame::Data(payload) => {
                let payload = payload.to_string();
                self.parse_payload(payload, 0)
            }
        }
    }

    fn parse_payload(
        &mut self,
        payload: String,
        joined_lines: usize,
    ) -> Option<Result<FrameEvent, AssemblerError>> {
        trace!("Chat stream payload: {:?}", payload);
        let event_json: Value = match serde_json::from_str(&payload) {
            Ok(json) => json,
            Err(e) if e.is_eof() => {
                if joined_lines >= self.limits.max_rebuffer_lines
                    || payload.len() > self.limits.max_pending_bytes
                {
                    return self.malformed(
                        format!(
                            "payload still incomplete after {} continuation lines",
                            joined_lines
                        ),
                        payload,
                    );
                }
                trace!("Payload incomplete, waiting for more data: {} bytes", payload.len());
                self.pending = Some(PendingPayload {
                    text: payload,
                    joined_lines,
                });
                return None;
            }
            Err(e) => return self.malformed(e.to_string(), payload),
        };

        if let Some(message) = extract_api_error_message(&event_json) {
            return Some(Err(AssemblerError::Upstream(message)));
        }

        match serde_json::from_value::<ChatCompletionChunk>(event_json) {
            Ok(chunk) => Some(Ok(FrameEvent::Delta(chunk.into_content_delta()))),
            Err(e) => self.malformed(format!("unexpected chunk shape: {}", e), payload),
        }
    }

    /// Drop an unterminated line that has outgrown `max_pending_bytes`.
    fn reject_oversized_line(&mut self) -> Option<Result<FrameEvent, AssemblerError>> {
        let line = std::mem::take(&mut self.buffer);
        self.discarding_line = true;
        let reason = format!(
            "line exceeds {} bytes without a terminator",
            self.limits.max_pending_bytes
        );
        self.malformed(reason, line.chars().take(200).collect())
    }

    fn flush_pending_at_eof(&mut self) -> Option<Result<FrameEvent, AssemblerError>> {
        if !self.eof {
            return None;
        }
        let pending = self.pending.take()?;
        let event = self.malformed(
            "stream ended inside an incomplete payload".to_string(),
            pending.text,
        );
        if event.is_some() {
            self.done = true;
        }
        event
    }

    fn malformed(
        &mut self,
        reason: String,
        payload: String,
    ) -> Option<Result<FrameEvent, AssemblerError>> {
        match self.limits.malformed_frame_policy {
            MalformedFramePolicy::Fail => {
                Some(Err(AssemblerError::PayloadInvalid { reason, payload }))
            }
            MalformedFramePolicy::Skip => {
                warn!("Skipping malformed chat stream frame: {}, data: {}", reason, payload);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> FrameReader {
        FrameReader::new(ReaderLimits::default())
    }

    fn drain(reader: &mut FrameReader) -> Vec<Result<FrameEvent, AssemblerError>> {
        std::iter::from_fn(|| reader.next_event()).collect()
    }

    fn delta(text: &str) -> Result<FrameEvent, AssemblerError> {
        Ok(FrameEvent::Delta(text.to_string()))
    }

    #[test]
    fn classifies_frames() {
        assert_eq!(Frame::classify(""), Frame::Blank);
        assert_eq!(Frame::classify(": keep-alive"), Frame::Comment);
        assert_eq!(Frame::classify("data: [DONE]"), Frame::Done);
        assert_eq!(Frame::classify("data:  [DONE] "), Frame::Done);
        assert_eq!(Frame::classify("data: {}"), Frame::Data("{}"));
        assert_eq!(Frame::classify("data:{}"), Frame::Other);
        assert_eq!(Frame::classify("event: message"), Frame::Other);
    }

    #[test]
    fn split_payload_waits_for_line_terminator() {
        let mut reader = reader();
        reader.feed(br#"data: {"choices":[{"delta":{"content":"AB"#);
        assert!(drain(&mut reader).is_empty());

        reader.feed(b"C\"}}]}\n");
        assert_eq!(drain(&mut reader), vec![delta("ABC")]);
    }

    #[test]
    fn strips_carriage_returns() {
        let mut reader = reader();
        reader.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\n");
        assert_eq!(drain(&mut reader), vec![delta("x")]);
    }

    #[test]
    fn comments_blank_and_unknown_lines_are_ignored() {
        let mut reader = reader();
        reader.feed(b": keep-alive\n\nevent: ping\nid: 3\n");
        assert!(drain(&mut reader).is_empty());
    }

    #[test]
    fn sentinel_stops_reading() {
        let mut reader = reader();
        reader.feed(b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n");
        assert_eq!(drain(&mut reader), vec![Ok(FrameEvent::Done)]);
        assert!(reader.is_done());

        reader.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"later\"}}]}\n");
        assert!(drain(&mut reader).is_empty());
    }

    #[test]
    fn trailing_line_without_newline_is_flushed_on_finish() {
        let mut reader = reader();
        reader.feed(br#"data: {"choices":[{"delta":{"content":"tail"}}]}"#);
        assert!(drain(&mut reader).is_empty());

        reader.finish();
        assert_eq!(drain(&mut reader), vec![delta("tail")]);
    }

    #[test]
    fn payload_wrapped_over_lines_is_joined() {
        let mut reader = reader();
        reader.feed(b"data: {\"choices\":[{\"delta\":\n{\"content\":\"joined\"}}]}\n");
        assert_eq!(drain(&mut reader), vec![delta("joined")]);
    }

    #[test]
    fn incomplete_payload_is_bounded() {
        let mut reader = FrameReader::new(ReaderLimits {
            max_rebuffer_lines: 2,
            ..ReaderLimits::default()
        });
        reader.feed(b"data: {\"choices\":[\n[\n[\n[\n");
        let events = drain(&mut reader);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Err(AssemblerError::PayloadInvalid { .. })
        ));
    }

    #[test]
    fn incomplete_payload_at_end_of_stream_is_malformed() {
        let mut reader = reader();
        reader.feed(b"data: {\"choices\":[\n");
        assert!(drain(&mut reader).is_empty());

        reader.finish();
        let events = drain(&mut reader);
        assert!(matches!(
            events.as_slice(),
            [Err(AssemblerError::PayloadInvalid { .. })]
        ));
    }

    #[test]
    fn syntax_error_fails_immediately_under_fail_policy() {
        let mut reader = reader();
        reader.feed(b"data: {not json}\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n");
        let events = drain(&mut reader);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Err(AssemblerError::PayloadInvalid { payload, .. }) if payload == "{not json}"
        ));
    }

    #[test]
    fn syntax_error_is_dropped_under_skip_policy() {
        let mut reader = FrameReader::new(ReaderLimits {
            malformed_frame_policy: MalformedFramePolicy::Skip,
            ..ReaderLimits::default()
        });
        reader.feed(b"data: {not json}\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n");
        assert_eq!(drain(&mut reader), vec![delta("ok")]);
    }

    fn skipping_reader() -> FrameReader {
        FrameReader::new(ReaderLimits {
            malformed_frame_policy: MalformedFramePolicy::Skip,
            ..ReaderLimits::default()
        })
    }

    #[test]
    fn truncated_frame_does_not_swallow_the_next_frame() {
        let mut reader = skipping_reader();
        reader.feed(b"data: {\"choices\":[\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\ndata: [DONE]\n");
        assert_eq!(drain(&mut reader), vec![delta("ok"), Ok(FrameEvent::Done)]);
    }

    #[test]
    fn truncated_frame_does_not_swallow_the_sentinel() {
        let mut reader = skipping_reader();
        reader.feed(b"data: {\"choices\":[\ndata: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n");
        assert_eq!(drain(&mut reader), vec![Ok(FrameEvent::Done)]);
        assert!(reader.is_done());
    }

    #[test]
    fn truncated_frame_followed_by_blank_line_fails_under_fail_policy() {
        let mut reader = reader();
        reader.feed(b"data: {\"choices\":[\n\ndata: {\"choices\":[]}\n");
        let events = drain(&mut reader);
        assert!(matches!(
            events.as_slice(),
            [Err(AssemblerError::PayloadInvalid { payload, .. })] if payload == "{\"choices\":["
        ));
    }

    #[test]
    fn unterminated_line_is_bounded() {
        let mut reader = FrameReader::new(ReaderLimits {
            max_pending_bytes: 64,
            ..ReaderLimits::default()
        });
        reader.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"");
        assert!(drain(&mut reader).is_empty());

        reader.feed(&[b'x'; 128]);
        let events = drain(&mut reader);
        assert!(matches!(
            events.as_slice(),
            [Err(AssemblerError::PayloadInvalid { .. })]
        ));
        assert!(reader.is_done());
    }

    #[test]
    fn oversized_line_is_dropped_up_to_its_terminator_under_skip_policy() {
        let mut reader = FrameReader::new(ReaderLimits {
            max_pending_bytes: 64,
            malformed_frame_policy: MalformedFramePolicy::Skip,
            ..ReaderLimits::default()
        });
        reader.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"");
        reader.feed(&[b'x'; 128]);
        assert!(drain(&mut reader).is_empty());

        reader.feed(b"xxxx\"}}]}\ndata: {\"choices\":[{\"delta\":{\"content\":\"next\"}}]}\n");
        assert_eq!(drain(&mut reader), vec![delta("next")]);
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let mut reader = reader();
        reader.feed(b"data: {\"choices\":[{\"delta\":{\"content\":42}}]}\n");
        assert!(matches!(
            drain(&mut reader).as_slice(),
            [Err(AssemblerError::PayloadInvalid { .. })]
        ));
    }

    #[test]
    fn in_stream_error_object_is_upstream_error() {
        let mut reader = reader();
        reader.feed(b"data: {\"error\":{\"message\":\"model overloaded\"}}\n");
        assert_eq!(
            drain(&mut reader),
            vec![Err(AssemblerError::Upstream("model overloaded".to_string()))]
        );
    }

    #[test]
    fn empty_delta_is_reported_as_empty() {
        let mut reader = reader();
        reader.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n");
        assert_eq!(drain(&mut reader), vec![delta("")]);
    }
}
