use std::fmt;

use memchr::memchr;
use tracing::warn;

use crate::api::StreamFrame;

/// Prefix marking a line as a frame; every other line is ignored.
pub const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Chunk(String),
    Done,
}

/// A frame that could not be decoded. Never fatal: the frame is skipped.
#[derive(Debug)]
pub enum ParseError {
    InvalidUtf8(std::str::Utf8Error),
    InvalidJson(serde_json::Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidUtf8(err) => write!(f, "invalid UTF-8 in stream frame: {err}"),
            ParseError::InvalidJson(err) => write!(f, "invalid JSON in stream frame: {err}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::InvalidUtf8(err) => Some(err),
            ParseError::InvalidJson(err) => Some(err),
        }
    }
}

/// Decode one complete line. `Ok(None)` covers non-frame lines and frames
/// that carry nothing to deliver.
pub fn parse_frame_line(line: &str) -> Result<Option<FrameEvent>, ParseError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };

    let frame: StreamFrame = serde_json::from_str(payload).map_err(ParseError::InvalidJson)?;
    if frame.done == Some(true) {
        return Ok(Some(FrameEvent::Done));
    }

    Ok(frame
        .chunk
        .filter(|chunk| !chunk.is_empty())
        .map(FrameEvent::Chunk))
}

/// Incremental decoder for the newline-delimited frame protocol.
///
/// Bytes are buffered until a newline arrives, so a line (or a multi-byte
/// character) split across reads is decoded once it is complete. After a
/// `done` frame the decoder ignores all further input.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<FrameEvent> {
        if self.finished {
            return Vec::new();
        }

        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let parsed = std::str::from_utf8(&self.buffer[..newline_pos])
                .map_err(ParseError::InvalidUtf8)
                .and_then(parse_frame_line);
            self.buffer.drain(..=newline_pos);

            match parsed {
                Ok(Some(FrameEvent::Done)) => {
                    self.finished = true;
                    self.buffer.clear();
                    events.push(FrameEvent::Done);
                    break;
                }
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Skipping malformed stream frame"),
            }
        }

        events
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes of an unterminated line still waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(events: &[FrameEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|event| match event {
                FrameEvent::Chunk(text) => Some(text.as_str()),
                FrameEvent::Done => None,
            })
            .collect()
    }

    #[test]
    fn decodes_chunks_in_order_and_stops_at_done() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(
            b"data: {\"chunk\":\"Hi\"}\ndata: {\"chunk\":\" there\"}\ndata: {\"done\":true}\n",
        );

        assert_eq!(chunks(&events), vec!["Hi", " there"]);
        assert_eq!(events.last(), Some(&FrameEvent::Done));
        assert_eq!(events.len(), 3);
        assert!(decoder.is_finished());
    }

    #[test]
    fn malformed_frame_is_skipped_without_interrupting_delivery() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(
            b"data: {\"chunk\":\"one\"}\ndata: not-json\ndata: {\"chunk\":\"two\"}\n",
        );

        assert_eq!(chunks(&events), vec!["one", "two"]);
        assert!(!decoder.is_finished());
    }

    #[test]
    fn partial_lines_wait_for_the_next_read() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.push(b"data: {\"chu").is_empty());
        assert_eq!(decoder.pending_len(), 11);

        let events = decoder.push(b"nk\":\"Hel\"}\ndata: {\"chunk\":\"lo\"}");
        assert_eq!(chunks(&events), vec!["Hel"]);

        let events = decoder.push(b"\n");
        assert_eq!(chunks(&events), vec!["lo"]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn multibyte_characters_survive_read_boundaries() {
        let line = "data: {\"chunk\":\"caf\u{e9} \u{1f33f}\"}\n".as_bytes();
        let split = line.len() - 5;
        let mut decoder = FrameDecoder::new();

        assert!(decoder.push(&line[..split]).is_empty());
        let events = decoder.push(&line[split..]);
        assert_eq!(chunks(&events), vec!["caf\u{e9} \u{1f33f}"]);
    }

    #[test]
    fn non_frame_lines_and_empty_chunks_deliver_nothing() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(
            b": keep-alive\n\nevent: message\ndata:{\"chunk\":\"no space\"}\ndata: {\"chunk\":\"\"}\ndata: {}\n",
        );

        assert!(events.is_empty());
    }

    #[test]
    fn crlf_terminated_frames_are_accepted() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: {\"chunk\":\"ok\"}\r\ndata: {\"done\":true}\r\n");

        assert_eq!(events, vec![FrameEvent::Chunk("ok".to_string()), FrameEvent::Done]);
    }

    #[test]
    fn done_frame_wins_over_its_chunk_and_ends_decoding() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(
            b"data: {\"chunk\":\"ignored\",\"done\":true}\ndata: {\"chunk\":\"late\"}\n",
        );
        assert_eq!(events, vec![FrameEvent::Done]);

        assert!(decoder.push(b"data: {\"chunk\":\"later\"}\n").is_empty());
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = b"data: {\"chunk\":\"".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b"\"}\ndata: {\"chunk\":\"fine\"}\n");

        let events = decoder.push(&bytes);
        assert_eq!(chunks(&events), vec!["fine"]);
    }

    #[test]
    fn parse_frame_line_reports_json_errors() {
        assert!(matches!(
            parse_frame_line("data: not-json"),
            Err(ParseError::InvalidJson(_))
        ));
        assert!(matches!(parse_frame_line("id: 4"), Ok(None)));
    }
}
