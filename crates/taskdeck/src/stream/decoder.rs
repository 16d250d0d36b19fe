//! Incremental event-stream frame decoder.
//!
//! Network reads do not respect frame boundaries, so the decoder keeps the
//! unparsed tail of the stream in a byte buffer and only parses a frame once
//! its blank-line separator has arrived. Buffering bytes rather than text keeps
//! multi-byte characters intact when a read splits them.

use taskdeck_protocol::{DEFAULT_EVENT_NAME, StreamFrame};

const SEPARATOR: &[u8] = b"\n\n";

/// Per-session frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.append_normalized(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = find(&self.buffer, SEPARATOR) {
            let raw: Vec<u8> = self.buffer.drain(..pos + SEPARATOR.len()).collect();
            let text = String::from_utf8_lossy(&raw[..pos]);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Append `chunk`, folding `\r\n` into `\n`, including a pair split
    /// between the previous chunk and this one.
    fn append_normalized(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        if self.buffer.last() == Some(&b'\r') && rest.first() == Some(&b'\n') {
            self.buffer.pop();
        }
        while let Some(pos) = find(rest, b"\r\n") {
            self.buffer.extend_from_slice(&rest[..pos]);
            self.buffer.push(b'\n');
            rest = &rest[pos + 2..];
        }
        self.buffer.extend_from_slice(rest);
    }
}

/// Parse one frame body (without its separator).
///
/// Returns `None` for frames without any `data:` line, such as heartbeats.
fn parse_frame(text: &str) -> Option<StreamFrame> {
    let mut event = DEFAULT_EVENT_NAME.to_string();
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            let value = value.trim();
            if !value.is_empty() {
                event = value.to_string();
            }
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.trim());
        }
    }

    if data.is_empty() {
        return None;
    }

    Some(StreamFrame {
        event,
        data: data.join("\n"),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG_FRAME: &str = "event: log\ndata: {\"log\":{\"id\":\"1\",\"sequence\":1,\"message\":\"héllo\"}}\n\n";

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: hello\n\n");
        assert_eq!(frames, vec![StreamFrame::message("hello")]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_event_name_and_trimmed_data() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"event:  log \ndata:   {\"a\":1}  \n\n");
        assert_eq!(frames, vec![StreamFrame::new("log", "{\"a\":1}")]);
    }

    #[test]
    fn test_multiple_data_lines_are_joined() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: first\ndata: second\ndata: third\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "first\nsecond\nthird");
    }

    #[test]
    fn test_comments_and_unknown_fields_are_ignored() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b": keepalive\nid: 42\nretry: 1000\ndata: x\n\n");
        assert_eq!(frames, vec![StreamFrame::message("x")]);
    }

    #[test]
    fn test_frame_without_data_is_discarded() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b": heartbeat\n\n").is_empty());
        assert!(decoder.feed(b"event: ping\n\n").is_empty());
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: one\n\n: hb\n\nevent: log\ndata: two\n\ndata: thr");
        assert_eq!(
            frames,
            vec![StreamFrame::message("one"), StreamFrame::new("log", "two")]
        );
        assert_eq!(decoder.pending_len(), "data: thr".len());

        let frames = decoder.feed(b"ee\n\n");
        assert_eq!(frames, vec![StreamFrame::message("three")]);
    }

    #[test]
    fn test_frame_is_not_parsed_before_separator() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: partial\n").is_empty());
        assert!(decoder.feed(b"data: more").is_empty());
        let frames = decoder.feed(b"\n\n");
        assert_eq!(frames[0].data, "partial\nmore");
    }

    #[test]
    fn test_split_at_every_offset_yields_identical_frame() {
        let bytes = LOG_FRAME.as_bytes();
        let expected = FrameDecoder::new().feed(bytes);
        assert_eq!(expected.len(), 1);

        for split in 0..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.feed(&bytes[..split]);
            frames.extend(decoder.feed(&bytes[split..]));
            assert_eq!(frames, expected, "split at byte {split}");
            assert_eq!(decoder.pending_len(), 0);
        }
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"event: log\r\ndata: a\r\n\r\n");
        assert_eq!(frames, vec![StreamFrame::new("log", "a")]);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: b\r\n\r").is_empty());
        let frames = decoder.feed(b"\n");
        assert_eq!(frames, vec![StreamFrame::message("b")]);
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"data: stale");
        decoder.reset();
        let frames = decoder.feed(b"data: fresh\n\n");
        assert_eq!(frames, vec![StreamFrame::message("fresh")]);
    }

    #[test]
    fn test_empty_event_name_keeps_default() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"event:\ndata: {}\n\nevent:   \ndata: x\n\n");
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|frame| frame.event == DEFAULT_EVENT_NAME));
    }
}
