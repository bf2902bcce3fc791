//! Incremental SSE framing for streamed completions.
//!
//! The response body arrives as arbitrary byte chunks. The decoder buffers
//! bytes until a newline completes a line, then interprets `data: ` lines:
//! the literal `[DONE]` terminates the stream, anything else is one JSON
//! chunk payload. Lines without the `data: ` prefix (comments, keepalives,
//! `event:`/`id:` fields) are ignored.

/// One framed event from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload text following `data: `.
    Data(String),
    /// The `[DONE]` terminator.
    Done,
}

/// Stateful line decoder; feed it byte chunks as they arrive.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one network chunk and return every completed event.
    ///
    /// Partial trailing text stays buffered until more bytes arrive.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush the unterminated tail at end of stream.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

/// Interpret one raw line (trailing `\n`/`\r` tolerated).
fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return None;
    }
    let payload = line.strip_prefix("data: ")?;
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(payload.to_string()))
}
