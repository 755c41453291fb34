use bytes::Bytes;

/// One server-sent event as parsed off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE reader.
///
/// Bytes may arrive split at arbitrary points, including mid-line and
/// mid-record; input is buffered until a full line (and a blank-line
/// record terminator) has been seen.
#[derive(Debug, Default)]
pub struct SseReader {
    buf: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &Bytes) -> Vec<SseFrame> {
        let Ok(text) = std::str::from_utf8(chunk) else {
            return Vec::new();
        };
        self.feed_str(text)
    }

    pub fn feed_str(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        while let Some(nl) = self.buf.find('\n') {
            let mut line = self.buf[..nl].to_string();
            self.buf.drain(..=nl);
            if line.ends_with('\r') {
                line.pop();
            }
            if line.is_empty() {
                self.flush_record(&mut out);
            } else {
                self.take_line(&line);
            }
        }
        out
    }

    /// Drains whatever is left after the upstream closed, including a
    /// final record that was never terminated by a blank line.
    pub fn close(&mut self) -> Vec<SseFrame> {
        if !self.buf.is_empty() {
            let tail = std::mem::take(&mut self.buf);
            let tail = tail.strip_suffix('\r').unwrap_or(&tail);
            if !tail.is_empty() {
                self.take_line(tail);
            }
        }
        let mut out = Vec::new();
        self.flush_record(&mut out);
        out
    }

    fn take_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.event = (!value.is_empty()).then(|| value.to_string());
            }
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }

    fn flush_record(&mut self, out: &mut Vec<SseFrame>) {
        if self.event.is_none() && self.data.is_empty() {
            return;
        }
        out.push(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        });
    }
}

/// Frames a payload back into an SSE record.
pub fn frame_data(payload: &str) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_split_records() {
        let mut reader = SseReader::new();
        assert!(reader.feed_str("data: {\"a\":").is_empty());
        assert!(reader.feed_str("1}\n").is_empty());
        let frames = reader.feed_str("\ndata: next\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "{\"a\":1}");
        assert_eq!(frames[1].data, "next");
    }

    #[test]
    fn carries_event_names_and_skips_comments() {
        let mut reader = SseReader::new();
        let frames = reader.feed_str(": keep-alive\nevent: response.completed\ndata: {}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("response.completed"));
        assert_eq!(frames[0].data, "{}");
    }

    #[test]
    fn close_flushes_unterminated_record() {
        let mut reader = SseReader::new();
        assert!(reader.feed_str("data: tail").is_empty());
        let frames = reader.close();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "tail");
    }

    #[test]
    fn joins_multi_line_data() {
        let mut reader = SseReader::new();
        let frames = reader.feed_str("data: a\ndata: b\n\n");
        assert_eq!(frames[0].data, "a\nb");
    }
}
