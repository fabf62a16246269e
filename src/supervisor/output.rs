//! Agent output capture
//!
//! One scanning loop runs per child stream. Every line is logged, kept in a
//! bounded buffer and checked against the readiness marker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

use super::latch::{ReadinessLatch, ReadySignal, StreamName};

/// Longest line prefix kept; the rest of a longer line is discarded unread
const MAX_LINE_BYTES: usize = 64 * 1024;

/// A captured output line
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OutputLine {
    pub stream: StreamName,
    pub line: String,
}

/// Bounded FIFO of output lines; the oldest lines are evicted first
#[derive(Debug)]
pub struct OutputBuffer {
    lines: VecDeque<OutputLine>,
    max_lines: usize,
    dropped: u64,
}

impl OutputBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines,
            dropped: 0,
        }
    }

    pub fn push(&mut self, stream: StreamName, line: &str) {
        if self.max_lines == 0 {
            self.dropped += 1;
            return;
        }
        while self.lines.len() >= self.max_lines {
            self.lines.pop_front();
            self.dropped += 1;
        }
        let line = if line.len() > MAX_LINE_BYTES {
            let mut end = MAX_LINE_BYTES;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            line[..end].to_string()
        } else {
            line.to_string()
        };
        self.lines.push_back(OutputLine { stream, line });
    }

    pub fn snapshot(&self) -> Vec<OutputLine> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines evicted so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    #[cfg(test)]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.line.contains(needle))
    }
}

pub type SharedOutput = Arc<Mutex<OutputBuffer>>;

/// Read `reader` line by line until EOF
///
/// The marker check happens before the line is buffered so a full buffer
/// never delays readiness.
pub async fn scan_lines<R>(
    stream: StreamName,
    reader: R,
    marker: Option<String>,
    latch: ReadinessLatch,
    output: SharedOutput,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();

    loop {
        raw.clear();
        match read_capped_line(&mut reader, &mut raw).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(stream = stream.as_str(), error = %e, "Failed to read agent output");
                break;
            }
        }

        let text = String::from_utf8_lossy(&raw);
        let line = text.trim_end_matches(['\r', '\n']);

        tracing::debug!(target: "ubt_harness::agent", stream = stream.as_str(), "{}", line);

        if let Some(marker) = marker.as_deref() {
            if line.contains(marker)
                && latch.fire(ReadySignal {
                    stream,
                    line: line.to_string(),
                })
            {
                tracing::debug!(stream = stream.as_str(), "Readiness marker observed");
            }
        }

        match output.lock() {
            Ok(mut buf) => buf.push(stream, line),
            Err(poisoned) => poisoned.into_inner().push(stream, line),
        }
    }

    tracing::trace!(stream = stream.as_str(), "Agent stream closed");
}

/// Read one line, keeping at most [`MAX_LINE_BYTES`] of it in `raw`
///
/// Bytes past the cap are consumed up to and including the newline but
/// never stored. Returns the number of bytes consumed; 0 means EOF.
async fn read_capped_line<R>(reader: &mut R, raw: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(consumed);
        }

        let (segment, line_done) = match available.iter().position(|b| *b == b'\n') {
            Some(end) => (&available[..=end], true),
            None => (available, false),
        };
        let room = MAX_LINE_BYTES.saturating_sub(raw.len());
        raw.extend_from_slice(&segment[..segment.len().min(room)]);

        let used = segment.len();
        reader.consume(used);
        consumed += used;
        if line_done {
            return Ok(consumed);
        }
    }
}
