//! Incremental Server-Sent Events framing.
//!
//! Bytes go in as they arrive from the body stream; complete `data` payloads
//! come out. Line endings may be LF, CRLF or CR, and may be split across
//! chunks. Comment lines (keep-alives) and frames without `data` produce
//! nothing. A trailing frame with no terminating blank line is dropped.

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    last_was_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every payload it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        for &byte in chunk {
            match byte {
                b'\r' => {
                    self.buffer.push(b'\n');
                    self.last_was_cr = true;
                }
                b'\n' if self.last_was_cr => {
                    self.last_was_cr = false;
                }
                _ => {
                    self.buffer.push(byte);
                    self.last_was_cr = false;
                }
            }
        }

        let mut payloads = Vec::new();
        while let Some(idx) = find_frame_end(&self.buffer) {
            let raw_event: Vec<u8> = self.buffer.drain(..idx + 2).collect();
            let raw_event = String::from_utf8_lossy(&raw_event[..idx]);
            if let Some(data) = extract_sse_data(&raw_event) {
                payloads.push(data);
            }
        }
        payloads
    }

    pub fn has_partial_frame(&self) -> bool {
        self.buffer.iter().any(|b| !b.is_ascii_whitespace())
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn extract_sse_data(raw: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.strip_prefix(' ').unwrap_or(data));
        } else if line == "data" {
            data_lines.push("");
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
