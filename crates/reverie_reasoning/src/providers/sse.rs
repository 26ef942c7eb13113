//! Shared SSE buffer management for streaming providers.
//!
//! Ollama (OpenAI-compatible) streams one `data:` line per chunk; Anthropic
//! streams `event:`/`data:` blocks separated by blank lines.

/// A reusable buffer for SSE byte stream parsing.
pub(crate) struct SseBuffer {
    buffer: String,
    /// Bytes of a UTF-8 sequence split across chunks.
    pending: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
        }
    }

    /// Append raw bytes. A multi-byte character split across chunks is held
    /// back until its remaining bytes arrive; invalid bytes become U+FFFD.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(s) => {
                self.buffer.push_str(s);
                self.pending.clear();
                return;
            }
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                self.buffer.push_str(&String::from_utf8_lossy(&self.pending));
                self.pending.clear();
                return;
            }
        };
        let rest = self.pending.split_off(valid_up_to);
        self.buffer.push_str(&String::from_utf8_lossy(&self.pending));
        self.pending = rest;
    }

    /// Extract complete newline-terminated lines (trimmed). Partial trailing data stays buffered.
    pub fn extract_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);
            lines.push(line);
        }
        lines
    }

    /// Extract complete blank-line-delimited event blocks. Partial trailing data stays buffered.
    pub fn extract_event_blocks(&mut self) -> Vec<String> {
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut blocks = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + 2);
            blocks.push(block);
        }
        blocks
    }

    /// Drain whatever is left once the stream has ended: a final line or
    /// block the server did not terminate.
    pub fn take_residue(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

/// Split an event block into its `event:` name and joined `data:` payload.
pub(crate) fn parse_event_block(block: &str) -> (String, String) {
    let mut event_type = String::new();
    let mut data = Vec::new();
    for line in block.lines() {
        if let Some(t) = line.strip_prefix("event:") {
            event_type = t.trim().to_string();
        } else if let Some(d) = line.strip_prefix("data:") {
            data.push(d.strip_prefix(' ').unwrap_or(d));
        }
    }
    (event_type, data.join("\n"))
}
