/// Accumulates raw body bytes and hands back complete lines.
///
/// Bytes are kept undecoded until a newline arrives so a multi-byte
/// character split across network chunks is never mangled.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator. `\r\n` and `\n` both end a line.
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the body has ended, if it is not blank.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest);
        let trimmed = text.trim_end_matches(['\r', '\n']);
        (!trimmed.trim().is_empty()).then(|| trimmed.to_string())
    }
}

/// One classified SSE line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Payload of a `data:` line, trimmed.
    Data(&'a str),
    /// The `[DONE]` sentinel.
    Done,
    /// Comments, `event:`/`id:` fields and blank separators.
    Ignored,
}

pub fn classify_line(line: &str) -> SseLine<'_> {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseLine::Ignored;
    };
    match payload.trim() {
        "[DONE]" => SseLine::Done,
        "" => SseLine::Ignored,
        data => SseLine::Data(data),
    }
}
