// Line framing for relay → client text.
//
// The relay terminates every line it sends with `\n`. TCP is free to split or
// merge writes, so a reader may see half a line, or three lines at once.
// `LineBuffer` accumulates raw bytes and hands back only complete lines, with
// `\r\n` / `\n` stripped and UTF-8 decoded lossily (a chat feed should keep
// flowing past one bad byte).
//
// `MAX_LINE_LEN` (64 KB) bounds the buffer: a peer that never sends `\n`
// gets its pending bytes emitted as one line instead of growing the buffer
// forever.

/// Longest partial line held before it is emitted unterminated.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Append the `\n` terminator.
pub fn encode_line(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Reassembles `\n`-terminated lines from arbitrary read chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every line completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw));
        }

        if self.pending.len() > MAX_LINE_LEN {
            let raw = std::mem::take(&mut self.pending);
            lines.push(decode_line(&raw));
        }

        lines
    }

    /// Take whatever partial line is buffered (e.g. when the peer closes).
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.trim_end_matches(['\r', '\n']).to_string()
}
