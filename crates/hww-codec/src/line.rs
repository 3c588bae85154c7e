use thiserror::Error;

/// Upper bound for a single line; a device that never sends `\n` must not
/// grow the buffer forever.
pub const MAX_LINE_LEN: usize = 64 * 1024;

const TERMINATOR: u8 = b'\n';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("line exceeds {MAX_LINE_LEN} bytes")]
    LineTooLong,
    #[error("line is not valid utf-8")]
    InvalidUtf8,
    #[error("frame is not valid hex")]
    InvalidHex,
    #[error("frame too short: {0} hex chars")]
    FrameTooShort(usize),
}

/// Reassembles newline-terminated lines from arbitrarily chunked reads.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes received after the last complete line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete line without its terminator.
    ///
    /// Blank lines are skipped. An error consumes only the offending line, so
    /// callers can keep polling after one.
    pub fn try_next(&mut self) -> Result<Option<String>, CodecError> {
        loop {
            let Some(end) = self.buffer.iter().position(|&b| b == TERMINATOR) else {
                if self.buffer.len() > MAX_LINE_LEN {
                    self.buffer.clear();
                    return Err(CodecError::LineTooLong);
                }
                return Ok(None);
            };

            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.len() > MAX_LINE_LEN {
                return Err(CodecError::LineTooLong);
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return String::from_utf8(line)
                .map(Some)
                .map_err(|_| CodecError::InvalidUtf8);
        }
    }
}

pub fn encode_line(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(TERMINATOR);
    bytes
}
