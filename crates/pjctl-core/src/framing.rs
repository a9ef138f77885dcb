//! Delimiter-based framing of the incoming byte stream.
//!
//! Devices speaking an ASCII protocol deliver responses in arbitrary chunks:
//! one read may carry half a response, or three responses and the start of a
//! fourth. [`LineFramer`] buffers the stream and emits a frame each time the
//! delimiter is seen. Text that has not yet been terminated is kept until a
//! later chunk completes it and nothing is validated here. A run of more
//! than [`MAX_PENDING`] bytes without a delimiter is logged and discarded.

use tracing::warn;

/// Longest unterminated run kept before the buffer is reset.
pub const MAX_PENDING: usize = 64 * 1024;

/// Buffers input and emits a frame whenever the delimiter is encountered.
///
/// Frames keep their delimiter, so `(PWR!1)` arrives as `(PWR!1)` when the
/// delimiter is `)`. Bytes are decoded lossily as UTF-8.
#[derive(Debug, Clone)]
pub struct LineFramer {
    delimiter: Vec<u8>,
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Create a framer splitting on `delimiter`.
    ///
    /// An empty delimiter is replaced by `\n`.
    pub fn new(delimiter: impl AsRef<[u8]>) -> Self {
        let delimiter = delimiter.as_ref();
        Self {
            delimiter: if delimiter.is_empty() {
                b"\n".to_vec()
            } else {
                delimiter.to_vec()
            },
            buffer: Vec::with_capacity(256),
        }
    }

    /// Feed a chunk of bytes, returning every frame it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        let dlen = self.delimiter.len();

        for &b in bytes {
            self.buffer.push(b);
            if self.buffer.len() >= dlen && self.buffer.ends_with(&self.delimiter) {
                frames.push(String::from_utf8_lossy(&self.buffer).into_owned());
                self.buffer.clear();
            } else if self.buffer.len() > MAX_PENDING {
                warn!(bytes = self.buffer.len(), "No delimiter found; discarding buffer");
                self.buffer.clear();
            }
        }

        frames
    }

    /// Number of buffered bytes still waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut framer = LineFramer::new(")");
        let frames = framer.push(b"(PWR!1)(SHU!0)");
        assert_eq!(frames, vec!["(PWR!1)", "(SHU!0)"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_partial_frame_is_retained() {
        let mut framer = LineFramer::new(")");
        assert!(framer.push(b"(SIN+MA").is_empty());
        assert_eq!(framer.pending(), 7);

        let frames = framer.push(b"IN!3)(PW");
        assert_eq!(frames, vec!["(SIN+MAIN!3)"]);
        assert_eq!(framer.pending(), 3);
    }

    #[test]
    fn test_unterminated_noise_is_kept_until_delimiter() {
        let mut framer = LineFramer::new(")");
        assert!(framer.push(b"Lamp Hours = 1234:56\r\n").is_empty());
        let frames = framer.push(b")");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("Lamp Hours = 1234:56"));
    }

    #[test]
    fn test_multi_byte_delimiter_across_chunks() {
        let mut framer = LineFramer::new("\r\n");
        assert!(framer.push(b"OK\r").is_empty());
        assert_eq!(framer.push(b"\nNEXT"), vec!["OK\r\n"]);
    }

    #[test]
    fn test_runaway_data_is_discarded() {
        let mut framer = LineFramer::new(")");
        let banner = vec![b'x'; MAX_PENDING + 10];
        assert!(framer.push(&banner).is_empty());
        assert_eq!(framer.pending(), 9);

        assert_eq!(framer.push(b"(PWR!1)"), vec!["xxxxxxxxx(PWR!1)"]);
    }

    #[test]
    fn test_empty_delimiter_defaults_to_newline() {
        let mut framer = LineFramer::new("");
        assert_eq!(framer.push(b"OK\nNEXT"), vec!["OK\n"]);
    }
}
