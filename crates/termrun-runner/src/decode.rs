//! Incremental UTF-8 decoding of process output.
//!
//! Reads from a pipe or PTY split multi-byte characters at arbitrary
//! boundaries. The decoder holds back an incomplete trailing sequence until
//! the next chunk arrives, so every emitted chunk is valid text on its own.

/// Stateful bytes-to-text decoder for one output stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk of bytes.
    ///
    /// Returns all complete characters; invalid sequences become U+FFFD. An
    /// incomplete sequence at the end is kept for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let keep = rest.len();
        let drain_to = self.pending.len() - keep;
        self.pending.drain(..drain_to);
        text
    }

    /// Flush whatever is held back once the stream has ended.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    /// Number of bytes waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ascii_passthrough() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(b"hello\n"), "hello\n");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_split_multibyte_character() {
        let bytes = "é".as_bytes();
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(&bytes[..1]), "");
        assert_eq!(decoder.pending_len(), 1);
        assert_eq!(decoder.push(&bytes[1..]), "é");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_split_four_byte_character() {
        let bytes = "a🦀b".as_bytes();
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(&bytes[..3]), "a");
        assert_eq!(decoder.push(&bytes[3..5]), "🦀");
        assert_eq!(decoder.push(&bytes[5..]), "b");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(b"a\xffb"), "a\u{fffd}b");
    }

    #[test]
    fn test_finish_flushes_truncated_sequence() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(&"é".as_bytes()[..1]), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
        assert_eq!(decoder.pending_len(), 0);
    }

    proptest! {
        #[test]
        fn prop_any_split_reassembles(text in "\\PC{0,64}", split in 0usize..256) {
            let bytes = text.as_bytes();
            let at = split.min(bytes.len());
            let mut decoder = Utf8Decoder::new();
            let mut out = decoder.push(&bytes[..at]);
            out.push_str(&decoder.push(&bytes[at..]));
            out.push_str(&decoder.finish());
            prop_assert_eq!(out, text);
        }
    }
}
