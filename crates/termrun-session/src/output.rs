//! Replay buffer of session output.

/// Append-only sequence of output chunks.
///
/// Chunks are kept exactly as they arrived (stdout and stderr interleaved
/// in arrival order) so a late reader can replay the stream verbatim. Once
/// frozen the buffer rejects further appends.
#[derive(Debug, Default, Clone)]
pub struct OutputBuffer {
    chunks: Vec<String>,
    bytes: usize,
    frozen: bool,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns false (and drops the chunk) once frozen.
    pub fn append(&mut self, chunk: impl Into<String>) -> bool {
        if self.frozen {
            return false;
        }
        let chunk = chunk.into();
        self.bytes += chunk.len();
        self.chunks.push(chunk);
        true
    }

    /// Stop accepting chunks. Irreversible.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether the buffer has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// All chunks in arrival order.
    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total size of all chunks in bytes.
    pub fn size(&self) -> usize {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_buffer_new() {
        let buffer = OutputBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.size(), 0);
        assert!(!buffer.is_frozen());
    }

    #[test]
    fn test_output_buffer_append() {
        let mut buffer = OutputBuffer::new();
        assert!(buffer.append("Hello"));
        assert!(buffer.append(" World"));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.size(), 11);
        assert_eq!(buffer.chunks(), &["Hello".to_string(), " World".to_string()]);
    }

    #[test]
    fn test_output_buffer_frozen_rejects_appends() {
        let mut buffer = OutputBuffer::new();
        buffer.append("done\n");
        buffer.freeze();

        assert!(!buffer.append("late"));
        assert_eq!(buffer.len(), 1);
        assert!(buffer.is_frozen());
    }

    #[test]
    fn test_output_buffer_keeps_empty_chunks_in_order() {
        let mut buffer = OutputBuffer::new();
        buffer.append("a");
        buffer.append("");
        buffer.append("b");
        assert_eq!(buffer.chunks().concat(), "ab");
        assert_eq!(buffer.len(), 3);
    }
}
