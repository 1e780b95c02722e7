//! Binary reassembly for streamed image payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Input bytes per encode slice. A multiple of 3 so slices encode without padding
/// and concatenate into one valid base64 string.
const ENCODE_SLICE_BYTES: usize = 3 * 16 * 1024;

/// Collects decoded binary chunks in arrival order and re-encodes them once.
///
/// One reassembler belongs to one attempt; it is consumed by [`finalize`](Self::finalize).
#[derive(Debug, Default)]
pub struct BinaryReassembler {
    chunks: Vec<Vec<u8>>,
    mime_type: Option<String>,
}

impl BinaryReassembler {
    /// Creates an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes.
    pub fn append(&mut self, bytes: impl Into<Vec<u8>>) {
        self.chunks.push(bytes.into());
    }

    /// Decodes a base64 chunk as sent by the backend and appends it.
    ///
    /// The first MIME type seen is kept.
    pub fn append_base64(&mut self, mime_type: &str, data: &str) -> Result<(), base64::DecodeError> {
        let bytes = STANDARD.decode(data.trim())?;
        if self.mime_type.is_none() && !mime_type.is_empty() {
            self.mime_type = Some(mime_type.to_string());
        }
        self.chunks.push(bytes);
        Ok(())
    }

    /// Returns true if no chunk has been appended.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total number of raw bytes collected.
    pub fn total_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// MIME type of the first chunk, if any.
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Joins the chunks into one buffer and returns its base64 encoding.
    pub fn finalize(self) -> String {
        let total = self.total_len();
        let mut buffer = vec![0u8; total];
        let mut offset = 0;
        for chunk in &self.chunks {
            buffer[offset..offset + chunk.len()].copy_from_slice(chunk);
            offset += chunk.len();
        }

        let mut encoded = String::with_capacity(total.div_ceil(3) * 4);
        for slice in buffer.chunks(ENCODE_SLICE_BYTES) {
            STANDARD.encode_string(slice, &mut encoded);
        }
        encoded
    }
}
