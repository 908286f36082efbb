//! Fixed-window text splitting.
//!
//! Chunks are measured in characters, not bytes, so multi-byte scripts split
//! at the same boundaries as ASCII. Consecutive chunks share `overlap`
//! characters of context.

use crate::types::CoreError;

#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    window: usize,
    overlap: usize,
}

impl Splitter {
    pub fn new(window: usize, overlap: usize) -> Result<Self, CoreError> {
        if window == 0 {
            return Err(CoreError::Ingestion("chunk window must be non-zero".into()));
        }
        if overlap >= window {
            return Err(CoreError::Ingestion(format!(
                "chunk overlap {overlap} must be smaller than window {window}"
            )));
        }
        Ok(Self { window, overlap })
    }

    /// Splits `text` into windows of at most `window` characters, each
    /// starting `window - overlap` characters after the previous one. Empty
    /// or whitespace-only input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();
        let step = self.window - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.window).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}
