use std::fmt;

use crate::error::StageError;

/// One ASCII instruction as it goes on the wire, terminator included.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CommandFrame(Vec<u8>);

impl CommandFrame {
    /// Wraps text produced by a dialect. The dialect guarantees ASCII.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into().into_bytes())
    }

    /// Encodes a caller supplied literal, refusing anything outside ASCII.
    pub fn ascii(text: &str) -> Result<Self, StageError> {
        if !text.is_ascii() {
            return Err(StageError::NonAscii(text.to_string()));
        }
        Ok(Self(text.as_bytes().to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Readable form with `terminator` removed from the end, if present.
    pub fn text_without(&self, terminator: &[u8]) -> String {
        let body = self.0.strip_suffix(terminator).unwrap_or(&self.0);
        String::from_utf8_lossy(body).into_owned()
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
