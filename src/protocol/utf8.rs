//! Incremental UTF-8 validation for fragmented text messages.

use crate::error::{Error, Result};

/// Validates a text message fragment by fragment, carrying an incomplete
/// trailing code point over to the next fragment.
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    pending: Vec<u8>,
}

impl Utf8Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the next fragment. On the final fragment every code point must
    /// be complete.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUtf8` on any invalid sequence.
    pub fn feed(&mut self, data: &[u8], is_final: bool) -> Result<()> {
        let joined;
        let bytes = if self.pending.is_empty() {
            data
        } else {
            joined = [std::mem::take(&mut self.pending).as_slice(), data].concat();
            joined.as_slice()
        };

        match std::str::from_utf8(bytes) {
            Ok(_) => Ok(()),
            // error_len() == None: the input ended in the middle of a code point.
            Err(e) if e.error_len().is_none() && !is_final => {
                self.pending.extend_from_slice(&bytes[e.valid_up_to()..]);
                Ok(())
            }
            Err(_) => Err(Error::InvalidUtf8),
        }
    }

    /// `true` while a partial code point is buffered.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        !self.pending.is_empty()
    }
}
