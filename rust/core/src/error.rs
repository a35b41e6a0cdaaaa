// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for STEP scanning and element indexing.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading a STEP/IFC payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Payload is not valid UTF-8 (first invalid byte at {0})")]
    InvalidUtf8(usize),

    #[error("Missing ISO-10303-21 header")]
    MissingHeader,

    #[error("Missing DATA section")]
    MissingDataSection,

    #[error("Parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Entity #{0} is defined more than once")]
    DuplicateEntity(u32),

    #[error("Unterminated entity starting at byte {0}")]
    Unterminated(usize),
}

impl Error {
    /// Build a parse error at the given byte offset.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
        }
    }
}
