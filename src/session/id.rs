//! Session identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque, globally unique session token.
///
/// Server-minted ids are UUID v4 (128 random bits). Client-supplied ids are
/// accepted as long as they are short visible ASCII, which is all a header
/// value can safely round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSessionId {
    #[error("session id is empty")]
    Empty,

    #[error("session id is {0} bytes, limit is {max}", max = SessionId::MAX_LEN)]
    TooLong(usize),

    #[error("session id must be visible ASCII")]
    BadCharacter,
}

impl SessionId {
    pub const MAX_LEN: usize = 128;

    /// Mint a fresh id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate a client-supplied id.
    pub fn parse(raw: &str) -> Result<Self, InvalidSessionId> {
        if raw.is_empty() {
            return Err(InvalidSessionId::Empty);
        }
        if raw.len() > Self::MAX_LEN {
            return Err(InvalidSessionId::TooLong(raw.len()));
        }
        if !raw.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(InvalidSessionId::BadCharacter);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
