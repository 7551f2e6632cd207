//! Document identifiers.
//!
//! A [`DocumentId`] is a 128-bit value rendered as a fixed-length token of
//! 32 lowercase hex characters (a v4 UUID without dashes). The newtype keeps
//! ids from being confused with arbitrary strings such as dependency names
//! or file uids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::CoreError;

/// Length of the rendered id token.
pub const ID_LENGTH: usize = 32;

/// Stable document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        DocumentId(Uuid::new_v4())
    }

    /// Parses a 32-character hex token.
    ///
    /// Dashed UUID renderings are rejected so that every stored id has
    /// exactly one spelling.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        if !is_valid_id(value) {
            return Err(CoreError::InvalidId {
                value: value.to_string(),
            });
        }
        Uuid::parse_str(value)
            .map(DocumentId)
            .map_err(|_| CoreError::InvalidId {
                value: value.to_string(),
            })
    }

    /// The id token as an owned string.
    pub fn as_token(&self) -> String {
        self.0.simple().to_string()
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if `value` is a well-formed id token.
pub fn is_valid_id(value: &str) -> bool {
    value.len() == ID_LENGTH && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Generates a fresh id token for things that are not documents
/// (file location uids, for example).
pub fn unique_token() -> String {
    DocumentId::new().as_token()
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for DocumentId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentId::parse(s)
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_token())
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DocumentId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
