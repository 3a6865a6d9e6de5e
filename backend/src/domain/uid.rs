//! DHIS2 object identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of every DHIS2 UID.
pub const UID_LENGTH: usize = 11;

/// Rejection of a candidate identifier.
///
/// Every variant carries the rejected input so the failure can be shown
/// verbatim to whoever supplied it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidUid {
    /// The identifier was empty.
    #[error("invalid UID: identifier is empty")]
    Empty,
    /// The identifier does not have exactly eleven characters.
    #[error("invalid UID `{uid}`: expected 11 characters, found {length}")]
    InvalidLength {
        /// Rejected input.
        uid: String,
        /// Character count of the input.
        length: usize,
    },
    /// The identifier contains a character outside `[A-Za-z0-9]`.
    #[error("invalid UID `{uid}`: character {character:?} at position {index} is not alphanumeric")]
    InvalidCharacter {
        /// Rejected input.
        uid: String,
        /// First offending character.
        character: char,
        /// Character position of the offending character.
        index: usize,
    },
}

impl InvalidUid {
    /// Rejected input.
    pub fn uid(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::InvalidLength { uid, .. } | Self::InvalidCharacter { uid, .. } => uid,
        }
    }
}

/// Validated 11-character alphanumeric DHIS2 identifier.
///
/// UUID-style identifiers are rejected; they come from other systems and
/// silently produce empty API responses when interpolated into DHIS2 URLs.
///
/// # Examples
/// ```
/// use sqlview_backend::domain::Uid;
///
/// assert!(Uid::parse("OwvmJaiVIBU").is_ok());
/// assert!(Uid::parse("abc-123-def").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    /// Validate `candidate` against the UID grammar.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidUid`] describing the first rule the input breaks.
    pub fn parse(candidate: &str) -> Result<Self, InvalidUid> {
        if candidate.is_empty() {
            return Err(InvalidUid::Empty);
        }
        if let Some((index, character)) = candidate
            .chars()
            .enumerate()
            .find(|(_, character)| !character.is_ascii_alphanumeric())
        {
            return Err(InvalidUid::InvalidCharacter {
                uid: candidate.to_owned(),
                character,
                index,
            });
        }
        // All characters are ASCII past this point, so bytes equal chars.
        if candidate.len() != UID_LENGTH {
            return Err(InvalidUid::InvalidLength {
                uid: candidate.to_owned(),
                length: candidate.len(),
            });
        }
        Ok(Self(candidate.to_owned()))
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Uid {
    type Error = InvalidUid;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Uid> for String {
    fn from(value: Uid) -> Self {
        value.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
