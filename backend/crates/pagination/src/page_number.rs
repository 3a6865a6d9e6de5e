//! Validated 1-based page index.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing a [`PageNumber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PageNumberError {
    /// Pages are numbered from one; zero is never a valid page.
    #[error("page numbers start at 1")]
    Zero,
}

/// One-based page index sent as the `page` query parameter.
///
/// # Examples
/// ```
/// use pagination::PageNumber;
///
/// let first = PageNumber::first();
/// assert_eq!(first.get(), 1);
/// assert_eq!(first.next().map(PageNumber::get), Some(2));
/// assert!(PageNumber::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageNumber(NonZeroU32);

impl PageNumber {
    /// The first page of every result set.
    #[must_use]
    pub const fn first() -> Self {
        Self(NonZeroU32::MIN)
    }

    /// Validate a raw page index.
    ///
    /// # Errors
    ///
    /// Returns [`PageNumberError::Zero`] when `value` is zero.
    pub fn new(value: u32) -> Result<Self, PageNumberError> {
        NonZeroU32::new(value).map(Self).ok_or(PageNumberError::Zero)
    }

    /// Raw page index.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// The page after this one, or `None` on overflow.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::first()
    }
}

impl TryFrom<u32> for PageNumber {
    type Error = PageNumberError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PageNumber> for u32 {
    fn from(value: PageNumber) -> Self {
        value.get()
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn zero_is_rejected() {
        assert_eq!(PageNumber::new(0), Err(PageNumberError::Zero));
    }

    #[rstest]
    #[case(1, Some(2))]
    #[case(19, Some(20))]
    #[case(u32::MAX, None)]
    fn next_advances_until_overflow(#[case] raw: u32, #[case] expected: Option<u32>) {
        let page = PageNumber::new(raw).expect("non-zero page");
        assert_eq!(page.next().map(PageNumber::get), expected);
    }

    #[rstest]
    fn deserialises_from_plain_integers() {
        let page: PageNumber = serde_json::from_str("3").expect("valid page");
        assert_eq!(page.get(), 3);
        assert!(serde_json::from_str::<PageNumber>("0").is_err());
    }
}
