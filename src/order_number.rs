//! Order number validation
//!
//! Order numbers are digit strings protected by a Luhn checksum. The field
//! is private to force validation through [`OrderNumber::parse`].

use serde::{Serialize, Serializer};
use std::fmt;

/// Validation errors for order numbers
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrderNumberError {
    #[error("Order number is empty")]
    Empty,

    #[error("Order number must contain only digits: got '{0}'")]
    NonDigit(String),

    #[error("Order number fails Luhn checksum: '{0}'")]
    Checksum(String),
}

/// Validated order number (non-empty, ASCII digits, Luhn-valid)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Validate a client-supplied order number.
    ///
    /// Surrounding whitespace is ignored (request bodies often carry a
    /// trailing newline).
    pub fn parse(raw: &str) -> Result<Self, OrderNumberError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(OrderNumberError::Empty);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OrderNumberError::NonDigit(s.to_string()));
        }
        if !luhn_valid(s) {
            return Err(OrderNumberError::Checksum(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Wrap a number read back from storage without re-validating it.
    pub(crate) fn from_trusted(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for OrderNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Luhn checksum over an all-digit string.
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        let mut d = (b - b'0') as u32;
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}
