//! Money and Time Value Types
//!
//! Unified conversion between the internal fixed-point representation and
//! the client-facing JSON representation. All amounts MUST go through this
//! module.
//!
//! ## Internal Representation
//! - All amounts are stored as `i64` minor units (1/100 of a point)
//! - The scale factor is `10^MONEY_DECIMALS`
//!
//! ## Wire Format
//! Amounts are JSON numbers equal to `minor / 100` with trailing zeros
//! dropped: `50000 -> 500`, `50050 -> 500.5`, `50005 -> 500.05`. The digits
//! are written and read as decimal text, so no amount passes through `f64`.
//!
//! ```rust
//! use loyalty_ledger::money::Money;
//!
//! let m = Money::from_minor(50_050);
//! assert_eq!(m.to_string(), "500.5");
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::*;
use serde::de::value::MapAccessDeserializer;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use thiserror::Error;

/// Number of fractional digits carried by [`Money`].
pub const MONEY_DECIMALS: u32 = 2;

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Money
// ============================================================================

/// Fixed-point amount in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Convert a decimal amount (in points) to minor units.
    ///
    /// Extra precision is rounded half away from zero, matching how the
    /// accrual service reports fractional sums.
    pub fn from_decimal(value: Decimal) -> Result<Self, MoneyError> {
        let scaled = value
            .round_dp_with_strategy(MONEY_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(Decimal::from(10i64.pow(MONEY_DECIMALS)))
            .ok_or(MoneyError::Overflow)?;
        scaled.to_i64().map(Money).ok_or(MoneyError::Overflow)
    }

    /// Parse a client string such as `"500.05"`.
    pub fn parse(s: &str) -> Result<Self, MoneyError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MoneyError::InvalidFormat("empty string".into()));
        }
        if s.contains(['e', 'E']) {
            return Err(MoneyError::InvalidFormat(
                "scientific notation not allowed".into(),
            ));
        }
        let d = Decimal::from_str(s).map_err(|e| MoneyError::InvalidFormat(e.to_string()))?;
        Self::from_decimal(d)
    }

    fn from_f64(v: f64) -> Result<Self, MoneyError> {
        if !v.is_finite() {
            return Err(MoneyError::InvalidFormat(format!("non-finite amount {}", v)));
        }
        let d = Decimal::from_f64(v).ok_or(MoneyError::Overflow)?;
        Self::from_decimal(d)
    }

    /// Decimal value in points, trailing zeros dropped.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, MONEY_DECIMALS).normalize()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let d = self.to_decimal();
        if d.fract().is_zero() {
            // Whole points go out as integers so `500` never becomes `500.0`
            serializer.serialize_i64(self.0 / 10i64.pow(MONEY_DECIMALS))
        } else {
            // Decimal text goes out verbatim, never through f64
            let n = serde_json::Number::from_str(&d.to_string())
                .map_err(|_| serde::ser::Error::custom(format!("amount {} not representable", d)))?;
            n.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MoneyVisitor;

        impl<'de> serde::de::Visitor<'de> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal amount as number or string")
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Money, E> {
                Money::from_decimal(Decimal::from(v)).map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Money, E> {
                Money::from_decimal(Decimal::from(v)).map_err(E::custom)
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Money, E> {
                Money::from_f64(v).map_err(E::custom)
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Money, E> {
                Money::parse(v).map_err(E::custom)
            }

            // serde_json hands over numbers as their source text
            fn visit_map<A: serde::de::MapAccess<'de>>(self, map: A) -> Result<Money, A::Error> {
                let n = serde_json::Number::deserialize(MapAccessDeserializer::new(map))?;
                Money::parse(&n.to_string()).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// UTC instant, serialized as RFC 3339 with second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| Timestamp(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}
