//! Value amounts in integer minimal units.
//!
//! Both plain value and token quantities are expressed as [`Amount`]. The
//! ledger encodes values as signed 64-bit integers, so an amount is always in
//! `0..=i64::MAX`. All arithmetic is checked: overflow is reported, never
//! wrapped or saturated.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

/// A non-negative quantity in minimal units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    /// Zero amount constant.
    pub const ZERO: Self = Self(0);

    /// Largest representable amount.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates an amount from minimal units, rejecting negative values.
    pub fn new(units: i64) -> Result<Self> {
        if units < 0 {
            return Err(CoreError::InvalidAmount(format!(
                "negative value {units} not allowed"
            )));
        }
        Ok(Self(units))
    }

    /// Creates an amount from an unsigned count that always fits.
    #[must_use]
    pub const fn from_units(units: u32) -> Self {
        Self(units as i64)
    }

    /// Returns the value in minimal units.
    #[must_use]
    pub const fn units(self) -> i64 {
        self.0
    }

    /// Checked addition. Returns `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction. Returns `None` if the result would be negative.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) if v >= 0 => Some(Self(v)),
            _ => None,
        }
    }

    /// Checked multiplication of a quantity by a unit price.
    ///
    /// Computed through a 128-bit intermediate so that an out-of-range product
    /// is detected rather than truncated.
    #[must_use]
    pub fn checked_mul(self, price: Self) -> Option<Self> {
        let product = i128::from(self.0) * i128::from(price.0);
        i64::try_from(product).ok().map(Self)
    }

    /// Addition that reports the overflowing operation by name.
    pub fn try_add(self, rhs: Self, operation: &'static str) -> Result<Self> {
        self.checked_add(rhs).ok_or(CoreError::overflow(operation))
    }

    /// Sums an iterator of amounts, failing on overflow.
    pub fn try_sum<I>(amounts: I, operation: &'static str) -> Result<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, a| acc.try_add(a, operation))
    }

    /// Returns true if this amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns true if this amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let units: i64 = s
            .trim()
            .parse()
            .map_err(|_| CoreError::InvalidAmount(format!("invalid number: {s}")))?;
        Self::new(units)
    }
}

impl TryFrom<i64> for Amount {
    type Error = CoreError;

    fn try_from(units: i64) -> Result<Self> {
        Self::new(units)
    }
}

impl From<u32> for Amount {
    fn from(units: u32) -> Self {
        Self::from_units(units)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let units = i64::deserialize(deserializer)?;
        Self::new(units).map_err(de::Error::custom)
    }
}
