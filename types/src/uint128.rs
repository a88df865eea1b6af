//! 128-bit unsigned integer, used for difficulties and work nonces.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::HexError;
use crate::uint256::strip_prefix;

/// A 16-byte unsigned integer with an integer interpretation.
///
/// The low 8 bytes double as a little-endian view of a 64-bit work nonce;
/// [`low_u64`](Self::low_u64) and [`from_u64`](Self::from_u64) convert
/// between the two without any byte shuffling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct U128(u128);

impl U128 {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u128::MAX);

    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Zero-extend a 64-bit work nonce.
    pub fn from_u64(value: u64) -> Self {
        Self(value as u128)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    /// The low 64 bits. For a work nonce this recovers the nonce itself.
    pub fn low_u64(&self) -> u64 {
        self.0 as u64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse from hex. Case-insensitive, optional `0x` prefix, any length
    /// up to 32 digits; short input is left-padded with zeros.
    pub fn from_hex(input: &str) -> Result<Self, HexError> {
        let digits = strip_prefix(input)?;
        if digits.len() > 32 {
            return Err(HexError::TooLong {
                actual: digits.len(),
                max: 32,
            });
        }
        // from_str_radix would also accept a leading `+`, which is not
        // part of the hex grammar.
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HexError::InvalidDigit);
        }
        let raw = u128::from_str_radix(digits, 16).map_err(|_| HexError::InvalidDigit)?;
        Ok(Self(raw))
    }

    /// Format as 32 lowercase hex digits, no prefix.
    pub fn to_hex(&self) -> String {
        format!("{:032x}", self.0)
    }
}

/// `{:x}` / `{:#x}` defer to the underlying integer, so responses can
/// render the compact `0x…` form without a second formatter.
impl fmt::LowerHex for U128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for U128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for U128 {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for U128 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for U128 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
