// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Exact-decimal stage positions.
//!
//! Positions and deltas are carried in millimetres as base-10 decimals.
//! Values are built from their literal or canonical string form, never
//! from a binary floating-point intermediate, so chained relative moves
//! do not accumulate rounding drift.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while building a [`Position`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("empty position value")]
    Empty,
    #[error("invalid position '{0}': expected digits with an optional '.' fraction")]
    Invalid(String),
    #[error("position '{0}' does not fit an exact decimal")]
    OutOfRange(String),
    #[error("position {0} is not a finite number")]
    NotFinite(String),
}

/// A stage position (or delta) in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(Decimal);

impl Position {
    pub const ZERO: Position = Position(Decimal::ZERO);

    /// Convert an integer millimetre value directly, without a string round-trip.
    pub fn from_mm(mm: i64) -> Self {
        Self(Decimal::from(mm))
    }

    /// Parse a decimal literal using `.` as the separator, independent of locale.
    ///
    /// Accepts an optional sign, digits, and an optional fraction (`2`, `-0.5`,
    /// `.25`, `3.`). Exponents, grouping separators and `,` are rejected.
    pub fn parse(input: &str) -> Result<Self, PositionError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(PositionError::Empty);
        }

        let (negative, body) = match raw.as_bytes()[0] {
            b'-' => (true, &raw[1..]),
            b'+' => (false, &raw[1..]),
            _ => (false, raw),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (body, None),
        };
        let digits_ok = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        let frac = frac_part.unwrap_or("");
        if !digits_ok(int_part) || !digits_ok(frac) || (int_part.is_empty() && frac.is_empty()) {
            return Err(PositionError::Invalid(input.to_string()));
        }

        let mut canonical = String::with_capacity(body.len() + 2);
        if negative {
            canonical.push('-');
        }
        canonical.push_str(if int_part.is_empty() { "0" } else { int_part });
        if !frac.is_empty() {
            canonical.push('.');
            canonical.push_str(frac);
        }

        Decimal::from_str_exact(&canonical)
            .map(Self)
            .map_err(|_| PositionError::OutOfRange(input.to_string()))
    }

    /// Convert a float through its shortest round-trip string form.
    ///
    /// `0.1_f64` becomes exactly `0.1`, not the nearest binary fraction.
    pub fn from_f64(value: f64) -> Result<Self, PositionError> {
        if !value.is_finite() {
            return Err(PositionError::NotFinite(value.to_string()));
        }
        Self::parse(&value.to_string())
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn checked_add(self, delta: Position) -> Option<Position> {
        self.0.checked_add(delta.0).map(Self)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Position {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct PositionVisitor;

impl<'de> Visitor<'de> for PositionVisitor {
    type Value = Position;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a position in millimetres (integer, float or decimal string)")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Position, E> {
        Ok(Position::from_mm(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Position, E> {
        Ok(Position(Decimal::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Position, E> {
        Position::from_f64(v).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Position, E> {
        Position::parse(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PositionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals_round_trip() {
        for literal in ["0", "2", "2.0", "-1.25", "0.1", "12.000", "27.5003", "-0"] {
            let pos = Position::parse(literal).unwrap();
            let back = Position::parse(&pos.to_string()).unwrap();
            assert_eq!(pos, back, "literal {}", literal);
            assert_eq!(pos.as_decimal(), Decimal::from_str(literal).unwrap());
        }
    }

    #[test]
    fn test_parse_loose_forms() {
        assert_eq!(Position::parse(".25").unwrap(), Position::parse("0.25").unwrap());
        assert_eq!(Position::parse("3.").unwrap(), Position::from_mm(3));
        assert_eq!(Position::parse("+4").unwrap(), Position::from_mm(4));
        assert_eq!(Position::parse("  7 ").unwrap(), Position::from_mm(7));
        assert_eq!("2.50".parse::<Position>().unwrap(), Position::parse("2.5").unwrap());
    }

    #[test]
    fn test_parse_rejects_locale_and_exponents() {
        assert!(matches!(Position::parse("1,5"), Err(PositionError::Invalid(_))));
        assert!(matches!(Position::parse("1e3"), Err(PositionError::Invalid(_))));
        assert!(matches!(Position::parse("1_000"), Err(PositionError::Invalid(_))));
        assert!(matches!(Position::parse("."), Err(PositionError::Invalid(_))));
        assert!(matches!(Position::parse("-"), Err(PositionError::Invalid(_))));
        assert_eq!(Position::parse(""), Err(PositionError::Empty));
    }

    #[test]
    fn test_integers_convert_directly() {
        for mm in [0i64, 1, -3, 5, 12, 60_000] {
            let pos = Position::from_mm(mm);
            assert_eq!(pos.to_string(), mm.to_string());
        }
    }

    #[test]
    fn test_float_uses_canonical_string() {
        assert_eq!(Position::from_f64(0.1).unwrap(), Position::parse("0.1").unwrap());
        assert_eq!(Position::from_f64(2.0).unwrap(), Position::from_mm(2));
        assert!(Position::from_f64(f64::NAN).is_err());
        assert!(Position::from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_chained_tenths_have_no_drift() {
        let step = Position::parse("0.1").unwrap();
        let mut pos = Position::ZERO;
        for _ in 0..1000 {
            pos = pos.checked_add(step).unwrap();
        }
        assert_eq!(pos, Position::from_mm(100));
    }

    #[test]
    fn test_add_overflow_is_none() {
        let far = Position::parse("79228162514264337593543950335").unwrap();
        assert_eq!(far.checked_add(Position::from_mm(1)), None);
        assert!(far.checked_add(Position::from_mm(-1)).is_some());
    }

    #[test]
    fn test_deserialize_from_toml_values() {
        #[derive(Deserialize)]
        struct Target {
            a: Position,
            b: Position,
            c: Position,
        }

        let target: Target = toml::from_str("a = 2\nb = 0.1\nc = \"-1.50\"").unwrap();
        assert_eq!(target.a, Position::from_mm(2));
        assert_eq!(target.b, Position::parse("0.1").unwrap());
        assert_eq!(target.c, Position::parse("-1.5").unwrap());
    }
}
