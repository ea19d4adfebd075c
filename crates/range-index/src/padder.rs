use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RangeIndexError, RangeIndexResult};

/// How a caller-supplied boundary maps onto the half-open scan `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndRange {
    /// Lower bound, encoded as-is.
    Inclusive,
    /// Upper bound, pushed to the next representable value so `to` itself is scanned.
    Exclusive,
}

/// Integer types that can be zero-padded into a sortable index suffix.
pub trait RangeValue: Copy + Ord + fmt::Display + FromStr + Send + Sync + 'static {
    /// Decimal digits of the type's maximum value.
    const WIDTH: usize;
    const NAME: &'static str;

    fn to_i128(self) -> i128;
}

impl RangeValue for i32 {
    const WIDTH: usize = 10;
    const NAME: &'static str = "int";

    fn to_i128(self) -> i128 {
        self as i128
    }
}

impl RangeValue for i64 {
    const WIDTH: usize = 19;
    const NAME: &'static str = "long";

    fn to_i128(self) -> i128 {
        self as i128
    }
}

/// Fixed-width, left-zero-padded decimal rendering.
///
/// Non-negative values of the same width sort lexicographically in numeric
/// order. Negative values render as `-` plus the padded magnitude: they all
/// sort before non-negative values, but not among themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroPadder<T> {
    _marker: PhantomData<T>,
}

impl<T: RangeValue> ZeroPadder<T> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    pub fn width(&self) -> usize {
        T::WIDTH
    }

    pub fn pad_zero(&self, value: T) -> String {
        render(value.to_i128(), T::WIDTH)
    }

    /// Encodes a textual boundary. The text must be a non-empty run of digits
    /// that fits `T`; `Exclusive` then adds one before padding, which still
    /// fits the width because `T::MAX + 1` has the same number of digits.
    pub fn pad_boundary(&self, boundary: &str, end: EndRange) -> RangeIndexResult<String> {
        if boundary.is_empty() || !boundary.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RangeIndexError::invalid_boundary(
                boundary,
                "The string value should be a series of digits",
            ));
        }
        let value = boundary.parse::<T>().map_err(|_| {
            RangeIndexError::invalid_boundary(boundary, format!("does not fit in {}", T::NAME))
        })?;

        let value = match end {
            EndRange::Inclusive => value.to_i128(),
            EndRange::Exclusive => value.to_i128() + 1,
        };
        Ok(render(value, T::WIDTH))
    }

    /// Inverse of the encoding, widened so the exclusive `MAX + 1` still decodes.
    pub fn decode(&self, encoded: &str) -> RangeIndexResult<i128> {
        let (negative, digits) = match encoded.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, encoded),
        };
        if digits.len() != T::WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RangeIndexError::invalid_boundary(
                encoded,
                format!("expected {} zero-padded digits", T::WIDTH),
            ));
        }
        let magnitude = digits
            .parse::<i128>()
            .map_err(|e| RangeIndexError::invalid_boundary(encoded, e.to_string()))?;
        Ok(if negative { -magnitude } else { magnitude })
    }
}

fn render(value: i128, width: usize) -> String {
    if value < 0 {
        format!("-{:0width$}", value.unsigned_abs(), width = width)
    } else {
        format!("{:0width$}", value, width = width)
    }
}

/// Integer width of a range field, resolved once from the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Int,
    Long,
}

impl FieldKind {
    pub fn width(&self) -> usize {
        match self {
            FieldKind::Int => i32::WIDTH,
            FieldKind::Long => i64::WIDTH,
        }
    }

    pub fn pad_boundary(&self, boundary: &str, end: EndRange) -> RangeIndexResult<String> {
        match self {
            FieldKind::Int => ZeroPadder::<i32>::new().pad_boundary(boundary, end),
            FieldKind::Long => ZeroPadder::<i64>::new().pad_boundary(boundary, end),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Int => f.write_str(i32::NAME),
            FieldKind::Long => f.write_str(i64::NAME),
        }
    }
}

impl FromStr for FieldKind {
    type Err = RangeIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "int32" | "integer" => Ok(FieldKind::Int),
            "long" | "int64" => Ok(FieldKind::Long),
            other => Err(RangeIndexError::invalid_schema(
                "range",
                format!("unknown field kind '{other}'"),
            )),
        }
    }
}

/// Value read from a range field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeNumber {
    Int(i32),
    Long(i64),
}

impl RangeNumber {
    pub fn kind(&self) -> FieldKind {
        match self {
            RangeNumber::Int(_) => FieldKind::Int,
            RangeNumber::Long(_) => FieldKind::Long,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            RangeNumber::Int(v) => *v < 0,
            RangeNumber::Long(v) => *v < 0,
        }
    }

    pub fn pad_zero(&self) -> String {
        match self {
            RangeNumber::Int(v) => ZeroPadder::<i32>::new().pad_zero(*v),
            RangeNumber::Long(v) => ZeroPadder::<i64>::new().pad_zero(*v),
        }
    }
}

impl fmt::Display for RangeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeNumber::Int(v) => write!(f, "{v}"),
            RangeNumber::Long(v) => write!(f, "{v}"),
        }
    }
}
