//! Numeric value types indicators can compute in.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Sub};

/// Arithmetic needed by the bundled indicators. `f64` is the default; `f32`
/// and [`Decimal`] are supported for exact or compact variants.
pub trait Numeric:
    Copy
    + PartialOrd
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
{
    fn zero() -> Self;
    fn one() -> Self;
    fn from_usize(n: usize) -> Self;
    /// `None` when the value is not representable (NaN for Decimal, for example).
    fn from_f64(v: f64) -> Option<Self>;
    fn to_f64(self) -> f64;

    fn abs(self) -> Self {
        if self < Self::zero() {
            Self::zero() - self
        } else {
            self
        }
    }

    fn max_of(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }

    fn min_of(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }
}

impl Numeric for f64 {
    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn from_usize(n: usize) -> Self {
        n as f64
    }

    fn from_f64(v: f64) -> Option<Self> {
        Some(v)
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl Numeric for f32 {
    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn from_usize(n: usize) -> Self {
        n as f32
    }

    fn from_f64(v: f64) -> Option<Self> {
        Some(v as f32)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Numeric for Decimal {
    fn zero() -> Self {
        Decimal::ZERO
    }

    fn one() -> Self {
        Decimal::ONE
    }

    fn from_usize(n: usize) -> Self {
        Decimal::from(n as u64)
    }

    fn from_f64(v: f64) -> Option<Self> {
        <Decimal as FromPrimitive>::from_f64(v)
    }

    fn to_f64(self) -> f64 {
        ToPrimitive::to_f64(&self).unwrap_or(f64::NAN)
    }
}
