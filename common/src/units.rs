//! Fixed-point monetary types for ParlayPool.
//!
//! All accounting happens in 18-decimal fixed point. [`Amount`] is a
//! collateral quantity, [`Ratio`] a dimensionless multiplier where
//! `Ratio::ONE` is 1.0. [`NativeAmount`] is only used at the collateral
//! ledger boundary. Every rounding in this module is toward zero.

use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{PoolError, Result};

/// Decimal places of the internal fixed-point unit.
pub const INTERNAL_DECIMALS: u32 = 18;

/// Largest collateral precision the engine accepts.
pub const MAX_COLLATERAL_DECIMALS: u32 = 36;

const SCALE: u128 = 1_000_000_000_000_000_000;

/// `10^exp`, or `None` if it does not fit in a `u128`.
pub fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

/// Compute `floor(a * b / denominator)` without intermediate overflow.
///
/// Returns `None` when `denominator` is zero or the quotient does not fit
/// in a `u128`.
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / denominator);
    }

    // Two u128 factors always fit in 256 bits.
    let quotient = U256::from(a) * U256::from(b) / U256::from(denominator);
    (quotient.bits() <= 128).then(|| quotient.as_u128())
}

fn overflow(operation: &str) -> PoolError {
    PoolError::ArithmeticOverflow(operation.to_string())
}

/// Render an 18-decimal raw value without trailing zeros.
fn fmt_fixed(raw: u128, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let whole = raw / SCALE;
    let fraction = raw % SCALE;
    if fraction == 0 {
        return write!(f, "{}", whole);
    }
    let digits = format!("{:018}", fraction);
    write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
}

/// Parse a non-negative decimal into an 18-decimal raw value, exactly.
fn raw_from_decimal(value: Decimal) -> Result<u128> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(PoolError::InvalidAmount(format!(
            "negative value {}",
            value
        )));
    }
    let value = value.normalize();
    let scale = value.scale();
    if scale > INTERNAL_DECIMALS {
        return Err(PoolError::PrecisionLoss {
            value: value.to_string(),
            decimals: INTERNAL_DECIMALS,
        });
    }
    let mantissa = u128::try_from(value.mantissa().abs())
        .map_err(|_| overflow("decimal mantissa"))?;
    let factor = pow10(INTERNAL_DECIMALS - scale).ok_or_else(|| overflow("decimal scale"))?;
    mantissa
        .checked_mul(factor)
        .ok_or_else(|| overflow("decimal to fixed point"))
}

fn raw_to_decimal(raw: u128) -> Option<Decimal> {
    let raw = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(raw, INTERNAL_DECIMALS)
        .ok()
        .map(|d| d.normalize())
}

/// Parse a plain decimal string such as `1000.5` into an 18-decimal raw
/// value. Covers the whole `u128` range, which `Decimal` does not.
fn raw_from_str(s: &str) -> Result<u128> {
    let invalid = || PoolError::InvalidAmount(format!("cannot parse {:?}", s));
    let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !digits(whole) || !digits(fraction) {
        return Err(invalid());
    }
    if fraction.len() > INTERNAL_DECIMALS as usize {
        return Err(PoolError::PrecisionLoss {
            value: s.to_string(),
            decimals: INTERNAL_DECIMALS,
        });
    }

    let whole: u128 = whole.parse().map_err(|_| overflow("parse whole units"))?;
    let fraction: u128 = format!("{:0<18}", fraction).parse().map_err(|_| invalid())?;
    whole
        .checked_mul(SCALE)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(|| overflow("parse fixed point"))
}

/// Serialize as a decimal string so values above `u64` survive JSON.
macro_rules! serde_as_string {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

/// A collateral quantity in internal 18-decimal units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

serde_as_string!(Amount);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// Create from a raw 18-decimal value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw 18-decimal value.
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Create from a whole number of collateral units.
    pub fn from_units(units: u64) -> Self {
        Self(units as u128 * SCALE)
    }

    /// Create from a human-readable decimal. Fails on negative values or
    /// more than 18 fractional digits.
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        raw_from_decimal(value).map(Self)
    }

    /// Convert to a human-readable decimal, if it fits in `Decimal`.
    pub fn to_decimal(&self) -> Option<Decimal> {
        raw_to_decimal(self.0)
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn try_add(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| overflow("amount addition"))
    }

    /// Checked subtraction.
    pub fn try_sub(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or_else(|| overflow("amount subtraction"))
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// `self * ratio`, rounded toward zero.
    pub fn try_mul_ratio(self, ratio: Ratio) -> Result<Amount> {
        mul_div_floor(self.0, ratio.0, SCALE)
            .map(Amount)
            .ok_or_else(|| overflow("amount times ratio"))
    }

    /// `self / denominator` as a ratio, rounded toward zero.
    pub fn try_ratio_to(self, denominator: Amount) -> Result<Ratio> {
        mul_div_floor(self.0, SCALE, denominator.0)
            .map(Ratio)
            .ok_or_else(|| overflow("amount ratio"))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_fixed(self.0, f)
    }
}

impl FromStr for Amount {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        raw_from_str(s).map(Amount)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Amount(iter.map(|a| a.0).sum())
    }
}

/// A dimensionless 18-decimal multiplier. `Ratio::ONE` is break-even.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ratio(u128);

serde_as_string!(Ratio);

impl Ratio {
    /// 0.0
    pub const ZERO: Ratio = Ratio(0);
    /// 1.0
    pub const ONE: Ratio = Ratio(SCALE);

    /// Create from a raw 18-decimal value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw 18-decimal value.
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Create from a human-readable decimal such as `0.1`.
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        raw_from_decimal(value).map(Self)
    }

    /// Convert to a human-readable decimal.
    pub fn to_decimal(&self) -> Option<Decimal> {
        raw_to_decimal(self.0)
    }

    /// `numerator / denominator`, rounded toward zero.
    pub fn from_fraction(numerator: Amount, denominator: Amount) -> Result<Self> {
        numerator.try_ratio_to(denominator)
    }

    /// `self * other`, rounded toward zero.
    pub fn try_mul(self, other: Ratio) -> Result<Ratio> {
        mul_div_floor(self.0, other.0, SCALE)
            .map(Ratio)
            .ok_or_else(|| overflow("ratio product"))
    }

    /// Whether the ratio lies in `[0, 1]`.
    pub fn is_fraction(&self) -> bool {
        self.0 <= SCALE
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Ratio::ONE
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_fixed(self.0, f)
    }
}

impl FromStr for Ratio {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        raw_from_str(s).map(Ratio)
    }
}

/// A quantity in the collateral's own precision, as the ledger stores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeAmount(u128);

serde_as_string!(NativeAmount);

impl NativeAmount {
    /// Zero.
    pub const ZERO: NativeAmount = NativeAmount(0);

    /// Create from the raw native integer.
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw native integer.
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: NativeAmount) -> Option<NativeAmount> {
        self.0.checked_add(other.0).map(NativeAmount)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: NativeAmount) -> Option<NativeAmount> {
        self.0.checked_sub(other.0).map(NativeAmount)
    }
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NativeAmount {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse()
            .map(NativeAmount)
            .map_err(|_| PoolError::InvalidAmount(format!("cannot parse {:?}", s)))
    }
}

/// The fungible asset backing the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Collateral {
    symbol: String,
    decimals: u32,
}

impl Collateral {
    /// Create a collateral descriptor.
    pub fn new(symbol: impl Into<String>, decimals: u32) -> Result<Self> {
        if decimals > MAX_COLLATERAL_DECIMALS {
            return Err(PoolError::UnsupportedDecimals(decimals));
        }
        Ok(Self {
            symbol: symbol.into().to_uppercase(),
            decimals,
        })
    }

    /// Ticker symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Native decimal precision.
    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Six-decimal dollar stablecoin.
    pub fn usdc() -> Self {
        Self {
            symbol: "USDC".to_string(),
            decimals: 6,
        }
    }

    /// Eight-decimal wrapped bitcoin.
    pub fn wbtc() -> Self {
        Self {
            symbol: "WBTC".to_string(),
            decimals: 8,
        }
    }

    /// Eighteen-decimal dollar stablecoin.
    pub fn dai() -> Self {
        Self {
            symbol: "DAI".to_string(),
            decimals: 18,
        }
    }
}

impl fmt::Display for Collateral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}
