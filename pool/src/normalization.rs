//! Conversion between a collateral's native precision and internal units.
//!
//! Up-scaling is always exact. Down-scaling rounds toward zero, except in
//! the `_exact` variant which refuses to drop dust.

use parlaypool_common::{
    pow10, Amount, NativeAmount, PoolError, Result, INTERNAL_DECIMALS, MAX_COLLATERAL_DECIMALS,
};

fn check_decimals(decimals: u32) -> Result<()> {
    if decimals > MAX_COLLATERAL_DECIMALS {
        return Err(PoolError::UnsupportedDecimals(decimals));
    }
    Ok(())
}

fn scale_factor(decimals: u32) -> Result<u128> {
    let diff = decimals.abs_diff(INTERNAL_DECIMALS);
    pow10(diff).ok_or(PoolError::UnsupportedDecimals(decimals))
}

/// Convert a native amount to internal 18-decimal units.
///
/// Exact for `decimals <= 18`. Above 18 the native value must be a whole
/// multiple of the scale factor, otherwise `PrecisionLoss`.
pub fn to_internal_units(amount: NativeAmount, decimals: u32) -> Result<Amount> {
    check_decimals(decimals)?;
    let factor = scale_factor(decimals)?;

    if decimals <= INTERNAL_DECIMALS {
        amount
            .raw()
            .checked_mul(factor)
            .map(Amount::from_raw)
            .ok_or_else(|| PoolError::ArithmeticOverflow("to internal units".to_string()))
    } else {
        if amount.raw() % factor != 0 {
            return Err(PoolError::PrecisionLoss {
                value: amount.to_string(),
                decimals,
            });
        }
        Ok(Amount::from_raw(amount.raw() / factor))
    }
}

/// Convert an internal amount to native units, rounding toward zero.
pub fn to_native_units(amount: Amount, decimals: u32) -> Result<NativeAmount> {
    check_decimals(decimals)?;
    let factor = scale_factor(decimals)?;

    if decimals <= INTERNAL_DECIMALS {
        Ok(NativeAmount::new(amount.raw() / factor))
    } else {
        amount
            .raw()
            .checked_mul(factor)
            .map(NativeAmount::new)
            .ok_or_else(|| PoolError::ArithmeticOverflow("to native units".to_string()))
    }
}

/// Convert an internal amount to native units, failing with
/// `PrecisionLoss` if any dust would be dropped.
pub fn to_native_units_exact(amount: Amount, decimals: u32) -> Result<NativeAmount> {
    let native = to_native_units(amount, decimals)?;
    if to_internal_units(native, decimals)? != amount {
        return Err(PoolError::PrecisionLoss {
            value: amount.to_string(),
            decimals,
        });
    }
    Ok(native)
}

/// Largest amount not above `amount` that the collateral can represent.
pub fn representable_floor(amount: Amount, decimals: u32) -> Result<Amount> {
    to_internal_units(to_native_units(amount, decimals)?, decimals)
}
