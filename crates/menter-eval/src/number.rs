//! Arbitrary-precision number helpers.
//!
//! Script numbers are [`BigDecimal`]s kept in normalized form, so `2.50`
//! and `2.5` are the same value and display the same way. Division and
//! rounding work on the unscaled digits directly, which keeps every
//! operation exact up to the requested scale.

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

/// Decimal places kept by division.
pub const DIVISION_SCALE: i64 = 20;

/// How digits past the target scale are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Down,
    Floor,
    Ceiling,
    /// Halves away from zero.
    HalfUp,
}

/// Parse decimal or scientific notation. A leading `.` is accepted.
pub fn parse(text: &str) -> Option<BigDecimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let parsed = match text.strip_prefix('.') {
        Some(rest) => BigDecimal::from_str(&format!("0.{rest}")),
        None => BigDecimal::from_str(text),
    };
    parsed.ok().map(|n| n.normalized())
}

pub fn from_i64(n: i64) -> BigDecimal {
    BigDecimal::from(n)
}

/// The shortest decimal that round-trips `f`; `None` for NaN and infinities.
pub fn from_f64(f: f64) -> Option<BigDecimal> {
    if f.is_finite() {
        parse(&f.to_string())
    } else {
        None
    }
}

pub fn to_f64(n: &BigDecimal) -> f64 {
    n.to_f64().unwrap_or(f64::NAN)
}

/// Plain notation without trailing zeros: `1e3` is `1000`, `2.50` is `2.5`.
pub fn format(n: &BigDecimal) -> String {
    let (digits, scale) = n.normalized().as_bigint_and_exponent();
    if digits.is_zero() {
        return "0".to_string();
    }
    let negative = digits.is_negative();
    let mut text = digits.abs().to_string();
    if scale <= 0 {
        text.push_str(&"0".repeat(scale.unsigned_abs() as usize));
    } else {
        let scale = scale as usize;
        if text.len() <= scale {
            text = format!("{}{text}", "0".repeat(scale - text.len() + 1));
        }
        text.insert(text.len() - scale, '.');
    }
    if negative {
        text.insert(0, '-');
    }
    text
}

/// The value as a whole number, if it has no fractional part.
pub fn to_integer(n: &BigDecimal) -> Option<BigInt> {
    let (digits, scale) = n.normalized().as_bigint_and_exponent();
    match scale.cmp(&0) {
        Ordering::Greater => None,
        Ordering::Equal => Some(digits),
        Ordering::Less => Some(digits * pow10(scale.unsigned_abs())),
    }
}

pub fn is_integer(n: &BigDecimal) -> bool {
    to_integer(n).is_some()
}

/// Round to `scale` decimal places.
pub fn round(n: &BigDecimal, scale: i64, mode: Rounding) -> BigDecimal {
    let (digits, current) = n.as_bigint_and_exponent();
    if current <= scale {
        return n.normalized();
    }
    let divisor = pow10((current - scale).unsigned_abs());
    let quotient = &digits / &divisor;
    let remainder = &digits - &quotient * &divisor;
    let adjust = match mode {
        Rounding::Down => 0,
        Rounding::Floor if remainder.is_negative() => -1,
        Rounding::Ceiling if remainder.is_positive() => 1,
        Rounding::HalfUp if remainder.abs() * BigInt::from(2) >= divisor => {
            if remainder.is_negative() {
                -1
            } else {
                1
            }
        }
        _ => 0,
    };
    BigDecimal::new(quotient + BigInt::from(adjust), scale).normalized()
}

pub fn floor(n: &BigDecimal) -> BigDecimal {
    round(n, 0, Rounding::Floor)
}

pub fn ceil(n: &BigDecimal) -> BigDecimal {
    round(n, 0, Rounding::Ceiling)
}

/// `x / y` rounded half-up to `scale` places; `None` when `y` is zero.
pub fn divide(x: &BigDecimal, y: &BigDecimal, scale: i64) -> Option<BigDecimal> {
    if y.is_zero() {
        return None;
    }
    let (x_digits, x_scale) = x.as_bigint_and_exponent();
    let (y_digits, y_scale) = y.as_bigint_and_exponent();
    let shift = y_scale - x_scale + scale;
    let (numerator, denominator) = if shift >= 0 {
        (x_digits * pow10(shift.unsigned_abs()), y_digits)
    } else {
        (x_digits, y_digits * pow10(shift.unsigned_abs()))
    };
    let mut quotient = &numerator / &denominator;
    let remainder = &numerator - &quotient * &denominator;
    if remainder.abs() * BigInt::from(2) >= denominator.abs() && !remainder.is_zero() {
        if remainder.is_negative() != denominator.is_negative() {
            quotient -= BigInt::from(1);
        } else {
            quotient += BigInt::from(1);
        }
    }
    Some(BigDecimal::new(quotient, scale).normalized())
}

/// Truncated remainder, carrying the sign of `x`; `None` when `y` is zero.
pub fn remainder(x: &BigDecimal, y: &BigDecimal) -> Option<BigDecimal> {
    if y.is_zero() {
        return None;
    }
    let (x_digits, x_scale) = x.as_bigint_and_exponent();
    let (y_digits, y_scale) = y.as_bigint_and_exponent();
    let scale = x_scale.max(y_scale);
    let x_digits = x_digits * pow10((scale - x_scale).unsigned_abs());
    let y_digits = y_digits * pow10((scale - y_scale).unsigned_abs());
    Some(BigDecimal::new(x_digits % y_digits, scale).normalized())
}

/// `base ^ exponent`. Whole exponents stay exact, negative ones divide at
/// [`DIVISION_SCALE`]; fractional exponents go through `f64`.
pub fn power(base: &BigDecimal, exponent: &BigDecimal) -> Option<BigDecimal> {
    let Some(whole) = to_integer(exponent) else {
        return from_f64(to_f64(base).powf(to_f64(exponent)));
    };
    let mut remaining = whole.abs().to_u64()?;
    let mut square = base.clone();
    let mut result = BigDecimal::from(1);
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = &result * &square;
        }
        remaining >>= 1;
        if remaining > 0 {
            square = &square * &square;
        }
    }
    if whole.is_negative() {
        divide(&BigDecimal::from(1), &result, DIVISION_SCALE)
    } else {
        Some(result.normalized())
    }
}

/// `n!` for non-negative whole numbers.
pub fn factorial(n: &BigDecimal) -> Option<BigDecimal> {
    let n = to_integer(n)?;
    if n.is_negative() {
        return None;
    }
    let n = n.to_u64()?;
    let product = (2..=n).fold(BigInt::from(1), |acc, i| acc * BigInt::from(i));
    Some(BigDecimal::new(product, 0))
}

fn pow10(exponent: u64) -> BigInt {
    num_traits::pow(BigInt::from(10), exponent as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(text: &str) -> BigDecimal {
        parse(text).unwrap()
    }

    #[test]
    fn test_format_is_plain_and_normalized() {
        assert_eq!(format(&n("2.500")), "2.5");
        assert_eq!(format(&n("-3.50")), "-3.5");
        assert_eq!(format(&n("1e3")), "1000");
        assert_eq!(format(&n("0.001")), "0.001");
        assert_eq!(format(&n("-0.5")), "-0.5");
        assert_eq!(format(&n(".25")), "0.25");
        assert_eq!(format(&n("0")), "0");
    }

    #[test]
    fn test_parse_rejects_text() {
        assert!(parse("abc").is_none());
        assert!(parse("").is_none());
        assert!(parse(" 42 ").is_some());
    }

    #[test]
    fn test_divide_rounds_half_up() {
        assert_eq!(format(&divide(&n("6"), &n("4"), DIVISION_SCALE).unwrap()), "1.5");
        assert_eq!(
            format(&divide(&n("2"), &n("3"), DIVISION_SCALE).unwrap()),
            "0.66666666666666666667"
        );
        assert_eq!(
            format(&divide(&n("-2"), &n("3"), DIVISION_SCALE).unwrap()),
            "-0.66666666666666666667"
        );
        assert_eq!(format(&divide(&n("1"), &n("8"), 2).unwrap()), "0.13");
        assert!(divide(&n("1"), &n("0"), DIVISION_SCALE).is_none());
    }

    #[test]
    fn test_remainder_keeps_dividend_sign() {
        assert_eq!(format(&remainder(&n("-7"), &n("3")).unwrap()), "-1");
        assert_eq!(format(&remainder(&n("7.5"), &n("2")).unwrap()), "1.5");
        assert!(remainder(&n("1"), &n("0")).is_none());
    }

    #[test]
    fn test_rounding_modes() {
        assert_eq!(format(&round(&n("2.5"), 0, Rounding::HalfUp)), "3");
        assert_eq!(format(&round(&n("-2.5"), 0, Rounding::HalfUp)), "-3");
        assert_eq!(format(&round(&n("1.2345"), 2, Rounding::HalfUp)), "1.23");
        assert_eq!(format(&floor(&n("-1.5"))), "-2");
        assert_eq!(format(&ceil(&n("1.1"))), "2");
        assert_eq!(format(&round(&n("-1.9"), 0, Rounding::Down)), "-1");
    }

    #[test]
    fn test_power_beyond_machine_width() {
        assert_eq!(
            format(&power(&n("2"), &n("100")).unwrap()),
            "1267650600228229401496703205376"
        );
        assert_eq!(format(&power(&n("2"), &n("-2")).unwrap()), "0.25");
        assert_eq!(format(&power(&n("4"), &n("0.5")).unwrap()), "2");
    }

    #[test]
    fn test_factorial() {
        assert_eq!(
            format(&factorial(&n("30")).unwrap()),
            "265252859812191058636308480000000"
        );
        assert_eq!(format(&factorial(&n("0")).unwrap()), "1");
        assert!(factorial(&n("-1")).is_none());
        assert!(factorial(&n("1.5")).is_none());
    }

    #[test]
    fn test_integer_detection() {
        assert!(is_integer(&n("1e3")));
        assert!(is_integer(&n("4.000")));
        assert!(!is_integer(&n("4.01")));
        assert_eq!(to_integer(&n("1e2")), Some(BigInt::from(100)));
    }
}
