use core::f64;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// The scalar type every rho expression evaluates to.
///
/// Arithmetic is total: domain errors propagate as quiet NaN instead of
/// raising, so `value()` can always be called.
#[derive(Debug, Clone, PartialEq, Copy)]
pub struct Number(f64);

/// Represents a Not-a-Number (NaN) value.
pub const NAN: Number = Number(f64::NAN);

/// Represents positive infinity.
pub const INFINITE: Number = Number(f64::INFINITY);

/// The numeric encoding of boolean `true`.
pub const TRUE: Number = Number(1.0);

/// The numeric encoding of boolean `false`.
pub const FALSE: Number = Number(0.0);

impl Number {
    /// Creates a new `Number` from an `f64` value.
    pub const fn new(value: f64) -> Self {
        Number(value)
    }

    /// Returns the underlying `f64` value.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Returns the underlying `i64` value, truncating any fractional part.
    pub fn to_int(self) -> i64 {
        self.0 as i64
    }

    /// Returns `true` if the number represents an integer value.
    ///
    /// Uses epsilon comparison to account for floating-point precision.
    pub fn is_int(&self) -> bool {
        (self.0 - self.0.trunc()).abs() < f64::EPSILON
    }

    /// Returns the absolute value of this number.
    pub fn abs(&self) -> Self {
        Number(self.0.abs())
    }

    /// Returns `true` if the number is zero or very close to zero.
    pub fn is_zero(&self) -> bool {
        self.0.abs() < f64::EPSILON
    }

    /// Returns `true` if the number is NaN (Not-a-Number).
    pub fn is_nan(&self) -> bool {
        self.0.is_nan()
    }

    /// Boolean interpretation: any non-zero, non-NaN value is truthy.
    pub fn is_true(&self) -> bool {
        !self.0.is_nan() && self.0 != 0.0
    }

    /// Raises this number to the power of `exp`.
    pub fn pow(self, exp: Self) -> Self {
        Number(self.0.powf(exp.0))
    }

    /// Returns the smaller of two numbers.
    pub fn min(self, other: Self) -> Self {
        Number(self.0.min(other.0))
    }

    /// Returns the larger of two numbers.
    pub fn max(self, other: Self) -> Self {
        Number(self.0.max(other.0))
    }
}

impl Default for Number {
    fn default() -> Self {
        Number(0.0)
    }
}

impl Neg for Number {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Number(-self.0)
    }
}

impl From<bool> for Number {
    fn from(value: bool) -> Self {
        if value { TRUE } else { FALSE }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number(value as f64)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number(value as f64)
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        Number(value as f64)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number(value as f64)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number(value)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_nan() {
            return write!(f, "nan");
        }
        if self.0.is_infinite() {
            return write!(f, "{}inf", if self.0 < 0.0 { "-" } else { "" });
        }
        // Constant folding can produce -0.0; the integer path below would
        // drop the sign and flip any later division by this constant.
        if self.0 == 0.0 && self.0.is_sign_negative() {
            return write!(f, "-0");
        }
        if self.is_int() && self.0.abs() < 1e15 {
            write!(f, "{}", self.0 as i64)
        } else {
            // Shortest representation that round-trips through the lexer.
            write!(f, "{}", self.0)
        }
    }
}

impl Add for Number {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Number(self.0 + other.0)
    }
}

impl Sub for Number {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Number(self.0 - other.0)
    }
}

impl Mul for Number {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Number(self.0 * other.0)
    }
}

impl Div for Number {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Number(self.0 / other.0)
    }
}

impl Rem for Number {
    type Output = Self;

    fn rem(self, other: Self) -> Self {
        Number(self.0 % other.0)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Number {}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.is_nan(), other.0.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.0.partial_cmp(&other.0).unwrap_or(Ordering::Less),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(42.0, "42")]
    #[case(42.125, "42.125")]
    #[case(-42.0, "-42")]
    #[case(0.0, "0")]
    #[case(-0.0, "-0")]
    #[case(0.5, "0.5")]
    #[case(f64::NAN, "nan")]
    #[case(f64::INFINITY, "inf")]
    #[case(f64::NEG_INFINITY, "-inf")]
    fn test_display_formatting(#[case] input: f64, #[case] expected: &str) {
        let num = Number::new(input);
        assert_eq!(format!("{}", num), expected);
    }

    #[rstest]
    #[case(5.0, 2.0, "7", "3", "10", "2.5", "1")]
    #[case(-5.0, 2.0, "-3", "-7", "-10", "-2.5", "-1")]
    #[case(0.0, 1.0, "1", "-1", "0", "0", "0")]
    fn test_operations(
        #[case] a: f64,
        #[case] b: f64,
        #[case] add_result: &str,
        #[case] sub_result: &str,
        #[case] mul_result: &str,
        #[case] div_result: &str,
        #[case] rem_result: &str,
    ) {
        let num_a = Number::new(a);
        let num_b = Number::new(b);

        assert_eq!(format!("{}", num_a + num_b), add_result);
        assert_eq!(format!("{}", num_a - num_b), sub_result);
        assert_eq!(format!("{}", num_a * num_b), mul_result);
        assert_eq!(format!("{}", num_a / num_b), div_result);
        assert_eq!(format!("{}", num_a % num_b), rem_result);
    }

    #[rstest]
    #[case(2.0, 10.0, 1024.0)]
    #[case(9.0, 0.5, 3.0)]
    #[case(5.0, 0.0, 1.0)]
    fn test_pow(#[case] base: f64, #[case] exp: f64, #[case] expected: f64) {
        assert_eq!(
            Number::new(base).pow(Number::new(exp)),
            Number::new(expected)
        );
    }

    #[rstest]
    #[case(1.0, true)]
    #[case(-0.5, true)]
    #[case(0.0, false)]
    #[case(f64::NAN, false)]
    fn test_is_true(#[case] value: f64, #[case] expected: bool) {
        assert_eq!(Number::new(value).is_true(), expected);
    }

    #[rstest]
    #[case(0.0, true)]
    #[case(0.1, false)]
    #[case(-0.0, true)]
    #[case(1e-16, true)]
    fn test_is_zero(#[case] value: f64, #[case] expected: bool) {
        assert_eq!(Number::new(value).is_zero(), expected);
    }

    #[test]
    fn test_nan_propagates() {
        assert!((NAN + Number::new(1.0)).is_nan());
        assert!((NAN * Number::new(0.0)).is_nan());
        assert!(!NAN.is_true());
    }

    #[test]
    fn test_ordering_with_nan() {
        assert_eq!(NAN.cmp(&NAN), Ordering::Equal);
        assert_eq!(NAN.cmp(&Number::new(1.0)), Ordering::Greater);
        assert_eq!(Number::new(1.0).cmp(&NAN), Ordering::Less);
    }
}
