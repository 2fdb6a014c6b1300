//! Rational timebases and exact timestamp rescaling.
//!
//! Every timestamp in the pipeline is an integer count of ticks of some
//! [`Rational`] timebase (seconds per tick). Moving a timestamp between
//! timebases is done with 128-bit integer cross multiplication, never floats.

use std::cmp::Ordering;
use std::fmt;

/// A rational number, used as seconds-per-tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    #[must_use]
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// The reciprocal, e.g. a frame rate turned into a timebase.
    #[must_use]
    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /// Approximate value, for logging only.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Rounding applied when a rescale is not exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rounding {
    /// Round toward zero.
    Zero,
    /// Round toward negative infinity.
    Down,
    /// Round toward positive infinity.
    Up,
    /// Round to nearest, halfway cases away from zero.
    #[default]
    NearInfinity,
}

/// Computes `a * b / c` with the given rounding.
///
/// Saturates to the `i64` range instead of wrapping. `c` must be non-zero.
#[must_use]
pub fn rescale_rnd(a: i64, b: i64, c: i64, rounding: Rounding) -> i64 {
    debug_assert!(c != 0, "rescale by zero");
    let mut n = a as i128 * b as i128;
    let mut d = c as i128;
    if d < 0 {
        n = -n;
        d = -d;
    }
    let q = n.div_euclid(d);
    let r = n.rem_euclid(d);
    let out = if r == 0 {
        q
    } else {
        match rounding {
            Rounding::Down => q,
            Rounding::Up => q + 1,
            Rounding::Zero => {
                if n < 0 {
                    q + 1
                } else {
                    q
                }
            }
            Rounding::NearInfinity => {
                let twice = 2 * r;
                if twice > d || (twice == d && n > 0) {
                    q + 1
                } else {
                    q
                }
            }
        }
    };
    out.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Rescales `value` from timebase `from` to timebase `to`, rounding to nearest.
#[must_use]
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    rescale_with(value, from, to, Rounding::NearInfinity)
}

/// Rescales `value` from timebase `from` to timebase `to`.
#[must_use]
pub fn rescale_with(value: i64, from: Rational, to: Rational, rounding: Rounding) -> i64 {
    let b = from.num as i128 * to.den as i128;
    let c = from.den as i128 * to.num as i128;
    if let (Ok(b), Ok(c)) = (i64::try_from(b), i64::try_from(c)) {
        return rescale_rnd(value, b, c, rounding);
    }
    // Factors too wide for i64; fall back to two steps through seconds*den.
    let via = rescale_rnd(value, from.num, from.den, rounding);
    rescale_rnd(via, to.den, to.num, rounding)
}

/// Orders two timestamps expressed in different timebases.
#[must_use]
pub fn compare_ts(a: i64, tb_a: Rational, b: i64, tb_b: Rational) -> Ordering {
    let lhs = a as i128 * tb_a.num as i128 * tb_b.den as i128;
    let rhs = b as i128 * tb_b.num as i128 * tb_a.den as i128;
    lhs.cmp(&rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rescale_frame_to_millis() {
        let fps25 = Rational::new(1, 25);
        let ms = Rational::new(1, 1000);
        assert_eq!(rescale(0, fps25, ms), 0);
        assert_eq!(rescale(1, fps25, ms), 40);
        assert_eq!(rescale(24, fps25, ms), 960);
    }

    #[test]
    fn test_rescale_rounding_modes() {
        assert_eq!(rescale_rnd(10, 1, 3, Rounding::Down), 3);
        assert_eq!(rescale_rnd(10, 1, 3, Rounding::Up), 4);
        assert_eq!(rescale_rnd(10, 1, 4, Rounding::NearInfinity), 3);
        assert_eq!(rescale_rnd(-10, 1, 4, Rounding::NearInfinity), -3);
        assert_eq!(rescale_rnd(-10, 1, 3, Rounding::Zero), -3);
        assert_eq!(rescale_rnd(-10, 1, 3, Rounding::Down), -4);
    }

    #[test]
    fn test_rescale_same_timebase_is_identity() {
        let tb = Rational::new(1, 44100);
        assert_eq!(rescale(123_456, tb, tb), 123_456);
    }

    #[test]
    fn test_compare_ts_across_timebases() {
        let video = Rational::new(1, 25);
        let audio = Rational::new(1, 44100);
        assert_eq!(compare_ts(1, video, 1764, audio), Ordering::Equal);
        assert_eq!(compare_ts(1, video, 1765, audio), Ordering::Less);
        assert_eq!(compare_ts(2, video, 1765, audio), Ordering::Greater);
    }

    proptest! {
        #[test]
        fn rescale_round_trip_through_finer_timebase(
            value in -1_000_000_000i64..1_000_000_000,
            num in 1i64..1000,
            den in 1i64..100_000,
            factor in 1i64..1000,
        ) {
            let a = Rational::new(num, den);
            let b = Rational::new(num, den * factor);
            let there = rescale(value, a, b);
            prop_assert_eq!(there, value * factor);
            prop_assert_eq!(rescale(there, b, a), value);
        }

        #[test]
        fn rescale_is_pure(value in 0i64..10_000_000, rate in 1i64..192_000) {
            let from = Rational::new(1, rate);
            let to = Rational::new(1, 1000);
            prop_assert_eq!(rescale(value, from, to), rescale(value, from, to));
        }
    }
}
