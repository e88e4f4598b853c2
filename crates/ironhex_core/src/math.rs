//! Fixed-point math utilities for deterministic geometry.
//!
//! Hex line drawing and bearing comparisons need fractional values.
//! Floating-point results can differ between CPUs, so everything here
//! uses fixed-point arithmetic.

use fixed::types::I32F32;

/// Fixed-point number type for all geometry math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// `sqrt(3)` to fixed-point precision.
pub const SQRT_3: Fixed = Fixed::from_bits(7_439_101_574);

/// Nudge applied to line endpoints so that lines running exactly along a
/// hex edge always round to the same side.
pub const LINE_EPSILON: Fixed = Fixed::from_bits(1 << 12);

/// Fractional cube coordinate used while interpolating hex lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCube {
    /// Column axis.
    pub q: Fixed,
    /// Row axis.
    pub r: Fixed,
    /// Derived third axis (`-q - r`).
    pub s: Fixed,
}

impl FixedCube {
    /// Create a fractional cube coordinate from integer cube axes.
    #[must_use]
    pub fn from_cube(q: i32, r: i32, s: i32) -> Self {
        Self {
            q: Fixed::from_num(q),
            r: Fixed::from_num(r),
            s: Fixed::from_num(s),
        }
    }

    /// Offset every axis by a small, axis-specific epsilon.
    ///
    /// The offsets sum to zero so the result stays on the cube plane.
    #[must_use]
    pub fn nudged(self) -> Self {
        Self {
            q: self.q + LINE_EPSILON,
            r: self.r + LINE_EPSILON * 2,
            s: self.s - LINE_EPSILON * 3,
        }
    }

    /// Linearly interpolate between two cube coordinates.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            q: self.q + (other.q - self.q) * t,
            r: self.r + (other.r - self.r) * t,
            s: self.s + (other.s - self.s) * t,
        }
    }

    /// Round to the nearest integer cube coordinate.
    ///
    /// The axis with the largest rounding error is recomputed from the
    /// other two, which keeps `q + r + s == 0`.
    #[must_use]
    pub fn round(self) -> (i32, i32, i32) {
        let rq = self.q.round();
        let rr = self.r.round();
        let rs = self.s.round();

        let dq = (rq - self.q).abs();
        let dr = (rr - self.r).abs();
        let ds = (rs - self.s).abs();

        let mut q: i32 = rq.to_num();
        let mut r: i32 = rr.to_num();
        let s: i32 = rs.to_num();

        if dq > dr && dq > ds {
            q = -r - s;
        } else if dr > ds {
            r = -q - s;
        }
        (q, r, -q - r)
    }
}

/// Fraction `num / den` as a fixed-point value.
#[must_use]
pub fn ratio(num: i32, den: i32) -> Fixed {
    if den == 0 {
        return Fixed::ZERO;
    }
    Fixed::from_num(num) / Fixed::from_num(den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqrt_3_precision() {
        let squared = SQRT_3 * SQRT_3;
        let three = Fixed::from_num(3);
        assert!((squared - three).abs() < Fixed::from_num(0.000_001));
    }

    #[test]
    fn test_cube_round_keeps_plane() {
        let a = FixedCube::from_cube(0, 0, 0);
        let b = FixedCube::from_cube(3, -1, -2);
        for i in 0..=4 {
            let (q, r, s) = a.nudged().lerp(b.nudged(), ratio(i, 4)).round();
            assert_eq!(q + r + s, 0);
        }
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = FixedCube::from_cube(1, 2, -3);
        let b = FixedCube::from_cube(-2, 0, 2);
        assert_eq!(a.lerp(b, Fixed::ZERO).round(), (1, 2, -3));
        assert_eq!(a.lerp(b, Fixed::ONE).round(), (-2, 0, 2));
    }

    #[test]
    fn test_ratio_zero_denominator() {
        assert_eq!(ratio(5, 0), Fixed::ZERO);
        assert_eq!(ratio(1, 2), Fixed::from_num(0.5));
    }
}
