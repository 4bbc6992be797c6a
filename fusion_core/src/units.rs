//! Physical-quantity helpers.
//!
//! Linear quantities are plain `f64` in SI units (m, m/s, m/s², rad/s, s);
//! every field documents its unit. Orientation is the one quantity with
//! non-trivial arithmetic, so it gets its own type: [`Angle`] always holds
//! a value wrapped to (−π, π] and its difference operator wraps too.

use approx::{AbsDiffEq, RelativeEq};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::ops::{Add, Neg, Sub};

/// Wrap `radians` into (−π, π].
pub fn wrap_angle(radians: f64) -> f64 {
    let wrapped = (radians + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// An orientation in radians, canonically wrapped to (−π, π].
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Angle(f64);

impl Angle {
    pub fn new(radians: f64) -> Self {
        Self(wrap_angle(radians))
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    pub fn sin(self) -> f64 {
        self.0.sin()
    }

    pub fn cos(self) -> f64 {
        self.0.cos()
    }
}

impl From<f64> for Angle {
    fn from(radians: f64) -> Self {
        Self::new(radians)
    }
}

impl From<Angle> for f64 {
    fn from(angle: Angle) -> Self {
        angle.0
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Angle) -> Angle {
        Angle::new(self.0 + rhs.0)
    }
}

impl Add<f64> for Angle {
    type Output = Angle;

    fn add(self, rhs: f64) -> Angle {
        Angle::new(self.0 + rhs)
    }
}

/// Shortest signed rotation from `rhs` to `self`.
impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Angle) -> Angle {
        Angle::new(self.0 - rhs.0)
    }
}

impl Neg for Angle {
    type Output = Angle;

    fn neg(self) -> Angle {
        Angle::new(-self.0)
    }
}

impl AbsDiffEq for Angle {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        (*self - *other).0.abs() <= epsilon
    }
}

impl RelativeEq for Angle {
    fn default_max_relative() -> f64 {
        f64::EPSILON
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        let diff = (*self - *other).0.abs();
        if diff <= epsilon {
            return true;
        }
        diff <= max_relative * self.0.abs().max(other.0.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn wraps_into_half_open_range() {
        assert_abs_diff_eq!(wrap_angle(TAU + 0.5), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(0.5), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn difference_takes_short_way_round() {
        let a = Angle::new(PI - 0.1);
        let b = Angle::new(-PI + 0.1);
        assert_abs_diff_eq!((b - a).radians(), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!((a - b).radians(), -0.2, epsilon = 1e-12);
    }

    #[test]
    fn equality_across_the_seam() {
        assert_relative_eq!(Angle::new(PI), Angle::new(-PI + 1e-15), epsilon = 1e-12);
        assert_relative_eq!(Angle::new(34656.6543), Angle::new(34656.6543));
    }
}
