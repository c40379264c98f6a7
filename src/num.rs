//! Utilities for numerics.

use std::{cmp::Ordering, f32::consts::PI};

/// An `f32` that implements [`Ord`] according to the IEEE 754 totalOrder predicate.
#[derive(Debug, Clone, Copy)]
pub struct TotalF32(pub f32);

impl PartialEq for TotalF32 {
    fn eq(&self, other: &Self) -> bool {
        f32::total_cmp(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        f32::total_cmp(&self.0, &other.0)
    }
}

/// Applies the standard sigmoid/logistic function to the input.
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Wraps an angle into the range `[-π, π)`.
pub fn normalize_radians(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn sigmoid_midpoint() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn total_order() {
        let mut values = [TotalF32(1.0), TotalF32(-3.0), TotalF32(0.5)];
        values.sort();
        assert_eq!(values.map(|v| v.0), [-3.0, 0.5, 1.0]);
    }

    #[test]
    fn wraps_angles() {
        assert_relative_eq!(normalize_radians(0.0), 0.0);
        assert_relative_eq!(normalize_radians(PI / 2.0), PI / 2.0);
        assert_relative_eq!(normalize_radians(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-5);
        assert_relative_eq!(normalize_radians(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-5);
    }
}
