//! Core types: f64 math re-exports, float-vector values, transform stacks.

pub use glam::{DMat4, DVec2, DVec3, DVec4, dvec3};

pub mod transform;
pub mod value;

/// Comparison epsilon, a lot looser than f64's relative precision.
pub const WEAK_EPS: f64 = 1e-8;

/// Approximate equality: absolutely close, or relatively close for large values.
pub fn weak_eq(a: f64, b: f64) -> bool {
    if (a - b).abs() < WEAK_EPS {
        return true;
    }
    if b.abs() <= WEAK_EPS {
        return false;
    }
    (a / b - 1.0).abs() < WEAK_EPS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_eq_absolute_and_relative() {
        assert!(weak_eq(0.0, 1e-9));
        assert!(weak_eq(1e9, 1e9 * (1.0 + 1e-10)));
        assert!(!weak_eq(1.0, 1.1));
    }

    #[test]
    fn identity_stack_is_identity_matrix() {
        let stack = transform::TransformStack::default();
        let mut m = DMat4::IDENTITY;
        stack.apply_to(&mut m);
        assert_eq!(m, DMat4::IDENTITY);
    }
}
