//! Float-vector values: the payload of transforms and animation keyframes.

use crate::{DMat4, DVec2, DVec3, DVec4};

/// Arity of a value, as declared by accessor params.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Float,
    Float2,
    Float3,
    Float4,
    Float4x4,
}

impl ValueKind {
    #[inline]
    pub fn component_count(self) -> usize {
        match self {
            ValueKind::Float => 1,
            ValueKind::Float2 => 2,
            ValueKind::Float3 => 3,
            ValueKind::Float4 => 4,
            ValueKind::Float4x4 => 16,
        }
    }
}

/// A fixed-arity float vector or 4x4 matrix.
///
/// Matrix components are stored row-major, exactly as authored in the
/// document; [`Value::as_mat4`] transposes into glam's column-major layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub kind: ValueKind,
    pub components: Vec<f64>,
}

impl Value {
    pub fn new(kind: ValueKind, components: Vec<f64>) -> Self {
        debug_assert_eq!(components.len(), kind.component_count());
        Self { kind, components }
    }

    #[inline]
    pub fn as_f64(&self) -> f64 {
        debug_assert_eq!(self.kind, ValueKind::Float);
        self.components[0]
    }

    #[inline]
    pub fn as_vec2(&self) -> DVec2 {
        debug_assert_eq!(self.kind, ValueKind::Float2);
        DVec2::new(self.components[0], self.components[1])
    }

    #[inline]
    pub fn as_vec3(&self) -> DVec3 {
        debug_assert_eq!(self.kind, ValueKind::Float3);
        DVec3::new(self.components[0], self.components[1], self.components[2])
    }

    #[inline]
    pub fn as_vec4(&self) -> DVec4 {
        debug_assert_eq!(self.kind, ValueKind::Float4);
        DVec4::new(
            self.components[0],
            self.components[1],
            self.components[2],
            self.components[3],
        )
    }

    /// Read as a matrix, transposing row-major storage into column-major.
    pub fn as_mat4(&self) -> DMat4 {
        debug_assert_eq!(self.kind, ValueKind::Float4x4);
        let mut cols = [0.0; 16];
        for row in 0..4 {
            for col in 0..4 {
                cols[col * 4 + row] = self.components[row * 4 + col];
            }
        }
        DMat4::from_cols_array(&cols)
    }
}

/// Component-wise linear interpolation of `a` and `b` into `out`.
pub fn lerp_into(a: &Value, b: &Value, out: &mut Value, t: f64) {
    debug_assert_eq!(a.components.len(), b.components.len());
    debug_assert_eq!(a.components.len(), out.components.len());
    for i in 0..a.components.len() {
        out.components[i] = a.components[i] * (1.0 - t) + b.components[i] * t;
    }
}
