//! Document transforms and transform stacks applied to 4x4 matrices.

use crate::value::{Value, ValueKind};
use crate::{DMat4, DVec3};

/// The transform node kinds the loader recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformKind {
    /// Full 4x4 matrix (`matrix`, `bind_shape_matrix`).
    Matrix,
    /// Axis + angle in degrees (`rotate`).
    Rotate,
    Translate,
    Scale,
}

impl TransformKind {
    /// Value arity this transform kind carries.
    pub fn value_kind(self) -> ValueKind {
        match self {
            TransformKind::Matrix => ValueKind::Float4x4,
            TransformKind::Rotate => ValueKind::Float4,
            TransformKind::Translate | TransformKind::Scale => ValueKind::Float3,
        }
    }
}

/// One local transform with its current (possibly animated) value.
#[derive(Clone, Debug)]
pub struct Transform {
    pub kind: TransformKind,
    pub value: Value,
}

impl Transform {
    /// Right-multiply `to` by this transform.
    pub fn apply_to(&self, to: &mut DMat4) {
        match self.kind {
            TransformKind::Matrix => {
                let mut m = self.value.as_mat4();
                normalize_rotation_rows(&mut m);
                *to *= m;
            }
            TransformKind::Rotate => {
                let c = &self.value.components;
                let axis = DVec3::new(c[0], c[1], c[2]);
                let angle = c[3].to_radians();
                if let Some(axis) = axis.try_normalize() {
                    *to *= DMat4::from_axis_angle(axis, angle);
                }
            }
            TransformKind::Translate => {
                *to *= DMat4::from_translation(self.value.as_vec3());
            }
            TransformKind::Scale => {
                *to *= DMat4::from_scale(self.value.as_vec3());
            }
        }
    }
}

/// Normalize each row of the upper 3x3 and pin the homogeneous corner to 1.
/// Authored bind matrices often carry scale the skeleton must not inherit.
fn normalize_rotation_rows(m: &mut DMat4) {
    let mut a = m.to_cols_array_2d();
    for row in 0..3 {
        let w: f64 = (0..3)
            .map(|col| a[col][row] * a[col][row])
            .sum::<f64>()
            .sqrt();
        if w > 0.0 {
            for col in 0..3 {
                a[col][row] /= w;
            }
        }
    }
    a[3][3] = 1.0;
    *m = DMat4::from_cols_array_2d(&a);
}

/// Ordered list of local transforms, applied first-to-last.
#[derive(Clone, Debug, Default)]
pub struct TransformStack {
    pub transforms: Vec<Transform>,
}

impl TransformStack {
    pub fn apply_to(&self, to: &mut DMat4) {
        for t in &self.transforms {
            t.apply_to(to);
        }
    }
}
