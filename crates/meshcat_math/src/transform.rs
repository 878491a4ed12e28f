// Transform utilities for meshcat scene data
//
// Decomposed translation/rotation/scale transforms in f64, with matrix
// decomposition done by hand so that degenerate scale columns and the
// quaternion branch selection behave the same on every platform.

use glam::{DMat3, DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Tolerance used when asking whether a scale is the identity scale.
pub const SCALE_EPSILON: f64 = 1e-6;

/// Column magnitudes below this are treated as degenerate during decomposition.
const DEGENERATE_COLUMN: f64 = 1e-10;

/// Transform components that can be composed into a matrix.
///
/// Rotation is a unit quaternion stored as (x, y, z, w).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation
    pub translation: DVec3,

    /// Rotation (as quaternion)
    pub rotation: DQuat,

    /// Scale
    pub scale: DVec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// The identity transform: no translation, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
        scale: DVec3::ONE,
    };

    pub fn new(translation: DVec3, rotation: DQuat, scale: DVec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Create a new transform with only translation.
    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Create a new transform with only scale.
    pub fn from_scale(scale: DVec3) -> Self {
        Self {
            scale,
            ..Self::IDENTITY
        }
    }

    /// Create a new transform from a 4x4 matrix.
    pub fn from_matrix(matrix: &DMat4) -> Self {
        decompose(matrix)
    }

    /// Parse 16 column-major floats into a decomposed transform.
    ///
    /// Returns `None` when the slice does not hold exactly 16 elements.
    pub fn from_column_major(elements: &[f64]) -> Option<Self> {
        let cols: &[f64; 16] = elements.try_into().ok()?;
        Some(decompose(&DMat4::from_cols_array(cols)))
    }

    /// Convert to a 4x4 transformation matrix.
    ///
    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Compose `self` (outer, parent) with `child` (inner).
    pub fn compose(&self, child: &Transform) -> Transform {
        compose(self, child)
    }

    /// True when every scale component is within [`SCALE_EPSILON`] of 1.
    pub fn has_identity_scale(&self) -> bool {
        (self.scale - DVec3::ONE).abs().max_element() < SCALE_EPSILON
    }

    /// Component-wise comparison within `epsilon`.
    ///
    /// Quaternions `q` and `-q` describe the same rotation and compare equal.
    pub fn abs_diff_eq(&self, other: &Transform, epsilon: f64) -> bool {
        self.translation.abs_diff_eq(other.translation, epsilon)
            && self.scale.abs_diff_eq(other.scale, epsilon)
            && (self.rotation.dot(other.rotation).abs() - 1.0).abs() < epsilon
    }
}

/// Combine parent and child transforms: `parent × child`, decomposed again.
pub fn compose(parent: &Transform, child: &Transform) -> Transform {
    decompose(&(parent.to_matrix() * child.to_matrix()))
}

/// Decompose a 4x4 matrix into translation, rotation and scale.
///
/// Scale is the magnitude of each basis column. A column shorter than
/// 1e-10 is used unnormalised when building the rotation.
pub fn decompose(matrix: &DMat4) -> Transform {
    let translation = matrix.w_axis.truncate();

    let columns = [
        matrix.x_axis.truncate(),
        matrix.y_axis.truncate(),
        matrix.z_axis.truncate(),
    ];
    let scale = DVec3::new(
        columns[0].length(),
        columns[1].length(),
        columns[2].length(),
    );

    let unit = |column: DVec3, magnitude: f64| {
        if magnitude > DEGENERATE_COLUMN {
            column / magnitude
        } else {
            column
        }
    };
    let rotation_matrix = DMat3::from_cols(
        unit(columns[0], scale.x),
        unit(columns[1], scale.y),
        unit(columns[2], scale.z),
    );

    Transform {
        translation,
        rotation: rotation_matrix_to_quat(&rotation_matrix),
        scale,
    }
}

/// Convert a 3x3 rotation matrix to a unit quaternion (Shepperd's method).
///
/// Branches on the trace and on the dominant diagonal element so the
/// square root argument stays well away from zero.
pub fn rotation_matrix_to_quat(m: &DMat3) -> DQuat {
    // r(row, col); glam stores columns
    let r = |row: usize, col: usize| m.col(col)[row];
    let trace = r(0, 0) + r(1, 1) + r(2, 2);

    let (x, y, z, w) = if trace > 0.0 {
        let s = 0.5 / (trace + 1.0).sqrt();
        (
            (r(2, 1) - r(1, 2)) * s,
            (r(0, 2) - r(2, 0)) * s,
            (r(1, 0) - r(0, 1)) * s,
            0.25 / s,
        )
    } else if r(0, 0) > r(1, 1) && r(0, 0) > r(2, 2) {
        let s = 2.0 * (1.0 + r(0, 0) - r(1, 1) - r(2, 2)).sqrt();
        (
            0.25 * s,
            (r(0, 1) + r(1, 0)) / s,
            (r(0, 2) + r(2, 0)) / s,
            (r(2, 1) - r(1, 2)) / s,
        )
    } else if r(1, 1) > r(2, 2) {
        let s = 2.0 * (1.0 + r(1, 1) - r(0, 0) - r(2, 2)).sqrt();
        (
            (r(0, 1) + r(1, 0)) / s,
            0.25 * s,
            (r(1, 2) + r(2, 1)) / s,
            (r(0, 2) - r(2, 0)) / s,
        )
    } else {
        let s = 2.0 * (1.0 + r(2, 2) - r(0, 0) - r(1, 1)).sqrt();
        (
            (r(0, 2) + r(2, 0)) / s,
            (r(1, 2) + r(2, 1)) / s,
            0.25 * s,
            (r(1, 0) - r(0, 1)) / s,
        )
    };

    let q = DQuat::from_xyzw(x, y, z, w);
    let length = q.length();
    if length.is_finite() && length > DEGENERATE_COLUMN {
        q / length
    } else {
        DQuat::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    const EPS: f64 = 1e-9;

    #[test]
    fn test_identity_defaults() {
        let t = Transform::default();
        assert_eq!(t.translation, DVec3::ZERO);
        assert_eq!(t.rotation, DQuat::IDENTITY);
        assert_eq!(t.scale, DVec3::ONE);
        assert!(t.has_identity_scale());
    }

    #[test]
    fn test_from_column_major_translation() {
        let m = [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            5.0, 0.0, 0.0, 1.0,
        ];
        let t = Transform::from_column_major(&m).unwrap();
        assert!((t.translation - DVec3::new(5.0, 0.0, 0.0)).length() < EPS);
        assert!(t.has_identity_scale());
    }

    #[test]
    fn test_from_column_major_wrong_length() {
        assert!(Transform::from_column_major(&[1.0; 12]).is_none());
    }

    #[test]
    fn test_compose_identity_left() {
        let t = Transform::new(
            DVec3::new(1.0, -2.0, 3.0),
            DQuat::from_rotation_y(FRAC_PI_4),
            DVec3::new(2.0, 3.0, 4.0),
        );
        let composed = compose(&Transform::IDENTITY, &t);
        assert!(composed.abs_diff_eq(&t, EPS));
    }

    #[test]
    fn test_decompose_roundtrip() {
        let cases = [
            Transform::new(
                DVec3::new(1.0, 2.0, 3.0),
                DQuat::from_rotation_x(0.3),
                DVec3::new(2.0, 2.0, 2.0),
            ),
            // trace <= 0, x dominant
            Transform::new(DVec3::ZERO, DQuat::from_rotation_x(PI * 0.9), DVec3::ONE),
            // y dominant
            Transform::new(DVec3::X, DQuat::from_rotation_y(PI * 0.9), DVec3::splat(0.5)),
            // z dominant
            Transform::new(DVec3::Y, DQuat::from_rotation_z(PI * 0.9), DVec3::new(1.0, 3.0, 0.1)),
        ];

        for t in cases {
            let recovered = decompose(&t.to_matrix());
            assert!(recovered.abs_diff_eq(&t, 1e-9), "{t:?} -> {recovered:?}");
            assert!((recovered.rotation.length() - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn test_rotation_about_z_maps_x_to_y() {
        let q = rotation_matrix_to_quat(&DMat3::from_rotation_z(FRAC_PI_2));
        let v = q * DVec3::X;
        assert!((v - DVec3::Y).length() < EPS);
    }

    #[test]
    fn test_degenerate_scale_column() {
        let m = DMat4::from_cols(
            glam::DVec4::new(0.0, 0.0, 0.0, 0.0),
            glam::DVec4::Y,
            glam::DVec4::Z,
            glam::DVec4::W,
        );
        let t = decompose(&m);
        assert_eq!(t.scale.x, 0.0);
        assert!(t.rotation.is_finite());
        assert!((t.rotation.length() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_world_chain_composition() {
        let t1 = Transform::from_translation(DVec3::new(1.0, 0.0, 0.0));
        let t2 = Transform::from_translation(DVec3::new(0.0, 1.0, 0.0));
        let t3 = Transform::from_scale(DVec3::splat(2.0));

        let world = t1.compose(&t2).compose(&t3);
        assert!((world.translation - DVec3::new(1.0, 1.0, 0.0)).length() < EPS);
        assert!((world.scale - DVec3::splat(2.0)).length() < EPS);
    }

    #[test]
    fn test_non_identity_scale_detection() {
        let t = Transform::from_scale(DVec3::new(1.0, 1.0, 1.0 + 1e-3));
        assert!(!t.has_identity_scale());
        let t = Transform::from_scale(DVec3::new(1.0, 1.0, 1.0 + 1e-8));
        assert!(t.has_identity_scale());
    }
}
