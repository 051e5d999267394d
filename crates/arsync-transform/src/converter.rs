//! Transform converter
//!
//! A converter is the signed axis permutation `M` plus a uniform unit scale
//! `s` that maps a vector from a declared source frame into a target frame:
//! `v' = s * M * v`. Rotations are conjugated, `R' = M * R * M^T`, which for a
//! quaternion means remapping the vector part and multiplying it by `det(M)`
//! so that a handedness flip still produces a proper rotation.
//!
//! The converter is applied as a permutation (one multiply per component,
//! never a sum) so the identity converter is bit-exact.

use arsync_core::{ArError, ArResult, Quat, Transform, Vec3};

use crate::FrameDeclaration;

/// Expected wire matrix shape
pub const MATRIX_ROWS: u32 = 4;
pub const MATRIX_COLS: u32 = 4;
pub const MATRIX_LEN: usize = 16;

/// One row of the signed permutation: which source axis feeds a target
/// axis, and with which sign
#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisMap {
    source: usize,
    sign: f64,
}

/// Converter from a declared source frame into a target frame
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConverter {
    source: FrameDeclaration,
    target: FrameDeclaration,
    /// Indexed by target axis
    map: [AxisMap; 3],
    /// Unit scale source -> target
    scale: f64,
    /// Determinant of the signed permutation, +1 or -1
    det: f64,
}

impl TransformConverter {
    /// Build a converter; both declarations must be valid
    pub fn new(source: FrameDeclaration, target: FrameDeclaration) -> ArResult<Self> {
        source.validate()?;
        target.validate()?;

        let mut map = [AxisMap {
            source: 0,
            sign: 1.0,
        }; 3];
        for (src, tgt) in source.alignments().iter().zip(target.alignments().iter()) {
            map[tgt.axis.index()] = AxisMap {
                source: src.axis.index(),
                sign: src.direction.sign() * tgt.direction.sign(),
            };
        }

        let scale = source.scale.value() / target.scale.value();
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ArError::InvalidFrame(format!(
                "unusable scale {} between {:?} and {:?}",
                scale, source.scale, target.scale
            )));
        }

        let det = permutation_parity(&map) * map.iter().map(|m| m.sign).product::<f64>();

        Ok(TransformConverter {
            source,
            target,
            map,
            scale,
            det,
        })
    }

    /// Converter into engine space
    pub fn to_engine(source: FrameDeclaration) -> ArResult<Self> {
        Self::new(source, FrameDeclaration::ENGINE)
    }

    pub fn source(&self) -> &FrameDeclaration {
        &self.source
    }

    pub fn target(&self) -> &FrameDeclaration {
        &self.target
    }

    /// Unit scale applied to points
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// True when source and target differ in handedness
    pub fn flips_handedness(&self) -> bool {
        self.det < 0.0
    }

    /// Converter for the opposite direction
    pub fn inverse(&self) -> TransformConverter {
        let mut map = self.map;
        for (target_axis, m) in self.map.iter().enumerate() {
            map[m.source] = AxisMap {
                source: target_axis,
                sign: m.sign,
            };
        }
        TransformConverter {
            source: self.target,
            target: self.source,
            map,
            scale: 1.0 / self.scale,
            det: self.det,
        }
    }

    #[inline]
    fn remap(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            v[self.map[0].source] * self.map[0].sign,
            v[self.map[1].source] * self.map[1].sign,
            v[self.map[2].source] * self.map[2].sign,
        )
    }

    /// Axis remap, then unit scale
    pub fn convert_point(&self, p: Vec3) -> Vec3 {
        self.remap(p) * self.scale
    }

    /// Same as a point: frames share their origin
    pub fn convert_vector(&self, v: Vec3) -> Vec3 {
        self.convert_point(v)
    }

    /// Axis remap and unit scale, made non-negative
    pub fn convert_size(&self, s: Vec3) -> Vec3 {
        self.convert_point(s).abs()
    }

    /// Axis remap without unit scale, for unitless grid coordinates
    pub fn convert_index(&self, i: Vec3) -> Vec3 {
        self.remap(i)
    }

    /// Scale a scalar length
    pub fn convert_scale(&self, length: f64) -> f64 {
        length * self.scale
    }

    /// Conjugate the rotation into the target frame
    pub fn convert_quaternion(&self, q: Quat) -> Quat {
        let v = self.remap(Vec3::new(q.x, q.y, q.z));
        Quat::new(v.x * self.det, v.y * self.det, v.z * self.det, q.w)
    }

    /// Rotation from roll/pitch/yaw radians expressed in the source frame
    pub fn convert_rotation(&self, roll: f64, pitch: f64, yaw: f64) -> Quat {
        self.convert_quaternion(Quat::from_euler(roll, pitch, yaw))
    }

    /// Convert a decomposed transform part by part
    ///
    /// Per-axis scale factors are unitless: they follow their axis but keep
    /// their sign and magnitude.
    pub fn convert_transform(&self, t: &Transform) -> Transform {
        let s = t.scale;
        Transform {
            translation: self.convert_point(t.translation),
            rotation: self.convert_quaternion(t.rotation),
            scale: Vec3::new(
                s[self.map[0].source],
                s[self.map[1].source],
                s[self.map[2].source],
            ),
        }
    }

    /// Decompose a row-major 4x4 matrix in the source frame and recompose
    /// it in the target frame
    pub fn convert_matrix(&self, rows: u32, cols: u32, data: &[f64]) -> ArResult<Transform> {
        let source = decompose_matrix(rows, cols, data)?;
        Ok(self.convert_transform(&source))
    }
}

/// Validate the shape of a wire matrix and decompose it without conversion
pub fn decompose_matrix(rows: u32, cols: u32, data: &[f64]) -> ArResult<Transform> {
    if rows != MATRIX_ROWS || cols != MATRIX_COLS || data.len() != MATRIX_LEN {
        return Err(ArError::MalformedMatrix {
            rows,
            cols,
            len: data.len(),
        });
    }

    let mut m = [0.0; MATRIX_LEN];
    m.copy_from_slice(data);
    Ok(Transform::from_row_major(&m))
}

/// +1 for an even permutation of the source axes, -1 for an odd one
fn permutation_parity(map: &[AxisMap; 3]) -> f64 {
    let mut inversions = 0;
    for i in 0..3 {
        for j in (i + 1)..3 {
            if map[i].source > map[j].source {
                inversions += 1;
            }
        }
    }
    if inversions % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}
