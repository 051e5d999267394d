//! Spatial math in engine space
//!
//! Engine space is left-handed, X forward, Y right, Z up. All matrices use the
//! row-vector convention of the wire format: `p' = p * M`, translation lives
//! in the last row of a row-major 4x4 array.

use std::ops::{Add, Div, Index, Mul, Neg, Sub};

/// Tolerance below which an axis scale is treated as degenerate
const SCALE_EPSILON: f64 = 1e-8;

/// 3D vector / point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    pub fn from_array(a: [f64; 3]) -> Self {
        Vec3::new(a[0], a[1], a[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn abs(self) -> Vec3 {
        Vec3::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    /// Component-wise product
    pub fn scale_by(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn approx_eq(self, other: Vec3, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

impl Index<usize> for Vec3 {
    type Output = f64;

    fn index(&self, axis: usize) -> &f64 {
        match axis {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for Vec3 {
    type Output = Vec3;
    fn div(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Rotation quaternion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Quat { x, y, z, w }
    }

    /// Rotation from roll (X), pitch (Y) and yaw (Z) in radians, applied
    /// roll first: `q = Rz(yaw) * Ry(pitch) * Rx(roll)`
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let cy = (yaw * 0.5).cos();
        let sy = (yaw * 0.5).sin();
        let cp = (pitch * 0.5).cos();
        let sp = (pitch * 0.5).sin();
        let cr = (roll * 0.5).cos();
        let sr = (roll * 0.5).sin();

        Quat {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
    }

    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        let len = axis.length();
        if len < SCALE_EPSILON {
            return Quat::IDENTITY;
        }
        let n = axis / len;
        let (s, c) = (angle * 0.5).sin_cos();
        Quat::new(n.x * s, n.y * s, n.z * s, c)
    }

    /// Build from a proper rotation matrix `m[row][col]` acting on column vectors
    pub fn from_rotation_matrix(m: [[f64; 3]; 3]) -> Self {
        let trace = m[0][0] + m[1][1] + m[2][2];

        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Quat::new(
                (m[2][1] - m[1][2]) / s,
                (m[0][2] - m[2][0]) / s,
                (m[1][0] - m[0][1]) / s,
                0.25 * s,
            )
        } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
            let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
            Quat::new(
                0.25 * s,
                (m[0][1] + m[1][0]) / s,
                (m[0][2] + m[2][0]) / s,
                (m[2][1] - m[1][2]) / s,
            )
        } else if m[1][1] > m[2][2] {
            let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
            Quat::new(
                (m[0][1] + m[1][0]) / s,
                0.25 * s,
                (m[1][2] + m[2][1]) / s,
                (m[0][2] - m[2][0]) / s,
            )
        } else {
            let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
            Quat::new(
                (m[0][2] + m[2][0]) / s,
                (m[1][2] + m[2][1]) / s,
                0.25 * s,
                (m[1][0] - m[0][1]) / s,
            )
        };

        q.normalize()
    }

    /// Rotation matrix `m[row][col]` acting on column vectors
    pub fn to_rotation_matrix(self) -> [[f64; 3]; 3] {
        let Quat { x, y, z, w } = self;
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - z * w),
                2.0 * (x * z + y * w),
            ],
            [
                2.0 * (x * y + z * w),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - x * w),
            ],
            [
                2.0 * (x * z - y * w),
                2.0 * (y * z + x * w),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    pub fn normalize(self) -> Quat {
        let len = self.length();
        if len < SCALE_EPSILON || !len.is_finite() {
            return Quat::IDENTITY;
        }
        Quat::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    pub fn conjugate(self) -> Quat {
        Quat::new(-self.x, -self.y, -self.z, self.w)
    }

    pub fn rotate(self, v: Vec3) -> Vec3 {
        let m = self.to_rotation_matrix();
        Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    /// Equality up to the double cover (`q` and `-q` are the same rotation)
    pub fn approx_eq(self, other: Quat, tolerance: f64) -> bool {
        let same = (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
            && (self.w - other.w).abs() <= tolerance;
        let flipped = (self.x + other.x).abs() <= tolerance
            && (self.y + other.y).abs() <= tolerance
            && (self.z + other.z).abs() <= tolerance
            && (self.w + other.w).abs() <= tolerance;
        same || flipped
    }
}

impl Mul for Quat {
    type Output = Quat;

    /// Hamilton product, `self` applied after `rhs`
    fn mul(self, rhs: Quat) -> Quat {
        Quat::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

/// Translation, rotation and per-axis scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Transform {
            translation,
            rotation,
            scale,
        }
    }

    /// Copy with the scale multiplied component-wise
    pub fn scaled(&self, factor: Vec3) -> Transform {
        Transform {
            scale: self.scale.scale_by(factor),
            ..*self
        }
    }

    /// Apply scale, then rotation, then translation
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.rotate(p.scale_by(self.scale)) + self.translation
    }

    /// Decompose a row-major 4x4 affine matrix (row-vector convention)
    ///
    /// A negative determinant is folded into the X scale. Degenerate axes
    /// yield an identity rotation.
    pub fn from_row_major(m: &[f64; 16]) -> Transform {
        let rows = [
            Vec3::new(m[0], m[1], m[2]),
            Vec3::new(m[4], m[5], m[6]),
            Vec3::new(m[8], m[9], m[10]),
        ];
        let translation = Vec3::new(m[12], m[13], m[14]);

        let mut scale = Vec3::new(rows[0].length(), rows[1].length(), rows[2].length());
        if scale.x < SCALE_EPSILON || scale.y < SCALE_EPSILON || scale.z < SCALE_EPSILON {
            return Transform::new(translation, Quat::IDENTITY, scale);
        }

        let mut axes = [rows[0] / scale.x, rows[1] / scale.y, rows[2] / scale.z];
        if rows[0].dot(rows[1].cross(rows[2])) < 0.0 {
            scale.x = -scale.x;
            axes[0] = -axes[0];
        }

        // Column i of the rotation matrix is the image of basis vector i
        let r = [
            [axes[0].x, axes[1].x, axes[2].x],
            [axes[0].y, axes[1].y, axes[2].y],
            [axes[0].z, axes[1].z, axes[2].z],
        ];

        Transform::new(translation, Quat::from_rotation_matrix(r), scale)
    }

    /// Compose into a row-major 4x4 affine matrix (row-vector convention)
    pub fn to_row_major(&self) -> [f64; 16] {
        let r = self.rotation.normalize().to_rotation_matrix();
        let s = self.scale.to_array();
        let mut m = [0.0; 16];

        for (i, scale) in s.iter().enumerate() {
            for j in 0..3 {
                m[i * 4 + j] = r[j][i] * scale;
            }
        }
        m[12] = self.translation.x;
        m[13] = self.translation.y;
        m[14] = self.translation.z;
        m[15] = 1.0;
        m
    }

    pub fn approx_eq(&self, other: &Transform, tolerance: f64) -> bool {
        self.translation.approx_eq(other.translation, tolerance)
            && self.rotation.approx_eq(other.rotation, tolerance)
            && self.scale.approx_eq(other.scale, tolerance)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    /// Box spanning `center - extent ..= center + extent`
    pub fn from_center_extent(center: Vec3, extent: Vec3) -> Self {
        Aabb {
            min: center - extent,
            max: center + extent,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half size
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

/// Oriented bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Obb {
    pub axis_box: Aabb,
    pub rotation: Quat,
}

impl Obb {
    pub fn new(translation: Vec3, rotation: Quat, extent: Vec3) -> Self {
        Obb {
            axis_box: Aabb::from_center_extent(translation, extent),
            rotation,
        }
    }
}

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const RED: Color = Color::rgba(255, 0, 0, 255);
    pub const YELLOW: Color = Color::rgba(255, 255, 0, 255);
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::RED
    }
}
