//! Synchronized domain model
//!
//! These are the decoded, engine-space value objects produced by the wire
//! codec and consumed by the reconciliation step and the engine observers.

use chrono::{DateTime, Utc};

use crate::{Aabb, ArError, ArResult, Color, ObjectId, Obb, PetriNetId, Quat, Transform, Vec3};

/// Triangle mesh
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vec3>,
    /// Triangle list, three indices per face
    pub indices: Vec<u32>,
    /// Empty, or one normal per vertex
    pub normals: Vec<Vec3>,
    /// Empty, or one color per vertex
    pub colors: Vec<Color>,
}

impl MeshData {
    /// Check triangle topology and per-vertex attribute lengths
    pub fn validate(&self) -> ArResult<()> {
        let invalid = |reason: String| ArError::InvalidMesh {
            name: self.name.clone(),
            reason,
        };

        if self.indices.len() % 3 != 0 {
            return Err(invalid(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }

        let vertex_count = self.vertices.len();
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(invalid(format!(
                "index {} out of range for {} vertices",
                bad, vertex_count
            )));
        }

        if !self.normals.is_empty() && self.normals.len() != vertex_count {
            return Err(invalid(format!(
                "{} normals for {} vertices",
                self.normals.len(),
                vertex_count
            )));
        }

        Ok(())
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Cached template referenced by name from object instances
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectPrototype {
    pub name: String,
    pub mesh_name: String,
    pub bounding_box: Aabb,
    pub mean_color: Color,
    pub type_tag: String,
}

/// Pose of a prototype-backed object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectData {
    pub prototype_name: String,
    pub transform: Transform,
}

/// Wireframe oriented box
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColoredBox {
    pub obb: Obb,
    pub color: Color,
}

/// Object instance as announced by the server
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectInstance {
    /// Prototype reference plus pose
    Prototype {
        id: ObjectId,
        pn_id: PetriNetId,
        data: ObjectData,
    },
    /// Standalone colored oriented box
    ColoredBox {
        id: ObjectId,
        pn_id: PetriNetId,
        data: ColoredBox,
    },
}

impl ObjectInstance {
    pub fn id(&self) -> &ObjectId {
        match self {
            ObjectInstance::Prototype { id, .. } | ObjectInstance::ColoredBox { id, .. } => id,
        }
    }

    pub fn pn_id(&self) -> PetriNetId {
        match self {
            ObjectInstance::Prototype { pn_id, .. } | ObjectInstance::ColoredBox { pn_id, .. } => {
                *pn_id
            }
        }
    }

    /// Name of the referenced prototype, if any
    pub fn prototype_name(&self) -> Option<&str> {
        match self {
            ObjectInstance::Prototype { data, .. } => Some(&data.prototype_name),
            ObjectInstance::ColoredBox { .. } => None,
        }
    }

    pub fn is_selectable(&self) -> bool {
        self.pn_id().is_selectable()
    }
}

/// Visibility control signal multiplexed on robot streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualChange {
    Enabled = 0,
    Disabled = 1,
    Revoked = 2,
}

impl VisualChange {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(VisualChange::Enabled),
            1 => Some(VisualChange::Disabled),
            2 => Some(VisualChange::Revoked),
            _ => None,
        }
    }

    pub fn is_visible(self) -> bool {
        matches!(self, VisualChange::Enabled)
    }
}

/// Either real payload or a visibility signal
#[derive(Debug, Clone, PartialEq)]
pub enum SyncPayload<T> {
    Data(T),
    Visibility(VisualChange),
}

impl<T> SyncPayload<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            SyncPayload::Data(data) => Some(data),
            SyncPayload::Visibility(_) => None,
        }
    }

    pub fn visibility(&self) -> Option<VisualChange> {
        match self {
            SyncPayload::Data(_) => None,
            SyncPayload::Visibility(change) => Some(*change),
        }
    }
}

/// Robot occupancy voxels
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoxelData {
    /// Voxel grid coordinates
    pub indices: Vec<Vec3>,
    pub voxel_side_length: f64,
    pub robot_origin: Transform,
}

/// Seven joint angles of the arm, in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrankaJoints {
    pub theta: [f64; 7],
}

/// Planned joint configuration at a point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointsSynced {
    pub joints: FrankaJoints,
    pub time_stamp: DateTime<Utc>,
}

pub type VoxelPayload = SyncPayload<VoxelData>;
pub type TcpPayload = SyncPayload<Vec<Vec3>>;
pub type JointSyncPayload = SyncPayload<Vec<JointsSynced>>;

/// Scenario the server is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    ReserveOnly,
    Mixed,
}

/// Assignment chosen for a selected object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Assignment {
    Robot,
    Human,
    #[default]
    Unassigned,
}

/// Tracked hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandIndex {
    Left = 0,
    Right = 1,
}

/// Quality of a hand tracking sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrackingStatus {
    #[default]
    NotTracked = 0,
    InertialOnly = 1,
    Tracked = 2,
}

/// Hand tracking sample in engine space
#[derive(Debug, Clone, PartialEq)]
pub struct HandSample {
    pub valid: bool,
    pub hand: HandIndex,
    pub tracking_status: TrackingStatus,
    pub grip: Transform,
    pub aim: Transform,
    pub key_positions: Vec<Vec3>,
    pub key_rotations: Vec<Quat>,
    pub key_radii: Vec<f64>,
    pub is_grasped: bool,
    pub time_stamp: DateTime<Utc>,
}

/// Captured point cloud
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    pub points: Vec<Vec3>,
    /// Absolute capture time, seconds since the Unix epoch
    pub timestamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshData {
        MeshData {
            name: "tri".into(),
            vertices: vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            indices: vec![0, 1, 2],
            ..Default::default()
        }
    }

    #[test]
    fn test_mesh_validate_ok() {
        assert!(triangle().validate().is_ok());
        assert_eq!(triangle().triangle_count(), 1);
    }

    #[test]
    fn test_mesh_validate_index_count() {
        let mut mesh = triangle();
        mesh.indices.push(0);
        assert!(matches!(mesh.validate(), Err(ArError::InvalidMesh { .. })));
    }

    #[test]
    fn test_mesh_validate_index_range() {
        let mut mesh = triangle();
        mesh.indices[2] = 3;
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_mesh_validate_normals() {
        let mut mesh = triangle();
        mesh.normals = vec![Vec3::new(0.0, 0.0, 1.0)];
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_instance_accessors() {
        let inst = ObjectInstance::Prototype {
            id: ObjectId::new("X1"),
            pn_id: PetriNetId::new(4),
            data: ObjectData {
                prototype_name: "cube".into(),
                transform: Transform::IDENTITY,
            },
        };
        assert_eq!(inst.id().as_str(), "X1");
        assert_eq!(inst.prototype_name(), Some("cube"));
        assert!(inst.is_selectable());
    }

    #[test]
    fn test_visual_change_from_wire() {
        assert_eq!(VisualChange::from_wire(2), Some(VisualChange::Revoked));
        assert_eq!(VisualChange::from_wire(7), None);
    }
}
