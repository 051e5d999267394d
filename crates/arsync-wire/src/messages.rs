//! Wire records
//!
//! Plain data mirrors of the protocol messages. The transport hands these
//! over already deserialized; optional sub-messages are `Option`, enums are
//! carried as raw `i32` so unknown values survive until decode, and oneof
//! payloads are Rust enums.

/// Axis enum values
pub const AXIS_X: i32 = 0;
pub const AXIS_Y: i32 = 1;
pub const AXIS_Z: i32 = 2;

/// Direction enum values
pub const DIRECTION_POSITIVE: i32 = 0;
pub const DIRECTION_NEGATIVE: i32 = 1;

/// Scenario enum values
pub const SCENARIO_RESERVE_ONLY: i32 = 1;
pub const SCENARIO_MIXED: i32 = 2;

/// Assignment enum values
pub const ASSIGNMENT_ROBOT: i32 = 0;
pub const ASSIGNMENT_HUMAN: i32 = 1;
pub const ASSIGNMENT_UNASSIGNED: i32 = 2;

/// Visibility control signal values
pub const VISUAL_ENABLED: i32 = 0;
pub const VISUAL_DISABLED: i32 = 1;
pub const VISUAL_REVOKED: i32 = 2;

// ============================================================================
// FRAME DECLARATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisAlignmentMsg {
    pub axis: i32,
    pub direction: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RatioMsg {
    pub num: i64,
    pub denom: i64,
}

/// One-time coordinate frame declaration embedded in a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformationMeta {
    pub right: Option<AxisAlignmentMsg>,
    pub forward: Option<AxisAlignmentMsg>,
    pub up: Option<AxisAlignmentMsg>,
    pub scale: Option<RatioMsg>,
}

// ============================================================================
// GEOMETRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex3d {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Index3d {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size3d {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuaternionMsg {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Euler angles in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation3d {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorMsg {
    pub r: u32,
    pub g: u32,
    pub b: u32,
    pub a: u32,
}

/// Row-major matrix
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixMsg {
    pub rows: u32,
    pub cols: u32,
    pub data: Vec<f64>,
}

/// Axis-aligned box; `diagonal` spans the full box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AabbMsg {
    pub translation: Option<Vertex3d>,
    pub diagonal: Option<Size3d>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObbMsg {
    pub axis_aligned: Option<AabbMsg>,
    pub rotation: Option<QuaternionMsg>,
}

// ============================================================================
// ASSETS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VertexList {
    pub vertices: Vec<Vertex3d>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorList {
    pub colors: Vec<ColorMsg>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshDataMsg {
    pub name: String,
    pub vertices: Vec<Vertex3d>,
    pub indices: Vec<u32>,
    pub vertex_normals: Option<VertexList>,
    pub vertex_colors: Option<ColorList>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshDataTfMeta {
    pub mesh_data: Option<MeshDataMsg>,
    pub transformation_meta: Option<TransformationMeta>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectPrototypeMsg {
    pub name: String,
    pub mean_color: Option<ColorMsg>,
    pub bounding_box: Option<AabbMsg>,
    pub mesh_name: String,
    pub type_tag: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectPrototypeTfMeta {
    pub object_prototype: Option<ObjectPrototypeMsg>,
    pub transformation_meta: Option<TransformationMeta>,
}

/// Bulk fetch request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameList {
    pub names: Vec<String>,
}

impl NameList {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        NameList {
            names: names.into_iter().collect(),
        }
    }
}

// ============================================================================
// OBJECT INSTANCES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectDataMsg {
    pub prototype_name: String,
    pub transform: Option<MatrixMsg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColoredBoxMsg {
    pub obbox: Option<ObbMsg>,
    pub box_color: Option<ColorMsg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectInstanceBody {
    Obj(ObjectDataMsg),
    Box(ColoredBoxMsg),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectInstanceMsg {
    pub id: String,
    pub pn_id: i32,
    pub data: Option<ObjectInstanceBody>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectInstanceTfMeta {
    pub object_instance: Option<ObjectInstanceMsg>,
    pub transformation_meta: Option<TransformationMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteRequest {
    pub id: String,
}

// ============================================================================
// ROBOT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoxelsMsg {
    pub voxel_side_length: f32,
    pub robot_origin: Option<MatrixMsg>,
    pub voxel_indices: Vec<Index3d>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoxelTfMeta {
    pub voxels: Option<VoxelsMsg>,
    pub transformation_meta: Option<TransformationMeta>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoxelTransmissionBody {
    VoxelData(VoxelTfMeta),
    StateUpdate(i32),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoxelTransmission {
    pub data: Option<VoxelTransmissionBody>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TcpsMsg {
    pub points: Vec<Vertex3d>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TcpsTfMeta {
    pub tcps: Option<TcpsMsg>,
    pub transformation_meta: Option<TransformationMeta>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TcpsTransmissionBody {
    TcpData(TcpsTfMeta),
    StateUpdate(i32),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TcpsTransmission {
    pub data: Option<TcpsTransmissionBody>,
}

/// Arm joint angles in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointsMsg {
    pub theta_1: f64,
    pub theta_2: f64,
    pub theta_3: f64,
    pub theta_4: f64,
    pub theta_5: f64,
    pub theta_6: f64,
    pub theta_7: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SyncJointsMsg {
    pub joints: Option<JointsMsg>,
    /// Seconds since the Unix epoch
    pub utc_timepoint: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncJointsData {
    pub sync_joints: Vec<SyncJointsMsg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncJointsTransmissionBody {
    SyncJointsData(SyncJointsData),
    StateUpdate(i32),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncJointsTransmission {
    pub data: Option<SyncJointsTransmissionBody>,
}

// ============================================================================
// SELECTION / SCENARIO
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScenarioMsg {
    pub scenario: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionMessage {
    pub object_id: String,
    pub pn_id: i32,
    pub assignment: i32,
}

// ============================================================================
// UPLOADS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandDataMsg {
    pub valid: bool,
    pub hand: i32,
    pub tracking_stat: i32,
    pub grip_position: Option<Vertex3d>,
    pub grip_rotation: Option<QuaternionMsg>,
    pub aim_position: Option<Vertex3d>,
    pub aim_rotation: Option<QuaternionMsg>,
    pub hand_key_positions: Vec<Vertex3d>,
    pub hand_key_rotations: Vec<QuaternionMsg>,
    pub hand_key_radii: Vec<f32>,
    pub is_grasped: bool,
    /// Milliseconds since the Unix epoch
    pub utc_time_stamp: i64,
    pub transformation_meta: Option<TransformationMeta>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PclDataMsg {
    pub vertices: Vec<Vertex3d>,
    pub timestamp: f64,
    pub transformation_meta: Option<TransformationMeta>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IcpData {
    pub transform: Option<MatrixMsg>,
    pub transformation_meta: Option<TransformationMeta>,
}

/// Registration result, empty when the server could not align the cloud
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IcpResult {
    pub data: Option<IcpData>,
}
