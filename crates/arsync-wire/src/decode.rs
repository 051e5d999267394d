//! Wire to engine-space decoding
//!
//! Element decoders take an optional converter: `None` means the stream never
//! declared a frame and the identity field mapping applies (x to x, y to y,
//! z to z, no scaling), which is the same as declaring the engine frame.
//!
//! Composite decoders ending in `_meta` feed the embedded declaration through
//! the stream's [`ConverterCache`] first.

use arsync_core::{
    Aabb, ArError, ArResult, Color, ColoredBox, FrankaJoints, JointSyncPayload, JointsSynced,
    MeshData, ObjectData, ObjectId, ObjectInstance, ObjectPrototype, Obb, PetriNetId, Quat,
    Scenario, SyncPayload, TcpPayload, Transform, Vec3, VisualChange, VoxelData, VoxelPayload,
};
use arsync_transform::{
    decompose_matrix, Axis, AxisAlignment, ConverterCache, Direction, FrameDeclaration, Ratio,
    TransformConverter,
};
use chrono::{DateTime, TimeZone, Utc};

use crate::messages::*;

// ============================================================================
// FRAME DECLARATION
// ============================================================================

fn decode_axis(value: i32) -> ArResult<Axis> {
    match value {
        AXIS_X => Ok(Axis::X),
        AXIS_Y => Ok(Axis::Y),
        AXIS_Z => Ok(Axis::Z),
        other => Err(ArError::UnknownEnumValue {
            kind: "axis",
            value: other,
        }),
    }
}

fn decode_direction(value: i32) -> ArResult<Direction> {
    match value {
        DIRECTION_POSITIVE => Ok(Direction::Positive),
        DIRECTION_NEGATIVE => Ok(Direction::Negative),
        other => Err(ArError::UnknownEnumValue {
            kind: "direction",
            value: other,
        }),
    }
}

fn decode_alignment(
    alignment: Option<&AxisAlignmentMsg>,
    field: &'static str,
) -> ArResult<AxisAlignment> {
    let alignment = alignment.ok_or(ArError::MissingField(field))?;
    Ok(AxisAlignment::new(
        decode_axis(alignment.axis)?,
        decode_direction(alignment.direction)?,
    ))
}

/// Decode and validate a frame declaration
///
/// A missing scale reads as the wire default 0/0 and is rejected.
pub fn decode_frame(meta: &TransformationMeta) -> ArResult<FrameDeclaration> {
    let scale = meta.scale.unwrap_or_default();
    let frame = FrameDeclaration::new(
        decode_alignment(meta.right.as_ref(), "right")?,
        decode_alignment(meta.forward.as_ref(), "forward")?,
        decode_alignment(meta.up.as_ref(), "up")?,
        Ratio::new(scale.num, scale.denom),
    );
    frame.validate()?;
    Ok(frame)
}

/// Feed an optional embedded declaration into the stream cache
pub fn observe_frame(
    cache: &mut ConverterCache,
    meta: Option<&TransformationMeta>,
) -> ArResult<()> {
    match meta {
        Some(meta) => {
            let frame = decode_frame(meta)?;
            cache.observe(Some(&frame))
        }
        None => Ok(()),
    }
}

// ============================================================================
// ELEMENTS
// ============================================================================

pub fn decode_vertex(v: &Vertex3d, cv: Option<&TransformConverter>) -> Vec3 {
    let raw = Vec3::new(f64::from(v.x), f64::from(v.y), f64::from(v.z));
    match cv {
        Some(cv) => cv.convert_point(raw),
        None => raw,
    }
}

/// Missing vector decodes to zero
pub fn decode_vertex_or_zero(v: Option<&Vertex3d>, cv: Option<&TransformConverter>) -> Vec3 {
    v.map(|v| decode_vertex(v, cv)).unwrap_or(Vec3::ZERO)
}

pub fn decode_index(i: &Index3d, cv: Option<&TransformConverter>) -> Vec3 {
    let raw = Vec3::new(f64::from(i.x), f64::from(i.y), f64::from(i.z));
    match cv {
        Some(cv) => cv.convert_index(raw),
        None => raw,
    }
}

/// Sizes are extents and never negative
pub fn decode_size(s: &Size3d, cv: Option<&TransformConverter>) -> Vec3 {
    let raw = Vec3::new(f64::from(s.x), f64::from(s.y), f64::from(s.z));
    match cv {
        Some(cv) => cv.convert_size(raw),
        None => raw.abs(),
    }
}

pub fn decode_quaternion(q: &QuaternionMsg, cv: Option<&TransformConverter>) -> Quat {
    let raw = Quat::new(
        f64::from(q.x),
        f64::from(q.y),
        f64::from(q.z),
        f64::from(q.w),
    );
    match cv {
        Some(cv) => cv.convert_quaternion(raw),
        None => raw,
    }
}

/// Missing quaternion decodes to identity
pub fn decode_quaternion_or_identity(
    q: Option<&QuaternionMsg>,
    cv: Option<&TransformConverter>,
) -> Quat {
    q.map(|q| decode_quaternion(q, cv)).unwrap_or(Quat::IDENTITY)
}

pub fn decode_rotation(r: &Rotation3d, cv: Option<&TransformConverter>) -> Quat {
    let (roll, pitch, yaw) = (f64::from(r.roll), f64::from(r.pitch), f64::from(r.yaw));
    match cv {
        Some(cv) => cv.convert_rotation(roll, pitch, yaw),
        None => Quat::from_euler(roll, pitch, yaw),
    }
}

/// Channels above 255 saturate
pub fn decode_color(c: &ColorMsg) -> Color {
    let channel = |v: u32| u8::try_from(v).unwrap_or(u8::MAX);
    Color::rgba(channel(c.r), channel(c.g), channel(c.b), channel(c.a))
}

/// Missing color decodes to the engine default, opaque red
pub fn decode_color_or_default(c: Option<&ColorMsg>) -> Color {
    c.map(decode_color).unwrap_or_default()
}

/// Validate and decompose a 4x4 row-major matrix
pub fn decode_matrix(m: &MatrixMsg, cv: Option<&TransformConverter>) -> ArResult<Transform> {
    match cv {
        Some(cv) => cv.convert_matrix(m.rows, m.cols, &m.data),
        None => decompose_matrix(m.rows, m.cols, &m.data),
    }
}

/// The wire carries the full diagonal, the engine box is center plus half size
pub fn decode_aabb(a: &AabbMsg, cv: Option<&TransformConverter>) -> Aabb {
    let center = decode_vertex_or_zero(a.translation.as_ref(), cv);
    let diagonal = a
        .diagonal
        .as_ref()
        .map(|d| decode_size(d, cv))
        .unwrap_or(Vec3::ZERO);
    Aabb::from_center_extent(center, diagonal * 0.5)
}

pub fn decode_obb(o: &ObbMsg, cv: Option<&TransformConverter>) -> Obb {
    Obb {
        axis_box: o
            .axis_aligned
            .as_ref()
            .map(|a| decode_aabb(a, cv))
            .unwrap_or_default(),
        rotation: decode_quaternion_or_identity(o.rotation.as_ref(), cv),
    }
}

// ============================================================================
// ASSETS
// ============================================================================

/// Decode a mesh and check its topology
pub fn decode_mesh(m: &MeshDataMsg, cv: Option<&TransformConverter>) -> ArResult<MeshData> {
    let mesh = MeshData {
        name: m.name.clone(),
        vertices: m.vertices.iter().map(|v| decode_vertex(v, cv)).collect(),
        indices: m.indices.clone(),
        normals: m
            .vertex_normals
            .as_ref()
            .map(|n| n.vertices.iter().map(|v| decode_normal(v, cv)).collect())
            .unwrap_or_default(),
        colors: m
            .vertex_colors
            .as_ref()
            .map(|c| c.colors.iter().map(decode_color).collect())
            .unwrap_or_default(),
    };
    mesh.validate()?;
    Ok(mesh)
}

// Normals follow the axes but are not affected by the unit scale
fn decode_normal(v: &Vertex3d, cv: Option<&TransformConverter>) -> Vec3 {
    let raw = Vec3::new(f64::from(v.x), f64::from(v.y), f64::from(v.z));
    match cv {
        Some(cv) => cv.convert_index(raw),
        None => raw,
    }
}

pub fn decode_mesh_meta(m: &MeshDataTfMeta, cache: &mut ConverterCache) -> ArResult<MeshData> {
    observe_frame(cache, m.transformation_meta.as_ref())?;
    let mesh = m.mesh_data.as_ref().ok_or(ArError::MissingField("mesh_data"))?;
    decode_mesh(mesh, cache.converter())
}

pub fn decode_prototype(p: &ObjectPrototypeMsg, cv: Option<&TransformConverter>) -> ObjectPrototype {
    ObjectPrototype {
        name: p.name.clone(),
        mesh_name: p.mesh_name.clone(),
        bounding_box: p
            .bounding_box
            .as_ref()
            .map(|a| decode_aabb(a, cv))
            .unwrap_or_default(),
        mean_color: decode_color_or_default(p.mean_color.as_ref()),
        type_tag: p.type_tag.clone(),
    }
}

pub fn decode_prototype_meta(
    p: &ObjectPrototypeTfMeta,
    cache: &mut ConverterCache,
) -> ArResult<ObjectPrototype> {
    observe_frame(cache, p.transformation_meta.as_ref())?;
    let prototype = p
        .object_prototype
        .as_ref()
        .ok_or(ArError::MissingField("object_prototype"))?;
    Ok(decode_prototype(prototype, cache.converter()))
}

// ============================================================================
// OBJECT INSTANCES
// ============================================================================

pub fn decode_object_data(
    d: &ObjectDataMsg,
    cv: Option<&TransformConverter>,
) -> ArResult<ObjectData> {
    let matrix = d.transform.as_ref().ok_or(ArError::MissingField("transform"))?;
    Ok(ObjectData {
        prototype_name: d.prototype_name.clone(),
        transform: decode_matrix(matrix, cv)?,
    })
}

pub fn decode_colored_box(b: &ColoredBoxMsg, cv: Option<&TransformConverter>) -> ColoredBox {
    ColoredBox {
        obb: b.obbox.as_ref().map(|o| decode_obb(o, cv)).unwrap_or_default(),
        color: decode_color_or_default(b.box_color.as_ref()),
    }
}

/// Decode an instance; an instance without payload is rejected
pub fn decode_object_instance(
    o: &ObjectInstanceMsg,
    cv: Option<&TransformConverter>,
) -> ArResult<ObjectInstance> {
    let id = ObjectId::new(o.id.clone());
    let pn_id = PetriNetId::new(o.pn_id);

    match o.data.as_ref() {
        Some(ObjectInstanceBody::Obj(data)) => Ok(ObjectInstance::Prototype {
            id,
            pn_id,
            data: decode_object_data(data, cv)?,
        }),
        Some(ObjectInstanceBody::Box(data)) => Ok(ObjectInstance::ColoredBox {
            id,
            pn_id,
            data: decode_colored_box(data, cv),
        }),
        None => Err(ArError::MissingField("object_instance.data")),
    }
}

pub fn decode_object_instance_meta(
    o: &ObjectInstanceTfMeta,
    cache: &mut ConverterCache,
) -> ArResult<ObjectInstance> {
    observe_frame(cache, o.transformation_meta.as_ref())?;
    let instance = o
        .object_instance
        .as_ref()
        .ok_or(ArError::MissingField("object_instance"))?;
    decode_object_instance(instance, cache.converter())
}

pub fn decode_delete(d: &DeleteRequest) -> ArResult<ObjectId> {
    if d.id.is_empty() {
        return Err(ArError::MissingField("id"));
    }
    Ok(ObjectId::new(d.id.clone()))
}

// ============================================================================
// ROBOT
// ============================================================================

/// Unknown visibility signals clamp to `Disabled`
pub fn decode_visual_change(value: i32) -> VisualChange {
    VisualChange::from_wire(value).unwrap_or_else(|| {
        tracing::warn!(value, "unknown visibility signal, treating as disabled");
        VisualChange::Disabled
    })
}

pub fn decode_voxels(v: &VoxelsMsg, cv: Option<&TransformConverter>) -> ArResult<VoxelData> {
    let robot_origin = match v.robot_origin.as_ref() {
        Some(m) => decode_matrix(m, cv)?,
        None => Transform::IDENTITY,
    };
    let side = f64::from(v.voxel_side_length);

    Ok(VoxelData {
        indices: v.voxel_indices.iter().map(|i| decode_index(i, cv)).collect(),
        voxel_side_length: cv.map(|cv| cv.convert_scale(side)).unwrap_or(side),
        robot_origin,
    })
}

pub fn decode_voxel_transmission(
    t: &VoxelTransmission,
    cache: &mut ConverterCache,
) -> ArResult<VoxelPayload> {
    match t.data.as_ref() {
        Some(VoxelTransmissionBody::VoxelData(meta)) => {
            observe_frame(cache, meta.transformation_meta.as_ref())?;
            let voxels = meta.voxels.as_ref().ok_or(ArError::MissingField("voxels"))?;
            Ok(SyncPayload::Data(decode_voxels(voxels, cache.converter())?))
        }
        Some(VoxelTransmissionBody::StateUpdate(value)) => {
            Ok(SyncPayload::Visibility(decode_visual_change(*value)))
        }
        None => Err(ArError::MissingField("voxel_transmission.data")),
    }
}

pub fn decode_tcps(t: &TcpsMsg, cv: Option<&TransformConverter>) -> Vec<Vec3> {
    t.points.iter().map(|p| decode_vertex(p, cv)).collect()
}

pub fn decode_tcps_transmission(
    t: &TcpsTransmission,
    cache: &mut ConverterCache,
) -> ArResult<TcpPayload> {
    match t.data.as_ref() {
        Some(TcpsTransmissionBody::TcpData(meta)) => {
            observe_frame(cache, meta.transformation_meta.as_ref())?;
            let tcps = meta.tcps.as_ref().ok_or(ArError::MissingField("tcps"))?;
            Ok(SyncPayload::Data(decode_tcps(tcps, cache.converter())))
        }
        Some(TcpsTransmissionBody::StateUpdate(value)) => {
            Ok(SyncPayload::Visibility(decode_visual_change(*value)))
        }
        None => Err(ArError::MissingField("tcps_transmission.data")),
    }
}

pub fn decode_joints(j: &JointsMsg) -> FrankaJoints {
    FrankaJoints {
        theta: [
            j.theta_1, j.theta_2, j.theta_3, j.theta_4, j.theta_5, j.theta_6, j.theta_7,
        ],
    }
}

/// Fractional seconds since the epoch; out of range values fall back to the epoch
pub fn decode_utc_timepoint(seconds: f64) -> DateTime<Utc> {
    if !seconds.is_finite() {
        return DateTime::<Utc>::default();
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(whole as i64, nanos)
        .single()
        .unwrap_or_default()
}

pub fn decode_sync_joints(s: &SyncJointsMsg) -> JointsSynced {
    JointsSynced {
        joints: s.joints.as_ref().map(decode_joints).unwrap_or_default(),
        time_stamp: decode_utc_timepoint(s.utc_timepoint),
    }
}

pub fn decode_joint_sync_transmission(t: &SyncJointsTransmission) -> ArResult<JointSyncPayload> {
    match t.data.as_ref() {
        Some(SyncJointsTransmissionBody::SyncJointsData(data)) => Ok(SyncPayload::Data(
            data.sync_joints.iter().map(decode_sync_joints).collect(),
        )),
        Some(SyncJointsTransmissionBody::StateUpdate(value)) => {
            Ok(SyncPayload::Visibility(decode_visual_change(*value)))
        }
        None => Err(ArError::MissingField("sync_joints_transmission.data")),
    }
}

// ============================================================================
// SCENARIO / REGISTRATION
// ============================================================================

/// Unknown scenario values fall back to `Mixed`
pub fn decode_scenario(s: &ScenarioMsg) -> Scenario {
    match s.scenario {
        SCENARIO_RESERVE_ONLY => Scenario::ReserveOnly,
        SCENARIO_MIXED => Scenario::Mixed,
        other => {
            tracing::warn!(value = other, "unknown scenario, falling back to mixed");
            Scenario::Mixed
        }
    }
}

/// Registration transform in engine space, `None` when no alignment was found
pub fn decode_icp_result(r: &IcpResult) -> ArResult<Option<Transform>> {
    let Some(data) = r.data.as_ref() else {
        return Ok(None);
    };
    let converter = match data.transformation_meta.as_ref() {
        Some(meta) => Some(TransformConverter::to_engine(decode_frame(meta)?)?),
        None => None,
    };
    let matrix = data.transform.as_ref().ok_or(ArError::MissingField("transform"))?;
    decode_matrix(matrix, converter.as_ref()).map(Some)
}
