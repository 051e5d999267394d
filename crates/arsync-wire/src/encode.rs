//! Engine-space to wire encoding
//!
//! Outgoing records are written in engine space and carry the engine frame
//! declaration where the record has room for one.

use arsync_core::{
    Aabb, Assignment, Color, ColoredBox, HandIndex, HandSample, MeshData, ObjectId,
    ObjectInstance, ObjectPrototype, Obb, PetriNetId, PointCloud, Quat, TrackingStatus,
    Transform, Vec3,
};
use arsync_transform::{Axis, AxisAlignment, Direction, FrameDeclaration, MATRIX_COLS, MATRIX_ROWS};

use crate::messages::*;

fn encode_alignment(a: AxisAlignment) -> AxisAlignmentMsg {
    AxisAlignmentMsg {
        axis: match a.axis {
            Axis::X => AXIS_X,
            Axis::Y => AXIS_Y,
            Axis::Z => AXIS_Z,
        },
        direction: match a.direction {
            Direction::Positive => DIRECTION_POSITIVE,
            Direction::Negative => DIRECTION_NEGATIVE,
        },
    }
}

pub fn encode_frame(frame: &FrameDeclaration) -> TransformationMeta {
    TransformationMeta {
        right: Some(encode_alignment(frame.right)),
        forward: Some(encode_alignment(frame.forward)),
        up: Some(encode_alignment(frame.up)),
        scale: Some(RatioMsg {
            num: frame.scale.num,
            denom: frame.scale.denom,
        }),
    }
}

/// Declaration of the engine frame
pub fn engine_meta() -> TransformationMeta {
    encode_frame(&FrameDeclaration::ENGINE)
}

pub fn encode_vertex(v: Vec3) -> Vertex3d {
    Vertex3d {
        x: v.x as f32,
        y: v.y as f32,
        z: v.z as f32,
    }
}

pub fn encode_size(s: Vec3) -> Size3d {
    Size3d {
        x: s.x as f32,
        y: s.y as f32,
        z: s.z as f32,
    }
}

/// Quaternions leave normalized
pub fn encode_quaternion(q: Quat) -> QuaternionMsg {
    let q = q.normalize();
    QuaternionMsg {
        x: q.x as f32,
        y: q.y as f32,
        z: q.z as f32,
        w: q.w as f32,
    }
}

pub fn encode_color(c: Color) -> ColorMsg {
    ColorMsg {
        r: u32::from(c.r),
        g: u32::from(c.g),
        b: u32::from(c.b),
        a: u32::from(c.a),
    }
}

/// 4x4 row-major matrix
pub fn encode_transform(t: &Transform) -> MatrixMsg {
    MatrixMsg {
        rows: MATRIX_ROWS,
        cols: MATRIX_COLS,
        data: t.to_row_major().to_vec(),
    }
}

pub fn encode_aabb(a: &Aabb) -> AabbMsg {
    AabbMsg {
        translation: Some(encode_vertex(a.center())),
        diagonal: Some(encode_size(a.extent() * 2.0)),
    }
}

pub fn encode_obb(o: &Obb) -> ObbMsg {
    ObbMsg {
        axis_aligned: Some(encode_aabb(&o.axis_box)),
        rotation: Some(encode_quaternion(o.rotation)),
    }
}

pub fn encode_mesh(m: &MeshData) -> MeshDataMsg {
    MeshDataMsg {
        name: m.name.clone(),
        vertices: m.vertices.iter().copied().map(encode_vertex).collect(),
        indices: m.indices.clone(),
        vertex_normals: (!m.normals.is_empty()).then(|| VertexList {
            vertices: m.normals.iter().copied().map(encode_vertex).collect(),
        }),
        vertex_colors: (!m.colors.is_empty()).then(|| ColorList {
            colors: m.colors.iter().copied().map(encode_color).collect(),
        }),
    }
}

pub fn encode_prototype(p: &ObjectPrototype) -> ObjectPrototypeMsg {
    ObjectPrototypeMsg {
        name: p.name.clone(),
        mean_color: Some(encode_color(p.mean_color)),
        bounding_box: Some(encode_aabb(&p.bounding_box)),
        mesh_name: p.mesh_name.clone(),
        type_tag: p.type_tag.clone(),
    }
}

fn encode_colored_box(b: &ColoredBox) -> ColoredBoxMsg {
    ColoredBoxMsg {
        obbox: Some(encode_obb(&b.obb)),
        box_color: Some(encode_color(b.color)),
    }
}

pub fn encode_object_instance(o: &ObjectInstance) -> ObjectInstanceMsg {
    let data = match o {
        ObjectInstance::Prototype { data, .. } => ObjectInstanceBody::Obj(ObjectDataMsg {
            prototype_name: data.prototype_name.clone(),
            transform: Some(encode_transform(&data.transform)),
        }),
        ObjectInstance::ColoredBox { data, .. } => {
            ObjectInstanceBody::Box(encode_colored_box(data))
        }
    };
    ObjectInstanceMsg {
        id: o.id().to_string(),
        pn_id: o.pn_id().0,
        data: Some(data),
    }
}

pub fn encode_assignment(assignment: Assignment) -> i32 {
    match assignment {
        Assignment::Robot => ASSIGNMENT_ROBOT,
        Assignment::Human => ASSIGNMENT_HUMAN,
        Assignment::Unassigned => ASSIGNMENT_UNASSIGNED,
    }
}

/// Unknown assignment values read as unassigned
pub fn decode_assignment(value: i32) -> Assignment {
    match value {
        ASSIGNMENT_ROBOT => Assignment::Robot,
        ASSIGNMENT_HUMAN => Assignment::Human,
        _ => Assignment::Unassigned,
    }
}

pub fn encode_selection(id: &ObjectId, pn_id: PetriNetId, assignment: Assignment) -> SelectionMessage {
    SelectionMessage {
        object_id: id.to_string(),
        pn_id: pn_id.0,
        assignment: encode_assignment(assignment),
    }
}

fn encode_hand(hand: HandIndex) -> i32 {
    hand as i32
}

fn encode_tracking_status(status: TrackingStatus) -> i32 {
    status as i32
}

/// Hand sample, already in the frame the server expects
pub fn encode_hand_sample(sample: &HandSample) -> HandDataMsg {
    HandDataMsg {
        valid: sample.valid,
        hand: encode_hand(sample.hand),
        tracking_stat: encode_tracking_status(sample.tracking_status),
        grip_position: Some(encode_vertex(sample.grip.translation)),
        grip_rotation: Some(encode_quaternion(sample.grip.rotation)),
        aim_position: Some(encode_vertex(sample.aim.translation)),
        aim_rotation: Some(encode_quaternion(sample.aim.rotation)),
        hand_key_positions: sample.key_positions.iter().copied().map(encode_vertex).collect(),
        hand_key_rotations: sample
            .key_rotations
            .iter()
            .copied()
            .map(encode_quaternion)
            .collect(),
        hand_key_radii: sample.key_radii.iter().map(|r| *r as f32).collect(),
        is_grasped: sample.is_grasped,
        utc_time_stamp: sample.time_stamp.timestamp_millis(),
        transformation_meta: Some(engine_meta()),
    }
}

/// Point cloud upload; non-finite points are dropped
pub fn encode_point_cloud(cloud: &PointCloud) -> PclDataMsg {
    PclDataMsg {
        vertices: cloud
            .points
            .iter()
            .copied()
            .filter(|p| p.is_finite())
            .map(encode_vertex)
            .collect(),
        timestamp: cloud.timestamp,
        transformation_meta: Some(engine_meta()),
    }
}
