//! Benchmarks for frame conversion

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arsync_core::{Quat, Transform, Vec3};
use arsync_transform::{Axis, AxisAlignment, FrameDeclaration, Ratio, TransformConverter};

/// Right-handed Y-up frame in millimetres
fn y_up_millimetres() -> FrameDeclaration {
    FrameDeclaration::new(
        AxisAlignment::positive(Axis::X),
        AxisAlignment::negative(Axis::Z),
        AxisAlignment::positive(Axis::Y),
        Ratio::new(1, 1000),
    )
}

fn bench_convert_point(c: &mut Criterion) {
    let converter = TransformConverter::to_engine(y_up_millimetres()).unwrap();
    let p = Vec3::new(120.0, -40.0, 880.0);

    c.bench_function("convert_point", |b| {
        b.iter(|| black_box(converter.convert_point(black_box(p))))
    });
}

fn bench_convert_quaternion(c: &mut Criterion) {
    let converter = TransformConverter::to_engine(y_up_millimetres()).unwrap();
    let q = Quat::from_euler(0.3, -0.2, 1.1);

    c.bench_function("convert_quaternion", |b| {
        b.iter(|| black_box(converter.convert_quaternion(black_box(q))))
    });
}

fn bench_convert_matrix(c: &mut Criterion) {
    let converter = TransformConverter::to_engine(y_up_millimetres()).unwrap();
    let data = Transform::new(
        Vec3::new(10.0, 20.0, 30.0),
        Quat::from_euler(0.1, 0.2, 0.3),
        Vec3::new(1.0, 2.0, 1.0),
    )
    .to_row_major();

    c.bench_function("convert_matrix", |b| {
        b.iter(|| black_box(converter.convert_matrix(4, 4, black_box(&data))))
    });
}

fn bench_convert_mesh_vertices(c: &mut Criterion) {
    let converter = TransformConverter::to_engine(y_up_millimetres()).unwrap();
    let vertices: Vec<Vec3> = (0..10_000)
        .map(|i| Vec3::new(i as f64, (i * 3) as f64, (i * 7) as f64))
        .collect();

    c.bench_function("convert_mesh_10k_vertices", |b| {
        b.iter(|| {
            let converted: Vec<Vec3> = vertices
                .iter()
                .map(|v| converter.convert_point(*v))
                .collect();
            black_box(converted)
        })
    });
}

criterion_group!(
    benches,
    bench_convert_point,
    bench_convert_quaternion,
    bench_convert_matrix,
    bench_convert_mesh_vertices,
);
criterion_main!(benches);
