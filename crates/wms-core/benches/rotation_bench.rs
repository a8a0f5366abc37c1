//! Criterion benchmarks for the sensor → display rotation pipeline.
//!
//! The resolver runs these lookups on every sensor sample, so they sit on a
//! hot path.  Building the mapping happens once per natural-orientation
//! change and is measured separately.
//!
//! Run with:
//! ```bash
//! cargo bench --package wms-core --bench rotation_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use wms_core::domain::rotation::calc_device_rotation;
use wms_core::{NaturalOrientation, Orientation, RotationMapping, SensorRotation};

fn bench_build_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("rotation_mapping_build");
    for natural in [NaturalOrientation::Portrait, NaturalOrientation::Landscape] {
        group.bench_with_input(
            BenchmarkId::new("natural", format!("{natural:?}")),
            &natural,
            |b, &natural| b.iter(|| RotationMapping::build(black_box(natural), black_box(90))),
        );
    }
    group.finish();
}

/// Full chain for one sample: sensor → device → display → display orientation.
fn bench_sensor_to_display(c: &mut Criterion) {
    let mapping = RotationMapping::build(NaturalOrientation::Portrait, 0);
    c.bench_function("sensor_to_display_orientation", |b| {
        b.iter(|| {
            let device = mapping.sensor_to_device(black_box(SensorRotation::Deg270));
            mapping
                .device_to_display(device)
                .map(|r| mapping.display_orientation(r))
        })
    });
}

fn bench_calc_device_rotation(c: &mut Criterion) {
    c.bench_function("calc_device_rotation_landscape_offset", |b| {
        b.iter(|| {
            calc_device_rotation(
                black_box(SensorRotation::Deg90),
                black_box(270),
                black_box(NaturalOrientation::Landscape),
            )
        })
    });
}

fn bench_orientation_to_rotation(c: &mut Criterion) {
    let mapping = RotationMapping::build(NaturalOrientation::Landscape, 0);
    c.bench_function("orientation_to_rotation", |b| {
        b.iter(|| mapping.orientation_to_rotation(black_box(Orientation::ReverseVertical)))
    });
}

criterion_group!(
    benches,
    bench_build_mapping,
    bench_sensor_to_display,
    bench_calc_device_rotation,
    bench_orientation_to_rotation,
);
criterion_main!(benches);
