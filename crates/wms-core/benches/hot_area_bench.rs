//! Criterion benchmarks for hot-area computation.
//!
//! Hot areas are recomputed for every visible session each time the window
//! info snapshot is rebuilt, so cost scales with session count.
//!
//! Run with:
//! ```bash
//! cargo bench --package wms-core --bench hot_area_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use wms_core::domain::hot_area::compute_hot_areas;
use wms_core::{Rect, ScreenId, SessionEntity, SessionId, SessionInfo, WindowType};

fn make_session(id: i32, custom_areas: usize) -> SessionEntity {
    let mut info = SessionInfo::new(format!("bench-{id}"), WindowType::AppMainWindow, ScreenId(0));
    info.rect = Rect::new(0, 0, 1080, 2340);
    let mut session = SessionEntity::from_info(SessionId(id), &info);
    session.touch_hot_areas = (0..custom_areas)
        .map(|i| Rect::new((i % 7) as i32 * 10, 0, 100, 100))
        .collect();
    session
}

fn bench_default_hot_zone(c: &mut Criterion) {
    let session = make_session(1, 0);
    c.bench_function("default_hot_zone", |b| {
        b.iter(|| compute_hot_areas(black_box(&session), black_box(Some(3.0))))
    });
}

/// Custom areas go through deduplication and truncation.
fn bench_custom_areas_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("custom_hot_areas");
    for &count in &[1usize, 5, 10, 20] {
        let session = make_session(1, count);
        group.bench_with_input(BenchmarkId::new("areas", count), &count, |b, _| {
            b.iter(|| compute_hot_areas(black_box(&session), None))
        });
    }
    group.finish();
}

fn bench_snapshot_of_many_sessions(c: &mut Criterion) {
    let sessions: Vec<SessionEntity> = (1..=64).map(|id| make_session(id, 0)).collect();
    c.bench_function("hot_areas_64_sessions", |b| {
        b.iter(|| {
            sessions
                .iter()
                .map(|s| compute_hot_areas(black_box(s), Some(1.5)))
                .count()
        })
    });
}

criterion_group!(
    benches,
    bench_default_hot_zone,
    bench_custom_areas_scaling,
    bench_snapshot_of_many_sessions,
);
criterion_main!(benches);
