//! Benchmarks for the host segmentation pipeline.
//!
//! Run with: `cargo bench -p planeseg`

#![allow(missing_docs, clippy::cast_precision_loss, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use planeseg::prelude::*;

/// A room corner: floor, back wall and a ramp, seen from above.
fn room(width: usize, height: usize) -> Cloud {
    Cloud::from_fn(width, height, |c, r| {
        let x = c as f32 * 0.01;
        let y = r as f32 * 0.01;
        let z = if r < height / 4 {
            3.0 - (height / 4 - r) as f32 * 0.02
        } else if c > width * 2 / 3 {
            3.0 - (x - width as f32 * 0.02 / 3.0) * 0.5
        } else {
            3.0
        };
        Point::new(x, y, z)
    })
    .with_sensor_origin(Point3::new(width as f32 * 0.005, height as f32 * 0.005, 0.0))
}

fn bench_segmentate(c: &mut Criterion) {
    let mut group = c.benchmark_group("Segmentate");
    group.sample_size(20);

    for (width, height) in [(160, 120), (320, 240), (640, 480)] {
        let cloud = room(width, height);
        let label = format!("{width}x{height}");
        group.throughput(Throughput::Elements((width * height) as u64));

        for (name, config) in [
            ("parallel", SegmentationConfig::default().with_search_radius(0.03)),
            (
                "sequential",
                SegmentationConfig::default()
                    .with_search_radius(0.03)
                    .with_parallel(false),
            ),
        ] {
            let mut ctx = Context::new(config);
            let mut planes = Vec::new();
            group.bench_with_input(BenchmarkId::new(name, &label), &cloud, |b, cloud| {
                b.iter(|| PlaneSegmentator::segmentate(black_box(cloud), &mut planes, &mut ctx));
            });
        }
    }

    group.finish();
}

fn bench_stages(c: &mut Criterion) {
    let cloud = room(320, 240);
    let mut ctx = Context::new(SegmentationConfig::default().with_search_radius(0.03));
    let mut normals = Cloud::new();
    let mut regions = Vec::new();
    let mut groups = Vec::new();
    PlaneSegmentator::extract_normals(&cloud, &mut normals, &mut ctx).unwrap();
    PlaneSegmentator::split(&normals, &mut regions, &mut ctx).unwrap();
    PlaneSegmentator::merge(&regions, &mut groups, &mut ctx).unwrap();

    let mut group = c.benchmark_group("Stages 320x240");
    group.bench_function("extract_normals", |b| {
        let mut out = Cloud::new();
        b.iter(|| PlaneSegmentator::extract_normals(black_box(&cloud), &mut out, &mut ctx));
    });
    group.bench_function("split", |b| {
        let mut out = Vec::new();
        b.iter(|| PlaneSegmentator::split(black_box(&normals), &mut out, &mut ctx));
    });
    group.bench_function("merge", |b| {
        let mut out = Vec::new();
        b.iter(|| PlaneSegmentator::merge(black_box(&regions), &mut out, &mut ctx));
    });
    group.bench_function("fit_planes", |b| {
        let mut out = Vec::new();
        b.iter(|| PlaneSegmentator::fit_planes(black_box(&cloud), &groups, &mut out, &mut ctx));
    });
    group.finish();
}

fn bench_organize(c: &mut Criterion) {
    let mut points = room(160, 120).points;
    points.reverse();
    let scattered = Cloud::unorganized(points);
    let organizer = Organizer::default();

    c.bench_function("organize 160x120", |b| {
        let mut out = Cloud::new();
        b.iter(|| organizer.organize(black_box(&scattered), &mut out));
    });
}

criterion_group!(benches, bench_segmentate, bench_stages, bench_organize);
criterion_main!(benches);
