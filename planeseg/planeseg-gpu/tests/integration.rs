//! Integration tests for planeseg-gpu.
//!
//! Tests marked with `#[ignore]` require a GPU and should be run with:
//! ```bash
//! cargo test -p planeseg-gpu -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use approx::assert_relative_eq;
use planeseg_gpu::buffers::{decode_points, encode_points};
use planeseg_gpu::{
    DeviceCloud, DeviceResources, GpuContext, GpuError, estimate_normals_gpu, split_gpu,
};
use planeseg_normals::NormalExtractor;
use planeseg_split::NormalSplitter;
use planeseg_types::{Cloud, Point, Point3, SegError};

/// Two planes meeting at a ridge along the middle column.
fn ridge_cloud(width: usize, height: usize) -> Cloud {
    let mid = width / 2;
    Cloud::from_fn(width, height, |c, r| {
        let x = c as f32 * 0.02;
        let y = r as f32 * 0.02;
        let z = if c < mid {
            2.0 + x * 0.5
        } else {
            2.0 + mid as f32 * 0.01 - (c - mid) as f32 * 0.02 * 0.5
        };
        Point::new(x, y, z)
    })
}

fn with_holes(mut cloud: Cloud) -> Cloud {
    for i in (0..cloud.len()).step_by(37) {
        cloud.points[i] = Point::invalid();
    }
    cloud
}

fn resources() -> DeviceResources {
    DeviceResources::acquire().expect("GPU should be available")
}

// ============================================================================
// Non-GPU tests (always run)
// ============================================================================

#[test]
fn test_gpu_context_availability_check() {
    let _available = GpuContext::is_available();
}

#[test]
fn test_acquire_matches_availability() {
    let acquired = DeviceResources::acquire();
    assert_eq!(acquired.is_ok(), GpuContext::is_available());
    if let Err(e) = acquired {
        assert!(matches!(e, GpuError::NotAvailable));
        assert!(SegError::from(e).is_device());
    }
}

#[test]
fn test_encoding_keeps_grid_order() {
    let cloud = with_holes(ridge_cloud(9, 5));
    let (raw, mask) = encode_points(&cloud.points, Point::is_finite);
    assert_eq!(raw.len(), cloud.len());
    assert_eq!(mask.iter().filter(|&&m| m == 1).count(), cloud.finite_count());

    let back = decode_points(&raw);
    for (a, b) in back.iter().zip(&cloud.points) {
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.z.to_bits(), b.z.to_bits());
    }
}

// ============================================================================
// GPU-required tests (run with --ignored)
// ============================================================================

#[test]
#[ignore = "Requires GPU"]
fn test_upload_download_is_lossless() {
    let res = resources();
    let cloud = with_holes(ridge_cloud(33, 17)).with_sensor_origin(Point3::new(0.1, 0.2, 0.3));
    let device = DeviceCloud::upload(&cloud, &res).unwrap();

    assert_eq!((device.width(), device.height()), (33, 17));
    assert_eq!(device.host_cloud(), &cloud);

    let back = device.download(&res).unwrap();
    assert_eq!(back.points.len(), cloud.points.len());
    for (a, b) in back.points.iter().zip(&cloud.points) {
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());
        assert_eq!(a.z.to_bits(), b.z.to_bits());
        assert_eq!(a.aux.to_bits(), b.aux.to_bits());
    }
    assert_eq!(back.sensor_origin, cloud.sensor_origin);
}

#[test]
#[ignore = "Requires GPU"]
fn test_upload_rejects_bad_shape() {
    let res = resources();
    let mut cloud = ridge_cloud(4, 4);
    cloud.points.pop();
    assert!(matches!(
        DeviceCloud::upload(&cloud, &res),
        Err(SegError::DataShape { .. })
    ));
    assert!(DeviceCloud::upload(&Cloud::new(), &res).is_err());
}

#[test]
#[ignore = "Requires GPU"]
fn test_normals_match_host() {
    let res = resources();
    let cloud = with_holes(ridge_cloud(48, 32));
    let extractor = NormalExtractor::default().with_search_radius(0.05);

    let mut host = Cloud::new();
    extractor.estimate_normals(&cloud, &mut host).unwrap();

    let input = DeviceCloud::upload(&cloud, &res).unwrap();
    let mut output = DeviceCloud::allocate_like(&input, &res).unwrap();
    estimate_normals_gpu(&extractor, &input, &mut output, &res).unwrap();
    output.update_host(&res).unwrap();
    let device = output.host_cloud();

    assert_eq!((device.width, device.height), (host.width, host.height));
    assert_eq!(device.valid_normal_count(), host.valid_normal_count());
    for (d, h) in device.points.iter().zip(&host.points) {
        assert_eq!(d.has_valid_normal(), h.has_valid_normal());
        if h.has_valid_normal() {
            let angle = d.coords().dot(&h.coords()).clamp(-1.0, 1.0).acos();
            assert!(angle < 1e-3, "angle {angle}");
        }
    }
}

#[test]
#[ignore = "Requires GPU"]
fn test_normals_ignore_points_across_depth_step() {
    let res = resources();
    let cloud = Cloud::from_fn(20, 20, |c, r| {
        let z = if c < 10 { 1.0 } else { 5.0 };
        Point::new(c as f32 * 0.1, r as f32 * 0.1, z)
    });
    let extractor = NormalExtractor::default().with_search_radius(0.3);

    let input = DeviceCloud::upload(&cloud, &res).unwrap();
    let mut output = DeviceCloud::allocate_like(&input, &res).unwrap();
    estimate_normals_gpu(&extractor, &input, &mut output, &res).unwrap();
    output.update_host(&res).unwrap();
    let device = output.host_cloud();

    assert_eq!(device.valid_normal_count(), 400);
    for col in [8, 9, 10, 11] {
        let n = &device.points[cloud.index(col, 10)];
        assert!(n.z.abs() > 0.999, "column {col}: {n:?}");
    }
}

#[test]
#[ignore = "Requires GPU"]
fn test_normals_reject_mismatched_output() {
    let res = resources();
    let input = DeviceCloud::upload(&ridge_cloud(8, 8), &res).unwrap();
    let other = DeviceCloud::upload(&ridge_cloud(4, 16), &res).unwrap();
    let mut output = DeviceCloud::allocate_like(&other, &res).unwrap();
    let err = estimate_normals_gpu(&NormalExtractor::default(), &input, &mut output, &res)
        .unwrap_err();
    assert!(matches!(err, SegError::DataShape { .. }));
}

#[test]
#[ignore = "Requires GPU"]
fn test_split_matches_host() {
    let res = resources();
    let cloud = ridge_cloud(64, 40);
    let extractor = NormalExtractor::default().with_search_radius(0.05);
    let mut normals = Cloud::new();
    extractor.estimate_normals(&cloud, &mut normals).unwrap();

    let splitter = NormalSplitter::default();
    let mut host = Vec::new();
    splitter.split(&normals, &mut host).unwrap();

    let device_normals = DeviceCloud::upload(&normals, &res).unwrap();
    let mut device = Vec::new();
    split_gpu(&splitter, &device_normals, &mut device, &res).unwrap();

    assert_eq!(device.len(), host.len());
    for (d, h) in device.iter().zip(&host) {
        assert_eq!(d.rect, h.rect);
        assert_eq!(d.valid_count, h.valid_count);
        assert_relative_eq!(d.normal, h.normal, epsilon = 1e-4);
        // f32 acos near 1 resolves to a few 1e-4 rad.
        assert_relative_eq!(d.dsv, h.dsv, epsilon = 1e-3);
    }
}

#[test]
#[ignore = "Requires GPU"]
fn test_split_all_invalid_is_empty() {
    let res = resources();
    let normals = Cloud::invalid(16, 16).normal_cloud_like();
    let device = DeviceCloud::upload(&normals, &res).unwrap();
    let mut out = vec![];
    split_gpu(&NormalSplitter::default(), &device, &mut out, &res).unwrap();
    assert!(out.is_empty());
}
