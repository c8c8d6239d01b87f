use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lensfix_3d::calibration::{calibrate_camera, CalibrationParams};
use lensfix_3d::synthetic;
use lensfix_image::ImageSize;
use lensfix_imgproc::calibration::{CameraIntrinsic, PolynomialDistortion};
use std::hint::black_box;

fn bench_calibrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("Calibrate");
    group.sample_size(10);

    let intrinsic = CameraIntrinsic {
        fx: 820.0,
        fy: 790.0,
        cx: 330.0,
        cy: 235.0,
    };
    let distortion = PolynomialDistortion {
        k1: -0.25,
        k2: 0.08,
        p1: 0.001,
        p2: -0.0005,
        k3: 0.0,
    };
    let size = ImageSize {
        width: 640,
        height: 480,
    };
    let object = synthetic::grid_points(9, 6, 0.03, 0.03);

    for n_views in [10, 25, 50] {
        let poses = synthetic::orbit_poses(n_views, &[0.12, 0.075, 0.0], 0.6);
        let image_points = poses
            .iter()
            .map(|pose| synthetic::project_view(&object, pose, &intrinsic, &distortion).unwrap())
            .collect::<Vec<_>>();
        let object_points = vec![object.clone(); n_views];

        group.bench_with_input(
            BenchmarkId::new("calibrate_camera", n_views),
            &(object_points, image_points),
            |b, (object_points, image_points)| {
                b.iter(|| {
                    black_box(calibrate_camera(
                        object_points,
                        image_points,
                        size,
                        &CalibrationParams::default(),
                    ))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_calibrate);
criterion_main!(benches);
