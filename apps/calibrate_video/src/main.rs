use argh::FromArgs;
use std::path::PathBuf;
use std::time::Instant;

use lensfix::{
    calibrate_video, CalibrationError, CalibrationRun, CancelToken, CollectorConfig, GridSpec,
};

#[derive(FromArgs)]
/// Calibrate a camera from a video of a checkerboard
struct Args {
    /// calibration video, or a directory of frame images
    #[argh(option, short = 'f')]
    file: PathBuf,

    /// frames per second of the video
    #[argh(option)]
    fps: u32,

    /// internal intersections along a row of the checkerboard
    #[argh(option, default = "9")]
    rows: usize,

    /// internal intersections along a column of the checkerboard
    #[argh(option, default = "6")]
    columns: usize,

    /// width of a checkerboard square
    #[argh(option, default = "1.0")]
    grid_width: f64,

    /// height of a checkerboard square
    #[argh(option, default = "1.0")]
    grid_height: f64,

    /// write every frame with detected corners as a JPEG
    #[argh(switch)]
    save_corners: bool,

    /// maximum number of images used for calibration
    #[argh(option, default = "100")]
    max_images: usize,

    /// seed of the random image selection
    #[argh(option)]
    seed: Option<u64>,

    /// write a JSON report next to the calibration files
    #[argh(switch)]
    report: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();
    let start = Instant::now();

    if args.fps == 0 {
        return Err(CalibrationError::InvalidConfig("fps must be at least 1".to_string()).into());
    }

    let grid = GridSpec::new(args.rows, args.columns, args.grid_width, args.grid_height)?;

    let mut collector = CollectorConfig::default().with_max_kept(args.max_images);
    if let Some(seed) = args.seed {
        collector = collector.with_seed(seed);
    }

    let run = CalibrationRun::default()
        .with_grid(grid)
        .with_collector(collector)
        .with_save_corners(args.save_corners)
        .with_report(args.report);

    log::info!("Frame rate = {} frames per sec", args.fps);

    // stop reading frames on ctrl-c and calibrate with what was found so far
    let cancel = CancelToken::new();
    ctrlc::set_handler({
        let cancel = cancel.clone();
        move || {
            log::warn!("Received Ctrl-C signal, stopping after the current frame");
            cancel.cancel();
        }
    })?;

    let summary = calibrate_video(&args.file, &run, &cancel)?;

    println!("Camera matrix:");
    for row in summary.camera_matrix() {
        println!("{:.6} {:.6} {:.6}", row[0], row[1], row[2]);
    }
    println!("Distortion coefficients:");
    let d = summary.distortion_coefficients();
    println!("{:.6} {:.6} {:.6} {:.6} {:.6}", d[0], d[1], d[2], d[3], d[4]);
    println!(
        "RMS reprojection error: {:.4} px ({} views, {})",
        summary.result.rms_error, summary.views_used, summary.result.termination
    );

    log::info!("Total time: {:.2} s", start.elapsed().as_secs_f64());

    Ok(())
}
