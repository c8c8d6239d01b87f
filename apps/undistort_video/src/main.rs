use argh::FromArgs;
use std::path::PathBuf;
use std::time::Instant;

use lensfix::io::VideoCodec;
use lensfix::{undistort_video, CancelToken, UndistortConfig};

#[derive(FromArgs)]
/// Undistort a video with a camera calibrated by calibrate_video
struct Args {
    /// video to undistort, or a directory of frame images
    #[argh(option, short = 'f')]
    file: PathBuf,

    /// frames per second of the written video, defaults to the input frame rate
    #[argh(option)]
    fps: Option<u32>,

    /// camera matrix file
    #[argh(option, short = 'c')]
    camera: PathBuf,

    /// distortion coefficients file
    #[argh(option, short = 'd')]
    distortion: PathBuf,

    /// also write every undistorted frame as a JPEG
    #[argh(switch, short = 'r')]
    raw: bool,

    /// write uncompressed video instead of H.264
    #[argh(switch)]
    uncompressed: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();
    let start = Instant::now();

    let codec = if args.uncompressed {
        VideoCodec::Raw
    } else {
        VideoCodec::H264
    };
    let mut config = UndistortConfig::default()
        .with_codec(codec)
        .with_raw(args.raw);
    if let Some(fps) = args.fps {
        config = config.with_fps(fps);
    }

    // stop on ctrl-c, keeping the frames written so far
    let cancel = CancelToken::new();
    ctrlc::set_handler({
        let cancel = cancel.clone();
        move || {
            log::warn!("Received Ctrl-C signal, stopping after the current frame");
            cancel.cancel();
        }
    })?;

    let summary = undistort_video(&args.file, &args.camera, &args.distortion, &config, &cancel)?;
    if summary.cancelled {
        log::warn!("cancelled after {} frames", summary.frames_written);
    }

    log::info!("Total time: {:.2} s", start.elapsed().as_secs_f64());

    Ok(())
}
