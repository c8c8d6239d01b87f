use lensfix_image::{Image, ImageSize};
use lensfix_io::calibration::{
    read_camera_matrix, read_distortion_coefficients, write_camera_matrix,
    write_distortion_coefficients,
};
use lensfix_io::sequence::ImageSequenceWriter;
use lensfix_io::{open_frame_source, FrameSink, IoError};

#[test]
fn directory_as_frame_source() -> Result<(), IoError> {
    let tmp_dir = tempfile::tempdir()?;
    let size = ImageSize {
        width: 24,
        height: 16,
    };

    let mut writer = ImageSequenceWriter::new(tmp_dir.path(), "board")?;
    for i in 0..5u8 {
        writer.write_frame(&Image::from_size_val(size, i * 40)?)?;
    }
    writer.finish()?;

    let mut source = open_frame_source(tmp_dir.path())?;
    assert_eq!(source.frame_size(), size);
    assert_eq!(source.frame_count(), Some(5));

    let mut count = 0;
    while let Some(frame) = source.read_frame()? {
        assert_eq!(frame.size(), size);
        count += 1;
    }
    assert_eq!(count, 5);
    // the source stays exhausted
    assert!(source.read_frame()?.is_none());
    Ok(())
}

#[test]
fn calibration_files_round_trip() -> Result<(), IoError> {
    let tmp_dir = tempfile::tempdir()?;
    let k_path = tmp_dir.path().join("board_camera_matrix.csv");
    let d_path = tmp_dir.path().join("board_distortion_coefficients.csv");

    let k = [[1.0e3 / 3.0, 0.0, 319.5], [0.0, 2.0e3 / 7.0, 239.5], [0.0, 0.0, 1.0]];
    let d = [-0.1 / 3.0, 0.02, -1e-4, 3e-4, 0.0];

    write_camera_matrix(&k_path, &k)?;
    write_distortion_coefficients(&d_path, &d)?;

    assert_eq!(read_camera_matrix(&k_path)?, k);
    assert_eq!(read_distortion_coefficients(&d_path)?, d);
    Ok(())
}
