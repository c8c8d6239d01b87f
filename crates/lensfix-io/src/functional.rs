use std::path::Path;

use lensfix_image::{Image, ImageSize};

use crate::error::IoError;

/// File extensions accepted as image frames.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

/// Whether the path has one of the [`IMAGE_EXTENSIONS`], ignoring case.
pub fn has_image_extension(file_path: impl AsRef<Path>) -> bool {
    file_path.as_ref().extension().is_some_and(|ext| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|candidate| ext.eq_ignore_ascii_case(candidate))
    })
}

/// Reads an image from the given file path as 8-bit RGB.
///
/// The method reads any image format supported by the image crate and converts the
/// pixels to three channels.
///
/// # Arguments
///
/// * `file_path` - The path to a valid image file.
///
/// # Returns
///
/// An RGB image containing the image data.
pub fn read_image_any_rgb8(file_path: impl AsRef<Path>) -> Result<Image<u8, 3>, IoError> {
    let file_path = file_path.as_ref().to_owned();

    // verify the file exists
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path));
    }

    // TODO: switch to image::ImageReader once the minimum image version allows it
    #[allow(deprecated)]
    let img = image::io::Reader::open(&file_path)?
        .with_guessed_format()?
        .decode()?;

    let size = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };

    Ok(Image::new(size, img.into_rgb8().into_raw())?)
}

/// Writes an RGB image as PNG.
///
/// # Arguments
///
/// * `file_path` - The path to the PNG image.
/// * `image` - The image to write.
pub fn write_image_png_rgb8(
    file_path: impl AsRef<Path>,
    image: &Image<u8, 3>,
) -> Result<(), IoError> {
    let size = image.size();
    image::save_buffer_with_format(
        file_path,
        image.as_slice(),
        size.width as u32,
        size.height as u32,
        image::ExtendedColorType::Rgb8,
        image::ImageFormat::Png,
    )?;
    Ok(())
}
