// Helpers for getting an `Image` out of the process as a viewable file.

use crate::core_modules::image::Image;
use image::error::{ImageError, LimitError, LimitErrorKind};
use image::{GrayImage, Luma};
use std::path::Path;

fn dimension(value: usize) -> Result<u32, ImageError> {
    u32::try_from(value)
        .map_err(|_| ImageError::Limits(LimitError::from_kind(LimitErrorKind::DimensionError)))
}

/// Converts to an 8-bit grayscale buffer. Values above 255 saturate.
pub fn to_gray_image(picture: &Image) -> Result<GrayImage, ImageError> {
    let width = dimension(picture.width())?;
    let height = dimension(picture.height())?;
    Ok(GrayImage::from_fn(width, height, |x, y| {
        let value = picture.as_raw()[y as usize * picture.width() + x as usize];
        Luma([value.min(255) as u8])
    }))
}

/// Writes `picture` as a grayscale PNG.
pub fn save_png(picture: &Image, path: &Path) -> Result<(), ImageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    to_gray_image(picture)?.save_with_format(path, image::ImageFormat::Png)
}
