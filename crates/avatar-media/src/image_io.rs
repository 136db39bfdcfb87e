//! PNG reading and writing.
//!
//! Decoding and encoding are CPU-bound; the async helpers move them onto
//! the blocking pool.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

use crate::error::{MediaError, MediaResult};

/// Decode an image file as 8-bit RGB.
pub fn load_rgb(path: &Path) -> MediaResult<RgbImage> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    Ok(image::open(path)?.to_rgb8())
}

/// Decode an image file as 8-bit grayscale.
pub fn load_gray(path: &Path) -> MediaResult<GrayImage> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    Ok(image::open(path)?.to_luma8())
}

/// Write an image as PNG (format taken from the `.png` extension).
pub fn save_png(image: &DynamicImage, path: &Path) -> MediaResult<()> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Encode an image to PNG bytes.
pub fn encode_png(image: &DynamicImage) -> MediaResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Decode PNG (or any supported format) bytes.
pub fn decode_image(bytes: &[u8]) -> MediaResult<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// [`load_rgb`] on the blocking pool.
pub async fn load_rgb_async(path: PathBuf) -> MediaResult<RgbImage> {
    tokio::task::spawn_blocking(move || load_rgb(&path)).await?
}

/// [`load_gray`] on the blocking pool.
pub async fn load_gray_async(path: PathBuf) -> MediaResult<GrayImage> {
    tokio::task::spawn_blocking(move || load_gray(&path)).await?
}

/// [`save_png`] on the blocking pool.
pub async fn save_png_async(image: DynamicImage, path: PathBuf) -> MediaResult<PathBuf> {
    tokio::task::spawn_blocking(move || {
        save_png(&image, &path)?;
        Ok(path)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    #[test]
    fn test_png_file_is_lossless() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.png");
        let img = RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8 * 40, y as u8 * 80, 7]));

        save_png(&DynamicImage::ImageRgb8(img.clone()), &path).unwrap();
        assert_eq!(load_rgb(&path).unwrap(), img);
    }

    #[test]
    fn test_png_bytes_decode() {
        let img = GrayImage::from_fn(4, 4, |x, _| image::Luma([x as u8 * 60]));
        let bytes = encode_png(&DynamicImage::ImageLuma8(img.clone())).unwrap();
        assert_eq!(decode_image(&bytes).unwrap().to_luma8(), img);
    }

    #[test]
    fn test_missing_file() {
        let err = load_rgb(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
