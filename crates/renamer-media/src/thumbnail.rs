//! Thumbnail normalization.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};

use renamer_models::encoding::{THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH};

use crate::error::{MediaError, MediaResult};

/// Resize an image in place to the fixed upload size and re-save it as RGB JPEG.
///
/// Decoding and encoding run on the blocking pool.
pub async fn normalize_thumbnail(path: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path));
    }

    tokio::task::spawn_blocking(move || -> MediaResult<PathBuf> {
        // Telegram serves thumbnails under arbitrary extensions
        let img = image::io::Reader::open(&path)?
            .with_guessed_format()?
            .decode()?;
        let normalized = normalize_image(img);
        normalized.save_with_format(&path, ImageFormat::Jpeg)?;
        tracing::debug!("Normalized thumbnail {}", path.display());
        Ok(path)
    })
    .await
    .map_err(|e| MediaError::internal(format!("thumbnail task panicked: {}", e)))?
}

fn normalize_image(img: DynamicImage) -> DynamicImage {
    let resized = img.resize_exact(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, FilterType::Triangle);
    DynamicImage::ImageRgb8(resized.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_normalize_png_with_alpha() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thumb.jpg");
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(320, 320, Rgba([10, 20, 30, 128]));
        img.save_with_format(&path, ImageFormat::Png).unwrap();

        let out = normalize_thumbnail(&path).await.unwrap();

        let reopened = image::open(&out).unwrap();
        assert_eq!(reopened.width(), THUMBNAIL_WIDTH);
        assert_eq!(reopened.height(), THUMBNAIL_HEIGHT);
        assert!(matches!(reopened, DynamicImage::ImageRgb8(_)));
    }

    #[tokio::test]
    async fn test_not_an_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thumb.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        assert!(matches!(
            normalize_thumbnail(&path).await,
            Err(MediaError::Image(_))
        ));
    }
}
