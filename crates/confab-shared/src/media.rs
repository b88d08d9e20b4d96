//! Image attachment pipeline.
//!
//! Produces the two derived artifacts of an image message: a re-encoded
//! full-size JPEG and a small square thumbnail. Pure in-memory processing;
//! uploading the results is the sync layer's job.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::constants::{
    IMAGE_JPEG_QUALITY, MAX_IMAGE_BYTES, THUMBNAIL_JPEG_QUALITY, THUMBNAIL_SIZE,
};
use crate::error::MediaError;

/// The derived artifacts for one source image.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Full-size image, re-encoded as JPEG.
    pub image_jpeg: Vec<u8>,
    /// Thumbnail bounded to [`THUMBNAIL_SIZE`] on both axes, JPEG.
    pub thumbnail_jpeg: Vec<u8>,
}

/// Decode a source image and produce upload-ready artifacts.
///
/// Inputs over [`MAX_IMAGE_BYTES`] are rejected before any decoding work,
/// so callers can rely on the size gate running before any upload.
pub fn prepare_image(image_bytes: &[u8]) -> Result<PreparedImage, MediaError> {
    if image_bytes.len() > MAX_IMAGE_BYTES {
        return Err(MediaError::TooLarge {
            size: image_bytes.len(),
            max: MAX_IMAGE_BYTES,
        });
    }

    let img = image::load_from_memory(image_bytes)?;

    let image_jpeg = encode_jpeg(&img, IMAGE_JPEG_QUALITY)?;
    let thumb = img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE);
    let thumbnail_jpeg = encode_jpeg(&thumb, THUMBNAIL_JPEG_QUALITY)?;

    Ok(PreparedImage {
        image_jpeg,
        thumbnail_jpeg,
    })
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let mut buf = Vec::new();
    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_image(w: u32, h: u32) -> Vec<u8> {
        use image::{ImageBuffer, Rgb};
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(w, h, |x, _| Rgb([(x % 256) as u8, 64, 128]));
        let mut buf = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn produces_both_artifacts() {
        let src = create_test_image(400, 300);
        let prepared = prepare_image(&src).unwrap();
        assert!(!prepared.image_jpeg.is_empty());
        assert!(!prepared.thumbnail_jpeg.is_empty());
    }

    #[test]
    fn thumbnail_is_bounded() {
        let src = create_test_image(800, 600);
        let prepared = prepare_image(&src).unwrap();

        let thumb = image::load_from_memory(&prepared.thumbnail_jpeg).unwrap();
        assert!(thumb.width() <= THUMBNAIL_SIZE);
        assert!(thumb.height() <= THUMBNAIL_SIZE);
    }

    #[test]
    fn oversized_input_rejected_before_decode() {
        // Not a valid image at all; the size gate must fire first.
        let oversized = vec![0u8; MAX_IMAGE_BYTES + 1];
        match prepare_image(&oversized) {
            Err(MediaError::TooLarge { size, max }) => {
                assert_eq!(size, MAX_IMAGE_BYTES + 1);
                assert_eq!(max, MAX_IMAGE_BYTES);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }
}
