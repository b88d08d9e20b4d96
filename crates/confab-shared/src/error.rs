use thiserror::Error;

/// Errors from the image attachment pipeline.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Image too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}
