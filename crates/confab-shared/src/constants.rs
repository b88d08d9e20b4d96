/// Maximum accepted source image size in bytes (10 MiB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// JPEG quality for the re-encoded full-size image.
pub const IMAGE_JPEG_QUALITY: u8 = 85;

/// JPEG quality for thumbnails.
pub const THUMBNAIL_JPEG_QUALITY: u8 = 70;

/// Thumbnail bounding box (square), in pixels.
pub const THUMBNAIL_SIZE: u32 = 200;

/// Random bytes per invite code (encodes to 12 base64url characters).
pub const INVITE_CODE_BYTES: usize = 9;

/// Attempts to mint a collision-free invite code before giving up.
pub const INVITE_CODE_ATTEMPTS: u32 = 5;

/// Attempts for the reaction read-merge-write loop before reporting a conflict.
pub const REACTION_MERGE_ATTEMPTS: u32 = 5;

/// Default page size when listing messages from the local cache.
pub const DEFAULT_MESSAGE_PAGE: u32 = 50;
