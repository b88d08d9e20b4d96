//! Abstraction over content-addressable object storage.

use crate::remote::RemoteError;

/// Blob storage returning retrievable URLs.
///
/// Callers are responsible for size-gating payloads before upload; the
/// attachment pipeline enforces its own cap before ever reaching here.
#[allow(async_fn_in_trait)]
pub trait ObjectStore: Send + Sync + 'static {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, RemoteError>;
}
