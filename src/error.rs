use std::time::Duration;

use thiserror::Error;

/// Failures produced while deriving a blurred raster.
///
/// The variants are `Clone` because one derivation can have many awaiters
/// attached to it; every awaiter receives the same error value. Callers treat
/// all of these as "leave the item alone": nothing here is fatal to a scan.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    /// The item exposed no usable background reference. Not a real error:
    /// callers skip the item.
    #[error("no usable background source")]
    MissingSource,

    /// The raster bytes could not be fetched.
    #[error("failed to fetch raster from {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The fetch exceeded the configured deadline.
    #[error("timed out fetching raster from {url} after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The fetched bytes were not a decodable image.
    #[error("failed to decode raster from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Blurring or JPEG encoding failed.
    #[error("failed to encode blurred raster: {reason}")]
    Encode { reason: String },
}
