use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, warn};

use crate::blur::{self, DerivedImage};
use crate::config::BlurConfig;
use crate::error::TransformError;

/// Acquires raw raster bytes for a source identifier.
///
/// The returned future owns everything it needs so late awaiters can outlive
/// the caller that issued the request.
pub trait RasterFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'static, anyhow::Result<Vec<u8>>>;
}

/// HTTP fetcher used against a live host.
#[derive(Debug, Clone, Default)]
pub struct HttpRasterFetcher {
    client: reqwest::Client,
}

impl HttpRasterFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RasterFetcher for HttpRasterFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            let response = client
                .get(&url)
                .header("User-Agent", "Mozilla/5.0")
                .send()
                .await
                .context("failed to fetch raster")?;
            if !response.status().is_success() {
                anyhow::bail!("HTTP error: {}", response.status());
            }
            Ok(response.bytes().await?.to_vec())
        }
        .boxed()
    }
}

type SharedDerivation = Shared<BoxFuture<'static, Result<Arc<DerivedImage>, TransformError>>>;

/// One cache slot: either the in-flight derivation every concurrent requester
/// attaches to, or the finished raster.
enum Entry {
    Pending(SharedDerivation),
    Ready(Arc<DerivedImage>),
}

/// Memoizes blurred rasters per source identifier.
///
/// Constructed once per engine and never reset. The map is the only shared
/// mutable state in the system; the lock is never held across an await. The
/// first requester for a key becomes its sole producer: it installs the
/// pending entry, and the tail of its own derivation future promotes the
/// entry on success or evicts it on failure, so a failed source is retried
/// from scratch by the next scan instead of being poisoned.
pub struct BlurCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    fetcher: Arc<dyn RasterFetcher>,
    blur_px: f32,
    jpeg_quality: u8,
    fetch_timeout: Duration,
}

fn lock(entries: &Mutex<HashMap<String, Entry>>) -> MutexGuard<'_, HashMap<String, Entry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BlurCache {
    pub fn new(fetcher: Arc<dyn RasterFetcher>, config: &BlurConfig) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            fetcher,
            blur_px: config.blur_px,
            jpeg_quality: config.jpeg_quality,
            fetch_timeout: config.fetch_timeout(),
        }
    }

    /// Return the blurred raster for `source_id`, deriving it at most once.
    ///
    /// Resolved entries return without suspending. Concurrent calls for the
    /// same source share one underlying acquisition. `requested` is the
    /// rendered box of the element asking for the transform; the first
    /// requester's box decides the raster size for everyone sharing the
    /// source.
    pub async fn ensure_transformed(
        &self,
        source_id: &str,
        requested: Option<(u32, u32)>,
    ) -> Result<Arc<DerivedImage>, TransformError> {
        if source_id.is_empty() {
            return Err(TransformError::MissingSource);
        }

        let shared = {
            let mut entries = lock(&self.entries);
            match entries.get(source_id) {
                Some(Entry::Ready(img)) => return Ok(Arc::clone(img)),
                Some(Entry::Pending(fut)) => fut.clone(),
                None => {
                    let fut = self.derivation(source_id.to_string(), requested);
                    entries.insert(source_id.to_string(), Entry::Pending(fut.clone()));
                    fut
                }
            }
        };

        shared.await
    }

    /// Synchronous lookup of an already-derived raster.
    pub fn lookup_ready(&self, source_id: &str) -> Option<Arc<DerivedImage>> {
        match lock(&self.entries).get(source_id) {
            Some(Entry::Ready(img)) => Some(Arc::clone(img)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    fn derivation(&self, url: String, requested: Option<(u32, u32)>) -> SharedDerivation {
        let entries = Arc::clone(&self.entries);
        let fetcher = Arc::clone(&self.fetcher);
        let blur_px = self.blur_px;
        let quality = self.jpeg_quality;
        let timeout = self.fetch_timeout;

        async move {
            let result =
                run_derivation(fetcher, &url, requested, blur_px, quality, timeout).await;

            // Sole producer for this key: settle the slot exactly once.
            let mut entries = lock(&entries);
            match &result {
                Ok(img) => {
                    debug!(url = %url, width = img.width, height = img.height, "blur derivation done");
                    entries.insert(url.clone(), Entry::Ready(Arc::clone(img)));
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "blur derivation failed; evicting entry");
                    entries.remove(&url);
                }
            }
            result
        }
        .boxed()
        .shared()
    }
}

async fn run_derivation(
    fetcher: Arc<dyn RasterFetcher>,
    url: &str,
    requested: Option<(u32, u32)>,
    blur_px: f32,
    quality: u8,
    fetch_timeout: Duration,
) -> Result<Arc<DerivedImage>, TransformError> {
    debug!(url = %url, "starting blur derivation");

    let bytes = match tokio::time::timeout(fetch_timeout, fetcher.fetch(url)).await {
        Err(_) => {
            return Err(TransformError::Timeout {
                url: url.to_string(),
                timeout: fetch_timeout,
            });
        }
        Ok(Err(e)) => {
            return Err(TransformError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(Ok(bytes)) => bytes,
    };

    // Pixel work happens off the async executor.
    let owned_url = url.to_string();
    let derived = tokio::task::spawn_blocking(move || {
        blur::derive_blurred(&bytes, &owned_url, requested, blur_px, quality)
    })
    .await
    .map_err(|e| TransformError::Encode {
        reason: format!("blur worker failed: {e}"),
    })??;

    Ok(Arc::new(derived))
}
