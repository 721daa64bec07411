//! Spoiler blur engine for Jellyfin-style episode listings.
//!
//! Watches a host application's element tree, classifies each media item as
//! watched or unwatched from whatever markers the markup happens to carry,
//! and blurs unwatched items' thumbnails and descriptions. Blurred rasters
//! are derived once per source URL and cached; restoring an item brings back
//! its exact pre-blur styling.

pub mod apply;
pub mod blur;
pub mod cache;
pub mod classify;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod style;

pub use apply::{Applier, BlurRequest, ItemState, StyleTriple};
pub use blur::DerivedImage;
pub use cache::{BlurCache, HttpRasterFetcher, RasterFetcher};
pub use classify::{ItemKind, Verdict, is_watched};
pub use config::{BlurConfig, ConfigBuilder};
pub use dom::{ElementTree, Matcher};
pub use engine::{BlurEngine, ScanSummary};
pub use error::TransformError;
pub use scheduler::{ChangeEvent, Reconciler};
