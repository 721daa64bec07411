use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tuning knobs for the blur pipeline and the reconciliation loop.
///
/// The defaults match the behavior the engine was built around; everything can
/// be overridden from a JSON file for experimentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    /// Gaussian blur radius applied to thumbnail rasters, in pixels.
    pub blur_px: f32,
    /// CSS blur radius for description text blocks, in pixels.
    pub text_blur_px: f32,
    /// Subtle horizontal stretch applied to the *displayed* sizing of blurred
    /// thumbs. Try 1.01 -> 1.015 -> 1.02.
    pub stretch_x: f64,
    /// Quality factor for the re-encoded JPEG (1-100).
    pub jpeg_quality: u8,
    /// Frame-aligned coalescing interval for mutation-driven scans.
    pub frame_interval_ms: u64,
    /// Trailing quiet period for scroll-driven scans.
    pub scroll_debounce_ms: u64,
    /// Delay before the very first scan, so the initial paint settles.
    pub startup_delay_ms: u64,
    /// Deadline for acquiring a source raster.
    pub fetch_timeout_ms: u64,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            blur_px: 24.0,
            text_blur_px: 6.0,
            stretch_x: 1.01,
            jpeg_quality: 85,
            frame_interval_ms: 16,
            scroll_debounce_ms: 150,
            startup_delay_ms: 200,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl BlurConfig {
    /// Load a config from a JSON file, falling back to defaults for any
    /// missing fields.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {:?}", path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            anyhow::bail!("jpeg_quality must be within 1-100, got {}", self.jpeg_quality);
        }
        if self.stretch_x < 1.0 {
            anyhow::bail!("stretch_x must be >= 1.0, got {}", self.stretch_x);
        }
        if self.blur_px <= 0.0 {
            anyhow::bail!("blur_px must be positive, got {}", self.blur_px);
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Fluent configuration builder for assembling a config in code.
pub struct ConfigBuilder {
    config: BlurConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BlurConfig::default(),
        }
    }

    pub fn blur_px(mut self, px: f32) -> Self {
        self.config.blur_px = px;
        self
    }

    pub fn text_blur_px(mut self, px: f32) -> Self {
        self.config.text_blur_px = px;
        self
    }

    pub fn stretch_x(mut self, ratio: f64) -> Self {
        self.config.stretch_x = ratio;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn frame_interval_ms(mut self, ms: u64) -> Self {
        self.config.frame_interval_ms = ms;
        self
    }

    pub fn scroll_debounce_ms(mut self, ms: u64) -> Self {
        self.config.scroll_debounce_ms = ms;
        self
    }

    pub fn startup_delay_ms(mut self, ms: u64) -> Self {
        self.config.startup_delay_ms = ms;
        self
    }

    pub fn fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.config.fetch_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Result<BlurConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
