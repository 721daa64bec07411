use crate::config::BlurConfig;

/// Class the applier toggles on description blocks of unwatched items.
pub const DESC_BLUR_CLASS: &str = "jb-desc-blur";

/// Host class marking runtime/codec info rows, always excluded from the text
/// blur.
pub const MEDIA_INFO_CLASS: &str = "listItemMediaInfo";

/// CSS the host needs injected once so the description-blur class takes
/// effect. Thumbnails don't appear here: their blur is baked into the derived
/// raster itself.
pub fn stylesheet(config: &BlurConfig) -> String {
    format!(
        ".listItem .{DESC_BLUR_CLASS} {{\n  \
           filter: blur({blur}px);\n  \
           opacity: 0.85;\n  \
           transition: filter 180ms ease, opacity 180ms ease;\n\
         }}\n",
        blur = config.text_blur_px,
    )
}
