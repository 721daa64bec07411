use std::collections::HashMap;
use std::sync::OnceLock;

use ego_tree::NodeId;
use regex::Regex;
use tracing::debug;

use crate::blur::DerivedImage;
use crate::classify::{self, ItemKind};
use crate::dom::{ElementTree, Matcher};
use crate::style::{DESC_BLUR_CLASS, MEDIA_INFO_CLASS};

/// The background style properties that must survive a blur/restore cycle
/// byte for byte. An empty string records "property was not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleTriple {
    pub size: String,
    pub position: String,
    pub repeat: String,
}

/// Per-item restore data, kept out-of-band instead of on the element itself.
#[derive(Debug, Clone, Default)]
pub struct ItemState {
    /// Source identifier captured before the first transform. Write-once.
    pub original_src: Option<String>,
    /// Style triple captured before the first transform. Write-once.
    pub original_style: Option<StyleTriple>,
    /// Whether the item's visible background currently shows the derived
    /// raster.
    pub transformed: bool,
}

/// A staged transform: everything the resolution pass needs to finish the job
/// once the cache delivers.
#[derive(Debug, Clone)]
pub struct BlurRequest {
    pub item: NodeId,
    pub thumb: NodeId,
    pub source: String,
    pub target: Option<(u32, u32)>,
    pub kind: ItemKind,
}

fn bg_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^url\((.*)\)$").unwrap())
}

/// Pull the source identifier out of an element's background-image style
/// property. Returns `None` for missing, empty, or `none` backgrounds.
pub fn extract_bg_url(tree: &ElementTree, el: NodeId) -> Option<String> {
    let raw = tree.style(el, "background-image")?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return None;
    }
    let caps = bg_url_regex().captures(raw)?;
    let url = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

fn thumb_of(tree: &ElementTree, item: NodeId, kind: ItemKind) -> Option<NodeId> {
    let matcher = match kind {
        ItemKind::EpisodeRow => Matcher::new().class("listItemImage"),
        ItemKind::NextUpCard => Matcher::new()
            .tag("a")
            .class("cardImageContainer")
            .class("cardContent"),
    };
    tree.select_first(item, &matcher)
}

fn overview_blocks(tree: &ElementTree, item: NodeId) -> Vec<NodeId> {
    let mut blocks = tree.select(
        item,
        &Matcher::new()
            .class("secondary")
            .class("listItem-overview")
            .class("listItemBodyText"),
    );
    for block in tree.select(
        item,
        &Matcher::new().class("listItem-bottomoverview").class("secondary"),
    ) {
        if !blocks.contains(&block) {
            blocks.push(block);
        }
    }
    blocks
}

/// Applies and reverses the blur treatment on classified items.
///
/// Owns the side-channel table. One applier per engine; it shares the engine's
/// lifetime, so `NodeId` keys stay valid for as long as the tree they index.
pub struct Applier {
    states: HashMap<NodeId, ItemState>,
    stretch_x: f64,
}

impl Applier {
    pub fn new(stretch_x: f64) -> Self {
        Self {
            states: HashMap::new(),
            stretch_x,
        }
    }

    pub fn state(&self, item: NodeId) -> Option<&ItemState> {
        self.states.get(&item)
    }

    /// The synchronous half of `apply`: classify, restore watched items,
    /// sync the description blur, and stage a transform for unwatched
    /// thumbnails. Idempotent; an already-transformed item stages nothing.
    ///
    /// Original source and style are captured here, before any mutation, and
    /// never overwritten afterwards.
    pub fn apply_sync(
        &mut self,
        tree: &mut ElementTree,
        item: NodeId,
        kind: ItemKind,
    ) -> Option<BlurRequest> {
        let watched = classify::is_watched(tree, item, kind);

        if kind == ItemKind::EpisodeRow {
            sync_text_blur(tree, item, watched);
        }

        let thumb = thumb_of(tree, item, kind)?;

        if watched {
            if let Some(state) = self.states.get_mut(&item) {
                if state.transformed {
                    restore(tree, thumb, state);
                    state.transformed = false;
                }
            }
            return None;
        }

        let state = self.states.entry(item).or_default();
        if state.transformed {
            return None;
        }

        let Some(current) = extract_bg_url(tree, thumb) else {
            debug!(?item, "no usable background source; leaving item alone");
            return None;
        };

        // Write-once: a repeated unwatched pass must not clobber the capture.
        let source = state.original_src.get_or_insert(current).clone();
        if state.original_style.is_none() {
            state.original_style = Some(StyleTriple {
                size: tree.style(thumb, "background-size").unwrap_or_default().to_string(),
                position: tree
                    .style(thumb, "background-position")
                    .unwrap_or_default()
                    .to_string(),
                repeat: tree
                    .style(thumb, "background-repeat")
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        Some(BlurRequest {
            item,
            thumb,
            source,
            target: tree.rect(thumb),
            kind,
        })
    }

    /// The asynchronous half: swap the staged thumbnail to the derived raster.
    ///
    /// Re-checks the item's presence and watched state first: a derivation
    /// that resolved after the item was removed or marked played is dropped
    /// rather than trusted.
    pub fn complete(&mut self, tree: &mut ElementTree, request: &BlurRequest, derived: &DerivedImage) {
        if !tree.is_attached(request.item) {
            debug!(item = ?request.item, "item left the tree before its transform resolved");
            return;
        }
        if classify::is_watched(tree, request.item, request.kind) {
            debug!(item = ?request.item, "item became watched before its transform resolved");
            return;
        }
        let Some(state) = self.states.get_mut(&request.item) else {
            return;
        };

        tree.set_style(
            request.thumb,
            "background-image",
            &format!("url(\"{}\")", derived.data_url),
        );
        // Presentation stretch is display-only; the raster itself is untouched.
        tree.set_style(request.thumb, "background-repeat", "no-repeat");
        tree.set_style(request.thumb, "background-position", "center center");
        tree.set_style(
            request.thumb,
            "background-size",
            &format!("{:.2}% 100%", self.stretch_x * 100.0),
        );
        state.transformed = true;
    }
}

fn sync_text_blur(tree: &mut ElementTree, item: NodeId, watched: bool) {
    for block in overview_blocks(tree, item) {
        let media_info = tree
            .get(block)
            .is_some_and(|el| el.has_class(MEDIA_INFO_CLASS));
        if watched || media_info {
            tree.remove_class(block, DESC_BLUR_CLASS);
        } else {
            tree.add_class(block, DESC_BLUR_CLASS);
        }
    }
}

fn restore(tree: &mut ElementTree, thumb: NodeId, state: &ItemState) {
    if let Some(original) = &state.original_src {
        tree.set_style(thumb, "background-image", &format!("url(\"{original}\")"));
    }
    if let Some(triple) = &state.original_style {
        restore_prop(tree, thumb, "background-size", &triple.size);
        restore_prop(tree, thumb, "background-position", &triple.position);
        restore_prop(tree, thumb, "background-repeat", &triple.repeat);
    }
}

fn restore_prop(tree: &mut ElementTree, thumb: NodeId, prop: &str, value: &str) {
    if value.is_empty() {
        tree.remove_style(thumb, prop);
    } else {
        tree.set_style(thumb, prop, value);
    }
}
