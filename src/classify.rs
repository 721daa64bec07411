use ego_tree::NodeId;

use crate::dom::{ElementTree, Matcher};

/// The kind of media item an element subtree represents. The host renders
/// episode list rows and next-up/summary cards with different markup, and the
/// two kinds read the generic indicators marker differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    EpisodeRow,
    NextUpCard,
}

/// How the generic `.indicators.listItemIndicators` subtree is interpreted
/// for a given item kind.
///
/// Episode rows treat the marker's presence as a positive watched signal (and
/// its absence as unwatched); next-up cards carry the same subtree for other
/// reasons, so there it carries no signal at all. The asymmetry is deliberate
/// and kept explicit here instead of being duplicated per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorPolicy {
    PresenceImpliesWatched,
    Ignored,
}

impl ItemKind {
    pub fn indicator_policy(self) -> IndicatorPolicy {
        match self {
            ItemKind::EpisodeRow => IndicatorPolicy::PresenceImpliesWatched,
            ItemKind::NextUpCard => IndicatorPolicy::Ignored,
        }
    }
}

/// Outcome of a single detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Watched,
    Unwatched,
    NoSignal,
}

/// Marker classes the host applies to already-played items.
const PLAYED_MARKER_CLASSES: [&str; 3] = [
    "playedIndicator",
    "playstatebutton-played",
    "playstatebutton-icon-played",
];

/// Classify one item subtree as watched or unwatched.
///
/// Strategies run in fixed priority order; the first definite verdict wins.
/// Ambiguous markup defaults to unwatched so an unwatched item is never left
/// unblurred by accident.
pub fn is_watched(tree: &ElementTree, item: NodeId, kind: ItemKind) -> bool {
    let strategies: [&dyn Fn() -> Verdict; 3] = [
        &|| play_state_control(tree, item),
        &|| played_marker(tree, item),
        &|| indicators(tree, item, kind.indicator_policy()),
    ];

    for strategy in strategies {
        match strategy() {
            Verdict::Watched => return true,
            Verdict::Unwatched => return false,
            Verdict::NoSignal => continue,
        }
    }

    // Fail safe: no signal at all means treat as unwatched.
    false
}

/// Strategy 1: the tri-state play-state control. When present, its attribute
/// value is authoritative either way and nothing falls through.
fn play_state_control(tree: &ElementTree, item: NodeId) -> Verdict {
    let matcher = Matcher::new()
        .tag("button")
        .class("emby-playstatebutton")
        .attr_present("data-played");
    match tree.select_first(item, &matcher) {
        Some(button) => {
            if tree.get(button).and_then(|el| el.attr("data-played")) == Some("true") {
                Verdict::Watched
            } else {
                Verdict::Unwatched
            }
        }
        None => Verdict::NoSignal,
    }
}

/// Strategy 2: any known "played" marker class implies watched. Absence says
/// nothing.
fn played_marker(tree: &ElementTree, item: NodeId) -> Verdict {
    for class in PLAYED_MARKER_CLASSES {
        if tree.select_first(item, &Matcher::new().class(class)).is_some() {
            return Verdict::Watched;
        }
    }
    Verdict::NoSignal
}

/// Strategy 3: the generic indicators subtree, read through the per-kind
/// policy.
fn indicators(tree: &ElementTree, item: NodeId, policy: IndicatorPolicy) -> Verdict {
    if policy == IndicatorPolicy::Ignored {
        return Verdict::NoSignal;
    }
    let matcher = Matcher::new().class("indicators").class("listItemIndicators");
    if tree.select_first(item, &matcher).is_some() {
        Verdict::Watched
    } else {
        Verdict::Unwatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_item(html: &str) -> (ElementTree, NodeId) {
        let tree = ElementTree::parse(html);
        let item = tree
            .select_first(tree.root(), &Matcher::new().class("item-under-test"))
            .expect("test markup must contain an .item-under-test element");
        (tree, item)
    }

    #[test]
    fn test_play_state_control_is_authoritative() {
        let (tree, item) = single_item(
            r#"<div class="item-under-test">
                 <button class="emby-playstatebutton" data-played="true"></button>
               </div>"#,
        );
        assert!(is_watched(&tree, item, ItemKind::EpisodeRow));
        assert!(is_watched(&tree, item, ItemKind::NextUpCard));
    }

    #[test]
    fn test_play_state_control_false_does_not_fall_through() {
        // A played marker class is also present, but the control outranks it.
        let (tree, item) = single_item(
            r#"<div class="item-under-test">
                 <button class="emby-playstatebutton" data-played="false"></button>
                 <div class="playedIndicator"></div>
               </div>"#,
        );
        assert!(!is_watched(&tree, item, ItemKind::EpisodeRow));
    }

    #[test]
    fn test_played_marker_classes_imply_watched() {
        for class in PLAYED_MARKER_CLASSES {
            let html = format!(
                r#"<div class="item-under-test"><span class="{class}"></span></div>"#
            );
            let (tree, item) = single_item(&html);
            assert!(
                is_watched(&tree, item, ItemKind::NextUpCard),
                "{class} should imply watched"
            );
        }
    }

    #[test]
    fn test_indicator_asymmetry_between_kinds() {
        let (tree, item) = single_item(
            r#"<div class="item-under-test">
                 <div class="indicators listItemIndicators"></div>
               </div>"#,
        );
        assert!(is_watched(&tree, item, ItemKind::EpisodeRow));
        // The same subtree carries no signal on a next-up card, so the card
        // falls through to the unwatched default.
        assert!(!is_watched(&tree, item, ItemKind::NextUpCard));
    }

    #[test]
    fn test_no_signal_defaults_to_unwatched() {
        let (tree, item) = single_item(r#"<div class="item-under-test"><p></p></div>"#);
        assert!(!is_watched(&tree, item, ItemKind::EpisodeRow));
        assert!(!is_watched(&tree, item, ItemKind::NextUpCard));
    }

    #[test]
    fn test_classification_reflects_live_markup() {
        let html = r#"<div class="item-under-test">
                        <button class="emby-playstatebutton" data-played="false"></button>
                      </div>"#;
        let (mut tree, item) = single_item(html);
        assert!(!is_watched(&tree, item, ItemKind::EpisodeRow));

        // User marks the item played; the next call must see it. No caching.
        let button = tree
            .select_first(item, &Matcher::new().class("emby-playstatebutton"))
            .unwrap();
        tree.set_attr(button, "data-played", "true");
        assert!(is_watched(&tree, item, ItemKind::EpisodeRow));
    }
}
