use std::collections::{BTreeMap, HashMap};

use ego_tree::{NodeId, Tree};
use scraper::Html;

/// One element of the host application's visual tree: tag name, classes,
/// attributes, inline style properties, and the rendered box when the host
/// reports one.
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: HashMap<String, String>,
    pub style: BTreeMap<String, String>,
    pub rect: Option<(u32, u32)>,
}

impl ElementData {
    fn root() -> Self {
        Self {
            tag: "#root".to_string(),
            ..Default::default()
        }
    }

    fn from_scraper(el: &scraper::node::Element) -> Self {
        let mut data = Self {
            tag: el.name().to_string(),
            classes: el.classes().map(str::to_string).collect(),
            attrs: el
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            style: BTreeMap::new(),
            rect: None,
        };
        if let Some(style) = data.attrs.get("style") {
            data.style = parse_inline_style(style);
        }
        // Snapshots carry rendered boxes as data-rect="WxH"
        if let Some(rect) = data.attrs.get("data-rect") {
            data.rect = parse_rect(rect);
        }
        data
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

fn parse_inline_style(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter_map(|decl| decl.split_once(':'))
        .map(|(prop, value)| (prop.trim().to_string(), value.trim().to_string()))
        .filter(|(prop, _)| !prop.is_empty())
        .collect()
}

fn parse_rect(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/// A single attribute condition of a [`Matcher`].
#[derive(Debug, Clone)]
enum AttrRule {
    Present(String),
    Equals(String, String),
    OneOf(String, Vec<String>),
}

impl AttrRule {
    fn matches(&self, el: &ElementData) -> bool {
        match self {
            AttrRule::Present(name) => el.attr(name).is_some(),
            AttrRule::Equals(name, value) => el.attr(name) == Some(value.as_str()),
            AttrRule::OneOf(name, values) => el
                .attr(name)
                .is_some_and(|v| values.iter().any(|want| want == v)),
        }
    }
}

/// Builder-style element predicate over tag name, classes, and attributes.
///
/// The host's markup shapes are undocumented and shift between releases, so
/// matching stays deliberately structural: no positional or sibling rules.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrRule>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn attr_present(mut self, name: &str) -> Self {
        self.attrs.push(AttrRule::Present(name.to_string()));
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs
            .push(AttrRule::Equals(name.to_string(), value.to_string()));
        self
    }

    pub fn attr_in(mut self, name: &str, values: &[&str]) -> Self {
        self.attrs.push(AttrRule::OneOf(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn matches(&self, el: &ElementData) -> bool {
        if let Some(tag) = &self.tag {
            if el.tag != *tag {
                return false;
            }
        }
        self.classes.iter().all(|c| el.has_class(c))
            && self.attrs.iter().all(|rule| rule.matches(el))
    }
}

/// Mutable model of the host application's element tree.
///
/// Parsed once from an HTML snapshot and then mutated in place: the engine
/// writes style properties and classes back onto elements, and the host (or a
/// test) can detach subtrees and change attributes between scans, the way the
/// real application does.
#[derive(Debug)]
pub struct ElementTree {
    tree: Tree<ElementData>,
}

impl ElementTree {
    /// Parse an HTML fragment into an element tree. Non-element nodes (text,
    /// comments) are skipped; their element children are lifted to the nearest
    /// element ancestor.
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_fragment(html);
        let mut tree = Tree::new(ElementData::root());
        let root_id = tree.root().id();

        let mut stack: Vec<(_, NodeId)> = doc
            .tree
            .root()
            .children()
            .rev()
            .map(|child| (child, root_id))
            .collect();

        while let Some((node, parent)) = stack.pop() {
            if let Some(el) = node.value().as_element() {
                // parse_fragment wraps content in a synthetic <html>; keeping
                // wrapper elements is harmless for class/attr matching.
                let id = match tree.get_mut(parent) {
                    Some(mut p) => p.append(ElementData::from_scraper(el)).id(),
                    None => continue,
                };
                for child in node.children().rev() {
                    stack.push((child, id));
                }
            } else {
                for child in node.children().rev() {
                    stack.push((child, parent));
                }
            }
        }

        Self { tree }
    }

    pub fn root(&self) -> NodeId {
        self.tree.root().id()
    }

    pub fn get(&self, id: NodeId) -> Option<&ElementData> {
        self.tree.get(id).map(|node| node.value())
    }

    fn with_el_mut<R>(&mut self, id: NodeId, f: impl FnOnce(&mut ElementData) -> R) -> Option<R> {
        self.tree.get_mut(id).map(|mut node| f(node.value()))
    }

    /// Whether the node is still reachable from the tree root. Detached
    /// subtrees remain allocated but are no longer part of the live tree.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let Some(node) = self.tree.get(id) else {
            return false;
        };
        let root = self.root();
        node.id() == root || node.ancestors().any(|a| a.id() == root)
    }

    /// All descendants of `scope` matching `matcher`, in document order.
    /// `scope` itself is not considered.
    pub fn select(&self, scope: NodeId, matcher: &Matcher) -> Vec<NodeId> {
        let Some(scope) = self.tree.get(scope) else {
            return Vec::new();
        };
        scope
            .descendants()
            .skip(1)
            .filter(|node| matcher.matches(node.value()))
            .map(|node| node.id())
            .collect()
    }

    pub fn select_first(&self, scope: NodeId, matcher: &Matcher) -> Option<NodeId> {
        let scope = self.tree.get(scope)?;
        scope
            .descendants()
            .skip(1)
            .find(|node| matcher.matches(node.value()))
            .map(|node| node.id())
    }

    pub fn has_ancestor_with_class(&self, id: NodeId, class: &str) -> bool {
        self.tree
            .get(id)
            .is_some_and(|node| node.ancestors().any(|a| a.value().has_class(class)))
    }

    /// Detach a subtree from the live tree, as the host does when it removes
    /// an item.
    pub fn detach(&mut self, id: NodeId) {
        if id == self.root() {
            return;
        }
        if let Some(mut node) = self.tree.get_mut(id) {
            node.detach();
        }
    }

    pub fn style(&self, id: NodeId, prop: &str) -> Option<&str> {
        self.get(id)?.style.get(prop).map(String::as_str)
    }

    pub fn set_style(&mut self, id: NodeId, prop: &str, value: &str) {
        self.with_el_mut(id, |el| {
            el.style.insert(prop.to_string(), value.to_string());
        });
    }

    pub fn remove_style(&mut self, id: NodeId, prop: &str) {
        self.with_el_mut(id, |el| {
            el.style.remove(prop);
        });
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        self.with_el_mut(id, |el| {
            if !el.has_class(class) {
                el.classes.push(class.to_string());
            }
        });
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        self.with_el_mut(id, |el| el.classes.retain(|c| c != class));
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.with_el_mut(id, |el| {
            el.attrs.insert(name.to_string(), value.to_string());
        });
    }

    pub fn rect(&self, id: NodeId) -> Option<(u32, u32)> {
        self.get(id)?.rect
    }

    pub fn set_rect(&mut self, id: NodeId, width: u32, height: u32) {
        self.with_el_mut(id, |el| el.rect = Some((width, height)));
    }
}
