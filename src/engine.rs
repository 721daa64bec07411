use std::sync::Arc;

use ego_tree::NodeId;
use futures::future::join_all;
use tracing::warn;

use crate::apply::{Applier, ItemState};
use crate::cache::{BlurCache, RasterFetcher};
use crate::classify::ItemKind;
use crate::config::BlurConfig;
use crate::dom::{ElementTree, Matcher};
use crate::error::TransformError;

/// Outcome counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Items matched across all groups.
    pub items: usize,
    /// Transforms staged for unwatched thumbnails.
    pub staged: usize,
    /// Transforms that failed; their items were left unchanged.
    pub failed: usize,
}

/// Ties the tree, classifier, cache, and applier together and runs whole
/// scans over the currently known item groups.
pub struct BlurEngine {
    tree: ElementTree,
    cache: BlurCache,
    applier: Applier,
    config: BlurConfig,
    scans_completed: u64,
}

impl BlurEngine {
    pub fn new(tree: ElementTree, fetcher: Arc<dyn RasterFetcher>, config: BlurConfig) -> Self {
        Self {
            tree,
            cache: BlurCache::new(fetcher, &config),
            applier: Applier::new(config.stretch_x),
            config,
            scans_completed: 0,
        }
    }

    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    /// The host mutates the tree between scans through this.
    pub fn tree_mut(&mut self) -> &mut ElementTree {
        &mut self.tree
    }

    pub fn cache(&self) -> &BlurCache {
        &self.cache
    }

    pub fn config(&self) -> &BlurConfig {
        &self.config
    }

    pub fn item_state(&self, item: NodeId) -> Option<&ItemState> {
        self.applier.state(item)
    }

    pub fn scans_completed(&self) -> u64 {
        self.scans_completed
    }

    /// All currently known items, per group, in document order: episode list
    /// rows first, then next-up cards.
    pub fn item_groups(&self) -> Vec<(NodeId, ItemKind)> {
        let root = self.tree.root();
        let mut items = Vec::new();

        let rows = Matcher::new().class("listItem").attr("data-type", "Episode");
        for id in self.tree.select(root, &rows) {
            items.push((id, ItemKind::EpisodeRow));
        }

        let cards = Matcher::new()
            .class("card")
            .attr_in("data-type", &["Episode", "Video"]);
        for id in self.tree.select(root, &cards) {
            if self.tree.has_ancestor_with_class(id, "nextUpSection") {
                items.push((id, ItemKind::NextUpCard));
            }
        }

        items
    }

    /// One reconciliation pass: classify and restore synchronously in
    /// document order, then resolve the staged transforms. A failure on one
    /// item never stops the rest of the scan.
    pub async fn scan(&mut self) -> ScanSummary {
        let items = self.item_groups();

        let mut staged = Vec::new();
        for (item, kind) in &items {
            if let Some(request) = self.applier.apply_sync(&mut self.tree, *item, *kind) {
                staged.push(request);
            }
        }

        // The cache deduplicates shared sources across these.
        let results = join_all(
            staged
                .iter()
                .map(|req| self.cache.ensure_transformed(&req.source, req.target)),
        )
        .await;

        let mut failed = 0;
        for (request, result) in staged.iter().zip(results) {
            match result {
                Ok(derived) => self.applier.complete(&mut self.tree, request, &derived),
                Err(TransformError::MissingSource) => {}
                Err(e) => {
                    failed += 1;
                    warn!(source = %request.source, error = %e, "transform failed; item left unchanged");
                }
            }
        }

        self.scans_completed += 1;
        ScanSummary {
            items: items.len(),
            staged: staged.len(),
            failed,
        }
    }
}
