use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use jellyfin_blur::{BlurConfig, BlurEngine, ElementTree, HttpRasterFetcher, classify, style};

/// One-shot mode: load a snapshot of the host's markup, run a single
/// reconciliation pass against live image URLs, and report what would be
/// blurred. Useful for checking selector and classifier behavior against a
/// page saved from a real server.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Jellyfin Blur Tool");
    println!("==================");

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: {} <snapshot.html> [config.json]", args[0]);
        return Ok(());
    }

    let config = match args.get(2) {
        Some(path) => BlurConfig::from_json_file(path)?,
        None => BlurConfig::default(),
    };

    let html = std::fs::read_to_string(&args[1])
        .with_context(|| format!("failed to read snapshot {}", args[1]))?;
    let tree = ElementTree::parse(&html);

    let mut engine = BlurEngine::new(tree, Arc::new(HttpRasterFetcher::new()), config);

    let items = engine.item_groups();
    println!("Found {} media item(s) in snapshot\n", items.len());

    let summary = engine.scan().await;

    for (index, (item, kind)) in items.iter().enumerate() {
        let watched = classify::is_watched(engine.tree(), *item, *kind);
        let transformed = engine
            .item_state(*item)
            .map(|state| state.transformed)
            .unwrap_or(false);

        let outcome = match (watched, transformed) {
            (true, _) => "watched, left as-is",
            (false, true) => "unwatched, thumbnail blurred",
            (false, false) => "unwatched, no transform (missing source or fetch failed)",
        };
        println!("  {} [{:?}] {}", index + 1, kind, outcome);
    }

    println!();
    println!("==================");
    println!(
        "Summary: {} item(s), {} transform(s) staged, {} failed",
        summary.items, summary.staged, summary.failed
    );
    if summary.failed == 0 {
        println!("✓ Scan completed cleanly");
    } else {
        println!("⚠ Some transforms failed; affected items were left unchanged");
    }

    println!(
        "\nInject this CSS for description blur:\n{}",
        style::stylesheet(engine.config())
    );

    Ok(())
}
