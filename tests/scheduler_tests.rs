// Reconciliation loop timing: startup delay, event coalescing, and scroll
// debounce, all under a paused clock.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};
use tokio::time::advance;

use jellyfin_blur::{
    BlurConfig, BlurEngine, ChangeEvent, ElementTree, RasterFetcher, Reconciler,
};

struct NeverFetch;

impl RasterFetcher for NeverFetch {
    fn fetch(&self, _url: &str) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        async { anyhow::bail!("no fetches expected") }.boxed()
    }
}

async fn paused_setup() -> (
    Arc<Mutex<BlurEngine>>,
    mpsc::UnboundedSender<ChangeEvent>,
    tokio::task::JoinHandle<()>,
) {
    let config = BlurConfig::default();
    let engine = Arc::new(Mutex::new(BlurEngine::new(
        ElementTree::parse("<div></div>"),
        Arc::new(NeverFetch),
        config.clone(),
    )));
    let (tx, rx) = mpsc::unbounded_channel();
    let reconciler = Reconciler::new(Arc::clone(&engine), rx, &config);
    let handle = tokio::spawn(reconciler.run());
    // Let the spawned loop reach its first await so its startup sleep is
    // registered before any test advances the paused clock.
    tokio::task::yield_now().await;
    (engine, tx, handle)
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

async fn scans(engine: &Arc<Mutex<BlurEngine>>) -> u64 {
    engine.lock().await.scans_completed()
}

#[tokio::test(start_paused = true)]
async fn test_initial_scan_waits_out_the_startup_delay() {
    let (engine, tx, handle) = paused_setup().await;
    settle().await;
    assert_eq!(scans(&engine).await, 0);

    advance(Duration::from_millis(200)).await;
    settle().await;
    assert_eq!(scans(&engine).await, 1);

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_mutation_burst_coalesces_into_one_scan() {
    let (engine, tx, handle) = paused_setup().await;
    advance(Duration::from_millis(200)).await;
    settle().await;
    assert_eq!(scans(&engine).await, 1);

    for _ in 0..5 {
        tx.send(ChangeEvent::Mutation).unwrap();
        tx.send(ChangeEvent::Attribute).unwrap();
    }
    settle().await;
    // Nothing fires until the frame deadline elapses.
    assert_eq!(scans(&engine).await, 1);

    advance(Duration::from_millis(16)).await;
    settle().await;
    assert_eq!(scans(&engine).await, 2);

    // A fresh burst arms a fresh deadline.
    tx.send(ChangeEvent::Mutation).unwrap();
    settle().await;
    advance(Duration::from_millis(16)).await;
    settle().await;
    assert_eq!(scans(&engine).await, 3);

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_scroll_debounce_fires_after_trailing_quiet_period() {
    let (engine, tx, handle) = paused_setup().await;
    advance(Duration::from_millis(200)).await;
    settle().await;
    assert_eq!(scans(&engine).await, 1);

    tx.send(ChangeEvent::Scroll).unwrap();
    settle().await;
    advance(Duration::from_millis(75)).await;
    settle().await;

    // Another scroll mid-debounce pushes the deadline out again.
    tx.send(ChangeEvent::Scroll).unwrap();
    settle().await;
    advance(Duration::from_millis(75)).await;
    settle().await;
    assert_eq!(scans(&engine).await, 1, "deadline was reset, nothing fires yet");

    advance(Duration::from_millis(75)).await;
    settle().await;
    assert_eq!(scans(&engine).await, 2, "one scan after the quiet period");

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_stops_when_the_notifier_goes_away() {
    let (engine, tx, handle) = paused_setup().await;
    advance(Duration::from_millis(200)).await;
    settle().await;

    tx.send(ChangeEvent::Mutation).unwrap();
    drop(tx);
    advance(Duration::from_millis(16)).await;
    settle().await;

    handle.await.unwrap();
    assert!(scans(&engine).await >= 1);
}