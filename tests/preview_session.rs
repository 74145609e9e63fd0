use std::sync::Arc;
use std::time::Duration;

use anteprima::application::render::ComrakBlockRenderer;
use anteprima::infra::scheduler::TokioScheduler;
use anteprima::preview::{
    BlockSplitter, FixedLoad, LoadCategory, PreviewConfig, PreviewError, PreviewEvent,
    PreviewHandle, PreviewServices, PreviewSession, RenderResult,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;

fn fast_config() -> PreviewConfig {
    let mut config = PreviewConfig::default();
    config.debounce.base_delay_small_ms = 20;
    config.debounce.base_delay_medium_ms = 30;
    config.debounce.base_delay_large_ms = 40;
    config.debounce.min_delay_ms = 5;
    config
}

fn spawn_session() -> (PreviewHandle, UnboundedReceiver<PreviewEvent>) {
    let services = PreviewServices {
        renderer: Arc::new(ComrakBlockRenderer::new()),
        load: Arc::new(FixedLoad::category(LoadCategory::Low)),
        scheduler: Arc::new(TokioScheduler::current()),
        splitter: BlockSplitter::markdown(),
    };
    let (events_tx, events) = mpsc::unbounded_channel();
    let handle =
        PreviewSession::spawn(fast_config(), services, events_tx).expect("session should spawn");
    (handle, events)
}

/// Collect rendered results until the session has been quiet for a while.
async fn settle(events: &mut UnboundedReceiver<PreviewEvent>) -> Vec<RenderResult> {
    let mut results = Vec::new();
    loop {
        match timeout(Duration::from_millis(400), events.recv()).await {
            Ok(Some(PreviewEvent::Rendered(result))) => results.push(result),
            Ok(Some(PreviewEvent::RenderFailures(_))) => {}
            Ok(None) | Err(_) => return results,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_of_edits_ends_on_latest_version() {
    let (handle, mut events) = spawn_session();

    let mut text = String::from("# Notes\n\n");
    for word in ["alpha", "beta", "gamma", "delta", "epsilon"] {
        text.push_str(word);
        text.push(' ');
        handle.edit(text.clone()).expect("edit accepted");
    }

    let results = settle(&mut events).await;
    let last = results.last().expect("at least one render applied");

    assert_eq!(last.version, 5);
    assert!(last.html.contains("<h1>Notes</h1>"));
    assert!(last.html.contains("epsilon"));
    assert!(
        results.windows(2).all(|pair| pair[0].version < pair[1].version),
        "results applied out of order: {:?}",
        results.iter().map(|r| r.version).collect::<Vec<_>>()
    );

    handle.close().await.expect("session closes");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unchanged_blocks_are_served_from_cache_after_edit() {
    let (handle, mut events) = spawn_session();

    handle
        .edit("first paragraph\n\nsecond paragraph")
        .expect("edit accepted");
    let first = settle(&mut events).await;
    assert_eq!(first.last().map(|r| r.version), Some(1));

    handle.move_cursor(3).expect("cursor accepted");
    handle
        .edit("first paragraph\n\nsecond paragraph, revised")
        .expect("edit accepted");
    let second = settle(&mut events).await;
    let last = second.last().expect("render applied");

    assert_eq!(last.version, 2);
    assert_eq!(last.metrics.blocks_total, 2);
    assert!(last.html.contains("revised"));

    handle.close().await.expect("session closes");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replacing_document_renders_new_text() {
    let (handle, mut events) = spawn_session();

    handle.edit("old document").expect("edit accepted");
    settle(&mut events).await;

    handle
        .replace_document("*new* document")
        .expect("replace accepted");
    let results = settle(&mut events).await;
    let last = results.last().expect("render applied");

    assert_eq!(last.version, 2);
    assert!(last.html.contains("<em>new</em>"));
    assert_eq!(last.metrics.cache_hits, 0);

    handle.close().await.expect("session closes");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handle_errors_once_session_is_closed() {
    let (handle, _events) = spawn_session();
    let other = handle.clone();

    handle.close().await.expect("session closes");

    assert!(matches!(other.edit("late"), Err(PreviewError::SessionClosed)));
    assert!(matches!(
        other.close().await,
        Err(PreviewError::SessionClosed)
    ));
}
