use std::{path::Path, process, time::Duration};

use anteprima::{
    application::{error::AppError, render::block_renderer},
    config::{self, Command, RenderArgs, WatchArgs},
    infra::{error::InfraError, telemetry},
    preview::{
        BlockSplitter, PreviewConfig, PreviewEvent, PreviewServices, PreviewSession,
        RenderOrchestrator,
    },
};
use tokio::{io::AsyncWriteExt, sync::mpsc, time::MissedTickBehavior};
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        InfraError::configuration(format!("failed to load configuration: {err}"))
    })?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Render(args) => run_render(settings.preview, args).await,
        Command::Watch(args) => run_watch(settings.preview, args).await,
    }
}

async fn read_document(path: &Path) -> Result<String, AppError> {
    tokio::fs::read_to_string(path).await.map_err(|err| {
        AppError::validation(format!("cannot read `{}`: {err}", path.display()))
    })
}

async fn run_render(preview: PreviewConfig, args: RenderArgs) -> Result<(), AppError> {
    let document = read_document(&args.file).await?;

    let mut orchestrator = RenderOrchestrator::new(
        BlockSplitter::markdown(),
        block_renderer(),
        &preview.cache,
        preview.incremental_threshold_chars(),
    );
    let outcome = orchestrator.render(&document, 1);

    info!(
        file = %args.file.display(),
        blocks_total = outcome.metrics.blocks_total,
        duration_ms = outcome.metrics.duration_ms,
        failed_blocks = outcome.failures.len(),
        "Rendered document"
    );

    match args.output {
        Some(path) => tokio::fs::write(&path, outcome.html.as_bytes()).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(outcome.html.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn run_watch(preview: PreviewConfig, args: WatchArgs) -> Result<(), AppError> {
    if args.poll_ms == 0 {
        return Err(AppError::validation("--poll-ms must be greater than zero"));
    }

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let session = PreviewSession::spawn(preview, PreviewServices::system(), events_tx)?;

    let mut last_seen = read_document(&args.file).await?;
    session.edit(last_seen.clone())?;
    info!(
        file = %args.file.display(),
        output = %args.output.display(),
        poll_ms = args.poll_ms,
        "Watching document"
    );

    let mut poll = tokio::time::interval(Duration::from_millis(args.poll_ms));
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; stopping watch");
                break;
            }
            _ = poll.tick() => {
                match tokio::fs::read_to_string(&args.file).await {
                    Ok(text) if text != last_seen => {
                        debug!(bytes = text.len(), "Document changed");
                        session.edit(text.clone())?;
                        last_seen = text;
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, file = %args.file.display(), "Failed to read document"),
                }
            }
            event = events.recv() => match event {
                Some(PreviewEvent::Rendered(result)) => {
                    tokio::fs::write(&args.output, result.html.as_bytes()).await?;
                    info!(
                        version = result.version,
                        kind = %result.metrics.render_kind,
                        cache_hits = result.metrics.cache_hits,
                        cache_misses = result.metrics.cache_misses,
                        duration_ms = result.metrics.duration_ms,
                        "Preview updated"
                    );
                }
                Some(PreviewEvent::RenderFailures(report)) => {
                    for failure in &report.failures {
                        warn!(
                            version = report.version,
                            block_index = failure.block_index,
                            block = %failure.block_id,
                            error = %failure.message,
                            "Block rendered as raw text"
                        );
                    }
                }
                None => break,
            },
        }
    }

    session.close().await?;
    Ok(())
}
