use anyhow::{Context, Result};
use generator_tracer::{
    config::Config,
    display::TerminalSink,
    privilege,
    render::{RenderLoop, TickFormat},
    resolver::ProcfsResolver,
    source::{EventSource, SocketSource, TimingObserver},
    store::AggregationStore,
};
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match &config.general.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {:?}", path))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        // stdout belongs to the live table
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = Config::config_path();
    let (config, load_error) = if config_path.exists() {
        match Config::load(&config_path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    } else {
        (Config::default(), None)
    };

    init_logging(&config)?;
    if let Some(e) = load_error {
        warn!("Failed to load config: {}, using defaults", e);
    }

    let socket_path = config
        .source
        .socket_path
        .clone()
        .unwrap_or_else(SocketSource::socket_path);
    let source = SocketSource::open(
        &socket_path,
        config.source.require_elevated,
        privilege::is_elevated(),
    )
    .await
    .with_context(|| format!("starting event source on {:?}", socket_path))?;

    let resolver = Arc::new(ProcfsResolver::new());
    let store = Arc::new(AggregationStore::new(resolver, config.general.placeholder_name.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    println!("Starting Collection. Waiting for data...");

    let render = RenderLoop::new(
        Arc::clone(&store),
        TerminalSink::stdout(),
        Duration::from_millis(config.general.render_interval_ms.max(1)),
        TickFormat::new(config.general.ticks_per_second),
    );
    let render_task = tokio::spawn(render.run(shutdown_rx.clone()));

    let observer: Arc<dyn TimingObserver> = store.clone();
    info!("Subscribing to {} event source", source.name());
    let mut source_task = tokio::spawn(async move { source.run(observer, shutdown_rx).await });

    let source_finished = tokio::select! {
        result = wait_for_signal() => {
            if let Err(e) = result {
                error!("Signal handling failed: {}", e);
            }
            info!("Shutting down");
            false
        }
        result = &mut source_task => {
            match result {
                Ok(Ok(())) => warn!("Event source ended"),
                Ok(Err(e)) => error!("Event source failed: {}", e),
                Err(e) => error!("Event source task failed: {}", e),
            }
            true
        }
    };

    let _ = shutdown_tx.send(true);
    if !source_finished {
        match source_task.await {
            Ok(Err(e)) => error!("Event source failed: {}", e),
            Err(e) => error!("Event source task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }
    if let Err(e) = render_task.await {
        error!("Render task failed: {}", e);
    }

    info!("Collected timings for {} processes", store.process_count());
    Ok(())
}
