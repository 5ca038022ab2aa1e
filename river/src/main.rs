use std::error::Error;

use river_core::{BlackholeSink, LogSink, Pipeline, RiverConfig, SequenceSource, Sink};
use tokio::signal;
use tracing::{error, info, warn};

mod cmdline;
mod setup_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let matches = cmdline::root_cli().get_matches();

    let Some((cmdline::RUN_SUBCOMMAND, args)) = matches.subcommand() else {
        return Err("unknown subcommand".into());
    };
    let river_name = args
        .get_one::<String>(cmdline::NAME_ARG)
        .ok_or("missing river name")?;
    let sink = args
        .get_one::<String>(cmdline::SINK_ARG)
        .map(String::as_str)
        .unwrap_or(cmdline::LOG_SINK);

    let config = RiverConfig::load(river_name.as_str(), std::env::vars())?;
    info!(?config, sink, "Starting river");

    match sink {
        cmdline::BLACKHOLE_SINK => run_river(config, BlackholeSink).await?,
        _ => {
            let sink = LogSink::new(config.river_name.clone());
            run_river(config, sink).await?
        }
    }

    match river_core::encode_metrics() {
        Ok(metrics) => info!(%metrics, "Final metrics"),
        Err(e) => warn!(?e, "Failed to encode metrics"),
    }
    Ok(())
}

/// Runs the river until it stops on its own or a shutdown signal arrives, then waits for the
/// batches still in flight.
async fn run_river<K>(config: RiverConfig, sink: K) -> river_core::Result<()>
where
    K: Sink + Sync + 'static,
{
    let source = SequenceSource::new(config.field_name.clone());
    let mut pipeline = Pipeline::new(config, source, sink)?;
    pipeline.start()?;

    let finished = tokio::select! {
        result = pipeline.join() => Some(result),
        _ = shutdown_signal() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            pipeline.close();
            pipeline.join().await
        }
    };

    info!("Waiting for in-flight batches");
    pipeline.wait_drained().await;
    info!(stats = ?pipeline.stats(), "River stopped");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => {
                error!(?e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await
            }
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal");
            }
            Err(e) => {
                error!(?e, "Failed to install terminate signal handler");
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
