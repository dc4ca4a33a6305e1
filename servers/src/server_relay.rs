use anyhow::Result;
use lib_relay::aggregate::StateAggregator;
use lib_relay::dispatcher::Dispatcher;
use std::sync::Arc;
use tokio::signal;

mod relay_logic;
use relay_logic::{broadcast, config, downstream, logger, upstream};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();
    logger::setup_logging(&config.log_dir, &config.log_level)?;
    log::info!(
        "Relay starting: upstream {} hub {}, subscriber port {}",
        config.upstream_url,
        config.hub,
        config.port
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let aggregator = Arc::new(StateAggregator::new(config.debug_mode));
    let dispatcher = Arc::new(Dispatcher::new());

    let upstream_handle = tokio::spawn(upstream::run(
        config.clone(),
        aggregator.clone(),
        shutdown_tx.subscribe(),
    ));

    let broadcast_handle = tokio::spawn(broadcast::run(
        config.clone(),
        aggregator.clone(),
        dispatcher.clone(),
        shutdown_tx.subscribe(),
    ));

    let mut downstream_handle = tokio::spawn(downstream::run(
        config.clone(),
        dispatcher.clone(),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
        // The subscriber endpoint returning early means it could not be
        // served (e.g. the listen port is taken). That is the one fatal
        // condition.
        result = &mut downstream_handle => {
            let _ = shutdown_tx.send(());
            let _ = tokio::try_join!(upstream_handle, broadcast_handle);
            return match result {
                Ok(server_result) => server_result,
                Err(join_err) => Err(anyhow::anyhow!("subscriber endpoint task failed: {join_err}")),
            };
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(upstream_handle, broadcast_handle, downstream_handle);

    log::info!("Shutdown complete.");
    Ok(())
}
