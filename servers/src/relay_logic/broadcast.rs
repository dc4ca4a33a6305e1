use crate::relay_logic::config::Config;
use lib_relay::aggregate::StateAggregator;
use lib_relay::dispatcher::Dispatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

/// Payload sent while no session is judged active. Signals "no session"
/// to subscribers without closing their connections.
const IDLE_PAYLOAD: &str = "{}";

/// Fixed-cadence fan-out: every tick, snapshot the aggregated state and
/// hand it to the dispatcher, or the idle payload when the session gate
/// is closed. Serialization happens once per tick regardless of how many
/// subscribers are connected.
pub async fn run(
    config: Config,
    aggregator: Arc<StateAggregator>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut tick = interval(Duration::from_millis(config.broadcast_interval_ms));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Broadcast scheduler received shutdown signal.");
                break;
            }
            _ = tick.tick() => {
                if dispatcher.client_count() == 0 {
                    continue;
                }
                let payload = if aggregator.is_active() {
                    aggregator.snapshot().to_string()
                } else {
                    IDLE_PAYLOAD.to_string()
                };
                dispatcher.broadcast(payload);
            }
        }
    }
}
