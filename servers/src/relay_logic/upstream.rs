use crate::relay_logic::config::Config;
use futures_util::{SinkExt, StreamExt};
use lib_relay::aggregate::StateAggregator;
use lib_relay::decoder;
use lib_relay::errors::RelayError;
use lib_relay::session::{self, Negotiation};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_tungstenite::{
    connect_async,
    tungstenite::handshake::client::generate_key,
    tungstenite::protocol::Message as WsMessage,
};

const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// The feed client's supervision loop: negotiate, connect, stream, and on
/// any failure reset the document and retry after the fixed backoff. Runs
/// for the life of the process; the shutdown channel is the only way out.
pub async fn run(
    config: Config,
    aggregator: Arc<StateAggregator>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let http = match reqwest::Client::builder().timeout(NETWORK_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            log::error!("Failed to build negotiation HTTP client: {e}");
            return;
        }
    };

    loop {
        if shutdown.try_recv().is_ok() {
            break;
        }

        match negotiate(&http, &config).await {
            Ok(negotiation) => {
                if let Err(e) = stream_session(&config, &aggregator, negotiation, &mut shutdown).await
                {
                    log::error!("Upstream session ended: {e}");
                } else {
                    // Clean exit only happens on shutdown.
                    break;
                }
            }
            Err(RelayError::NegotiationFailed(reason)) => {
                // Expected whenever no live feed is being served.
                log::warn!("Negotiation failed: {reason}");
            }
            Err(e) => log::error!("Negotiation error: {e}"),
        }

        // Nothing from a torn-down or stale session may leak into the next.
        aggregator.reset();

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = sleep(Duration::from_millis(config.retry_delay_ms)) => {}
        }
    }

    log::info!("Upstream feed client shutting down.");
}

/// Phase one of the handshake: fetch the session cookie and connection
/// token for the configured hub.
async fn negotiate(http: &reqwest::Client, config: &Config) -> Result<Negotiation, RelayError> {
    let url = session::negotiate_url(&config.upstream_url, &config.hub)?;
    log::info!("Negotiating upstream session: {url}");

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| RelayError::Connection(format!("negotiation request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(RelayError::NegotiationFailed(format!(
            "negotiation returned status {}",
            response.status()
        )));
    }

    let cookie = response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response
        .text()
        .await
        .map_err(|e| RelayError::Connection(format!("negotiation body unreadable: {e}")))?;

    session::parse_negotiation(cookie.as_deref(), &body)
}

/// Phase two: open the persistent connection, subscribe, and pump frames
/// into the aggregator until the connection dies or shutdown is signalled.
/// `Ok(())` means shutdown; any connection failure comes back as `Err`.
async fn stream_session(
    config: &Config,
    aggregator: &StateAggregator,
    negotiation: Negotiation,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), RelayError> {
    let url = session::connect_url(&config.upstream_url, &config.hub, &negotiation)?;

    let request = http::Request::builder()
        .method("GET")
        .uri(url.as_str())
        .header("Host", url.host_str().unwrap_or_default())
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .header("User-Agent", session::CLIENT_IDENTIFIER)
        .header("Accept-Encoding", "gzip,identity")
        .header("Cookie", negotiation.cookie.as_str())
        .body(())
        .map_err(|e| RelayError::Connection(format!("connect request invalid: {e}")))?;

    let (ws_stream, _) = connect_async(request)
        .await
        .map_err(|e| RelayError::Connection(format!("connect failed: {e}")))?;
    log::info!("Connected to upstream feed.");

    let (mut write, mut read) = ws_stream.split();

    // A fresh connection starts from a clean document.
    aggregator.reset();

    let subscribe = session::subscribe_message(&config.hub, &config.topics);
    write
        .send(WsMessage::Text(subscribe.into()))
        .await
        .map_err(|e| RelayError::Connection(format!("subscribe send failed: {e}")))?;
    log::debug!("Subscribed to {} topics", config.topics.len());

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Upstream connection closing for shutdown...");
                let _ = write.close().await;
                return Ok(());
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match decoder::decode_frame(text.as_str()) {
                            Ok(fields) => aggregator.apply(fields),
                            // One bad frame is dropped; the session continues.
                            Err(e) => log::warn!("Discarding undecodable frame: {e}"),
                        }
                    }
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(frame))) => {
                        return Err(RelayError::Connection(format!("closed by upstream: {frame:?}")));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(RelayError::Connection(e.to_string()));
                    }
                    None => {
                        return Err(RelayError::Connection("stream ended by remote host".into()));
                    }
                }
            }
        }
    }
}
