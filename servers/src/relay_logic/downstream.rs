use crate::relay_logic::config::Config;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use futures_util::StreamExt;
use lib_relay::dispatcher::Dispatcher;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

/// Serves the subscriber endpoint. Failure to bind here is the one fatal
/// startup condition, so errors propagate instead of being retried.
pub async fn run(
    config: Config,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(dispatcher);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!("Subscriber endpoint listening on {addr}");

    if let (Some(cert_path), Some(key_path)) = (config.tls_cert_path, config.tls_key_path) {
        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path).await?;
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await.ok();
                log::info!("Subscriber endpoint shutting down.");
            })
            .await?;
    }

    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(dispatcher): State<Arc<Dispatcher>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, dispatcher))
}

async fn health_handler() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "OK")
}

async fn handle_socket(mut socket: WebSocket, dispatcher: Arc<Dispatcher>) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    let mut feed = dispatcher.add_client(client_id);
    log::info!("Subscriber {client_id} connected");

    loop {
        tokio::select! {
            // The protocol is strictly server-push: inbound traffic is
            // drained and ignored until the subscriber goes away.
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            payload = feed.recv() => {
                match payload {
                    Some(payload) => {
                        if socket.send(Message::Text(payload.to_string().into())).await.is_err() {
                            // Subscriber disconnected mid-send.
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    dispatcher.remove_client(client_id);
    log::info!("Subscriber {client_id} disconnected");
}
