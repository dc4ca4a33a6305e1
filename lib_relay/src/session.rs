//! Pure pieces of the upstream handshake: negotiation-response parsing,
//! endpoint derivation and the subscribe control message. Kept free of I/O
//! so the two-phase handshake can be unit tested; the feed client in the
//! server binary does the actual network work.

use serde_json::{json, Value};
use url::Url;

use crate::errors::RelayError;

/// Protocol version sent on both handshake phases.
pub const CLIENT_PROTOCOL: &str = "1.5";

/// Transport requested on the connect phase.
pub const TRANSPORT: &str = "webSockets";

/// Fixed client identifier the upstream expects on the socket request.
pub const CLIENT_IDENTIFIER: &str = "BestHTTP";

/// Artifacts extracted from a successful negotiation response. Both are
/// replayed on the connect request.
#[derive(Debug, Clone)]
pub struct Negotiation {
    pub cookie: String,
    pub connection_token: String,
}

/// Hub-selection descriptor: the JSON document both handshake phases carry
/// as the `connectionData` query parameter.
pub fn hub_descriptor(hub: &str) -> String {
    json!([{ "name": hub }]).to_string()
}

/// Extracts the session cookie and connection token from a negotiation
/// response. Either one missing is the expected "no live feed available"
/// signal, not a crash condition.
pub fn parse_negotiation(set_cookie: Option<&str>, body: &str) -> Result<Negotiation, RelayError> {
    let cookie = set_cookie
        .filter(|c| !c.is_empty())
        .ok_or_else(|| RelayError::NegotiationFailed("response carried no session cookie".into()))?;

    let body: Value = serde_json::from_str(body)
        .map_err(|e| RelayError::NegotiationFailed(format!("unreadable negotiation body: {e}")))?;
    let token = body
        .get("ConnectionToken")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RelayError::NegotiationFailed("response carried no connection token".into())
        })?;

    Ok(Negotiation {
        cookie: cookie.to_string(),
        connection_token: token.to_string(),
    })
}

/// The negotiation endpoint for the given upstream base URL.
pub fn negotiate_url(base: &str, hub: &str) -> Result<Url, RelayError> {
    let url = Url::parse_with_params(
        &format!("{}/negotiate", base.trim_end_matches('/')),
        &[
            ("connectionData", hub_descriptor(hub).as_str()),
            ("clientProtocol", CLIENT_PROTOCOL),
        ],
    )?;
    Ok(url)
}

/// The persistent connection endpoint, with the scheme switched to
/// WebSocket and the negotiated token threaded through.
pub fn connect_url(base: &str, hub: &str, negotiation: &Negotiation) -> Result<Url, RelayError> {
    let ws_base = base
        .trim_end_matches('/')
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    let url = Url::parse_with_params(
        &format!("{ws_base}/connect"),
        &[
            ("clientProtocol", CLIENT_PROTOCOL),
            ("transport", TRANSPORT),
            ("connectionToken", negotiation.connection_token.as_str()),
            ("connectionData", hub_descriptor(hub).as_str()),
        ],
    )?;
    Ok(url)
}

/// The one control message sent after the socket opens: subscribes to the
/// configured topic list. The request id is echoed back on the snapshot
/// reply (see [`crate::decoder::SNAPSHOT_REQUEST_ID`]).
pub fn subscribe_message(hub: &str, topics: &[String]) -> String {
    json!({
        "H": hub,
        "M": "Subscribe",
        "A": [topics],
        "I": crate::decoder::SNAPSHOT_REQUEST_ID,
    })
    .to_string()
}
