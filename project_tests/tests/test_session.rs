use lib_relay::errors::RelayError;
use lib_relay::session::{
    connect_url, hub_descriptor, negotiate_url, parse_negotiation, subscribe_message, Negotiation,
};
use serde_json::{json, Value};

const BASE: &str = "https://livetiming.example.com/signalr";

#[test]
fn negotiation_with_both_artifacts_succeeds() {
    let negotiation = parse_negotiation(
        Some("GCLB=CKi0r_XYZ; path=/; HttpOnly"),
        r#"{"Url":"/signalr","ConnectionToken":"abc+def/123=","ConnectionId":"f00"}"#,
    )
    .expect("negotiation should parse");

    assert_eq!(negotiation.cookie, "GCLB=CKi0r_XYZ; path=/; HttpOnly");
    assert_eq!(negotiation.connection_token, "abc+def/123=");
}

#[test]
fn missing_cookie_is_a_negotiation_failure() {
    let err = parse_negotiation(None, r#"{"ConnectionToken":"abc"}"#)
        .expect_err("missing cookie must fail");
    assert!(matches!(err, RelayError::NegotiationFailed(_)));
}

#[test]
fn missing_token_is_a_negotiation_failure() {
    let err = parse_negotiation(Some("GCLB=x"), r#"{"Url":"/signalr"}"#)
        .expect_err("missing token must fail");
    assert!(matches!(err, RelayError::NegotiationFailed(_)));
}

#[test]
fn unreadable_body_is_a_negotiation_failure() {
    let err =
        parse_negotiation(Some("GCLB=x"), "<html>502</html>").expect_err("bad body must fail");
    assert!(matches!(err, RelayError::NegotiationFailed(_)));
}

#[test]
fn negotiate_url_carries_hub_descriptor_and_protocol() {
    let url = negotiate_url(BASE, "Streaming").expect("url should build");
    assert!(url.as_str().starts_with(&format!("{BASE}/negotiate?")));

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert!(pairs.contains(&("connectionData".into(), r#"[{"name":"Streaming"}]"#.into())));
    assert!(pairs.contains(&("clientProtocol".into(), "1.5".into())));
}

#[test]
fn connect_url_switches_scheme_and_threads_the_token() {
    let negotiation = Negotiation {
        cookie: "GCLB=x".into(),
        connection_token: "to ken+/=".into(),
    };
    let url = connect_url(BASE, "Streaming", &negotiation).expect("url should build");

    assert_eq!(url.scheme(), "wss");
    assert_eq!(url.path(), "/signalr/connect");

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert!(pairs.contains(&("transport".into(), "webSockets".into())));
    // Percent-encoding must round-trip the token exactly.
    assert!(pairs.contains(&("connectionToken".into(), "to ken+/=".into())));
    assert!(pairs.contains(&("connectionData".into(), hub_descriptor("Streaming"))));
    assert!(pairs.contains(&("clientProtocol".into(), "1.5".into())));
}

#[test]
fn subscribe_message_names_the_hub_and_topics() {
    let topics = vec!["Heartbeat".to_string(), "TimingData".to_string()];
    let message: Value =
        serde_json::from_str(&subscribe_message("Streaming", &topics)).expect("valid JSON");

    assert_eq!(message["H"], "Streaming");
    assert_eq!(message["M"], "Subscribe");
    assert_eq!(message["A"], json!([["Heartbeat", "TimingData"]]));
    assert_eq!(message["I"], 1);
}
