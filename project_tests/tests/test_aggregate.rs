use lib_relay::aggregate::{StateAggregator, ACTIVE_MESSAGE_THRESHOLD, EMPTY_FRAME_LIMIT};
use serde_json::{json, Value};

// One decoded frame's worth of fields from a JSON object literal.
fn fields(fragment: Value) -> Vec<(String, Value)> {
    fragment
        .as_object()
        .expect("fragment fixture must be an object")
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[test]
fn sequences_replace_wholesale() {
    let agg = StateAggregator::new(false);
    agg.apply(fields(json!({"x": [1, 2, 3]})));
    agg.apply(fields(json!({"x": [4]})));
    assert_eq!(agg.snapshot(), json!({"x": [4]}));
}

#[test]
fn replaying_a_leaf_fragment_is_idempotent() {
    let agg = StateAggregator::new(false);
    agg.apply(fields(json!({"lap": 31, "order": ["44", "1", "16"]})));
    let once = agg.snapshot();
    agg.apply(fields(json!({"lap": 31, "order": ["44", "1", "16"]})));
    assert_eq!(agg.snapshot(), once);
}

#[test]
fn mappings_merge_key_by_key_at_depth() {
    let agg = StateAggregator::new(false);
    agg.apply(fields(json!({
        "TimingData": {"Lines": {"1": {"Position": 1, "GapToLeader": ""}}}
    })));
    agg.apply(fields(json!({
        "TimingData": {"Lines": {"1": {"GapToLeader": "+0.512"}, "16": {"Position": 2}}}
    })));

    assert_eq!(
        agg.snapshot(),
        json!({
            "TimingData": {
                "Lines": {
                    "1": {"Position": 1, "GapToLeader": "+0.512"},
                    "16": {"Position": 2}
                }
            }
        })
    );
}

#[test]
fn merging_two_fragments_matches_their_deep_union() {
    let a = json!({"s": {"drivers": {"44": {"pos": 3}}, "flag": "green"}});
    let b = json!({"s": {"drivers": {"44": {"gap": "+1.2"}, "63": {"pos": 4}}, "flag": "yellow"}});
    // Deep union of a and b, with b's leaves winning on collision.
    let union = json!({
        "s": {
            "drivers": {"44": {"pos": 3, "gap": "+1.2"}, "63": {"pos": 4}},
            "flag": "yellow"
        }
    });

    let sequential = StateAggregator::new(false);
    sequential.apply(fields(a));
    sequential.apply(fields(b));

    let combined = StateAggregator::new(false);
    combined.apply(fields(union));

    assert_eq!(sequential.snapshot(), combined.snapshot());
}

#[test]
fn omitted_and_null_keys_never_erase_state() {
    let agg = StateAggregator::new(false);
    agg.apply(fields(json!({"TrackStatus": {"Status": "1"}, "LapCount": {"CurrentLap": 9}})));
    // This fragment omits LapCount entirely and nulls a nested key.
    agg.apply(fields(json!({"TrackStatus": {"Status": null, "Message": "AllClear"}})));

    assert_eq!(
        agg.snapshot(),
        json!({
            "TrackStatus": {"Status": "1", "Message": "AllClear"},
            "LapCount": {"CurrentLap": 9}
        })
    );
}

#[test]
fn scalar_leaf_becoming_a_subtree_replaces() {
    let agg = StateAggregator::new(false);
    agg.apply(fields(json!({"clock": "00:00:00"})));
    agg.apply(fields(json!({"clock": {"Remaining": "01:59:30", "Extrapolating": true}})));
    assert_eq!(
        agg.snapshot(),
        json!({"clock": {"Remaining": "01:59:30", "Extrapolating": true}})
    );
}

#[test]
fn empty_mapping_replaces_wholesale() {
    let agg = StateAggregator::new(false);
    agg.apply(fields(json!({"TopThree": {"Lines": {"1": {}}}})));
    agg.apply(fields(json!({"TopThree": {}})));
    assert_eq!(agg.snapshot(), json!({"TopThree": {}}));
}

#[test]
fn empty_frame_run_past_limit_clears_the_session() {
    let agg = StateAggregator::new(false);
    agg.apply(fields(json!({"LapCount": {"CurrentLap": 7}})));

    for _ in 0..EMPTY_FRAME_LIMIT {
        agg.apply(Vec::new());
    }
    // At the limit the document survives.
    assert_eq!(agg.snapshot(), json!({"LapCount": {"CurrentLap": 7}}));

    // One past the limit: session end, even with the connection open.
    agg.apply(Vec::new());
    assert_eq!(agg.snapshot(), json!({}));
    assert_eq!(agg.message_count(), 0);
}

#[test]
fn data_frame_resets_the_empty_run() {
    let agg = StateAggregator::new(false);
    agg.apply(fields(json!({"LapCount": {"CurrentLap": 7}})));

    for _ in 0..EMPTY_FRAME_LIMIT {
        agg.apply(Vec::new());
    }
    agg.apply(fields(json!({"Heartbeat": {"Utc": "2024-05-26T13:03:01Z"}})));
    for _ in 0..EMPTY_FRAME_LIMIT {
        agg.apply(Vec::new());
    }

    // Neither run crossed the limit, so nothing was discarded.
    assert_eq!(
        agg.snapshot(),
        json!({"LapCount": {"CurrentLap": 7}, "Heartbeat": {"Utc": "2024-05-26T13:03:01Z"}})
    );
}

#[test]
fn debug_mode_disables_the_liveness_reset() {
    let agg = StateAggregator::new(true);
    agg.apply(fields(json!({"LapCount": {"CurrentLap": 7}})));
    for _ in 0..EMPTY_FRAME_LIMIT * 4 {
        agg.apply(Vec::new());
    }
    assert_eq!(agg.snapshot(), json!({"LapCount": {"CurrentLap": 7}}));
}

#[test]
fn broadcast_gate_opens_past_the_message_threshold() {
    let agg = StateAggregator::new(false);
    for i in 0..ACTIVE_MESSAGE_THRESHOLD {
        agg.apply(vec![(format!("t{i}"), json!(i))]);
    }
    // message_count == 5 is not enough.
    assert!(!agg.is_active());

    agg.apply(fields(json!({"one_more": true})));
    assert_eq!(agg.message_count(), ACTIVE_MESSAGE_THRESHOLD + 1);
    assert!(agg.is_active());
}

#[test]
fn debug_mode_forces_the_gate_open() {
    let agg = StateAggregator::new(true);
    assert_eq!(agg.message_count(), 0);
    assert!(agg.is_active());
}

#[test]
fn reset_clears_document_and_counters() {
    let agg = StateAggregator::new(false);
    for _ in 0..10 {
        agg.apply(fields(json!({"SessionData": {"Series": [1, 2]}})));
    }
    assert!(agg.is_active());

    agg.reset();
    assert_eq!(agg.snapshot(), json!({}));
    assert_eq!(agg.message_count(), 0);
    assert!(!agg.is_active());
}
