use lib_relay::dispatcher::Dispatcher;

#[tokio::test]
async fn broadcast_reaches_every_live_subscriber() {
    let dispatcher = Dispatcher::new();
    let mut first = dispatcher.add_client(1);
    let mut second = dispatcher.add_client(2);

    dispatcher.broadcast(r#"{"LapCount":{"CurrentLap":3}}"#.to_string());

    assert_eq!(
        &*first.recv().await.expect("first subscriber should receive"),
        r#"{"LapCount":{"CurrentLap":3}}"#
    );
    assert_eq!(
        &*second.recv().await.expect("second subscriber should receive"),
        r#"{"LapCount":{"CurrentLap":3}}"#
    );
}

#[tokio::test]
async fn dead_subscriber_is_isolated_and_evicted() {
    let dispatcher = Dispatcher::new();
    let mut first = dispatcher.add_client(1);
    let second = dispatcher.add_client(2);
    let mut third = dispatcher.add_client(3);
    assert_eq!(dispatcher.client_count(), 3);

    // Subscriber 2 goes away without deregistering.
    drop(second);

    dispatcher.broadcast("{}".to_string());

    // The send failure is isolated: 1 and 3 still get the payload, and 2
    // is no longer a broadcast target.
    assert_eq!(&*first.recv().await.expect("first should receive"), "{}");
    assert_eq!(&*third.recv().await.expect("third should receive"), "{}");
    assert_eq!(dispatcher.client_count(), 2);
}

#[tokio::test]
async fn slow_subscriber_queues_without_blocking_the_tick() {
    let dispatcher = Dispatcher::new();
    let mut slow = dispatcher.add_client(1);

    // Many ticks fire before the subscriber drains anything.
    for i in 0..100 {
        dispatcher.broadcast(format!(r#"{{"tick":{i}}}"#));
    }

    // All payloads are waiting in the subscriber's own queue, in order.
    for i in 0..100 {
        assert_eq!(
            &*slow.recv().await.expect("payload should be queued"),
            &format!(r#"{{"tick":{i}}}"#)
        );
    }
}

#[tokio::test]
async fn explicit_removal_stops_delivery() {
    let dispatcher = Dispatcher::new();
    let mut gone = dispatcher.add_client(7);
    dispatcher.remove_client(7);
    assert_eq!(dispatcher.client_count(), 0);

    dispatcher.broadcast("{}".to_string());
    // Channel closed by removal, nothing queued.
    assert!(gone.recv().await.is_none());
}
