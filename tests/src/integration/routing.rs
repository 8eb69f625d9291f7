//! # Topic Routing Integration Tests
//!
//! A real publisher and real subscribers over TCP loopback: topic-filtered
//! delivery, fan-out, lifecycle rules, and session events.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use flux_pubsub::{
        ports::PublisherEvents, ByteData, ContentEnvelope, Endpoint, EventRecord, Publisher,
        Subscriber, Topic,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// A subscriber wired to capture every delivery.
    struct Capture {
        subscriber: Subscriber,
        plain_hits: Arc<AtomicUsize>,
        topical: Arc<Mutex<Vec<(String, ContentEnvelope)>>>,
    }

    fn capture_subscriber(port: u16) -> Capture {
        let plain_hits = Arc::new(AtomicUsize::new(0));
        let topical = Arc::new(Mutex::new(Vec::new()));

        let plain_counter = Arc::clone(&plain_hits);
        let topical_log = Arc::clone(&topical);
        let subscriber = Subscriber::new(
            Endpoint::parse("127.0.0.1", port).unwrap(),
            Arc::new(move |_envelope| {
                plain_counter.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(move |topic: &Topic, envelope| {
                topical_log
                    .lock()
                    .unwrap()
                    .push((topic.as_str().to_string(), envelope));
            }),
        );
        Capture {
            subscriber,
            plain_hits,
            topical,
        }
    }

    fn sample() -> ContentEnvelope {
        ContentEnvelope::Event(EventRecord::new("reading", serde_json::json!({"v": 21})))
    }

    /// Poll until `condition` holds or the deadline passes.
    async fn wait_for(condition: impl Fn() -> bool, what: &str) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    /// Poll until the publisher reports `count` live sessions.
    async fn wait_for_sessions(publisher: &Publisher, count: usize) {
        for _ in 0..200 {
            if publisher.session_count().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} sessions");
    }

    async fn started_publisher() -> (Arc<Publisher>, u16) {
        let publisher = Arc::new(Publisher::new(0));
        publisher.start().await.unwrap();
        let port = publisher.local_port().await.unwrap();
        (publisher, port)
    }

    // =============================================================================
    // SCENARIOS
    // =============================================================================

    #[tokio::test]
    async fn test_ephemeral_port_is_reported_and_reachable() {
        let (publisher, port) = started_publisher().await;
        assert_ne!(port, 0);

        let capture = capture_subscriber(port);
        capture.subscriber.start().await.unwrap();
        wait_for_sessions(&publisher, 1).await;

        capture.subscriber.stop().await.unwrap();
        publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_hierarchical_topic_routing() {
        let (publisher, port) = started_publisher().await;
        let capture = capture_subscriber(port);
        capture.subscriber.subscribe_topic("home/").unwrap();
        capture.subscriber.start().await.unwrap();
        wait_for_sessions(&publisher, 1).await;

        publisher.publish_topic(&sample(), "home/kitchen/").await.unwrap();
        publisher.publish_topic(&sample(), "office/").await.unwrap();

        wait_for(
            || !capture.topical.lock().unwrap().is_empty(),
            "topic delivery",
        )
        .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let deliveries = capture.topical.lock().unwrap().clone();
        assert_eq!(deliveries.len(), 1, "office/ must not match home/");
        // The callback reports the subscribed topic, not the wire topic.
        assert_eq!(deliveries[0].0, "home/");
        assert_eq!(deliveries[0].1, sample());
        assert_eq!(capture.plain_hits.load(Ordering::SeqCst), 0);

        capture.subscriber.stop().await.unwrap();
        publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_all_topics_and_topic_subscription_both_fire() {
        let (publisher, port) = started_publisher().await;
        let capture = capture_subscriber(port);
        capture.subscriber.subscribe().unwrap();
        capture.subscriber.subscribe_topic("home/").unwrap();
        capture.subscriber.start().await.unwrap();
        wait_for_sessions(&publisher, 1).await;

        publisher.publish_topic(&sample(), "home/livingroom/").await.unwrap();

        wait_for(
            || capture.plain_hits.load(Ordering::SeqCst) == 1,
            "plain delivery",
        )
        .await;
        wait_for(
            || capture.topical.lock().unwrap().len() == 1,
            "topic delivery",
        )
        .await;

        capture.subscriber.stop().await.unwrap();
        publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_fan_out_to_multiple_subscribers() {
        let (publisher, port) = started_publisher().await;
        let alpha = capture_subscriber(port);
        let beta = capture_subscriber(port);
        alpha.subscriber.subscribe_topic("feed/").unwrap();
        beta.subscriber.subscribe_topic("feed/").unwrap();
        alpha.subscriber.start().await.unwrap();
        beta.subscriber.start().await.unwrap();
        wait_for_sessions(&publisher, 2).await;

        let reached = publisher
            .publish_topic(&sample(), "feed/prices/")
            .await
            .unwrap();
        assert_eq!(reached, 2);

        wait_for(|| alpha.topical.lock().unwrap().len() == 1, "alpha").await;
        wait_for(|| beta.topical.lock().unwrap().len() == 1, "beta").await;

        alpha.subscriber.stop().await.unwrap();
        beta.subscriber.stop().await.unwrap();
        publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_byte_payload_passes_through() {
        let (publisher, port) = started_publisher().await;
        let capture = capture_subscriber(port);
        capture.subscriber.subscribe_topic("blob/").unwrap();
        capture.subscriber.start().await.unwrap();
        wait_for_sessions(&publisher, 1).await;

        let payload: Vec<u8> = (0..=255).collect();
        let envelope = ContentEnvelope::Bytes(ByteData::new(payload.clone()));
        publisher.publish_topic(&envelope, "blob/raw/").await.unwrap();

        wait_for(|| capture.topical.lock().unwrap().len() == 1, "delivery").await;
        let deliveries = capture.topical.lock().unwrap().clone();
        match &deliveries[0].1 {
            ContentEnvelope::Bytes(data) => assert_eq!(&data.bytes[..], &payload[..]),
            other => panic!("expected bytes, got {other:?}"),
        }

        capture.subscriber.stop().await.unwrap();
        publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_endpoint_reaches_second_publisher() {
        let (default_publisher, default_port) = started_publisher().await;
        let (direct_publisher, direct_port) = started_publisher().await;

        let capture = capture_subscriber(default_port);
        capture.subscriber.start().await.unwrap();
        capture
            .subscriber
            .subscribe_endpoint(
                Endpoint::parse("127.0.0.1", direct_port).unwrap(),
                // Auto-normalized with a trailing slash.
                "beta",
            )
            .await
            .unwrap();
        wait_for_sessions(&direct_publisher, 1).await;

        direct_publisher
            .publish_topic(&sample(), "beta/updates/")
            .await
            .unwrap();

        wait_for(|| capture.topical.lock().unwrap().len() == 1, "delivery").await;
        assert_eq!(capture.topical.lock().unwrap()[0].0, "beta/");

        capture.subscriber.stop().await.unwrap();
        default_publisher.stop().await.unwrap();
        direct_publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_a_bind_error() {
        let (publisher, port) = started_publisher().await;

        let rival = Publisher::new(port);
        let err = rival.start().await.unwrap_err();
        assert!(matches!(err, flux_pubsub::BusError::Bind { .. }));

        publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_publisher_stop_ends_subscriber_sessions() {
        let (publisher, port) = started_publisher().await;
        let capture = capture_subscriber(port);
        capture.subscriber.subscribe().unwrap();
        capture.subscriber.start().await.unwrap();
        wait_for_sessions(&publisher, 1).await;

        publisher.stop().await.unwrap();
        assert_eq!(
            publisher.publish(&sample()).await,
            Err(flux_pubsub::BusError::NotStarted)
        );

        // The subscriber side notices the closed connection; stopping it
        // still succeeds and completes within the teardown bound.
        tokio::time::sleep(Duration::from_millis(100)).await;
        capture.subscriber.stop().await.unwrap();
    }

    // =============================================================================
    // SESSION LIFECYCLE EVENTS
    // =============================================================================

    #[derive(Default)]
    struct SessionLog {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
    }

    impl PublisherEvents for SessionLog {
        fn on_session_connected(&self, _peer: Endpoint) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        fn on_session_disconnected(&self, _peer: Endpoint) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle_callbacks() {
        let log = Arc::new(SessionLog::default());
        let publisher = Arc::new(Publisher::with_events(0, Arc::clone(&log) as _));
        publisher.start().await.unwrap();
        let port = publisher.local_port().await.unwrap();

        let capture = capture_subscriber(port);
        capture.subscriber.start().await.unwrap();
        wait_for(|| log.connected.load(Ordering::SeqCst) == 1, "connect event").await;

        capture.subscriber.stop().await.unwrap();
        wait_for(
            || log.disconnected.load(Ordering::SeqCst) == 1,
            "disconnect event",
        )
        .await;

        publisher.stop().await.unwrap();
    }
}
