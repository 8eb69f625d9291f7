//! # Security Integration Tests
//!
//! CURVE key configuration ordering, peer authentication, and encrypted
//! end-to-end delivery. The `curve` feature toggles between the secured
//! suite and the capability-gate suite.

#[cfg(all(test, feature = "curve"))]
mod secured {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use flux_pubsub::{
        security::generate_keypair, BusError, ByteData, ContentEnvelope, Endpoint, Publisher,
        Subscriber, Topic,
    };

    async fn wait_for(condition: impl Fn() -> bool, what: &str) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn test_encrypted_end_to_end_delivery() {
        let server = generate_keypair();
        let client = generate_keypair();

        let publisher = Publisher::new(0);
        publisher.set_server_private_key(&server.0).await.unwrap();
        publisher.start().await.unwrap();
        let port = publisher.local_port().await.unwrap();

        let topical = Arc::new(Mutex::new(Vec::new()));
        let topical_log = Arc::clone(&topical);
        let subscriber = Subscriber::new(
            Endpoint::parse("127.0.0.1", port).unwrap(),
            Arc::new(|_| {}),
            Arc::new(move |topic: &Topic, envelope: ContentEnvelope| {
                topical_log
                    .lock()
                    .unwrap()
                    .push((topic.as_str().to_string(), envelope));
            }),
        );
        subscriber.set_client_keys(&client.0, &client.1).await.unwrap();
        subscriber.set_server_public_key(&server.1).await.unwrap();
        subscriber.subscribe_topic("vault/").unwrap();
        subscriber.start().await.unwrap();

        for _ in 0..200 {
            if publisher.session_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(publisher.session_count().await, 1);

        let secret_payload = ContentEnvelope::Bytes(ByteData::new(b"classified".to_vec()));
        publisher
            .publish_topic(&secret_payload, "vault/docs/")
            .await
            .unwrap();

        wait_for(|| topical.lock().unwrap().len() == 1, "secured delivery").await;
        let deliveries = topical.lock().unwrap().clone();
        assert_eq!(deliveries[0].0, "vault/");
        assert_eq!(deliveries[0].1, secret_payload);

        subscriber.stop().await.unwrap();
        publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_untrusted_server_key_fails_connect() {
        let server = generate_keypair();
        let imposter = generate_keypair();
        let client = generate_keypair();

        let publisher = Publisher::new(0);
        publisher.set_server_private_key(&server.0).await.unwrap();
        publisher.start().await.unwrap();
        let port = publisher.local_port().await.unwrap();

        let subscriber = Subscriber::new(
            Endpoint::parse("127.0.0.1", port).unwrap(),
            Arc::new(|_| {}),
            Arc::new(|_, _| {}),
        );
        subscriber.set_client_keys(&client.0, &client.1).await.unwrap();
        // Trusting the wrong key must fail the handshake, not connect
        // silently.
        subscriber.set_server_public_key(&imposter.1).await.unwrap();

        let err = subscriber.start().await.unwrap_err();
        assert!(matches!(err, BusError::SecurityMisconfigured(_)));

        publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_secured_mode_requires_server_key_before_connecting() {
        let client = generate_keypair();
        let subscriber = Subscriber::new(
            Endpoint::parse("127.0.0.1", 14999).unwrap(),
            Arc::new(|_| {}),
            Arc::new(|_, _| {}),
        );
        subscriber.set_client_keys(&client.0, &client.1).await.unwrap();

        // Client keys without a trusted server key: caught at the call
        // that would create the connection, never silently ignored.
        let err = subscriber.start().await.unwrap_err();
        assert!(matches!(err, BusError::SecurityMisconfigured(_)));
    }

    #[tokio::test]
    async fn test_key_setters_rejected_after_start() {
        let server = generate_keypair();
        let publisher = Publisher::new(0);
        publisher.start().await.unwrap();

        assert_eq!(
            publisher.set_server_private_key(&server.0).await,
            Err(BusError::AlreadyStarted)
        );

        publisher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_generated_keys_are_wellformed() {
        let (secret, public) = generate_keypair();
        assert_eq!(secret.len(), 40);
        assert_eq!(public.len(), 40);
        assert!(flux_types::KeyMaterial::parse(&public).is_ok());
        assert!(flux_types::SecretKeyMaterial::parse(&secret).is_ok());
    }

}

#[cfg(all(test, not(feature = "curve")))]
mod capability_gate {
    use std::sync::Arc;

    use flux_pubsub::{BusError, Endpoint, Publisher, Subscriber};

    #[tokio::test]
    async fn test_publisher_setter_reports_unsupported() {
        let publisher = Publisher::new(0);
        assert_eq!(
            publisher.set_server_private_key("any").await,
            Err(BusError::SecurityUnsupported)
        );
    }

    #[tokio::test]
    async fn test_subscriber_setters_report_unsupported() {
        let subscriber = Subscriber::new(
            Endpoint::parse("127.0.0.1", 14000).unwrap(),
            Arc::new(|_| {}),
            Arc::new(|_, _| {}),
        );
        assert_eq!(
            subscriber.set_client_keys("a", "b").await,
            Err(BusError::SecurityUnsupported)
        );
        assert_eq!(
            subscriber.set_server_public_key("a").await,
            Err(BusError::SecurityUnsupported)
        );
    }
}
