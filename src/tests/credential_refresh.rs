#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;

    use crate::credentials::credential::TokenGrant;
    use crate::error::GatewayError;
    use crate::tests::common::{build_manager, grant_body, read_token_file, test_config};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_on_expired_credential_share_one_refresh() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .delay(Duration::from_millis(300))
                    .body(grant_body("at-2", None, 3600));
            })
            .await;

        let manager = build_manager(&config).await;
        manager.bootstrap("rt-1").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.get_access_token().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "at-2");
        }

        mock.assert_calls_async(1).await;
        assert_eq!(read_token_file(&config).as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn missing_token_file_is_unauthorized_without_network() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200).body(grant_body("at-x", None, 3600));
            })
            .await;

        let manager = build_manager(&config).await;

        assert!(matches!(manager.get_access_token().await, Err(GatewayError::Unauthorized)));
        assert!(matches!(manager.refresh().await, Err(GatewayError::Unauthorized)));
        assert!(!manager.snapshot().await.authorized);
        mock.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn rejected_refresh_token_moves_to_unauthorized() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400)
                    .header("content-type", "application/json")
                    .body("{\"error\":\"invalid_grant\",\"error_description\":\"token revoked\"}");
            })
            .await;

        let manager = build_manager(&config).await;
        manager.bootstrap("rt-1").await.unwrap();

        let first = manager.get_access_token().await;
        assert!(matches!(first, Err(GatewayError::AuthRejected(_))), "got {:?}", first);
        assert!(!manager.snapshot().await.authorized);

        // no second network call until a new bootstrap
        assert!(matches!(manager.get_access_token().await, Err(GatewayError::Unauthorized)));
        mock.assert_calls_async(1).await;

        // the file keeps the last successful token, memory is what decides
        assert_eq!(read_token_file(&config).as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_persisted() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(grant_body("at-2", Some("rt-2"), 3600));
            })
            .await;

        let manager = build_manager(&config).await;
        manager.bootstrap("rt-1").await.unwrap();
        let credential = manager.refresh().await.unwrap();

        assert_eq!(credential.refresh_token, "rt-2");
        assert_eq!(read_token_file(&config).as_deref(), Some("rt-2"));
        assert!(manager.snapshot().await.last_refresh_at.is_some());
    }

    #[tokio::test]
    async fn new_bootstrap_forgets_previous_refresh_time() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200).body(grant_body("at-2", None, 3600));
            })
            .await;

        let manager = build_manager(&config).await;
        manager.bootstrap("rt-1").await.unwrap();
        manager.refresh().await.unwrap();
        assert!(manager.snapshot().await.last_refresh_at.is_some());

        manager.bootstrap("rt-9").await.unwrap();
        let snapshot = manager.snapshot().await;
        assert!(snapshot.authorized);
        assert_eq!(snapshot.last_refresh_at, None);
        assert_eq!(read_token_file(&config).as_deref(), Some("rt-9"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_persist_is_io_but_refreshed_credential_stays_usable() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .delay(Duration::from_millis(300))
                    .body(grant_body("at-2", Some("rt-2"), 3600));
            })
            .await;

        let manager = build_manager(&config).await;
        manager.bootstrap("rt-1").await.unwrap();
        // a plain file where the token directory should be makes every write fail
        let data_dir = dir.path().join("data");
        std::fs::remove_dir_all(&data_dir).unwrap();
        std::fs::write(&data_dir, "not a directory").unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.refresh().await }));
        }
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(matches!(outcome, Err(GatewayError::Io(_))), "got {:?}", outcome);
        }

        assert_eq!(manager.get_access_token().await.unwrap(), "at-2");
        assert!(manager.snapshot().await.authorized);
        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn fresh_access_token_is_reused_without_refresh() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200).body(grant_body("at-other", None, 3600));
            })
            .await;

        let manager = build_manager(&config).await;
        manager
            .install(TokenGrant { access_token: "at-1".into(), refresh_token: Some("rt-1".into()), expires_in: 3600 })
            .await
            .unwrap();

        assert_eq!(manager.get_access_token().await.unwrap(), "at-1");
        assert_eq!(manager.get_access_token().await.unwrap(), "at-1");
        mock.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn token_inside_safety_margin_is_refreshed() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200).body(grant_body("at-2", None, 3600));
            })
            .await;

        let manager = build_manager(&config).await;
        // 30s left, margin is 60s
        manager
            .install(TokenGrant { access_token: "at-1".into(), refresh_token: Some("rt-1".into()), expires_in: 30 })
            .await
            .unwrap();

        assert_eq!(manager.get_access_token().await.unwrap(), "at-2");
        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn unavailable_auth_server_keeps_credential() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(503).body("maintenance");
            })
            .await;

        let manager = build_manager(&config).await;
        manager.bootstrap("rt-1").await.unwrap();

        let err = manager.get_access_token().await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)), "got {:?}", err);
        assert!(manager.snapshot().await.authorized);
        // retried up to the configured bound
        mock.assert_calls_async(3).await;
    }

    #[tokio::test]
    async fn persisted_token_is_loaded_at_startup() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &server.base_url(), "http://127.0.0.1:1");
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200).body(grant_body("at-restart", None, 3600));
            })
            .await;

        build_manager(&config).await.bootstrap("rt-1").await.unwrap();

        let restarted = build_manager(&config).await;
        assert!(restarted.snapshot().await.authorized);
        assert_eq!(restarted.get_access_token().await.unwrap(), "at-restart");
    }

    #[tokio::test]
    async fn deauthorize_clears_memory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, "http://127.0.0.1:1", "http://127.0.0.1:1");
        let manager = build_manager(&config).await;

        manager.bootstrap("rt-1").await.unwrap();
        assert!(manager.token_store().exists().await);

        manager.deauthorize().await.unwrap();
        assert!(!manager.snapshot().await.authorized);
        assert!(read_token_file(&config).is_none());
        assert!(matches!(manager.get_access_token().await, Err(GatewayError::Unauthorized)));
    }

    #[tokio::test]
    async fn blank_bootstrap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, "http://127.0.0.1:1", "http://127.0.0.1:1");
        let manager = build_manager(&config).await;

        assert!(matches!(manager.bootstrap("   ").await, Err(GatewayError::BadRequest(_))));
        assert!(read_token_file(&config).is_none());
    }
}
