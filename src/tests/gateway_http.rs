#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use http::StatusCode;
    use httpmock::prelude::*;
    use serde_json::{json, Value};

    use crate::server::server::{build_router, AppState};
    use crate::tests::common::{build_reqwest_client, closed_addr, grant_body, read_token_file, spawn_axum, test_config};

    #[tokio::test]
    async fn health_before_bootstrap_is_serving_but_not_authorized() {
        let dir = tempfile::tempdir().unwrap();
        // neither the auth server nor the vendor API is reachable
        let unreachable = format!("http://{}", closed_addr().await);
        let config = test_config(&dir, &unreachable, &unreachable);
        let state = AppState::from_config(&config).await.unwrap();
        let (handle, addr) = spawn_axum(build_router(&config, state)).await;

        let response = tokio::time::timeout(
            Duration::from_secs(1),
            build_reqwest_client().get(format!("http://{}/health", addr)).send(),
        )
        .await
        .expect("health must answer within the check timeout")
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["serving"], true);
        assert_eq!(body["authorized"], false);
        assert_eq!(body["last_refresh_at"], Value::Null);
        assert_eq!(body["token_file_present"], false);

        handle.abort();
    }

    #[tokio::test]
    async fn bootstrap_then_domain_call_refreshes_once() {
        let auth = MockServer::start_async().await;
        let api = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &auth.base_url(), &api.base_url());

        let refresh = auth
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(grant_body("at-2", None, 3600));
            })
            .await;
        let zones = api
            .mock_async(|when, then| {
                when.method(GET).path("/homes/1/zoneStates").header("authorization", "Bearer at-2");
                then.status(200).json_body(json!({"zoneStates": {"1": {"setting": {"power": "ON"}}}}));
            })
            .await;

        let state = AppState::from_config(&config).await.unwrap();
        let (handle, addr) = spawn_axum(build_router(&config, state)).await;
        let client = build_reqwest_client();

        let response = client
            .post(format!("http://{}/activation/bootstrap", addr))
            .json(&json!({"refresh_token": "rt-1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_token_file(&config).as_deref(), Some("rt-1"));

        let response = client
            .get(format!("http://{}/api/upstream/homes/1/zoneStates", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["zoneStates"]["1"]["setting"]["power"], "ON");

        refresh.assert_calls_async(1).await;
        zones.assert_calls_async(1).await;
        assert_eq!(read_token_file(&config).as_deref(), Some("rt-1"));

        let health: Value = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["authorized"], true);
        assert!(health["last_refresh_at"].is_string());

        handle.abort();
    }

    #[tokio::test]
    async fn error_kinds_map_to_distinct_statuses() {
        let auth = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let unreachable = format!("http://{}", closed_addr().await);
        let config = test_config(&dir, &auth.base_url(), &unreachable);
        auth.mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(200).body(grant_body("at-2", None, 3600));
        })
        .await;

        let state = AppState::from_config(&config).await.unwrap();
        let (handle, addr) = spawn_axum(build_router(&config, state)).await;
        let client = build_reqwest_client();
        let zones_url = format!("http://{}/api/upstream/zones", addr);

        // not yet authorized
        let response = client.get(&zones_url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "unauthorized");

        // authorized but the vendor API is down
        client
            .post(format!("http://{}/activation/bootstrap", addr))
            .json(&json!({"refresh_token": "rt-1"}))
            .send()
            .await
            .unwrap();
        let response = client.get(&zones_url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "upstream_unavailable");

        handle.abort();
    }

    #[tokio::test]
    async fn rejected_credentials_are_forbidden_then_unauthorized() {
        let auth = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, &auth.base_url(), "http://127.0.0.1:1");
        auth.mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(400).body("{\"error\":\"invalid_grant\"}");
        })
        .await;
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(&config.token.path, "rt-revoked").unwrap();

        let state = AppState::from_config(&config).await.unwrap();
        let (handle, addr) = spawn_axum(build_router(&config, state)).await;
        let client = build_reqwest_client();
        let zones_url = format!("http://{}/api/upstream/zones", addr);

        assert_eq!(client.get(&zones_url).send().await.unwrap().status(), StatusCode::FORBIDDEN);
        assert_eq!(client.get(&zones_url).send().await.unwrap().status(), StatusCode::UNAUTHORIZED);

        let status: Value = client
            .get(format!("http://{}/activation/status", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status"], "not_started");

        handle.abort();
    }

    #[tokio::test]
    async fn static_assets_and_index_are_served() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, "http://127.0.0.1:1", "http://127.0.0.1:1");
        let static_dir = dir.path().join("static");
        fs::create_dir_all(&static_dir).unwrap();
        fs::write(static_dir.join("index.html"), "<h1>activate</h1>").unwrap();
        fs::write(static_dir.join("app.js"), "console.log('ok');").unwrap();

        let state = AppState::from_config(&config).await.unwrap();
        let (handle, addr) = spawn_axum(build_router(&config, state)).await;
        let client = build_reqwest_client();

        let index = client.get(format!("http://{}/", addr)).send().await.unwrap();
        assert_eq!(index.status(), StatusCode::OK);
        assert_eq!(index.text().await.unwrap(), "<h1>activate</h1>");

        let script = client.get(format!("http://{}/static/app.js", addr)).send().await.unwrap();
        assert_eq!(script.status(), StatusCode::OK);
        assert_eq!(script.text().await.unwrap(), "console.log('ok');");

        let missing = client.get(format!("http://{}/static/nope.css", addr)).send().await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        handle.abort();
    }

    #[tokio::test]
    async fn api_index_and_metrics_are_exposed() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, "http://127.0.0.1:1", "http://127.0.0.1:1");
        let state = AppState::from_config(&config).await.unwrap();
        let (handle, addr) = spawn_axum(build_router(&config, state)).await;
        let client = build_reqwest_client();

        let index: Value = client
            .get(format!("http://{}/api", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(index["endpoints"]["/health"].is_string());

        let metrics = client.get(format!("http://{}/metrics", addr)).send().await.unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
        assert!(metrics.text().await.unwrap().contains("thermogw_"));

        let reset = client.post(format!("http://{}/activation/reset", addr)).send().await.unwrap();
        assert_eq!(reset.status(), StatusCode::OK);

        let bad = client
            .post(format!("http://{}/activation/bootstrap", addr))
            .json(&json!({"refresh_token": ""}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        handle.abort();
    }
}
