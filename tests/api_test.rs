#[cfg(test)]
mod api_integration_tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use stoneserver::billing::stripe_integration::sign_payload;
    use stoneserver::billing::StripeClient;
    use stoneserver::core::config::{AppConfig, QboConfig, QboEnvironment};
    use stoneserver::core::shared::state::AppState;
    use stoneserver::main_module::build_router;
    use stoneserver::qbo::client::QboClient;
    use tower::ServiceExt;

    const WEBHOOK_SECRET: &str = "whsec_router_test";

    // No database is reachable behind this state.
    fn app() -> Router {
        build_router(Arc::new(AppState::lazy(AppConfig::for_tests())))
    }

    fn app_with_stripe() -> Router {
        let stripe = StripeClient::new("sk_test".into(), WEBHOOK_SECRET.into(), "usd".into());
        build_router(Arc::new(AppState::lazy(AppConfig::for_tests()).with_stripe(stripe)))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_simple() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "stoneserver");
    }

    #[tokio::test]
    async fn test_health_reports_missing_database() {
        let response = app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["database"], false);
        assert_eq!(body["integrations"]["stripe"], false);
    }

    #[tokio::test]
    async fn test_health_lists_attached_integrations() {
        let qbo = QboClient::new(QboConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost:8080/api/qbo/callback".into(),
            environment: QboEnvironment::Sandbox,
        });
        let stripe = StripeClient::new("sk_test".into(), WEBHOOK_SECRET.into(), "usd".into());
        let state = AppState::lazy(AppConfig::for_tests())
            .with_qbo(qbo)
            .with_stripe(stripe);

        let response = build_router(Arc::new(state))
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["integrations"]["qbo"], true);
        assert_eq!(body["integrations"]["stripe"], true);
        assert_eq!(body["integrations"]["drive"], false);
    }

    #[tokio::test]
    async fn test_api_requires_session() {
        let response = app()
            .oneshot(
                Request::get("/api/stones")
                    .header(header::ACCEPT, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_browser_is_redirected_to_login() {
        let response = app()
            .oneshot(
                Request::get("/api/stones?search=white")
                    .header(header::ACCEPT, "text/html,application/xhtml+xml")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_redirection());
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/login?redirectTo="));
    }

    #[tokio::test]
    async fn test_cookie_mutation_without_csrf_token_is_forbidden() {
        let response = app()
            .oneshot(
                Request::post("/api/stones")
                    .header(header::COOKIE, "stone_session=not-a-real-token")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"Calacatta"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_checkout_requires_session() {
        let response = app_with_stripe()
            .oneshot(
                Request::post("/api/sales/6f1c1a56-3b7e-4d2c-9c3a-0d5f0a9b1e11/checkout")
                    .header(header::ACCEPT, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_without_stripe_is_unavailable() {
        let response = app()
            .oneshot(
                Request::post("/api/stripe/webhook")
                    .header("stripe-signature", "t=1,v1=abc")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let ts = chrono::Utc::now().timestamp();
        let response = app_with_stripe()
            .oneshot(
                Request::post("/api/stripe/webhook")
                    .header("stripe-signature", format!("t={ts},v1=00ff"))
                    .body(Body::from(r#"{"id":"evt","type":"charge.refunded","created":0,"data":{"object":{}}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let missing = app_with_stripe()
            .oneshot(Request::post("/api/stripe/webhook").body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_acknowledges_unhandled_events() {
        let payload = r#"{"id":"evt_9","type":"customer.created","created":0,"data":{"object":{}}}"#;
        let ts = chrono::Utc::now().timestamp();
        let sig = sign_payload(WEBHOOK_SECRET, ts, payload).unwrap();

        let response = app_with_stripe()
            .oneshot(
                Request::post("/api/stripe/webhook")
                    .header("stripe-signature", format!("t={ts},v1={sig}"))
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["received"], true);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = app()
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
