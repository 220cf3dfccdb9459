#[cfg(test)]
mod external_client_tests {
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use std::collections::HashMap;
    use std::str::FromStr;
    use stoneserver::billing::stripe_integration::{CreateCheckoutSessionParams, StripeError};
    use stoneserver::billing::StripeClient;
    use stoneserver::core::config::{QboConfig, QboEnvironment};
    use stoneserver::qbo::client::{EmailAddr, QboCustomer, QboInvoice};
    use stoneserver::qbo::{QboClient, QboError};

    fn qbo(server: &mockito::ServerGuard) -> QboClient {
        let url = server.url();
        QboClient::new(QboConfig {
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            redirect_uri: "http://localhost:8080/api/qbo/callback".to_string(),
            environment: QboEnvironment::Sandbox,
        })
        .with_base_urls(
            &format!("{url}/authorize"),
            &format!("{url}/oauth2/tokens/bearer"),
            &url,
        )
    }

    fn checkout_params() -> CreateCheckoutSessionParams {
        let mut metadata = HashMap::new();
        metadata.insert("sale_id".to_string(), "sale-1".to_string());
        CreateCheckoutSessionParams {
            amount_cents: 125_000,
            currency: "usd".to_string(),
            name: "Countertop installation".to_string(),
            success_url: "http://localhost/sales/1?checkout=success".to_string(),
            cancel_url: "http://localhost/sales/1?checkout=cancelled".to_string(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_stripe_checkout_session() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/checkout/sessions")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("mode".into(), "payment".into()),
                Matcher::UrlEncoded("line_items[0][price_data][unit_amount]".into(), "125000".into()),
                Matcher::UrlEncoded("line_items[0][price_data][currency]".into(), "usd".into()),
                Matcher::UrlEncoded("line_items[0][quantity]".into(), "1".into()),
                Matcher::UrlEncoded("metadata[sale_id]".into(), "sale-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"cs_test_a1","url":"https://checkout.stripe.com/c/pay/cs_test_a1","status":"open","payment_status":"unpaid","amount_total":125000,"currency":"usd","metadata":{"sale_id":"sale-1"}}"#,
            )
            .create_async()
            .await;

        let client = StripeClient::new("sk_test_1".into(), "whsec".into(), "usd".into())
            .with_base_url(&server.url());
        let session = client.create_checkout_session(checkout_params()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(session.id, "cs_test_a1");
        assert_eq!(session.url.as_deref(), Some("https://checkout.stripe.com/c/pay/cs_test_a1"));
        assert!(!session.is_paid());
    }

    #[tokio::test]
    async fn test_stripe_error_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/checkout/sessions")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"Invalid currency: zzz","type":"invalid_request_error"}}"#)
            .create_async()
            .await;

        let client = StripeClient::new("sk_test_1".into(), "whsec".into(), "usd".into())
            .with_base_url(&server.url());
        let err = client.create_checkout_session(checkout_params()).await.unwrap_err();
        assert_eq!(err, StripeError::ApiError("Invalid currency: zzz".to_string()));
    }

    #[tokio::test]
    async fn test_qbo_exchange_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/tokens/bearer")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "auth-code".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"at","refresh_token":"rt","token_type":"bearer","expires_in":3600,"x_refresh_token_expires_in":8726400}"#,
            )
            .create_async()
            .await;

        let tokens = qbo(&server).exchange_code("auth-code").await.unwrap();
        mock.assert_async().await;
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token, "rt");
        assert_eq!(tokens.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_qbo_create_customer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Regex("^/v3/company/9130/customer".to_string()))
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer at")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "DisplayName": "Jane Doe",
                "PrimaryEmailAddr": { "Address": "jane@example.com" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"Customer":{"Id":"58","DisplayName":"Jane Doe"},"time":"2024-01-01T00:00:00Z"}"#)
            .create_async()
            .await;

        let customer = QboCustomer {
            display_name: "Jane Doe".to_string(),
            primary_email_addr: Some(EmailAddr {
                address: "jane@example.com".to_string(),
            }),
            ..Default::default()
        };
        let created = qbo(&server)
            .create_customer("9130", "at", &customer)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(created.id.as_deref(), Some("58"));
    }

    #[tokio::test]
    async fn test_qbo_invoice_fault_and_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", Matcher::Regex("^/v3/company/9130/invoice".to_string()))
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer at")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"Fault":{"Error":[{"Message":"Invalid Reference Id","Detail":"Item ref 1 does not exist","code":"2500"}],"type":"ValidationFault"}}"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", Matcher::Regex("^/v3/company/9130/invoice".to_string()))
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer expired")
            .with_status(401)
            .with_body("")
            .create_async()
            .await;

        let invoice = QboInvoice::single_line(
            "58",
            &BigDecimal::from_str("2450.50").unwrap(),
            "Countertops".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        let client = qbo(&server);

        let fault = client.create_invoice("9130", "at", &invoice).await.unwrap_err();
        assert_eq!(
            fault,
            QboError::Api("Invalid Reference Id: Item ref 1 does not exist".to_string())
        );

        let expired = client.create_invoice("9130", "expired", &invoice).await.unwrap_err();
        assert_eq!(expired, QboError::Unauthorized);
    }
}
