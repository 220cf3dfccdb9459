// Runs against a real Postgres. Skipped unless DATABASE_URL is set; every
// test seeds its own companies so they can share one database.
#[cfg(test)]
mod db_integration_tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use diesel::prelude::*;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::{Arc, OnceLock};
    use stoneserver::billing::api::{complete_checkout, StripeCheckout, CHECKOUT_OPEN};
    use stoneserver::billing::stripe_integration::StripeCheckoutSession;
    use stoneserver::core::config::AppConfig;
    use stoneserver::core::shared::schema::{companies, deals, deals_list, users};
    use stoneserver::core::shared::state::AppState;
    use stoneserver::core::shared::utils::{create_conn, run_migrations, DbPool};
    use stoneserver::main_module::build_router;
    use stoneserver::security::session::create_session;
    use tower::ServiceExt;
    use uuid::Uuid;

    static MIGRATED: OnceLock<bool> = OnceLock::new();

    struct Tenant {
        company_id: Uuid,
        user_id: Uuid,
        token: String,
    }

    struct Harness {
        state: Arc<AppState>,
        app: Router,
    }

    impl Harness {
        fn pool(&self) -> &DbPool {
            &self.state.conn
        }

        fn seed_tenant(&self, superuser: bool) -> Tenant {
            let mut conn = self.pool().get().unwrap();
            let company_id = Uuid::new_v4();
            let user_id = Uuid::new_v4();
            diesel::insert_into(companies::table)
                .values((
                    companies::id.eq(company_id),
                    companies::name.eq(format!("Shop {}", &company_id.simple().to_string()[..8])),
                ))
                .execute(&mut conn)
                .unwrap();
            diesel::insert_into(users::table)
                .values((
                    users::id.eq(user_id),
                    users::company_id.eq(company_id),
                    users::name.eq("Fabricator"),
                    users::email.eq(format!("{}@example.com", user_id.simple())),
                    users::password_hash.eq("unused"),
                    users::is_employee.eq(true),
                    users::is_admin.eq(true),
                    users::is_superuser.eq(superuser),
                ))
                .execute(&mut conn)
                .unwrap();
            let (token, _) =
                create_session(&mut conn, user_id, company_id, &self.state.config.session).unwrap();
            Tenant {
                company_id,
                user_id,
                token,
            }
        }

        async fn call(&self, method: Method, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::ACCEPT, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"));
            let body = match body {
                Some(value) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(value.to_string())
                }
                None => Body::empty(),
            };
            let response = self
                .app
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }
    }

    fn harness() -> Option<Harness> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let mut config = AppConfig::for_tests();
        config.database.url = url;
        config.database.pool_size = 8;
        let pool = create_conn(&config.database).ok()?;
        let migrated = *MIGRATED.get_or_init(|| match run_migrations(&pool) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Migrations failed: {e}");
                false
            }
        });
        if !migrated {
            return None;
        }
        let state = Arc::new(AppState::new(config, pool));
        Some(Harness {
            app: build_router(state.clone()),
            state,
        })
    }

    fn id_of(value: &Value) -> String {
        value["id"].as_str().unwrap().to_string()
    }

    async fn new_customer(h: &Harness, t: &Tenant, name: &str) -> String {
        let (status, body) = h
            .call(Method::POST, "/api/customers", &t.token, Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        id_of(&body)
    }

    async fn new_slabs(h: &Harness, t: &Tenant, count: i64) -> Vec<String> {
        let (status, stone) = h
            .call(
                Method::POST,
                "/api/stones",
                &t.token,
                Some(json!({ "name": "Calacatta Gold", "stone_type": "marble" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, slabs) = h
            .call(
                Method::POST,
                &format!("/api/stones/{}/slabs", id_of(&stone)),
                &t.token,
                Some(json!({ "bundle": "B-1", "width": 120.0, "length": 60.0, "quantity": count })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        slabs.as_array().unwrap().iter().map(id_of).collect()
    }

    fn column_of(h: &Harness, list_id: &str) -> Vec<(Uuid, i32)> {
        let mut conn = h.pool().get().unwrap();
        deals::table
            .filter(deals::list_id.eq(Uuid::parse_str(list_id).unwrap()))
            .filter(deals::is_deleted.eq(false))
            .select((deals::id, deals::position))
            .order(deals::position.asc())
            .load(&mut conn)
            .unwrap()
    }

    #[tokio::test]
    async fn test_customer_round_trip_and_soft_delete() {
        let Some(h) = harness() else {
            return;
        };
        let t = h.seed_tenant(false);
        let id = new_customer(&h, &t, "Dana Ortiz").await;

        let (status, body) = h
            .call(Method::GET, &format!("/api/customers/{id}"), &t.token, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Dana Ortiz");

        let (status, body) = h
            .call(
                Method::PUT,
                &format!("/api/customers/{id}"),
                &t.token,
                Some(json!({ "address": "12 Quarry Rd" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], "12 Quarry Rd");

        let (status, _) = h
            .call(Method::DELETE, &format!("/api/customers/{id}"), &t.token, None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, list) = h.call(Method::GET, "/api/customers", &t.token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(list.as_array().unwrap().iter().all(|c| c["id"] != id.as_str()));

        let (status, _) = h
            .call(Method::GET, &format!("/api/customers/{id}"), &t.token, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deal_move_renumbers_both_columns() {
        let Some(h) = harness() else {
            return;
        };
        let t = h.seed_tenant(false);
        let (status, board) = h.call(Method::GET, "/api/deals", &t.token, None).await;
        assert_eq!(status, StatusCode::OK);
        let lists: Vec<String> = board.as_array().unwrap().iter().map(id_of).collect();
        assert_eq!(lists.len(), 5);

        let customer = new_customer(&h, &t, "Lee Park").await;
        let mut cards = Vec::new();
        for _ in 0..3 {
            let (status, deal) = h
                .call(
                    Method::POST,
                    "/api/deals",
                    &t.token,
                    Some(json!({ "customer_id": customer, "list_id": lists[0] })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            cards.push(Uuid::parse_str(&id_of(&deal)).unwrap());
        }

        let (status, _) = h
            .call(
                Method::POST,
                &format!("/api/deals/{}/move", cards[0]),
                &t.token,
                Some(json!({ "list_id": lists[1], "position": 0 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(column_of(&h, &lists[0]), vec![(cards[1], 0), (cards[2], 1)]);
        assert_eq!(column_of(&h, &lists[1]), vec![(cards[0], 0)]);

        let (status, _) = h
            .call(Method::DELETE, &format!("/api/deals/{}", cards[1]), &t.token, None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(column_of(&h, &lists[0]), vec![(cards[2], 0)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_board_loads_create_one_pipeline() {
        let Some(h) = harness() else {
            return;
        };
        let t = h.seed_tenant(false);
        let (a, b, c) = tokio::join!(
            h.call(Method::GET, "/api/deals", &t.token, None),
            h.call(Method::GET, "/api/deals/lists", &t.token, None),
            h.call(Method::GET, "/api/deals", &t.token, None),
        );
        assert_eq!((a.0, b.0, c.0), (StatusCode::OK, StatusCode::OK, StatusCode::OK));

        let mut conn = h.pool().get().unwrap();
        let live: i64 = deals_list::table
            .filter(deals_list::company_id.eq(t.company_id))
            .filter(deals_list::is_deleted.eq(false))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(live, 5);
    }

    #[tokio::test]
    async fn test_sold_slab_is_locked_to_its_sale() {
        let Some(h) = harness() else {
            return;
        };
        let t = h.seed_tenant(false);
        let slabs = new_slabs(&h, &t, 2).await;

        let sale = json!({ "customer": { "name": "Ana Ruiz" }, "price": "2400.00", "slabs": [slabs[0]] });
        let (status, body) = h
            .call(Method::POST, "/api/sales", &t.token, Some(sale.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["slabs"].as_array().unwrap().len(), 1);

        let (status, _) = h.call(Method::POST, "/api/sales", &t.token, Some(sale)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = h
            .call(
                Method::PUT,
                &format!("/api/slabs/{}", slabs[0]),
                &t.token,
                Some(json!({ "width": 100.0 })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = h
            .call(Method::DELETE, &format!("/api/slabs/{}", slabs[0]), &t.token, None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = h
            .call(Method::DELETE, &format!("/api/slabs/{}", slabs[1]), &t.token, None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_sell_a_slab_once() {
        let Some(h) = harness() else {
            return;
        };
        let t = h.seed_tenant(false);
        let slabs = new_slabs(&h, &t, 1).await;
        let sale = json!({ "customer": { "name": "Sam Hale" }, "price": "900", "slabs": [slabs[0]] });

        let (a, b) = tokio::join!(
            h.call(Method::POST, "/api/sales", &t.token, Some(sale.clone())),
            h.call(Method::POST, "/api/sales", &t.token, Some(sale.clone())),
        );
        let mut statuses = vec![a.0, b.0];
        statuses.sort();
        assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);
    }

    #[tokio::test]
    async fn test_deleted_company_loses_access() {
        let Some(h) = harness() else {
            return;
        };
        let owner = h.seed_tenant(true);
        let other = h.seed_tenant(false);

        let (status, _) = h.call(Method::GET, "/api/auth/me", &other.token, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = h
            .call(
                Method::DELETE,
                &format!("/api/companies/{}", other.company_id),
                &owner.token,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = h.call(Method::GET, "/api/auth/me", &other.token, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // A session minted after the deletion is refused as well.
        let mut conn = h.pool().get().unwrap();
        let (fresh, _) = create_session(
            &mut conn,
            other.user_id,
            other.company_id,
            &h.state.config.session,
        )
        .unwrap();
        drop(conn);
        let (status, _) = h.call(Method::GET, "/api/auth/me", &fresh, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = h.call(Method::GET, "/api/auth/me", &owner.token, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_references_to_other_companies_are_rejected() {
        let Some(h) = harness() else {
            return;
        };
        let mine = h.seed_tenant(false);
        let theirs = h.seed_tenant(false);
        let start = Utc::now();
        let event = |assignee: Uuid| {
            json!({
                "title": "Template kitchen",
                "start_date": start,
                "end_date": start + chrono::Duration::hours(2),
                "assigned_user_id": assignee,
            })
        };

        let (status, body) = h
            .call(Method::POST, "/api/events", &mine.token, Some(event(theirs.user_id)))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["fields"]["assigned_user_id"].is_array());

        let (status, _) = h
            .call(Method::POST, "/api/events", &mine.token, Some(event(mine.user_id)))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, board) = h.call(Method::GET, "/api/deals", &mine.token, None).await;
        let list = id_of(&board[0]);
        let customer = new_customer(&h, &mine, "Jo Reyes").await;
        let (status, body) = h
            .call(
                Method::POST,
                "/api/deals",
                &mine.token,
                Some(json!({ "customer_id": customer, "list_id": list, "user_id": theirs.user_id })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["fields"]["user_id"].is_array());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_instruction_moves_cannot_form_a_cycle() {
        let Some(h) = harness() else {
            return;
        };
        let t = h.seed_tenant(false);
        let (_, a) = h
            .call(Method::POST, "/api/instructions", &t.token, Some(json!({ "title": "Install" })))
            .await;
        let (_, b) = h
            .call(Method::POST, "/api/instructions", &t.token, Some(json!({ "title": "Seams" })))
            .await;
        let (a, b) = (id_of(&a), id_of(&b));

        let (url_a, url_b) = (
            format!("/api/instructions/{a}/move"),
            format!("/api/instructions/{b}/move"),
        );
        let (first, second) = tokio::join!(
            h.call(
                Method::POST,
                &url_a,
                &t.token,
                Some(json!({ "parent_id": b, "position": 0 })),
            ),
            h.call(
                Method::POST,
                &url_b,
                &t.token,
                Some(json!({ "parent_id": a, "position": 0 })),
            ),
        );
        let mut statuses = vec![first.0, second.0];
        statuses.sort();
        assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

        let (status, _) = h
            .call(
                Method::POST,
                &format!("/api/instructions/{a}/move"),
                &t.token,
                Some(json!({ "parent_id": null, "position": -1 })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, tree) = h.call(Method::GET, "/api/instructions", &t.token, None).await;
        assert_eq!(status, StatusCode::OK);
        let roots = tree.as_array().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0]["children"].as_array().unwrap().len(), 1);

        let root = id_of(&roots[0]);
        let (status, _) = h
            .call(Method::DELETE, &format!("/api/instructions/{root}"), &t.token, None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, tree) = h.call(Method::GET, "/api/instructions", &t.token, None).await;
        assert!(tree.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deposit_leaves_sale_unpaid_until_balance_is_covered() {
        let Some(h) = harness() else {
            return;
        };
        let t = h.seed_tenant(false);
        let slabs = new_slabs(&h, &t, 1).await;
        let (status, sale) = h
            .call(
                Method::POST,
                "/api/sales",
                &t.token,
                Some(json!({ "customer": { "name": "Kim Vo" }, "price": "1000.00", "slabs": [slabs[0]] })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let sale_id = Uuid::parse_str(&id_of(&sale)).unwrap();

        let mut conn = h.pool().get().unwrap();
        for (session_id, amount) in [("cs_deposit", "100.00"), ("cs_balance", "900.00")] {
            let now = Utc::now();
            diesel::insert_into(stoneserver::core::shared::schema::stripe_checkouts::table)
                .values(&StripeCheckout {
                    id: Uuid::new_v4(),
                    company_id: t.company_id,
                    sale_id,
                    session_id: format!("{session_id}_{}", sale_id.simple()),
                    amount: BigDecimal::from_str(amount).unwrap(),
                    currency: "usd".into(),
                    status: CHECKOUT_OPEN.into(),
                    created_at: now,
                    updated_at: now,
                })
                .execute(&mut conn)
                .unwrap();
        }
        let session = |prefix: &str| StripeCheckoutSession {
            id: format!("{prefix}_{}", sale_id.simple()),
            url: None,
            status: Some("complete".into()),
            payment_status: Some("paid".into()),
            amount_total: None,
            currency: Some("usd".into()),
            metadata: HashMap::new(),
        };

        assert!(complete_checkout(&mut conn, &session("cs_deposit")).unwrap());
        assert!(!complete_checkout(&mut conn, &session("cs_deposit")).unwrap());
        drop(conn);
        let (_, current) = h
            .call(Method::GET, &format!("/api/sales/{sale_id}"), &t.token, None)
            .await;
        assert!(current["paid_date"].is_null());

        let mut conn = h.pool().get().unwrap();
        assert!(complete_checkout(&mut conn, &session("cs_balance")).unwrap());
        drop(conn);
        let (_, current) = h
            .call(Method::GET, &format!("/api/sales/{sale_id}"), &t.token, None)
            .await;
        assert!(current["paid_date"].is_string());
    }
}
