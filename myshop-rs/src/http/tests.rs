#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::module_inception)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use cookie::{Cookie, SameSite};
    use serde_json::{json, Value};

    use crate::accounts::{Account, AccountDirectory};
    use crate::http::{router, AppState, Sessions};
    use crate::onboarding::{
        FileOnboardingStore, MemoryOnboardingStore, OnboardingProgress, OnboardingStep,
        OnboardingStore, StoreError,
    };
    use crate::retry::RetryPolicy;
    use crate::session::SESSION_MAX_AGE_DAYS;

    const SECRET: &str = "http-test-secret-0123456789";

    fn seller(id: &str, email: &str, store_id: u64) -> Account {
        Account {
            id: String::from(id),
            email: String::from(email),
            name: String::from("Corner Bakery"),
            password: String::from("bread"),
            role: Some(String::from("owner")),
            store_id: Some(store_id),
        }
    }

    fn customer() -> Account {
        Account {
            id: String::from("c-1"),
            email: String::from("buyer@example.com"),
            name: String::from("Sam Buyer"),
            password: String::from("hunter2"),
            role: None,
            store_id: None,
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    fn test_app_state(
        onboarding: Arc<dyn OnboardingStore>,
        retry: RetryPolicy,
        secure_cookies: bool,
    ) -> AppState {
        AppState {
            accounts: Arc::new(AccountDirectory::new(
                vec![
                    seller("17", "owner@example.com", 4),
                    seller("18", "other@example.com", 5),
                ],
                vec![customer()],
            )),
            sessions: Arc::new(Sessions::new(SECRET, secure_cookies).unwrap()),
            onboarding,
            retry,
        }
    }

    fn test_server() -> Result<TestServer> {
        let state = test_app_state(Arc::new(MemoryOnboardingStore::new()), fast_retry(3), false);
        Ok(TestServer::new(router(state))?)
    }

    async fn login(
        server: &TestServer,
        scope: &str,
        email: &str,
        password: &str,
        cookie_name: &str,
    ) -> Cookie<'static> {
        let response = server
            .post(&format!("/api/{scope}/login"))
            .json(&json!({ "email": email, "password": password }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        response.cookie(cookie_name)
    }

    /// Fails the first `failures` calls, then delegates to memory.
    #[derive(Debug)]
    struct FlakyStore {
        inner: MemoryOnboardingStore,
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryOnboardingStore::new(),
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn trip(&self) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining == 0 {
                return Ok(());
            }
            self.failures.store(remaining - 1, Ordering::SeqCst);
            Err(StoreError::Io {
                path: String::from("onboarding"),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ),
            })
        }
    }

    #[async_trait]
    impl OnboardingStore for FlakyStore {
        async fn load(&self, seller_id: &str) -> Result<OnboardingProgress, StoreError> {
            self.trip()?;
            self.inner.load(seller_id).await
        }

        async fn save(
            &self,
            seller_id: &str,
            progress: &OnboardingProgress,
        ) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.save(seller_id, progress).await
        }

        async fn complete(
            &self,
            seller_id: &str,
            step: OnboardingStep,
        ) -> Result<OnboardingProgress, StoreError> {
            self.trip()?;
            self.inner.complete(seller_id, step).await
        }

        async fn clear(&self, seller_id: &str) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.clear(seller_id).await
        }
    }

    #[tokio::test]
    async fn health_returns_ok() -> Result<()> {
        let server = test_server()?;
        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body.get("status"), Some(&Value::String("ok".into())));
        Ok(())
    }

    #[tokio::test]
    async fn responses_carry_request_id() -> Result<()> {
        let server = test_server()?;
        let response = server.get("/health").await;
        assert!(!response.header("x-request-id").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn seller_login_sets_session_cookie() -> Result<()> {
        let server = test_server()?;
        let cookie = login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;

        assert!(!cookie.value().is_empty());
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_ne!(cookie.secure(), Some(true));
        assert_eq!(
            cookie.max_age(),
            Some(cookie::time::Duration::days(SESSION_MAX_AGE_DAYS))
        );
        Ok(())
    }

    #[tokio::test]
    async fn production_cookies_are_secure() -> Result<()> {
        let state = test_app_state(Arc::new(MemoryOnboardingStore::new()), fast_retry(3), true);
        let server = TestServer::new(router(state))?;
        let cookie = login(
            &server,
            "customer",
            "buyer@example.com",
            "hunter2",
            "myshop_customer",
        )
        .await;
        assert_eq!(cookie.secure(), Some(true));
        Ok(())
    }

    #[tokio::test]
    async fn session_cookie_identifies_seller() -> Result<()> {
        let server = test_server()?;
        let cookie = login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;

        let response = server.get("/api/seller/me").add_cookie(cookie).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["scope"], "seller");
        assert_eq!(body["id"], "17");
        assert_eq!(body["email"], "owner@example.com");
        assert_eq!(body["role"], "owner");
        assert_eq!(body["store_id"], 4);
        Ok(())
    }

    #[tokio::test]
    async fn customer_session_round_trip() -> Result<()> {
        let server = test_server()?;
        let cookie =
            login(&server, "customer", "buyer@example.com", "hunter2", "myshop_customer").await;

        let response = server.get("/api/customer/me").add_cookie(cookie).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["scope"], "customer");
        assert_eq!(body["id"], "c-1");
        assert!(body.get("store_id").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn bad_credentials_share_one_response() -> Result<()> {
        let server = test_server()?;

        let wrong_password = server
            .post("/api/seller/login")
            .json(&json!({ "email": "owner@example.com", "password": "cake" }))
            .await;
        let unknown_email = server
            .post("/api/seller/login")
            .json(&json!({ "email": "nobody@example.com", "password": "bread" }))
            .await;
        let customer_as_seller = server
            .post("/api/seller/login")
            .json(&json!({ "email": "buyer@example.com", "password": "hunter2" }))
            .await;

        for response in [wrong_password, unknown_email, customer_as_seller] {
            assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
            let body: Value = response.json();
            assert_eq!(body["error"], "invalid email or password");
            assert!(response.cookies().get("myshop_session").is_none());
        }
        Ok(())
    }

    #[tokio::test]
    async fn missing_and_tampered_sessions_look_identical() -> Result<()> {
        let server = test_server()?;
        let cookie = login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;

        let mut tampered_value = cookie.value().to_string();
        let last = tampered_value.pop().unwrap();
        tampered_value.push(if last == 'A' { 'B' } else { 'A' });

        let missing = server.get("/api/seller/me").await;
        let tampered = server
            .get("/api/seller/me")
            .add_cookie(Cookie::new("myshop_session", tampered_value))
            .await;
        let garbage = server
            .get("/api/seller/me")
            .add_cookie(Cookie::new("myshop_session", "not-a-token"))
            .await;

        for response in [missing, tampered, garbage] {
            assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
            let body: Value = response.json();
            assert_eq!(body, json!({ "error": "unauthorized" }));
        }
        Ok(())
    }

    #[tokio::test]
    async fn seller_and_customer_tokens_are_not_interchangeable() -> Result<()> {
        let server = test_server()?;
        let seller_cookie =
            login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;
        let customer_cookie =
            login(&server, "customer", "buyer@example.com", "hunter2", "myshop_customer").await;

        let customer_token_as_seller = server
            .get("/api/seller/me")
            .add_cookie(Cookie::new(
                "myshop_session",
                customer_cookie.value().to_string(),
            ))
            .await;
        assert_eq!(
            customer_token_as_seller.status_code(),
            StatusCode::UNAUTHORIZED
        );

        let seller_token_as_customer = server
            .get("/api/customer/me")
            .add_cookie(Cookie::new(
                "myshop_customer",
                seller_cookie.value().to_string(),
            ))
            .await;
        assert_eq!(
            seller_token_as_customer.status_code(),
            StatusCode::UNAUTHORIZED
        );

        let customer_cookie_on_seller_route = server
            .get("/api/seller/onboarding")
            .add_cookie(customer_cookie)
            .await;
        assert_eq!(
            customer_cookie_on_seller_route.status_code(),
            StatusCode::UNAUTHORIZED
        );
        Ok(())
    }

    #[tokio::test]
    async fn logout_expires_cookie() -> Result<()> {
        let server = test_server()?;
        let cookie = login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;

        let response = server.post("/api/seller/logout").add_cookie(cookie).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let removal = response.cookie("myshop_session");
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(cookie::time::Duration::ZERO));
        Ok(())
    }

    #[tokio::test]
    async fn onboarding_progress_is_scoped_to_session_seller() -> Result<()> {
        let server = test_server()?;
        let owner = login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;
        let other = login(&server, "seller", "other@example.com", "bread", "myshop_session").await;

        let empty = server
            .get("/api/seller/onboarding")
            .add_cookie(owner.clone())
            .await;
        assert_eq!(empty.status_code(), StatusCode::OK);
        let body: Value = empty.json();
        assert_eq!(body["seller_id"], "17");
        assert_eq!(body["completed"], json!([]));
        assert_eq!(body["next_step"], "store_profile");
        assert_eq!(body["finished"], false);

        let done = server
            .post("/api/seller/onboarding/store_profile")
            .add_cookie(owner.clone())
            .await;
        assert_eq!(done.status_code(), StatusCode::OK);
        let body: Value = done.json();
        assert_eq!(body["completed"], json!(["store_profile"]));
        assert_eq!(body["next_step"], "first_product");

        let repeated = server
            .post("/api/seller/onboarding/store_profile")
            .add_cookie(owner.clone())
            .await;
        let body: Value = repeated.json();
        assert_eq!(body["completed"], json!(["store_profile"]));

        let other_progress = server.get("/api/seller/onboarding").add_cookie(other).await;
        let body: Value = other_progress.json();
        assert_eq!(body["seller_id"], "18");
        assert_eq!(body["completed"], json!([]));

        let reset = server
            .delete("/api/seller/onboarding")
            .add_cookie(owner.clone())
            .await;
        assert_eq!(reset.status_code(), StatusCode::OK);
        let after = server.get("/api/seller/onboarding").add_cookie(owner).await;
        let body: Value = after.json();
        assert_eq!(body["completed"], json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn onboarding_rejects_unknown_step() -> Result<()> {
        let server = test_server()?;
        let owner = login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;

        let response = server
            .post("/api/seller/onboarding/celebrate")
            .add_cookie(owner)
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let anonymous = server.post("/api/seller/onboarding/launch").await;
        assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn onboarding_survives_transient_store_failures() -> Result<()> {
        let store = Arc::new(FlakyStore::new(2));
        let state = test_app_state(store.clone(), fast_retry(3), false);
        let server = TestServer::new(router(state))?;
        let owner = login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;

        let response = server.get("/api/seller/onboarding").add_cookie(owner).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(store.calls(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn onboarding_reports_unavailable_after_retries() -> Result<()> {
        let store = Arc::new(FlakyStore::new(u32::MAX));
        let state = test_app_state(store.clone(), fast_retry(4), false);
        let server = TestServer::new(router(state))?;
        let owner = login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;

        let response = server
            .post("/api/seller/onboarding/payments")
            .add_cookie(owner)
            .await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["error"], "database unavailable");
        assert_eq!(store.calls(), 4);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_step_completions_are_all_kept() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(FileOnboardingStore::new(dir.path()));
        let state = test_app_state(store, fast_retry(3), false);
        let server = TestServer::new(router(state))?;
        let owner = login(&server, "seller", "owner@example.com", "bread", "myshop_session").await;

        let complete = |step: &'static str| {
            let request = server
                .post(&format!("/api/seller/onboarding/{step}"))
                .add_cookie(owner.clone());
            async move { request.await.status_code() }
        };
        let statuses = tokio::join!(
            complete("store_profile"),
            complete("first_product"),
            complete("payments"),
            complete("shipping"),
            complete("launch"),
        );
        assert_eq!(
            statuses,
            (
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::OK,
            )
        );

        let after = server.get("/api/seller/onboarding").add_cookie(owner).await;
        let body: Value = after.json();
        assert_eq!(
            body["completed"],
            json!(["store_profile", "first_product", "payments", "shipping", "launch"])
        );
        assert_eq!(body["finished"], true);
        Ok(())
    }
}
