use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::GlobalKeyExtractor,
    GovernorLayer,
};
use tracing::{error, info, warn};

use crate::accounts::Account;
use crate::onboarding::{OnboardingProgress, OnboardingStep, StoreError};
use crate::session::{removal_cookie, session_cookie, SessionScope};

use super::auth::require_session;
use super::error::ApiError;
use super::responses::{
    HealthResponse, LoginRequest, LogoutResponse, OnboardingResponse, SessionResponse,
};
use super::state::AppState;

#[allow(clippy::expect_used)]
pub fn router(state: AppState) -> Router {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(20)
            .burst_size(50)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .expect("default governor config is valid"),
    );

    Router::new()
        .route("/health", get(health))
        .route("/api/seller/login", post(seller_login))
        .route("/api/seller/logout", post(seller_logout))
        .route("/api/seller/me", get(seller_me))
        .route(
            "/api/seller/onboarding",
            get(onboarding_progress).delete(onboarding_reset),
        )
        .route("/api/seller/onboarding/{step}", post(onboarding_complete))
        .route("/api/customer/login", post(customer_login))
        .route("/api/customer/logout", post(customer_logout))
        .route("/api/customer/me", get(customer_me))
        .layer(GovernorLayer::new(governor_conf))
        .layer(tower_http::request_id::PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(
            tower_http::request_id::SetRequestIdLayer::new(
                axum::http::header::HeaderName::from_static("x-request-id"),
                tower_http::request_id::MakeRequestUuid::default(),
            ),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn authenticate<'a>(
    state: &'a AppState,
    scope: SessionScope,
    request: &LoginRequest,
) -> Option<&'a Account> {
    match scope {
        SessionScope::Seller => state
            .accounts
            .authenticate_seller(&request.email, &request.password),
        SessionScope::Customer => state
            .accounts
            .authenticate_customer(&request.email, &request.password),
    }
}

fn login(
    state: &AppState,
    jar: CookieJar,
    scope: SessionScope,
    request: LoginRequest,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let Some(account) = authenticate(state, scope, &request) else {
        warn!(scope = scope.as_str(), "login rejected");
        return Err(ApiError::InvalidCredentials);
    };

    let claims = account.claims();
    let token = state
        .sessions
        .signer(scope)
        .sign_claims(&claims)
        .map_err(|err| {
            error!(scope = scope.as_str(), error = %err, "failed to sign session");
            ApiError::Internal
        })?;
    info!(scope = scope.as_str(), sub = %claims.sub, "login succeeded");

    let cookie = session_cookie(scope, token, state.sessions.secure_cookies);
    Ok((jar.add(cookie), Json(SessionResponse::new(scope, claims))))
}

fn logout(jar: CookieJar, scope: SessionScope) -> (CookieJar, Json<LogoutResponse>) {
    info!(scope = scope.as_str(), "logout");
    (
        jar.remove(removal_cookie(scope)),
        Json(LogoutResponse { success: true }),
    )
}

fn me(
    state: &AppState,
    jar: &CookieJar,
    scope: SessionScope,
) -> Result<Json<SessionResponse>, ApiError> {
    let claims = require_session(state, jar, scope)?;
    Ok(Json(SessionResponse::new(scope, claims)))
}

async fn seller_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    login(&state, jar, SessionScope::Seller, request)
}

async fn seller_logout(jar: CookieJar) -> (CookieJar, Json<LogoutResponse>) {
    logout(jar, SessionScope::Seller)
}

async fn seller_me(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<SessionResponse>, ApiError> {
    me(&state, &jar, SessionScope::Seller)
}

async fn customer_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    login(&state, jar, SessionScope::Customer, request)
}

async fn customer_logout(jar: CookieJar) -> (CookieJar, Json<LogoutResponse>) {
    logout(jar, SessionScope::Customer)
}

async fn customer_me(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<SessionResponse>, ApiError> {
    me(&state, &jar, SessionScope::Customer)
}

fn store_unavailable<'a>(
    operation: &'static str,
    seller_id: &'a str,
) -> impl FnOnce(StoreError) -> ApiError + 'a {
    move |err| {
        error!(operation, seller_id, error = %err, "onboarding store unavailable");
        ApiError::Unavailable
    }
}

async fn load_progress(
    state: &AppState,
    seller_id: &str,
) -> Result<OnboardingProgress, ApiError> {
    state
        .retry
        .run(|| state.onboarding.load(seller_id))
        .await
        .map_err(store_unavailable("load", seller_id))
}

async fn onboarding_progress(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<OnboardingResponse>, ApiError> {
    let claims = require_session(&state, &jar, SessionScope::Seller)?;
    let progress = load_progress(&state, &claims.sub).await?;
    Ok(Json(OnboardingResponse::new(claims.sub, &progress)))
}

async fn onboarding_complete(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(step): Path<String>,
) -> Result<Json<OnboardingResponse>, ApiError> {
    let claims = require_session(&state, &jar, SessionScope::Seller)?;
    let step: OnboardingStep = step.parse().map_err(|_| ApiError::UnknownStep)?;

    let progress = state
        .retry
        .run(|| state.onboarding.complete(&claims.sub, step))
        .await
        .map_err(store_unavailable("complete", &claims.sub))?;
    info!(seller_id = %claims.sub, step = step.as_str(), "onboarding step completed");
    Ok(Json(OnboardingResponse::new(claims.sub, &progress)))
}

async fn onboarding_reset(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<OnboardingResponse>, ApiError> {
    let claims = require_session(&state, &jar, SessionScope::Seller)?;
    state
        .retry
        .run(|| state.onboarding.clear(&claims.sub))
        .await
        .map_err(store_unavailable("clear", &claims.sub))?;
    info!(seller_id = %claims.sub, "onboarding progress reset");
    Ok(Json(OnboardingResponse::new(
        claims.sub,
        &OnboardingProgress::default(),
    )))
}
