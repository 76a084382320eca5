use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::session::{SessionClaims, SessionScope};

use super::error::ApiError;
use super::state::AppState;

/// Claims from the `scope` cookie, or `Unauthorized` for any failure.
pub fn require_session(
    state: &AppState,
    jar: &CookieJar,
    scope: SessionScope,
) -> Result<SessionClaims, ApiError> {
    let claims = jar
        .get(scope.cookie_name())
        .and_then(|cookie| state.sessions.signer(scope).verify_claims(cookie.value()));

    match claims {
        Some(claims) => {
            debug!(scope = scope.as_str(), sub = %claims.sub, "session accepted");
            Ok(claims)
        }
        None => {
            debug!(scope = scope.as_str(), "no valid session");
            Err(ApiError::Unauthorized)
        }
    }
}
