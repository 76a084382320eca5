//! Signed session tokens for seller and customer cookies.
//!
//! ## Token format
//!
//! ```text
//! base64url(payload) "." base64url(hmac_sha256(key, payload))
//! ```
//!
//! The payload is the JSON text of [`SessionClaims`]. Base64 uses the URL-safe
//! alphabet without padding so the token can be placed in a cookie verbatim.
//!
//! Each [`SessionScope`] derives its own key from the server secret, so a
//! customer token never verifies under the seller signer and vice versa.
//! Verification failures of any kind collapse to `None`.

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_MAX_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScope {
    Seller,
    Customer,
}

impl SessionScope {
    pub fn cookie_name(self) -> &'static str {
        match self {
            SessionScope::Seller => "myshop_session",
            SessionScope::Customer => "myshop_customer",
        }
    }

    fn key_suffix(self) -> &'static str {
        match self {
            SessionScope::Seller => ":seller",
            SessionScope::Customer => ":customer",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionScope::Seller => "seller",
            SessionScope::Customer => "customer",
        }
    }
}

/// Principal carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<u64>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session secret is not a usable hmac key")]
    InvalidKey,
    #[error("failed to encode session claims: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct SessionSigner {
    scope: SessionScope,
    mac: HmacSha256,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn new(secret: &str, scope: SessionScope) -> Result<Self, SessionError> {
        let key = format!("{secret}{}", scope.key_suffix());
        let mac =
            HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| SessionError::InvalidKey)?;
        Ok(Self { scope, mac })
    }

    pub fn sign(&self, payload: &str) -> String {
        let signature = self.signature(payload.as_bytes());
        format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            BASE64_URL_SAFE_NO_PAD.encode(signature)
        )
    }

    pub fn verify(&self, token: &str) -> Option<String> {
        let mut parts = token.split('.');
        let (encoded_payload, encoded_signature) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let payload = BASE64_URL_SAFE_NO_PAD.decode(encoded_payload).ok()?;
        let provided = BASE64_URL_SAFE_NO_PAD.decode(encoded_signature).ok()?;
        let expected = self.signature(&payload);

        if !bool::from(expected.ct_eq(provided.as_slice())) {
            return None;
        }
        String::from_utf8(payload).ok()
    }

    pub fn sign_claims(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        let payload = serde_json::to_string(claims)?;
        Ok(self.sign(&payload))
    }

    pub fn verify_claims(&self, token: &str) -> Option<SessionClaims> {
        let payload = self.verify(token)?;
        serde_json::from_str(&payload).ok()
    }

    fn signature(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Cookie carrying a freshly signed token for `scope`.
pub fn session_cookie(scope: SessionScope, token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((scope.cookie_name(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(cookie::time::Duration::days(SESSION_MAX_AGE_DAYS))
        .build()
}

/// Cookie that, when removed from a jar, expires the session for `scope`.
pub fn removal_cookie(scope: SessionScope) -> Cookie<'static> {
    Cookie::build(scope.cookie_name()).path("/").build()
}
