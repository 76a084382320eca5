use serde::{Deserialize, Serialize};

use crate::onboarding::{OnboardingProgress, OnboardingStep};
use crate::session::{SessionClaims, SessionScope};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub scope: &'static str,
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<u64>,
}

impl SessionResponse {
    pub fn new(scope: SessionScope, claims: SessionClaims) -> Self {
        Self {
            scope: scope.as_str(),
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            role: claims.role,
            store_id: claims.store_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct OnboardingResponse {
    pub seller_id: String,
    pub completed: Vec<OnboardingStep>,
    pub next_step: Option<OnboardingStep>,
    pub finished: bool,
}

impl OnboardingResponse {
    pub fn new(seller_id: String, progress: &OnboardingProgress) -> Self {
        Self {
            seller_id,
            completed: progress.completed.iter().copied().collect(),
            next_step: progress.next_step(),
            finished: progress.is_finished(),
        }
    }
}
