use std::sync::Arc;

use crate::accounts::AccountDirectory;
use crate::onboarding::OnboardingStore;
use crate::retry::RetryPolicy;
use crate::session::{SessionError, SessionScope, SessionSigner};

/// The two session signers. Each scope gets its own key.
#[derive(Debug, Clone)]
pub struct Sessions {
    pub seller: SessionSigner,
    pub customer: SessionSigner,
    pub secure_cookies: bool,
}

impl Sessions {
    pub fn new(secret: &str, secure_cookies: bool) -> Result<Self, SessionError> {
        Ok(Self {
            seller: SessionSigner::new(secret, SessionScope::Seller)?,
            customer: SessionSigner::new(secret, SessionScope::Customer)?,
            secure_cookies,
        })
    }

    pub fn signer(&self, scope: SessionScope) -> &SessionSigner {
        match scope {
            SessionScope::Seller => &self.seller,
            SessionScope::Customer => &self.customer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub accounts: Arc<AccountDirectory>,
    pub sessions: Arc<Sessions>,
    pub onboarding: Arc<dyn OnboardingStore>,
    pub retry: RetryPolicy,
}
