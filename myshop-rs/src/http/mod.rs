//! HTTP layer: Axum router, handlers, and responses.
//!
//! Exposes seller and customer login/logout/me endpoints backed by signed
//! session cookies, plus the seller onboarding API.

mod auth;
mod error;
mod handlers;
mod responses;
mod state;

#[cfg(test)]
mod tests;

pub use handlers::router;
pub use state::{AppState, Sessions};
