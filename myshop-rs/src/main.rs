//! # myshop-rs
//!
//! Session and onboarding service for the MyShop storefront.
//!
//! Sellers and customers sign in with credentials from an accounts file and
//! receive a signed, HTTP-only session cookie. Seller onboarding progress is
//! persisted per seller and every storage call is retried with backoff.
//!
//! ## Architecture
//!
//! - **Session**: HMAC-SHA256 signed cookie tokens, one key per principal scope
//! - **Retry**: bounded exponential backoff around transient storage calls
//! - **Accounts**: TOML-based credentials with constant-time password comparison
//! - **Onboarding**: per-seller progress behind an injected store
//! - **HTTP**: Axum router with rate limiting, request IDs, and graceful shutdown

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

mod accounts;
mod config;
mod http;
mod onboarding;
mod retry;
mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::serve;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::accounts::load_accounts;
use crate::config::{AppConfig, Cli};
use crate::http::{router, AppState, Sessions};
use crate::onboarding::{FileOnboardingStore, MemoryOnboardingStore, OnboardingStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().context("failed to initialize logging")?;

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli).context("failed to load configuration")?;
    let accounts =
        load_accounts(config.accounts_file.as_deref()).context("failed to load accounts file")?;
    info!(
        bind = %config.bind,
        data_dir = %config.data_dir.display(),
        production = config.production,
        ephemeral = config.ephemeral,
        sellers = accounts.seller_count(),
        customers = accounts.customer_count(),
        accounts_file = ?config.accounts_file.as_ref().map(|path| path.display().to_string()),
        retry_attempts = config.retry.max_attempts,
        retry_base_delay_ms = config.retry.base_delay.as_millis() as u64,
        "configuration loaded"
    );
    if config.accounts_file.is_none() {
        warn!("no accounts file configured; every login will be rejected");
    }
    if !config.production {
        warn!("production mode off; session cookies are sent without Secure");
    }

    let onboarding: Arc<dyn OnboardingStore> = if config.ephemeral {
        Arc::new(MemoryOnboardingStore::new())
    } else {
        Arc::new(FileOnboardingStore::new(&config.data_dir))
    };

    let sessions = Sessions::new(&config.session_secret, config.secure_cookies())
        .context("failed to initialize session signers")?;

    let state = AppState {
        accounts: Arc::new(accounts),
        sessions: Arc::new(sessions),
        onboarding,
        retry: config.retry,
    };

    let app = router(state);
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let shutdown = tokio::signal::ctrl_c();
    info!(bind = %config.bind, "myshop-rs listening");

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = shutdown.await;
        info!("shutting down gracefully");
    })
    .await
    .context("server exited with error")
}

/// Initialize tracing subscriber with `RUST_LOG` env filter (default: `info`).
fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
