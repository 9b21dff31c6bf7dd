// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Webmention Service
//!
//! Receives Webmentions on `POST /webmention`, verifies that the source
//! really links to the target and stores accepted mentions. Sends
//! Webmentions on `POST /send`, discovering the target's endpoint first.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `WEBMENTION_USER_AGENT`: User-Agent for outbound requests
//! - `REQUIRE_ATTRIBUTE`: Attribute a source link must carry; empty disables (default: webmention)
//! - `ACCEPTED_TARGET_DOMAINS`: Comma-separated wildcard patterns for target hosts (default: any)
//! - `BAN_UNKNOWN_EXTENSIONS`: Reject unregistered extension definitions (default: false)
//! - `CROSS_ORIGIN_POLICY`: same-origin, same-site or cross-origin (default: cross-origin)
//! - `ALLOWED_ORIGINS`: Comma-separated origins exempt from the policy (default: https://webmention.io)
//! - `FETCH_TIMEOUT_MS`: Outbound request timeout in milliseconds (default: 10000)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webmention_engine::{
    config::Config,
    handlers::{router, AppState},
    metrics::Metrics,
    receiver::Receiver,
    sender::Sender,
    store::InMemoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = load_config();
    info!(
        bind_addr = %config.bind_addr,
        require_attribute = ?config.receiver.require_attribute,
        accepted_target_domains = ?config.receiver.accepted_target_domains,
        cross_origin_policy = %config.sender.cross_origin_policy,
        "Starting Webmention service"
    );

    let store = Arc::new(InMemoryStore::new());
    let receiver = Receiver::new(config.receiver.clone(), store)?;
    let sender = Sender::new(&config.sender)?;
    let metrics = if config.metrics.enabled {
        Some(Metrics::new()?)
    } else {
        None
    };

    let state = Arc::new(AppState {
        receiver,
        sender,
        metrics,
        config: config.clone(),
    });

    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Load configuration from environment variables.
fn load_config() -> Config {
    let mut config = Config::default();

    if let Ok(addr) = std::env::var("BIND_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(ua) = std::env::var("WEBMENTION_USER_AGENT") {
        config.receiver.user_agent = ua.clone();
        config.sender.user_agent = ua;
    }
    if let Ok(attr) = std::env::var("REQUIRE_ATTRIBUTE") {
        let attr = attr.trim();
        config.receiver.require_attribute = (!attr.is_empty()).then(|| attr.to_string());
    }
    if let Ok(domains) = std::env::var("ACCEPTED_TARGET_DOMAINS") {
        config.receiver.accepted_target_domains = Some(split_list(&domains));
    }
    if let Some(ban) = std::env::var("BAN_UNKNOWN_EXTENSIONS")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.receiver.ban_unknown_extensions = ban;
    }
    if let Ok(policy) = std::env::var("CROSS_ORIGIN_POLICY") {
        match policy.parse() {
            Ok(policy) => config.sender.cross_origin_policy = policy,
            Err(e) => warn!(error = %e, "Ignoring CROSS_ORIGIN_POLICY"),
        }
    }
    if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
        config.sender.allowed_origins = split_list(&origins);
    }
    if let Some(timeout) = std::env::var("FETCH_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.receiver.fetch_timeout_ms = timeout;
        config.sender.fetch_timeout_ms = timeout;
    }

    config
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
