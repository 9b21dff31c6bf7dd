// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the Webmention engine.

use crate::discovery::CrossOriginPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default User-Agent for outbound fetches.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "webmention-engine/",
    env!("CARGO_PKG_VERSION"),
    " (Webmention; +https://github.com/hyperpolymath/indieweb2-bastion)"
);

/// Configuration for the Webmention service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Inbound notification handling
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// Outbound notification handling
    #[serde(default)]
    pub sender: SenderConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Receiver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// User-Agent sent when fetching the source
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Attribute an HTML link must carry to count (default: "webmention").
    /// `None` accepts any matching link.
    #[serde(default = "default_require_attribute")]
    pub require_attribute: Option<String>,

    /// URL schemes accepted for source and target (default: http, https)
    #[serde(default = "default_accepted_protocols")]
    pub accepted_protocols: Vec<String>,

    /// Wildcard patterns the target host must match (default: any host)
    #[serde(default)]
    pub accepted_target_domains: Option<Vec<String>>,

    /// Content types advertised in the Accept header when fetching the source
    #[serde(default = "default_accepted_content_types")]
    pub accepted_content_types: Vec<String>,

    /// Reject unregistered extension definitions (default: false)
    #[serde(default)]
    pub ban_unknown_extensions: bool,

    /// Source fetch timeout in milliseconds (default: 10000)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum source body size in bytes (default: 5 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Sender configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Which discovered endpoints are trusted (default: cross-origin)
    #[serde(default)]
    pub cross_origin_policy: CrossOriginPolicy,

    /// Origins exempt from the cross-origin policy
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// User-Agent for discovery and notification requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in milliseconds (default: 10000)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum discovery body size in bytes (default: 5 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_require_attribute() -> Option<String> {
    Some("webmention".to_string())
}

fn default_accepted_protocols() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_accepted_content_types() -> Vec<String> {
    vec![
        "text/html".to_string(),
        "application/json".to_string(),
        "text/plain".to_string(),
    ]
}

fn default_allowed_origins() -> Vec<String> {
    vec!["https://webmention.io".to_string()]
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            receiver: ReceiverConfig::default(),
            sender: SenderConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            require_attribute: default_require_attribute(),
            accepted_protocols: default_accepted_protocols(),
            accepted_target_domains: None,
            accepted_content_types: default_accepted_content_types(),
            ban_unknown_extensions: false,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            cross_origin_policy: CrossOriginPolicy::default(),
            allowed_origins: default_allowed_origins(),
            user_agent: default_user_agent(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl ReceiverConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Value of the Accept header sent when fetching the source.
    pub fn accept_header(&self) -> String {
        self.accepted_content_types.join(", ")
    }

    /// Whether `scheme` is accepted. Entries may be written as `https` or `https:`.
    pub fn accepts_protocol(&self, scheme: &str) -> bool {
        self.accepted_protocols
            .iter()
            .any(|p| p.trim_end_matches(':').eq_ignore_ascii_case(scheme))
    }
}

impl SenderConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
