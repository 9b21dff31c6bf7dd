// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Webmention endpoint discovery.
//!
//! Discovery tries, in order:
//! 1. `Link` header of a HEAD response
//! 2. `Link` header of a GET response
//! 3. first `<link>` or `<a>` with `rel="webmention"` in an HTML GET body
//!
//! The endpoint is resolved against the target URL and must satisfy the
//! sender's [`CrossOriginPolicy`].

use crate::domain::domain_matches;
use crate::fetch::{read_body, response_media_type};
use crate::html::start_tags;
use reqwest::{header, Client, Method, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Which discovered endpoints a sender trusts, relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossOriginPolicy {
    /// Same scheme, host and port as the target.
    SameOrigin,
    /// Same scheme; host equal to or a subdomain of the target host.
    SameSite,
    /// Any endpoint.
    #[default]
    CrossOrigin,
}

impl fmt::Display for CrossOriginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SameOrigin => write!(f, "same-origin"),
            Self::SameSite => write!(f, "same-site"),
            Self::CrossOrigin => write!(f, "cross-origin"),
        }
    }
}

impl FromStr for CrossOriginPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "same-origin" => Ok(Self::SameOrigin),
            "same-site" => Ok(Self::SameSite),
            "cross-origin" => Ok(Self::CrossOrigin),
            other => Err(format!("unknown cross-origin policy: {other}")),
        }
    }
}

/// The part of the origin that violated the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDimension {
    Protocol,
    Host,
    Port,
}

impl fmt::Display for PolicyDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol => write!(f, "protocol"),
            Self::Host => write!(f, "host"),
            Self::Port => write!(f, "port"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Endpoint violates {policy} policy: {dimension} expected {expected}, found {found}")]
pub struct PolicyViolation {
    pub policy: CrossOriginPolicy,
    pub dimension: PolicyDimension,
    pub expected: String,
    pub found: String,
}

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No Webmention endpoint found (last status: {})", display_status(.status))]
    NoEndpoint { status: Option<u16> },

    #[error("Discovery request failed (last status: {}): {message}", display_status(.status))]
    Request {
        message: String,
        status: Option<u16>,
    },

    #[error("Invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error(transparent)]
    Policy(#[from] PolicyViolation),
}

impl DiscoveryError {
    /// Last HTTP status seen, if discovery got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NoEndpoint { status } | Self::Request { status, .. } => *status,
            _ => None,
        }
    }
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

/// Cross-origin policy plus the origins exempt from it.
#[derive(Debug, Clone, Default)]
pub struct EndpointPolicy {
    pub policy: CrossOriginPolicy,
    allowed_origins: Vec<Url>,
}

impl EndpointPolicy {
    /// Unparseable `allowed_origins` entries are ignored.
    pub fn new<S: AsRef<str>>(policy: CrossOriginPolicy, allowed_origins: &[S]) -> Self {
        let allowed_origins = allowed_origins
            .iter()
            .filter_map(|o| match Url::parse(o.as_ref()) {
                Ok(url) => Some(url),
                Err(e) => {
                    debug!(origin = o.as_ref(), error = %e, "Ignoring invalid allowed origin");
                    None
                }
            })
            .collect();
        Self {
            policy,
            allowed_origins,
        }
    }

    /// Check a resolved `endpoint` discovered for `target`.
    pub fn check(&self, target: &Url, endpoint: &Url) -> Result<(), PolicyViolation> {
        if self.policy == CrossOriginPolicy::CrossOrigin {
            return Ok(());
        }

        let endpoint_origin = endpoint.origin();
        if self
            .allowed_origins
            .iter()
            .any(|o| o.origin() == endpoint_origin)
        {
            debug!(endpoint = %endpoint, "Endpoint origin explicitly allowed");
            return Ok(());
        }

        let violation = |dimension, expected: String, found: String| PolicyViolation {
            policy: self.policy,
            dimension,
            expected,
            found,
        };

        if target.scheme() != endpoint.scheme() {
            return Err(violation(
                PolicyDimension::Protocol,
                target.scheme().to_string(),
                endpoint.scheme().to_string(),
            ));
        }

        let expected_host = normalize_host(target.host_str().unwrap_or_default());
        let found_host = normalize_host(endpoint.host_str().unwrap_or_default());

        match self.policy {
            CrossOriginPolicy::SameOrigin => {
                if expected_host != found_host {
                    return Err(violation(PolicyDimension::Host, expected_host, found_host));
                }
                let (expected_port, found_port) =
                    (target.port_or_known_default(), endpoint.port_or_known_default());
                if expected_port != found_port {
                    return Err(violation(
                        PolicyDimension::Port,
                        display_port(expected_port),
                        display_port(found_port),
                    ));
                }
            }
            CrossOriginPolicy::SameSite => {
                let site = format!("*.{expected_host}");
                if found_host != expected_host && !domain_matches(&site, &found_host) {
                    return Err(violation(PolicyDimension::Host, expected_host, found_host));
                }
            }
            CrossOriginPolicy::CrossOrigin => {}
        }

        Ok(())
    }
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn display_port(port: Option<u16>) -> String {
    port.map_or_else(|| "none".to_string(), |p| p.to_string())
}

/// Locates a target's Webmention endpoint.
#[derive(Debug, Clone)]
pub struct EndpointDiscoverer {
    client: Client,
    user_agent: String,
    max_body_bytes: usize,
}

impl EndpointDiscoverer {
    pub fn new(client: Client, user_agent: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            max_body_bytes,
        }
    }

    /// Discover the endpoint for `target` and check it against `policy`.
    pub async fn discover(
        &self,
        target: &Url,
        policy: &EndpointPolicy,
    ) -> Result<Url, DiscoveryError> {
        let mut last_status = None;
        let mut found = None;

        match self.request(Method::HEAD, target).await {
            Ok(response) => {
                last_status = Some(response.status().as_u16());
                if response.status().is_success() {
                    found = link_header_endpoint(response.headers());
                }
            }
            Err(e) => debug!(target = %target, error = %e, "HEAD request failed, falling back to GET"),
        }

        if found.is_none() {
            let response = self
                .request(Method::GET, target)
                .await
                .map_err(|e| {
                    debug!(target = %target, status = ?last_status, error = %e, "GET request failed");
                    DiscoveryError::Request {
                        message: e.to_string(),
                        status: last_status,
                    }
                })?;
            last_status = Some(response.status().as_u16());

            if response.status().is_success() {
                found = link_header_endpoint(response.headers());
                if found.is_none() && response_media_type(&response).as_deref() == Some("text/html")
                {
                    let body = read_body(response, self.max_body_bytes)
                        .await
                        .map_err(|e| DiscoveryError::Request {
                            message: e.to_string(),
                            status: last_status,
                        })?;
                    found = html_endpoint(&String::from_utf8_lossy(&body));
                }
            }
        }

        let Some(raw) = found else {
            debug!(target = %target, status = ?last_status, "No Webmention endpoint advertised");
            return Err(DiscoveryError::NoEndpoint {
                status: last_status,
            });
        };

        let endpoint = target
            .join(raw.trim())
            .map_err(|e| DiscoveryError::InvalidEndpoint {
                endpoint: raw.clone(),
                reason: e.to_string(),
            })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(DiscoveryError::InvalidEndpoint {
                endpoint: raw,
                reason: format!("unsupported scheme {}", endpoint.scheme()),
            });
        }

        policy.check(target, &endpoint)?;

        debug!(target = %target, endpoint = %endpoint, "Discovered Webmention endpoint");
        Ok(endpoint)
    }

    async fn request(&self, method: Method, target: &Url) -> reqwest::Result<Response> {
        self.client
            .request(method, target.clone())
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await
    }
}

/// First `rel="webmention"` target across all `Link` headers, in order.
fn link_header_endpoint(headers: &header::HeaderMap) -> Option<String> {
    headers
        .get_all(header::LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(split_link_values)
        .find_map(webmention_link)
}

/// Split a Link header into entries on commas outside `<...>` and quotes.
fn split_link_values(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut in_uri = false;
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '<' if !in_quotes => in_uri = true,
            '>' if !in_quotes => in_uri = false,
            '"' if !in_uri => in_quotes = !in_quotes,
            ',' if !in_uri && !in_quotes => {
                entries.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}

fn webmention_link(entry: &str) -> Option<String> {
    let entry = entry.trim();
    let rest = entry.strip_prefix('<')?;
    let close = rest.find('>')?;
    let uri = &rest[..close];

    let is_webmention = rest[close + 1..].split(';').any(|param| {
        let Some((key, value)) = param.split_once('=') else {
            return false;
        };
        key.trim().eq_ignore_ascii_case("rel")
            && value
                .trim()
                .trim_matches('"')
                .split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case("webmention"))
    });

    is_webmention.then(|| uri.to_string())
}

fn html_endpoint(html: &str) -> Option<String> {
    start_tags(html)
        .filter(|tag| matches!(tag.name.as_str(), "link" | "a") && tag.has_rel("webmention"))
        .find_map(|tag| tag.attr("href").map(str::to_string))
}
