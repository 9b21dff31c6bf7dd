// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outbound Webmention notifications.

use crate::config::SenderConfig;
use crate::discovery::{DiscoveryError, EndpointDiscoverer, EndpointPolicy};
use crate::fetch::{build_client, failure_detail};
use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Send errors.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Notification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Endpoint rejected notification ({code}): {message}")]
    Rejected { message: String, code: u16 },
}

/// Result of a successful notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The endpoint accepted the notification. `location` is set when it
    /// answered `201 Created` with a status URL.
    Accepted { location: Option<String> },
}

/// Sends Webmentions on behalf of a source page.
#[derive(Debug, Clone)]
pub struct Sender {
    client: Client,
    discoverer: EndpointDiscoverer,
    policy: EndpointPolicy,
    user_agent: String,
}

impl Sender {
    pub fn new(config: &SenderConfig) -> reqwest::Result<Self> {
        let client = build_client(config.fetch_timeout())?;

        if !identifies_webmention(&config.user_agent) {
            warn!(
                user_agent = %config.user_agent,
                "User-Agent should include \"Webmention\" so receivers can identify the request"
            );
        }

        Ok(Self {
            discoverer: EndpointDiscoverer::new(
                client.clone(),
                config.user_agent.clone(),
                config.max_body_bytes,
            ),
            client,
            policy: EndpointPolicy::new(config.cross_origin_policy, &config.allowed_origins),
            user_agent: config.user_agent.clone(),
        })
    }

    /// Notify `target` that `source` links to it.
    pub async fn send(&self, source: &Url, target: &Url) -> Result<SendOutcome, SendError> {
        let endpoint = self.discoverer.discover(target, &self.policy).await?;

        debug!(source = %source, target = %target, endpoint = %endpoint, "Sending Webmention");

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("source", source.as_str())
            .append_pair("target", target.as_str())
            .finish();

        let response = self
            .client
            .post(endpoint.clone())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::USER_AGENT, &self.user_agent)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CREATED {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            info!(endpoint = %endpoint, location = ?location, "Webmention created");
            return Ok(SendOutcome::Accepted { location });
        }

        if status.is_success() {
            info!(endpoint = %endpoint, status = status.as_u16(), "Webmention accepted");
            return Ok(SendOutcome::Accepted { location: None });
        }

        let message = failure_detail(response).await;
        warn!(endpoint = %endpoint, status = status.as_u16(), %message, "Webmention rejected");
        Err(SendError::Rejected {
            message,
            code: status.as_u16(),
        })
    }
}

/// Receivers look for "Webmention" in the User-Agent; any casing counts.
fn identifies_webmention(user_agent: &str) -> bool {
    user_agent.to_ascii_lowercase().contains("webmention")
}
