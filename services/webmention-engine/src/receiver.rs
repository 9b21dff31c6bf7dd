// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Inbound Webmention handling.
//!
//! A request moves through these steps and stops at the first failure:
//! 1. method, body and Content-Type checks
//! 2. form decoding
//! 3. `source`/`target` URL and protocol validation
//! 4. extension parsing
//! 5. self-reference check
//! 6. target domain allow-list
//! 7. source fetch
//! 8. content verification
//!
//! Accepted mentions are upserted into the [`MentionStore`]. A source that
//! answers `410 Gone`, or no longer links to the target, removes any stored
//! mention for the pair.

use crate::config::ReceiverConfig;
use crate::domain::matches_any;
use crate::extension::{ExtensionError, ExtensionRegistry, Webmention};
use crate::fetch::{build_client, failure_detail, media_type, read_body, BodyError};
use crate::store::{MentionStore, StoreError};
use crate::verifier::{ContentVerifier, CustomContentCheck, VerifyError};
use http::{Method, StatusCode};
use reqwest::{header, Client};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Receiver errors. Each maps to an HTTP status via [`ReceiveError::status_code`].
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(Method),

    #[error("Missing request body")]
    MissingBody,

    #[error("Invalid Content-Type: expected application/x-www-form-urlencoded, got {actual:?}")]
    InvalidContentType { actual: Option<String> },

    #[error("Malformed form body: not valid UTF-8")]
    MalformedBody,

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid URL format for {param}: {url}")]
    InvalidUrl { param: &'static str, url: String },

    #[error("Unsupported protocol for {param}: {protocol}")]
    UnsupportedProtocol {
        param: &'static str,
        protocol: String,
    },

    #[error(transparent)]
    Extension(#[from] ExtensionError),

    #[error("Source and target must be different URLs")]
    SameSourceAndTarget,

    #[error("Target domain not accepted: {0}")]
    TargetDomainNotAccepted(String),

    #[error("Failed to fetch source: {0}")]
    SourceFetch(String),

    #[error("Source returned {status}: {detail}")]
    SourceStatus { status: u16, detail: String },

    #[error("Source returned an empty body")]
    MissingSourceBody,

    #[error("Source too large (>{0} bytes)")]
    SourceTooLarge(usize),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("Source ({content_type}) does not link to target")]
    TargetNotFound { content_type: String },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ReceiveError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::SourceFetch(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Short label for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::MissingBody | Self::InvalidContentType { .. } | Self::MalformedBody => {
                "invalid_request"
            }
            Self::MissingParameter(_) | Self::InvalidUrl { .. } | Self::UnsupportedProtocol { .. } => {
                "invalid_parameter"
            }
            Self::Extension(_) => "invalid_extension",
            Self::SameSourceAndTarget => "same_source_target",
            Self::TargetDomainNotAccepted(_) => "target_domain",
            Self::SourceFetch(_) => "source_fetch",
            Self::SourceStatus { .. } | Self::MissingSourceBody | Self::SourceTooLarge(_) => {
                "source_unusable"
            }
            Self::Verify(_) => "source_unparseable",
            Self::TargetNotFound { .. } => "target_not_found",
            Self::Storage(_) => "storage",
        }
    }
}

/// The parts of an HTTP request the receiver looks at.
#[derive(Debug, Clone)]
pub struct InboundRequest<'a> {
    pub method: Method,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

/// Outcome of a successfully processed request.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    /// Source links to target; the mention was stored.
    Accepted(Webmention),
    /// Source is gone; any stored mention for the pair was removed.
    Deleted { source: Url, target: Url },
}

enum SourceState {
    Linked,
    Gone,
}

/// Webmention receiver.
pub struct Receiver {
    config: ReceiverConfig,
    client: Client,
    registry: ExtensionRegistry,
    verifier: ContentVerifier,
    store: Arc<dyn MentionStore>,
}

impl Receiver {
    pub fn new(config: ReceiverConfig, store: Arc<dyn MentionStore>) -> reqwest::Result<Self> {
        let client = build_client(config.fetch_timeout())?;
        let verifier = ContentVerifier::new(config.require_attribute.clone());

        Ok(Self {
            config,
            client,
            registry: ExtensionRegistry::new(),
            verifier,
            store,
        })
    }

    /// Install a check for source content types without a built-in strategy.
    pub fn with_custom_check(mut self, check: Arc<dyn CustomContentCheck>) -> Self {
        self.verifier = self.verifier.with_custom_check(check);
        self
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Process a request end to end, including storage.
    pub async fn receive(
        &self,
        request: InboundRequest<'_>,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        let mention = self.validate(request)?;

        match self.check_source(&mention).await {
            Ok(SourceState::Linked) => {
                self.store.insert(&mention).await?;
                info!(
                    source = %mention.source,
                    target = %mention.target,
                    kind = ?mention.extension.kind(),
                    "Webmention accepted"
                );
                Ok(ReceiveOutcome::Accepted(mention))
            }
            Ok(SourceState::Gone) => {
                self.store
                    .delete(mention.source.as_str(), mention.target.as_str())
                    .await?;
                info!(source = %mention.source, target = %mention.target, "Source gone, Webmention deleted");
                Ok(ReceiveOutcome::Deleted {
                    source: mention.source,
                    target: mention.target,
                })
            }
            Err(err @ ReceiveError::TargetNotFound { .. }) => {
                self.store
                    .delete(mention.source.as_str(), mention.target.as_str())
                    .await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Run the request checks that need no network access.
    pub fn validate(&self, request: InboundRequest<'_>) -> Result<Webmention, ReceiveError> {
        if request.method != Method::POST {
            return Err(ReceiveError::MethodNotAllowed(request.method));
        }
        if request.body.is_empty() {
            return Err(ReceiveError::MissingBody);
        }
        self.validate_content_type(request.content_type)?;

        let body = std::str::from_utf8(request.body).map_err(|_| ReceiveError::MalformedBody)?;
        let form = Form::parse(body);

        let source = self.validate_url("source", form.get("source"))?;
        let target = self.validate_url("target", form.get("target"))?;

        let extension = self.registry.parse(
            form.get("definition"),
            form.get("payload"),
            self.config.ban_unknown_extensions,
        )?;

        if source == target {
            debug!(source = %source, "Source and target are identical");
            return Err(ReceiveError::SameSourceAndTarget);
        }

        if let Some(domains) = &self.config.accepted_target_domains {
            let host = target.host_str().unwrap_or_default();
            if !matches_any(domains, host) {
                debug!(host, patterns = ?domains, "Target domain not accepted");
                return Err(ReceiveError::TargetDomainNotAccepted(host.to_string()));
            }
        }

        Ok(Webmention {
            source,
            target,
            extension,
        })
    }

    fn validate_content_type(&self, content_type: Option<&str>) -> Result<(), ReceiveError> {
        let ct = content_type.map(media_type);
        match &ct {
            Some(actual) if actual == FORM_CONTENT_TYPE => Ok(()),
            _ => {
                debug!(content_type = ?ct, "Content-Type invalid");
                Err(ReceiveError::InvalidContentType { actual: ct })
            }
        }
    }

    fn validate_url(&self, param: &'static str, raw: Option<&str>) -> Result<Url, ReceiveError> {
        let raw = match raw {
            Some(s) if !s.trim().is_empty() => s.trim(),
            _ => {
                debug!(param, "Missing parameter");
                return Err(ReceiveError::MissingParameter(param));
            }
        };

        let url = Url::parse(raw).map_err(|_| {
            debug!(param, url = %raw, "Invalid URL format");
            ReceiveError::InvalidUrl {
                param,
                url: raw.to_string(),
            }
        })?;

        if !self.config.accepts_protocol(url.scheme()) {
            debug!(param, url = %raw, "Protocol not accepted");
            return Err(ReceiveError::UnsupportedProtocol {
                param,
                protocol: url.scheme().to_string(),
            });
        }

        if url.host_str().is_none() {
            return Err(ReceiveError::InvalidUrl {
                param,
                url: raw.to_string(),
            });
        }

        Ok(url)
    }

    async fn check_source(&self, mention: &Webmention) -> Result<SourceState, ReceiveError> {
        let response = self
            .client
            .get(mention.source.clone())
            .header(header::USER_AGENT, &self.config.user_agent)
            .header(header::ACCEPT, self.config.accept_header())
            .send()
            .await
            .map_err(|e| {
                debug!(source = %mention.source, error = %e, "Source fetch failed");
                ReceiveError::SourceFetch(e.to_string())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::GONE {
            return Ok(SourceState::Gone);
        }
        if !status.is_success() {
            let detail = failure_detail(response).await;
            debug!(source = %mention.source, status = status.as_u16(), "Source fetch rejected");
            return Err(ReceiveError::SourceStatus {
                status: status.as_u16(),
                detail,
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = read_body(response, self.config.max_body_bytes)
            .await
            .map_err(|e| match e {
                BodyError::TooLarge(max) => ReceiveError::SourceTooLarge(max),
                BodyError::Read(e) => ReceiveError::SourceFetch(e.to_string()),
            })?;
        if body.is_empty() {
            return Err(ReceiveError::MissingSourceBody);
        }

        if self
            .verifier
            .verify(&body, content_type.as_deref(), &mention.target)?
        {
            Ok(SourceState::Linked)
        } else {
            let content_type = content_type
                .as_deref()
                .map(media_type)
                .unwrap_or_else(|| "unknown".to_string());
            debug!(source = %mention.source, target = %mention.target, %content_type, "Target not found in source");
            Err(ReceiveError::TargetNotFound { content_type })
        }
    }
}

/// Decoded form fields. The first occurrence of a key wins.
struct Form {
    pairs: Vec<(String, String)>,
}

impl Form {
    fn parse(body: &str) -> Self {
        Self {
            pairs: url::form_urlencoded::parse(body.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
