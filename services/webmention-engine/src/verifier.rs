// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Source document verification.
//!
//! Decides whether a fetched source document links to the target, with one
//! strategy per content type:
//! - `text/html`: an `<a href>` or `<img|audio|video src>` equal to the target
//! - `application/json`: any string leaf equal to the target
//! - `text/plain`: the target appears as a substring
//! - anything else: delegated to a [`CustomContentCheck`], if installed
//!
//! HTML and text bodies are decoded lossily whatever their declared charset.
//! Target URLs are ASCII once serialized, so undecodable bytes never take
//! part in a match.

use crate::fetch::media_type;
use crate::html::start_tags;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Verification errors. A document that parses but lacks the link is not an
/// error; it yields `Ok(false)`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VerifyError {
    #[error("Source body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Unsupported source content type: {0}")]
    UnsupportedContentType(String),
}

/// Hook for content types without a built-in strategy.
pub trait CustomContentCheck: Send + Sync {
    fn check(&self, content_type: &str, body: &[u8], target: &Url) -> bool;
}

impl<F> CustomContentCheck for F
where
    F: Fn(&str, &[u8], &Url) -> bool + Send + Sync,
{
    fn check(&self, content_type: &str, body: &[u8], target: &Url) -> bool {
        self(content_type, body, target)
    }
}

/// Checks fetched documents for a link to the target.
#[derive(Clone, Default)]
pub struct ContentVerifier {
    require_attribute: Option<String>,
    custom_check: Option<Arc<dyn CustomContentCheck>>,
}

impl std::fmt::Debug for ContentVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentVerifier")
            .field("require_attribute", &self.require_attribute)
            .field("custom_check", &self.custom_check.is_some())
            .finish()
    }
}

impl ContentVerifier {
    /// `require_attribute` limits HTML matches to tags carrying that attribute.
    pub fn new(require_attribute: Option<String>) -> Self {
        Self {
            require_attribute,
            custom_check: None,
        }
    }

    pub fn with_custom_check(mut self, check: Arc<dyn CustomContentCheck>) -> Self {
        self.custom_check = Some(check);
        self
    }

    /// Check `document` for a link to `target`.
    pub fn verify(
        &self,
        document: &[u8],
        content_type: Option<&str>,
        target: &Url,
    ) -> Result<bool, VerifyError> {
        let media = content_type.map(media_type).unwrap_or_default();

        let found = match media.as_str() {
            "text/html" => self.verify_html(&String::from_utf8_lossy(document), target),
            "application/json" => verify_json(document, target)?,
            "text/plain" => String::from_utf8_lossy(document).contains(target.as_str()),
            _ => match &self.custom_check {
                Some(check) => check.check(&media, document, target),
                None => {
                    let shown = if media.is_empty() { "(none)".to_string() } else { media.clone() };
                    return Err(VerifyError::UnsupportedContentType(shown));
                }
            },
        };

        debug!(content_type = %media, target = %target, found, "Verified source document");
        Ok(found)
    }

    fn verify_html(&self, html: &str, target: &Url) -> bool {
        start_tags(html).any(|tag| {
            let link = match tag.name.as_str() {
                "a" => tag.attr("href"),
                "img" | "audio" | "video" => tag.attr("src"),
                _ => None,
            };

            let Some(link) = link else {
                return false;
            };
            if let Some(required) = &self.require_attribute {
                if !tag.has_attr(required) {
                    return false;
                }
            }
            link_matches(link, target)
        })
    }
}

fn link_matches(link: &str, target: &Url) -> bool {
    let link = link.trim();
    link == target.as_str() || Url::parse(link).map(|u| &u == target).unwrap_or(false)
}

fn verify_json(document: &[u8], target: &Url) -> Result<bool, VerifyError> {
    let value: Value =
        serde_json::from_slice(document).map_err(|e| VerifyError::MalformedJson(e.to_string()))?;
    Ok(contains_string(&value, target.as_str()))
}

fn contains_string(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s == needle,
        Value::Array(items) => items.iter().any(|v| contains_string(v, needle)),
        Value::Object(map) => map.values().any(|v| contains_string(v, needle)),
        _ => false,
    }
}
