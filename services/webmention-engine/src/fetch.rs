// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outbound HTTP helpers shared by the receiver and the sender.

use reqwest::{header, Client, Response};
use std::time::Duration;
use thiserror::Error;

/// Errors while reading a response body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("response too large (>{0} bytes)")]
    TooLarge(usize),

    #[error("failed to read response body: {0}")]
    Read(#[from] reqwest::Error),
}

/// Build an HTTP client that follows redirects and gives up after `timeout`.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

/// Media type of a Content-Type value, without parameters, lowercased.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

/// Media type of a response, if it declared one.
pub fn response_media_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(media_type)
        .filter(|m| !m.is_empty())
}

/// Read a response body, abandoning it once it exceeds `max_bytes`.
pub async fn read_body(response: Response, max_bytes: usize) -> Result<Vec<u8>, BodyError> {
    if let Some(len) = response.content_length() {
        if len as usize > max_bytes {
            return Err(BodyError::TooLarge(max_bytes));
        }
    }

    let capacity = response
        .content_length()
        .map(|len| (len as usize).min(max_bytes))
        .unwrap_or(8192);
    let mut body = Vec::with_capacity(capacity);
    let mut stream = response;
    while let Some(chunk) = stream.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > max_bytes {
            return Err(BodyError::TooLarge(max_bytes));
        }
    }
    Ok(body)
}

/// Best-effort description of a failed response: its body, else the status text.
pub async fn failure_detail(response: Response) -> String {
    const MAX_DETAIL: usize = 512;

    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("Unknown status")
        .to_string();

    match read_body(response, 64 * 1024).await {
        Ok(body) => {
            let text = String::from_utf8_lossy(&body);
            let text = text.trim();
            if text.is_empty() {
                fallback
            } else {
                text.chars().take(MAX_DETAIL).collect()
            }
        }
        Err(_) => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_strips_parameters() {
        assert_eq!(media_type("text/html; charset=utf-8"), "text/html");
        assert_eq!(media_type("  Application/JSON "), "application/json");
        assert_eq!(media_type("text/plain;format=flowed"), "text/plain");
        assert_eq!(media_type(""), "");
    }
}
