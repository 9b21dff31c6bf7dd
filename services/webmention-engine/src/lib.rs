// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Webmention Engine
//!
//! Implements both sides of the Webmention protocol:
//!
//! - Receiving: request validation, source fetch and link verification
//!   for HTML, JSON and plain-text sources
//! - Sending: endpoint discovery via `Link` headers and HTML, with a
//!   configurable cross-origin policy
//! - Extensions: typed payloads (like, comment, mention) with stable
//!   storage ordinals; unknown definitions pass through unchanged
//! - Target domain allow-lists with wildcard patterns

pub mod config;
pub mod discovery;
pub mod domain;
pub mod extension;
pub mod fetch;
pub mod handlers;
pub mod html;
pub mod metrics;
pub mod receiver;
pub mod sender;
pub mod store;
pub mod verifier;

pub use config::Config;
pub use discovery::{CrossOriginPolicy, DiscoveryError, EndpointDiscoverer, EndpointPolicy};
pub use extension::{
    Extension, ExtensionError, ExtensionRegistry, MentionKind, Validated, Webmention,
};
pub use receiver::{InboundRequest, ReceiveError, ReceiveOutcome, Receiver};
pub use sender::{SendError, SendOutcome, Sender};
pub use store::{InMemoryStore, MentionQuery, MentionStore};
pub use verifier::{ContentVerifier, CustomContentCheck, VerifyError};
