// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Webmention extension registry.
//!
//! An extension is identified by a definition URI and carries a JSON payload
//! that must satisfy the definition's schema. Each registered definition owns
//! a stable ordinal ([`MentionKind`]) used for compact storage.
//!
//! The ordinals are append-only: never renumber or remove a variant, since
//! previously stored rows are decoded through the same table.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const LIKE_DEFINITION: &str = "https://webmention.dev/extensions/like";
pub const COMMENT_DEFINITION: &str = "https://webmention.dev/extensions/comment";
pub const MENTION_DEFINITION: &str = "https://webmention.dev/extensions/mention";

/// Extension parsing errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtensionError {
    #[error("Invalid payload: not valid JSON ({0})")]
    InvalidPayloadJson(String),

    #[error("Invalid payload for {definition}: {reason}")]
    InvalidPayload { definition: String, reason: String },

    #[error("Unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("Invalid payload: a payload requires a definition")]
    PayloadWithoutDefinition,

    #[error("Invalid stored kind: {0}")]
    InvalidKind(u8),
}

/// Stable storage ordinal for a mention kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MentionKind {
    Basic = 0,
    Unknown = 1,
    Like = 2,
    Comment = 3,
    Mention = 4,
}

impl MentionKind {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Basic),
            1 => Some(Self::Unknown),
            2 => Some(Self::Like),
            3 => Some(Self::Comment),
            4 => Some(Self::Mention),
            _ => None,
        }
    }
}

/// Author of a reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Url>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LikePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentPayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MentionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

/// A typed payload together with the JSON it was validated from.
///
/// The raw JSON is what gets stored, so URLs and timestamps keep the exact
/// form the sender used.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T> {
    pub data: T,
    pub raw: Value,
}

impl<T: DeserializeOwned> Validated<T> {
    fn from_raw(raw: Value) -> Result<Self, String> {
        let data = serde_json::from_value(raw.clone()).map_err(|e| e.to_string())?;
        Ok(Self { data, raw })
    }
}

/// A parsed extension, or the absence of one.
#[derive(Debug, Clone, PartialEq)]
pub enum Extension {
    Basic,
    Like(Validated<LikePayload>),
    Comment(Validated<CommentPayload>),
    Mention(Validated<MentionPayload>),
    /// Unregistered definition, kept verbatim.
    Unknown {
        definition: String,
        payload: Option<Value>,
    },
}

impl Extension {
    pub fn kind(&self) -> MentionKind {
        match self {
            Self::Basic => MentionKind::Basic,
            Self::Like(_) => MentionKind::Like,
            Self::Comment(_) => MentionKind::Comment,
            Self::Mention(_) => MentionKind::Mention,
            Self::Unknown { .. } => MentionKind::Unknown,
        }
    }

    /// Payload JSON exactly as received.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Basic => None,
            Self::Like(p) => Some(&p.raw),
            Self::Comment(p) => Some(&p.raw),
            Self::Mention(p) => Some(&p.raw),
            Self::Unknown { payload, .. } => payload.as_ref(),
        }
    }

    /// Definition URI carried only by unregistered extensions.
    pub fn unknown_definition(&self) -> Option<&str> {
        match self {
            Self::Unknown { definition, .. } => Some(definition),
            _ => None,
        }
    }
}

/// A validated notification: `source` links to `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct Webmention {
    pub source: Url,
    pub target: Url,
    pub extension: Extension,
}

/// Compact persisted form of a [`Webmention`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMention {
    pub source: String,
    pub target: String,
    pub kind: u8,
    /// Only set for [`MentionKind::Unknown`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Webmention {
    pub fn to_stored(&self, updated_at: chrono::DateTime<chrono::Utc>) -> StoredMention {
        StoredMention {
            source: self.source.to_string(),
            target: self.target.to_string(),
            kind: self.extension.kind().ordinal(),
            definition: self.extension.unknown_definition().map(str::to_string),
            payload: self.extension.payload().cloned(),
            updated_at,
        }
    }
}

/// A stored mention mapped back to its canonical definition URI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedWebmention {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// A registered extension definition.
pub struct ExtensionDefinition {
    pub definition: &'static str,
    pub kind: MentionKind,
    validate: fn(Value) -> Result<Extension, String>,
}

impl std::fmt::Debug for ExtensionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionDefinition")
            .field("definition", &self.definition)
            .field("kind", &self.kind)
            .finish()
    }
}

fn validate_like(value: Value) -> Result<Extension, String> {
    Validated::from_raw(value).map(Extension::Like)
}

fn validate_comment(value: Value) -> Result<Extension, String> {
    let payload: Validated<CommentPayload> = Validated::from_raw(value)?;
    if payload.data.content.trim().is_empty() {
        return Err("content must not be empty".to_string());
    }
    Ok(Extension::Comment(payload))
}

fn validate_mention(value: Value) -> Result<Extension, String> {
    Validated::from_raw(value).map(Extension::Mention)
}

// Append only.
static DEFINITIONS: &[ExtensionDefinition] = &[
    ExtensionDefinition {
        definition: LIKE_DEFINITION,
        kind: MentionKind::Like,
        validate: validate_like,
    },
    ExtensionDefinition {
        definition: COMMENT_DEFINITION,
        kind: MentionKind::Comment,
        validate: validate_comment,
    },
    ExtensionDefinition {
        definition: MENTION_DEFINITION,
        kind: MentionKind::Mention,
        validate: validate_mention,
    },
];

/// Registry of known extension definitions.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionRegistry {
    definitions: &'static [ExtensionDefinition],
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self {
            definitions: DEFINITIONS,
        }
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definitions(&self) -> &'static [ExtensionDefinition] {
        self.definitions
    }

    pub fn lookup(&self, definition: &str) -> Option<&'static ExtensionDefinition> {
        self.definitions.iter().find(|d| d.definition == definition)
    }

    fn lookup_kind(&self, kind: MentionKind) -> Option<&'static ExtensionDefinition> {
        self.definitions.iter().find(|d| d.kind == kind)
    }

    /// Parse the raw `definition` and `payload` fields of a request.
    pub fn parse(
        &self,
        definition: Option<&str>,
        payload: Option<&str>,
        ban_unknown: bool,
    ) -> Result<Extension, ExtensionError> {
        let payload = payload
            .map(|raw| serde_json::from_str::<Value>(raw))
            .transpose()
            .map_err(|e| ExtensionError::InvalidPayloadJson(e.to_string()))?;

        let Some(definition) = definition else {
            if payload.is_some() {
                return Err(ExtensionError::PayloadWithoutDefinition);
            }
            return Ok(Extension::Basic);
        };

        match self.lookup(definition) {
            Some(registered) => {
                let value = payload.unwrap_or_else(|| Value::Object(Default::default()));
                (registered.validate)(value).map_err(|reason| {
                    debug!(definition, %reason, "Extension payload failed validation");
                    ExtensionError::InvalidPayload {
                        definition: definition.to_string(),
                        reason,
                    }
                })
            }
            None if ban_unknown => {
                Err(ExtensionError::UnsupportedExtension(definition.to_string()))
            }
            None => {
                debug!(definition, "Keeping unregistered extension verbatim");
                Ok(Extension::Unknown {
                    definition: definition.to_string(),
                    payload,
                })
            }
        }
    }

    /// Map a stored row back to its canonical definition URI and payload.
    pub fn reparse(&self, stored: &StoredMention) -> Result<NormalizedWebmention, ExtensionError> {
        let kind =
            MentionKind::from_ordinal(stored.kind).ok_or(ExtensionError::InvalidKind(stored.kind))?;

        let definition = match kind {
            MentionKind::Basic => None,
            MentionKind::Unknown => stored.definition.clone(),
            registered => Some(
                self.lookup_kind(registered)
                    .ok_or(ExtensionError::InvalidKind(stored.kind))?
                    .definition
                    .to_string(),
            ),
        };

        Ok(NormalizedWebmention {
            source: stored.source.clone(),
            target: stored.target.clone(),
            definition,
            payload: stored.payload.clone(),
        })
    }
}
