//! Content-addressed cell attachments
//!
//! A markdown cell can embed binary payloads (typically pasted or dropped
//! images) directly in its persisted data. Each attachment is keyed by a
//! name, holds exactly one MIME type with a base64 payload, and is
//! referenced from the cell source via `![...](attachment:<key>)` image
//! syntax. Attachments are never shared across cells: copying a cell deep
//! copies the store.
//!
//! The persisted shape is `{ "<key>": { "<mime>": ["<base64>", ...] } }`,
//! where the payload list holds the base64 string split into chunks.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted attachment mapping shape.
type AttachmentMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;

// ─────────────────────────────────────────────────────────────────────────────
// Attachment
// ─────────────────────────────────────────────────────────────────────────────

/// A single MIME-typed base64 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// MIME type, e.g. `image/png`.
    pub mime: String,
    /// Base64-encoded payload.
    pub data: String,
}

impl Attachment {
    /// Render this attachment as a `data:` URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attachment Store
// ─────────────────────────────────────────────────────────────────────────────

/// Per-cell mapping from attachment key to payload.
///
/// Each key maps to exactly one MIME/payload pair; adding under an existing
/// key replaces the previous entry rather than merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AttachmentMap", into = "AttachmentMap")]
pub struct AttachmentStore {
    entries: BTreeMap<String, Attachment>,
}

impl AttachmentStore {
    /// Insert or replace the attachment for `key`.
    pub fn add(&mut self, key: &str, mime: &str, b64_data: &str) {
        self.entries.insert(
            key.to_string(),
            Attachment {
                mime: mime.to_string(),
                data: b64_data.to_string(),
            },
        );
    }

    /// Look up an attachment by key.
    pub fn get(&self, key: &str) -> Option<&Attachment> {
        self.entries.get(key)
    }

    /// True if `key` has an attachment.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of attachments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the store holds no attachments.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, attachment)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attachment)> {
        self.entries.iter()
    }

    /// Deep copy of the subset of entries whose key satisfies `keep`.
    ///
    /// Used by attachment garbage collection: the live store is never
    /// mutated, only the persisted snapshot is filtered.
    pub fn filtered<F>(&self, keep: F) -> AttachmentStore
    where
        F: Fn(&str) -> bool,
    {
        AttachmentStore {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl From<AttachmentMap> for AttachmentStore {
    fn from(map: AttachmentMap) -> Self {
        let mut store = AttachmentStore::default();
        for (key, bundle) in map {
            // One MIME type per key by invariant; a malformed entry with
            // several keeps the first and drops the rest.
            if let Some((mime, chunks)) = bundle.into_iter().next() {
                store.add(&key, &mime, &chunks.concat());
            }
        }
        store
    }
}

impl From<AttachmentStore> for AttachmentMap {
    fn from(store: AttachmentStore) -> Self {
        store
            .entries
            .into_iter()
            .map(|(key, att)| {
                let mut bundle = BTreeMap::new();
                bundle.insert(att.mime, vec![att.data]);
                (key, bundle)
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blobs and Data URIs
// ─────────────────────────────────────────────────────────────────────────────

/// A binary payload handed to the cell by the host's paste/drop surface.
///
/// Named blobs come from drag-and-drop of real files; pasted images usually
/// arrive nameless and get an auto-generated attachment key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Filename, if the source had one.
    pub name: Option<String>,
    /// MIME type declared by the source.
    pub mime: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

/// Encode raw bytes as a base64 `data:` URI.
pub fn encode_data_uri(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

/// Split a base64 `data:` URI into `(mime_type, base64_payload)`.
pub fn parse_data_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri.strip_prefix("data:").ok_or_else(|| Error::DataUri {
        message: "missing data: prefix".to_string(),
    })?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| Error::DataUri {
        message: "missing payload separator".to_string(),
    })?;
    let mime = header.strip_suffix(";base64").ok_or_else(|| Error::DataUri {
        message: "payload is not base64-encoded".to_string(),
    })?;
    Ok((mime.to_string(), payload.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
