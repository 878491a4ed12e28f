//! Content-addressed asset table and data-URI decoding.
//!
//! Recordings embed meshes and textures once, keyed by a hash
//! (`cas-v1/<hash>` or `sha256-<hash>`), and refer to them by key.
//! Each key maps to a data URI that is decoded lazily and cached.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Prefix of content-addressed asset keys.
pub const CAS_PREFIX: &str = "cas-v1/";

static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:([^;,]+)(?:;([^,]+))?,(.+)").expect("data URI pattern is valid")
});

/// Errors that can occur while resolving an asset.
///
/// These never escape [`AssetResolver::resolve`]; they are logged and the
/// caller sees `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("no asset with key {0:?}")]
    UnknownKey(String),

    #[error("malformed data URI for {0:?}")]
    MalformedDataUri(String),

    #[error("malformed asset reference {0:?}")]
    MalformedAssetReference(String),
}

/// Result type for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;

/// Decoded bytes of one asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Parse `data:<mime>[;<encoding>],<payload>`.
///
/// Only the `base64` encoding is decoded; any other payload is returned as
/// its text bytes. `label` names the asset in the error.
pub fn parse_data_uri(uri: &str, label: &str) -> AssetResult<ResolvedAsset> {
    let caps = DATA_URI
        .captures(uri)
        .ok_or_else(|| AssetError::MalformedDataUri(label.to_string()))?;

    let mime_type = caps[1].to_string();
    let payload = &caps[3];
    let data = match caps.get(2).map(|m| m.as_str()) {
        Some("base64") => STANDARD
            .decode(payload.trim())
            .map_err(|_| AssetError::MalformedDataUri(label.to_string()))?,
        _ => payload.as_bytes().to_vec(),
    };

    Ok(ResolvedAsset { mime_type, data })
}

/// Resolves asset keys against the table extracted from a recording.
#[derive(Debug, Default)]
pub struct AssetResolver {
    table: HashMap<String, String>,
    // failures are cached too so each bad key is reported once
    by_key: HashMap<String, Option<ResolvedAsset>>,
    by_uri: HashMap<String, Option<ResolvedAsset>>,
}

impl AssetResolver {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self {
            table,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Resolve an asset key to its decoded bytes.
    ///
    /// Returns `None` for unknown keys and malformed URIs.
    pub fn resolve(&mut self, key: &str) -> Option<&ResolvedAsset> {
        if !self.by_key.contains_key(key) {
            let resolved = match self.table.get(key) {
                Some(uri) => parse_data_uri(uri, key),
                None => Err(AssetError::UnknownKey(key.to_string())),
            };
            let entry = match resolved {
                Ok(asset) => Some(asset),
                Err(e @ AssetError::UnknownKey(_)) => {
                    // unknown keys are common for optional resources
                    log::debug!("{}", e);
                    None
                }
                Err(e) => {
                    log::warn!("{}", e);
                    None
                }
            };
            self.by_key.insert(key.to_string(), entry);
        }
        self.by_key.get(key).and_then(Option::as_ref)
    }

    /// Decode an inline data URI, caching by the URI text.
    pub fn resolve_data_uri(&mut self, uri: &str) -> Option<&ResolvedAsset> {
        if !self.by_uri.contains_key(uri) {
            let entry = match parse_data_uri(uri, "inline data URI") {
                Ok(asset) => Some(asset),
                Err(e) => {
                    log::warn!("{}", e);
                    None
                }
            };
            self.by_uri.insert(uri.to_string(), entry);
        }
        self.by_uri.get(uri).and_then(Option::as_ref)
    }

    /// Resolve a URL that is either an inline data URI or an asset key.
    pub fn resolve_url(&mut self, url: &str) -> Option<&ResolvedAsset> {
        if url.starts_with("data:") {
            self.resolve_data_uri(url)
        } else {
            self.resolve(url)
        }
    }

    /// Resolve a content-addressed reference found inside an embedded file.
    pub fn resolve_reference(&mut self, reference: &str) -> AssetResult<&ResolvedAsset> {
        if !reference.starts_with(CAS_PREFIX) || reference.len() == CAS_PREFIX.len() {
            return Err(AssetError::MalformedAssetReference(reference.to_string()));
        }
        if !self.contains_key(reference) {
            return Err(AssetError::UnknownKey(reference.to_string()));
        }
        self.resolve(reference)
            .ok_or_else(|| AssetError::MalformedDataUri(reference.to_string()))
    }
}
