//! Hierarchical store keys
//!
//! A key is a chain of `(kind, name)` segments from the root entity down to
//! the addressed one. The encoded form `Kind:name/Kind:name` is the identity
//! token the reconciler diffs on, so two keys are equal exactly when their
//! encodings are equal.

use crate::errors::KeyError;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

const SEGMENT_SEPARATOR: char = '/';
const KIND_SEPARATOR: char = ':';

static UNSAFE_NAME_CHARS: OnceLock<Regex> = OnceLock::new();
static KIND_PATTERN: OnceLock<Regex> = OnceLock::new();

fn unsafe_name_chars() -> &'static Regex {
    UNSAFE_NAME_CHARS
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("Invalid name pattern"))
}

fn kind_pattern() -> &'static Regex {
    KIND_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("Invalid kind pattern"))
}

/// Returns true if `kind` can be used as an entity kind segment
pub fn is_valid_kind(kind: &str) -> bool {
    kind_pattern().is_match(kind)
}

/// Reduce a free-form name to `[A-Za-z0-9._-]`
///
/// German umlauts and sharp s are transliterated first so that titles keep
/// their readable shape; every other run of unsafe characters collapses into
/// a single `-`. Leading and trailing dashes are trimmed.
pub fn sanitize_name(raw: &str) -> String {
    let mut transliterated = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            'ä' => transliterated.push_str("ae"),
            'ö' => transliterated.push_str("oe"),
            'ü' => transliterated.push_str("ue"),
            'Ä' => transliterated.push_str("Ae"),
            'Ö' => transliterated.push_str("Oe"),
            'Ü' => transliterated.push_str("Ue"),
            'ß' => transliterated.push_str("ss"),
            other => transliterated.push(other),
        }
    }

    unsafe_name_chars()
        .replace_all(&transliterated, "-")
        .trim_matches('-')
        .to_string()
}

/// Store key with an optional ancestor chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    kind: String,
    name: String,
    parent: Option<Box<Key>>,
}

impl Key {
    /// Build a key; the name is sanitized so the encoding stays unambiguous
    pub fn new(
        kind: impl Into<String>,
        name: impl AsRef<str>,
        parent: Option<&Key>,
    ) -> Result<Self, KeyError> {
        let kind = kind.into();
        if !is_valid_kind(&kind) {
            return Err(KeyError::InvalidKind(kind));
        }

        Ok(Self {
            kind,
            name: sanitize_name(name.as_ref()),
            parent: parent.map(|p| Box::new(p.clone())),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// Encode as `Kind:name/Kind:name`, root first
    pub fn encode(&self) -> String {
        let mut encoded = match &self.parent {
            Some(parent) => {
                let mut s = parent.encode();
                s.push(SEGMENT_SEPARATOR);
                s
            }
            None => String::new(),
        };
        encoded.push_str(&self.kind);
        encoded.push(KIND_SEPARATOR);
        encoded.push_str(&self.name);
        encoded
    }

    /// Parse an encoded key produced by [`Key::encode`]
    pub fn decode(encoded: &str) -> Result<Self, KeyError> {
        if encoded.is_empty() {
            return Err(KeyError::Empty);
        }

        let mut key: Option<Key> = None;
        for segment in encoded.split(SEGMENT_SEPARATOR) {
            let (kind, name) = segment
                .split_once(KIND_SEPARATOR)
                .ok_or_else(|| KeyError::MalformedSegment(segment.to_string()))?;

            if !is_valid_kind(kind) || sanitize_name(name) != name {
                return Err(KeyError::MalformedSegment(segment.to_string()));
            }

            key = Some(Key {
                kind: kind.to_string(),
                name: name.to_string(),
                parent: key.map(Box::new),
            });
        }

        key.ok_or(KeyError::Empty)
    }

    /// True if `ancestor` is this key or one of its ancestors
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Key::decode(&encoded).map_err(serde::de::Error::custom)
    }
}
