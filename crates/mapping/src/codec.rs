//! Typed-value codecs
//!
//! Typed leaves that a backend cannot store natively are written in a generic
//! tagged form:
//!
//! | Leaf | Tagged form |
//! |------|-------------|
//! | DateTime | `{"$type": "datetime", "$value": "2024-05-01T08:30:00Z"}` |
//! | Date | `{"$type": "date", "$value": "2024-05-01"}` |
//! | Uuid | `{"$type": "uuid", "$value": "67e55044-10b1-426f-9247-bb680e5fe0c8"}` |
//! | Binary | `{"$type": "binary", "$value": "<base64>"}` |
//!
//! A tagged form is an object with exactly the two keys `$type` (a string)
//! and `$value`. Plain application objects that happen to have that shape
//! with a registered tag are escaped on encode as
//! `{"$type": "object", "$value": {...}}` and unescaped on decode, so they
//! never come back as typed leaves. Tagged forms with unknown tags keep
//! their tag; their payload is encoded and decoded like any other subtree.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rustc_hash::FxHashMap;
use strata_core::{CanonicalValue, Error, JsonHint, JsonPath, LeafKind, PathSegment, Result, TypedLeaf};
use tracing::debug;
use uuid::Uuid;

/// Key holding the tag of a tagged form
pub const TYPE_KEY: &str = "$type";

/// Key holding the payload of a tagged form
pub const VALUE_KEY: &str = "$value";

/// Tag of an escaped plain object
pub const ESCAPED_OBJECT_TAG: &str = "object";

/// Converts one kind of typed leaf to and from its string payload
pub trait LeafCodec: Send + Sync {
    /// Leaf kind handled by this codec
    fn kind(&self) -> LeafKind;

    /// Tag written to `$type`
    fn tag(&self) -> &'static str;

    /// Payload for `leaf`; None if the leaf is of another kind
    fn encode_payload(&self, leaf: &TypedLeaf) -> Option<String>;

    /// Parse a payload
    fn decode_payload(&self, payload: &str) -> std::result::Result<TypedLeaf, String>;
}

/// RFC 3339 instants, always written in UTC with as many sub-second digits
/// as needed
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeCodec;

impl LeafCodec for DateTimeCodec {
    fn kind(&self) -> LeafKind {
        LeafKind::DateTime
    }

    fn tag(&self) -> &'static str {
        "datetime"
    }

    fn encode_payload(&self, leaf: &TypedLeaf) -> Option<String> {
        leaf.as_datetime()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    fn decode_payload(&self, payload: &str) -> std::result::Result<TypedLeaf, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(payload) {
            return Ok(TypedLeaf::DateTime(dt.with_timezone(&Utc)));
        }
        // offset-less ISO-8601 is read as UTC
        NaiveDateTime::parse_from_str(payload, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| TypedLeaf::DateTime(naive.and_utc()))
            .map_err(|e| format!("invalid datetime '{}': {}", payload, e))
    }
}

/// Calendar dates as `YYYY-MM-DD`
#[derive(Debug, Clone, Copy, Default)]
pub struct DateCodec;

impl LeafCodec for DateCodec {
    fn kind(&self) -> LeafKind {
        LeafKind::Date
    }

    fn tag(&self) -> &'static str {
        "date"
    }

    fn encode_payload(&self, leaf: &TypedLeaf) -> Option<String> {
        leaf.as_date().map(|d| d.format("%Y-%m-%d").to_string())
    }

    fn decode_payload(&self, payload: &str) -> std::result::Result<TypedLeaf, String> {
        NaiveDate::parse_from_str(payload, "%Y-%m-%d")
            .map(TypedLeaf::Date)
            .map_err(|e| format!("invalid date '{}': {}", payload, e))
    }
}

/// Hyphenated UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidCodec;

impl LeafCodec for UuidCodec {
    fn kind(&self) -> LeafKind {
        LeafKind::Uuid
    }

    fn tag(&self) -> &'static str {
        "uuid"
    }

    fn encode_payload(&self, leaf: &TypedLeaf) -> Option<String> {
        leaf.as_uuid().map(|u| u.hyphenated().to_string())
    }

    fn decode_payload(&self, payload: &str) -> std::result::Result<TypedLeaf, String> {
        Uuid::parse_str(payload)
            .map(TypedLeaf::Uuid)
            .map_err(|e| format!("invalid uuid '{}': {}", payload, e))
    }
}

/// Standard base64
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl LeafCodec for BinaryCodec {
    fn kind(&self) -> LeafKind {
        LeafKind::Binary
    }

    fn tag(&self) -> &'static str {
        "binary"
    }

    fn encode_payload(&self, leaf: &TypedLeaf) -> Option<String> {
        leaf.as_bytes().map(|b| BASE64.encode(b))
    }

    fn decode_payload(&self, payload: &str) -> std::result::Result<TypedLeaf, String> {
        BASE64
            .decode(payload)
            .map(TypedLeaf::Binary)
            .map_err(|e| format!("invalid base64: {}", e))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registered leaf codecs, looked up by kind and by tag
#[derive(Clone, Default)]
pub struct CodecRegistry {
    by_kind: FxHashMap<LeafKind, Arc<dyn LeafCodec>>,
    by_tag: FxHashMap<&'static str, LeafKind>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.by_tag.keys().collect();
        tags.sort();
        f.debug_struct("CodecRegistry").field("tags", &tags).finish()
    }
}

/// Tag and payload of a tagged form, if `map` is one
fn tagged_parts(map: &BTreeMap<String, CanonicalValue>) -> Option<(&str, &CanonicalValue)> {
    if map.len() != 2 {
        return None;
    }
    let tag = map.get(TYPE_KEY)?.as_str()?;
    let payload = map.get(VALUE_KEY)?;
    Some((tag, payload))
}

fn tagged(tag: &str, payload: CanonicalValue) -> CanonicalValue {
    let mut map = BTreeMap::new();
    map.insert(TYPE_KEY.to_string(), CanonicalValue::String(tag.to_string()));
    map.insert(VALUE_KEY.to_string(), payload);
    CanonicalValue::Object(map)
}

fn describe(value: &CanonicalValue) -> String {
    match value {
        CanonicalValue::Typed(leaf) => leaf.kind().to_string(),
        other => other.type_name().to_lowercase(),
    }
}

impl CodecRegistry {
    /// Registry with no codecs
    pub fn empty() -> Self {
        CodecRegistry::default()
    }

    /// Registry with the datetime, date, uuid and binary codecs
    pub fn standard() -> Self {
        let mut registry = CodecRegistry::empty();
        registry.insert(Arc::new(DateTimeCodec));
        registry.insert(Arc::new(DateCodec));
        registry.insert(Arc::new(UuidCodec));
        registry.insert(Arc::new(BinaryCodec));
        registry
    }

    fn insert(&mut self, codec: Arc<dyn LeafCodec>) {
        self.by_tag.insert(codec.tag(), codec.kind());
        self.by_kind.insert(codec.kind(), codec);
    }

    /// Add or replace the codec for a leaf kind
    pub fn register(&mut self, codec: impl LeafCodec + 'static) -> Result<()> {
        let tag = codec.tag();
        if tag == ESCAPED_OBJECT_TAG {
            return Err(Error::invalid_input(format!("codec tag '{}' is reserved", tag)));
        }
        if let Some(kind) = self.by_tag.get(tag) {
            if *kind != codec.kind() {
                return Err(Error::invalid_input(format!(
                    "codec tag '{}' already used by {}",
                    tag, kind
                )));
            }
        }
        if let Some(previous) = self.by_kind.get(&codec.kind()) {
            self.by_tag.remove(previous.tag());
        }
        self.insert(Arc::new(codec));
        Ok(())
    }

    /// True if leaves of `kind` can be encoded
    pub fn supports(&self, kind: LeafKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Tag used for `kind`
    pub fn tag_of(&self, kind: LeafKind) -> Option<&'static str> {
        self.by_kind.get(&kind).map(|c| c.tag())
    }

    fn is_known_tag(&self, tag: &str) -> bool {
        tag == ESCAPED_OBJECT_TAG || self.by_tag.contains_key(tag)
    }

    /// Generic tagged form of a leaf
    pub fn encode(&self, leaf: &TypedLeaf) -> Result<CanonicalValue> {
        let codec = self
            .by_kind
            .get(&leaf.kind())
            .ok_or_else(|| Error::unsupported(JsonPath::root(), leaf.kind().name()))?;
        let payload = codec
            .encode_payload(leaf)
            .ok_or_else(|| Error::unsupported(JsonPath::root(), leaf.kind().name()))?;
        Ok(tagged(codec.tag(), CanonicalValue::String(payload)))
    }

    /// Decode one value (not its children)
    ///
    /// - a tagged form with a registered tag becomes a typed leaf
    /// - an escaped object is unwrapped
    /// - a tagged form with an unknown tag is returned unchanged
    /// - a plain string is parsed when `expected` names a kind
    /// - a result that disagrees with `expected` is an error
    pub fn decode(&self, value: &CanonicalValue, expected: Option<LeafKind>) -> Result<CanonicalValue> {
        self.decode_at(value, expected, &JsonPath::root())
    }

    fn decode_at(
        &self,
        value: &CanonicalValue,
        expected: Option<LeafKind>,
        path: &JsonPath,
    ) -> Result<CanonicalValue> {
        let decoded = match value {
            CanonicalValue::Object(map) => match tagged_parts(map) {
                Some((ESCAPED_OBJECT_TAG, payload)) => match payload {
                    CanonicalValue::Object(_) => payload.clone(),
                    other => {
                        return Err(Error::hydration(
                            path.clone(),
                            format!("escaped object holds {}", describe(other)),
                        ))
                    }
                },
                Some((tag, payload)) => match self.by_tag.get(tag) {
                    Some(kind) => {
                        let text = payload.as_str().ok_or_else(|| {
                            Error::hydration(
                                path.clone(),
                                format!("'{}' payload must be a string, found {}", tag, describe(payload)),
                            )
                        })?;
                        self.parse(*kind, text, path)?
                    }
                    None => {
                        debug!(target: "strata::codec", %path, tag, "preserving unknown tag");
                        value.clone()
                    }
                },
                None => value.clone(),
            },
            CanonicalValue::String(s) => match expected {
                Some(kind) if self.supports(kind) => self.parse(kind, s, path)?,
                _ => value.clone(),
            },
            other => other.clone(),
        };

        match (expected, &decoded) {
            (_, CanonicalValue::Null) | (None, _) => Ok(decoded),
            (Some(kind), CanonicalValue::Typed(leaf)) if leaf.kind() == kind => Ok(decoded),
            (Some(kind), other) => Err(Error::hydration(
                path.clone(),
                format!("expected {}, found {}", kind, describe(other)),
            )),
        }
    }

    fn parse(&self, kind: LeafKind, payload: &str, path: &JsonPath) -> Result<CanonicalValue> {
        let codec = self
            .by_kind
            .get(&kind)
            .ok_or_else(|| Error::hydration(path.clone(), format!("no codec for {}", kind)))?;
        codec
            .decode_payload(payload)
            .map(CanonicalValue::Typed)
            .map_err(|reason| Error::hydration(path.clone(), reason))
    }

    /// Tag every typed leaf in the tree and escape lookalike objects
    pub fn encode_tree(&self, value: &CanonicalValue) -> Result<CanonicalValue> {
        self.encode_tree_except(value, &[])
    }

    /// Like [`encode_tree`](Self::encode_tree), but leaves of the `native`
    /// kinds stay typed for a backend that stores them directly
    pub fn encode_tree_except(&self, value: &CanonicalValue, native: &[LeafKind]) -> Result<CanonicalValue> {
        match value {
            CanonicalValue::Typed(leaf) if native.contains(&leaf.kind()) => Ok(value.clone()),
            CanonicalValue::Typed(leaf) => self.encode(leaf),
            CanonicalValue::Array(items) => Ok(CanonicalValue::Array(
                items
                    .iter()
                    .map(|v| self.encode_tree_except(v, native))
                    .collect::<Result<_>>()?,
            )),
            CanonicalValue::Object(map) => {
                let encoded: BTreeMap<String, CanonicalValue> = map
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.encode_tree_except(v, native)?)))
                    .collect::<Result<_>>()?;
                let lookalike = tagged_parts(map).is_some_and(|(tag, _)| self.is_known_tag(tag));
                if lookalike {
                    Ok(tagged(ESCAPED_OBJECT_TAG, CanonicalValue::Object(encoded)))
                } else {
                    Ok(CanonicalValue::Object(encoded))
                }
            }
            other => Ok(other.clone()),
        }
    }

    /// Decode every tagged form in the tree
    ///
    /// `hint` supplies expected kinds by path relative to the tree root;
    /// errors report `base` joined with the failing relative path.
    pub fn decode_tree(
        &self,
        value: &CanonicalValue,
        hint: Option<&JsonHint>,
        base: &JsonPath,
    ) -> Result<CanonicalValue> {
        let mut path = base.clone();
        self.decode_node(value, hint, base.len(), &mut path)
    }

    fn decode_node(
        &self,
        value: &CanonicalValue,
        hint: Option<&JsonHint>,
        base_len: usize,
        path: &mut JsonPath,
    ) -> Result<CanonicalValue> {
        let relative: &[PathSegment] = &path.segments()[base_len..];
        let expected = hint.and_then(|h| h.expected_kind(relative));

        match value {
            CanonicalValue::Object(map) => match tagged_parts(map) {
                Some((ESCAPED_OBJECT_TAG, CanonicalValue::Object(inner))) if expected.is_none() => {
                    self.decode_children(inner, hint, base_len, path)
                }
                Some((tag, payload)) if expected.is_none() && !self.is_known_tag(tag) => {
                    debug!(target: "strata::codec", %path, tag, "preserving unknown tag");
                    path.push_key(VALUE_KEY);
                    let decoded = self.decode_node(payload, hint, base_len, path);
                    path.pop();
                    Ok(tagged(tag, decoded?))
                }
                Some(_) => self.decode_at(value, expected, path),
                None if expected.is_some() => self.decode_at(value, expected, path),
                None => self.decode_children(map, hint, base_len, path),
            },
            CanonicalValue::Array(items) if expected.is_none() => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    path.push_index(i);
                    let decoded = self.decode_node(item, hint, base_len, path);
                    path.pop();
                    out.push(decoded?);
                }
                Ok(CanonicalValue::Array(out))
            }
            other => self.decode_at(other, expected, path),
        }
    }

    fn decode_children(
        &self,
        map: &BTreeMap<String, CanonicalValue>,
        hint: Option<&JsonHint>,
        base_len: usize,
        path: &mut JsonPath,
    ) -> Result<CanonicalValue> {
        let mut out = BTreeMap::new();
        for (key, child) in map {
            path.push_key(key.clone());
            let decoded = self.decode_node(child, hint, base_len, path);
            path.pop();
            out.insert(key.clone(), decoded?);
        }
        Ok(CanonicalValue::Object(out))
    }
}
