//! Composite key assembly.
//!
//! A composite key packs the collection name and one or more field values
//! into a single string attribute:
//!
//! ```text
//! users|new@x.com
//! orders|2024-01-31|c\|42
//! ```
//!
//! Every segment is escaped (`\` becomes `\\`, `|` becomes `\|`), so the
//! encoding is injective and [`decode`] recovers the original segments.
//! Unescaped segments keep their byte order, which keeps prefix and range
//! queries over the encoded attribute meaningful.

use std::fmt;

use serde_json::Value;

use crate::error::{DocumentError, DocumentResult};

/// Separator placed between key segments.
pub const SEPARATOR: char = '|';

const ESCAPE: char = '\\';

/// The key attribute being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Partition (hash) key: all-or-nothing.
    Partition,
    /// Sort (range) key: fully set, fully untouched or fully removed.
    Sort,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition => f.write_str("partition"),
            Self::Sort => f.write_str("sort"),
        }
    }
}

/// One key field's state for a given write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyPart<'a> {
    /// The write does not touch the field.
    Untouched,
    /// The write leaves the field without a value (removed or null).
    Absent,
    /// The field's new value.
    Present(&'a Value),
}

impl<'a> KeyPart<'a> {
    /// Classify a resolved field value; missing and `null` are both absent.
    #[must_use]
    pub fn of(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Absent,
            Some(v) => Self::Present(v),
        }
    }

    fn is_untouched(&self) -> bool {
        matches!(self, Self::Untouched)
    }
}

/// What to do with a key attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeKey {
    /// Leave the attribute as it is.
    Skip,
    /// Write the encoded value.
    Set(String),
    /// Delete the attribute.
    Remove,
}

/// Assemble a key attribute value from its ordered parts.
///
/// `parts` must line up one-to-one with the key paths declared for `role`.
pub fn assemble(
    role: KeyRole,
    collection: &str,
    parts: &[KeyPart<'_>],
) -> DocumentResult<CompositeKey> {
    let untouched = parts.iter().filter(|p| p.is_untouched()).count();
    if untouched == parts.len() {
        return Ok(CompositeKey::Skip);
    }
    if untouched > 0 {
        return Err(partial_key(role, collection, "only some key fields are supplied"));
    }

    let present: Vec<&Value> = parts
        .iter()
        .filter_map(|p| match p {
            KeyPart::Present(v) => Some(*v),
            _ => None,
        })
        .collect();

    if present.is_empty() {
        Ok(CompositeKey::Remove)
    } else if present.len() < parts.len() {
        Err(partial_key(role, collection, "some key fields have no value"))
    } else {
        let segments: Vec<String> = present.into_iter().map(key_segment).collect();
        Ok(CompositeKey::Set(encode(collection, &segments)))
    }
}

fn partial_key(role: KeyRole, collection: &str, detail: &str) -> DocumentError {
    let message = format!("{role} key of collection {collection}: {detail}");
    match role {
        KeyRole::Partition => DocumentError::InvalidUpdates(message),
        KeyRole::Sort => DocumentError::InvalidUpdateValue(message),
    }
}

/// The string form of a single key field.
#[must_use]
pub fn key_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Encode a collection name followed by `segments`.
#[must_use]
pub fn encode(collection: &str, segments: &[String]) -> String {
    let mut out = String::with_capacity(
        collection.len() + segments.iter().map(|s| s.len() + 1).sum::<usize>(),
    );
    push_escaped(&mut out, collection);
    for segment in segments {
        out.push(SEPARATOR);
        push_escaped(&mut out, segment);
    }
    out
}

fn push_escaped(out: &mut String, segment: &str) {
    for c in segment.chars() {
        if c == SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

/// Split an encoded key back into its segments, collection name first.
#[must_use]
pub fn decode(encoded: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            SEPARATOR => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}
