//! Caller-supplied write conditions over document fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::names::NameSession;
use crate::keypath::KeyPath;
use crate::marshal::to_attribute;

/// A predicate over the stored document, evaluated by the store before a
/// write is applied.
///
/// Paths are relative to the document, not to the stored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    /// The field is present.
    Exists(KeyPath),
    /// The field is absent.
    NotExists(KeyPath),
    /// The field equals the value.
    Equals(KeyPath, Value),
    /// The field is present and differs from the value.
    NotEquals(KeyPath, Value),
    /// Both conditions hold.
    And(Box<Condition>, Box<Condition>),
    /// At least one condition holds.
    Or(Box<Condition>, Box<Condition>),
    /// The condition does not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// Combine with `other` so that both must hold.
    #[must_use]
    pub fn and(self, other: Condition) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Combine with `other` so that either may hold.
    #[must_use]
    pub fn or(self, other: Condition) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Invert the condition.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Render the condition, allocating placeholders from `session`.
    pub fn compile(&self, session: &mut NameSession) -> String {
        match self {
            Self::Exists(path) => format!("attribute_exists({})", session.document_path(path)),
            Self::NotExists(path) => {
                format!("attribute_not_exists({})", session.document_path(path))
            }
            Self::Equals(path, value) => {
                let path = session.document_path(path);
                let value = session.intern_value(to_attribute(value));
                format!("{path} = {value}")
            }
            Self::NotEquals(path, value) => {
                let path = session.document_path(path);
                let value = session.intern_value(to_attribute(value));
                format!("{path} <> {value}")
            }
            Self::And(left, right) => {
                format!("({}) AND ({})", left.compile(session), right.compile(session))
            }
            Self::Or(left, right) => {
                format!("({}) OR ({})", left.compile(session), right.compile(session))
            }
            Self::Not(inner) => format!("NOT ({})", inner.compile(session)),
        }
    }
}

/// `attribute_exists` on a top-level item attribute.
pub(crate) fn item_exists(session: &mut NameSession, attribute: &str) -> String {
    format!("attribute_exists({})", session.intern(attribute))
}

/// `attribute_not_exists` on a top-level item attribute.
pub(crate) fn item_not_exists(session: &mut NameSession, attribute: &str) -> String {
    format!("attribute_not_exists({})", session.intern(attribute))
}

/// Join an engine guard with an optional caller condition.
pub(crate) fn guarded(
    session: &mut NameSession,
    guard: Option<String>,
    condition: Option<&Condition>,
) -> Option<String> {
    let caller = condition.map(|c| c.compile(session));
    match (guard, caller) {
        (Some(guard), Some(caller)) => Some(format!("{guard} AND ({caller})")),
        (guard, caller) => guard.or(caller),
    }
}
