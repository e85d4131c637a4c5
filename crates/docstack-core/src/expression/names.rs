//! Placeholder allocation for expression attribute names and values.
//!
//! Each compiled request owns one [`NameSession`]. Names that can appear
//! literally in an expression pass through unchanged; everything else gets a
//! `#nN` token. Values always get a `:vN` token. Because every placeholder in
//! a request comes from the same session, caller-supplied conditions can
//! never collide with engine-generated actions.

use std::collections::BTreeMap;

use docstack_model::AttributeValue;

use super::reserved::is_expression_keyword;
use crate::keypath::KeyPath;

/// Token the document wrapper attribute is always addressed by.
pub const WRAPPER_TOKEN: &str = "#value";

/// Per-request name and value placeholder allocator.
#[derive(Debug, Clone)]
pub struct NameSession {
    wrapper: String,
    /// name -> token, for names that needed a token.
    tokens: BTreeMap<String, String>,
    /// token -> name, only for tokens handed out so far.
    names: BTreeMap<String, String>,
    values: BTreeMap<String, AttributeValue>,
    next_name: usize,
    next_value: usize,
}

impl NameSession {
    /// Start a session whose document wrapper attribute is `wrapper`.
    #[must_use]
    pub fn new(wrapper: impl Into<String>) -> Self {
        let wrapper = wrapper.into();
        let tokens = BTreeMap::from([(wrapper.clone(), WRAPPER_TOKEN.to_owned())]);
        Self {
            wrapper,
            tokens,
            names: BTreeMap::new(),
            values: BTreeMap::new(),
            next_name: 0,
            next_value: 0,
        }
    }

    /// The expression form of an attribute name.
    pub fn intern(&mut self, name: &str) -> String {
        if let Some(token) = self.tokens.get(name) {
            let token = token.clone();
            self.names.insert(token.clone(), name.to_owned());
            return token;
        }
        if is_safe_name(name) {
            return name.to_owned();
        }

        let token = format!("#n{}", self.next_name);
        self.next_name += 1;
        self.tokens.insert(name.to_owned(), token.clone());
        self.names.insert(token.clone(), name.to_owned());
        token
    }

    /// Register a literal value and return its `:vN` token.
    pub fn intern_value(&mut self, value: AttributeValue) -> String {
        let token = format!(":v{}", self.next_value);
        self.next_value += 1;
        self.values.insert(token.clone(), value);
        token
    }

    /// The expression form of a path below the document wrapper, e.g.
    /// `#value.address.#n0`.
    pub fn document_path(&mut self, path: &KeyPath) -> String {
        let wrapper = self.wrapper.clone();
        let mut out = self.intern(&wrapper);
        for segment in path.segments() {
            out.push('.');
            out.push_str(&self.intern(segment));
        }
        out
    }

    /// The tokens handed out so far: token to name and token to value.
    #[must_use]
    pub fn snapshot(
        &self,
    ) -> (
        BTreeMap<String, String>,
        BTreeMap<String, AttributeValue>,
    ) {
        (self.names.clone(), self.values.clone())
    }

    /// Consume the session, returning the same maps as [`Self::snapshot`].
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<String, String>,
        BTreeMap<String, AttributeValue>,
    ) {
        (self.names, self.values)
    }
}

/// Identifier-shaped names that are neither reserved words nor function
/// names can be used as-is.
fn is_safe_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_expression_keyword(name)
}
