//! Partial-update compilation.
//!
//! A sparse set of field updates becomes one `SET ... REMOVE ...` expression
//! that edits the wrapped document in place and keeps every derived index
//! key in step with it.

use std::collections::BTreeMap;
use std::fmt;

use docstack_model::AttributeValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::condition::{Condition, guarded, item_exists};
use super::names::NameSession;
use crate::collection::Collection;
use crate::composite::{self, CompositeKey, KeyPart, KeyRole};
use crate::config::DocumentConfig;
use crate::error::{DocumentError, DocumentResult};
use crate::keypath::{self, KeyPath, PathMatch};
use crate::marshal::to_attribute;

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// What to do with one document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldUpdate {
    /// Write the value.
    Set(Value),
    /// Delete the field.
    Remove,
}

/// A sparse partial update keyed by dotted field path.
///
/// A `None` entry stands for a field whose value was left undefined; it is
/// rejected at compile time rather than silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Updates(BTreeMap<String, Option<FieldUpdate>>);

impl Updates {
    /// An empty update set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `path` to `value`.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0
            .insert(path.into(), Some(FieldUpdate::Set(value.into())));
        self
    }

    /// Remove `path`.
    #[must_use]
    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.0.insert(path.into(), Some(FieldUpdate::Remove));
        self
    }

    /// Insert a raw entry.
    pub fn insert(&mut self, path: impl Into<String>, update: Option<FieldUpdate>) {
        self.0.insert(path.into(), update);
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<FieldUpdate>)> {
        self.0.iter()
    }
}

/// JSON merge-patch style: `null` removes the field, anything else sets it.
impl From<Map<String, Value>> for Updates {
    fn from(fields: Map<String, Value>) -> Self {
        Self(
            fields
                .into_iter()
                .map(|(path, value)| {
                    let update = match value {
                        Value::Null => FieldUpdate::Remove,
                        v => FieldUpdate::Set(v),
                    };
                    (path, Some(update))
                })
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Mutation plan
// ---------------------------------------------------------------------------

/// A compiled mutation ready to submit as an `UpdateItem` or a
/// transactional `Update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationPlan {
    /// `path = :token` assignments.
    pub set_actions: Vec<String>,
    /// Paths to delete.
    pub remove_actions: Vec<String>,
    /// Condition the store must check before applying the mutation.
    pub condition_expression: Option<String>,
    /// Token to attribute name.
    pub names: BTreeMap<String, String>,
    /// Token to attribute value.
    pub values: BTreeMap<String, AttributeValue>,
}

impl MutationPlan {
    /// Render the update expression, e.g. `SET a = :v0 REMOVE b`.
    #[must_use]
    pub fn expression(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MutationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.set_actions.is_empty() {
            write!(f, "SET {}", self.set_actions.join(", "))?;
        }
        if !self.remove_actions.is_empty() {
            if !self.set_actions.is_empty() {
                f.write_str(" ")?;
            }
            write!(f, "REMOVE {}", self.remove_actions.join(", "))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compile `updates` for a document of `collection`.
///
/// The plan carries no condition; see [`compile_guarded`] for one that only
/// applies to an existing document.
pub fn compile(
    collection: &Collection,
    updates: &Updates,
    config: &DocumentConfig,
) -> DocumentResult<MutationPlan> {
    let mut session = NameSession::new(&config.wrapper_attribute);
    let (set_actions, remove_actions) = compile_actions(collection, updates, config, &mut session)?;
    Ok(finish(set_actions, remove_actions, None, session))
}

/// Compile `updates` guarded by `attribute_exists` on the primary key and
/// the optional caller condition.
pub fn compile_guarded(
    collection: &Collection,
    updates: &Updates,
    condition: Option<&Condition>,
    config: &DocumentConfig,
) -> DocumentResult<MutationPlan> {
    let mut session = NameSession::new(&config.wrapper_attribute);
    let (set_actions, remove_actions) = compile_actions(collection, updates, config, &mut session)?;
    let guard = item_exists(&mut session, &collection.layout.partition_attr);
    let condition = guarded(&mut session, Some(guard), condition);
    Ok(finish(set_actions, remove_actions, condition, session))
}

fn finish(
    set_actions: Vec<String>,
    remove_actions: Vec<String>,
    condition_expression: Option<String>,
    session: NameSession,
) -> MutationPlan {
    let (names, values) = session.into_parts();
    let plan = MutationPlan {
        set_actions,
        remove_actions,
        condition_expression,
        names,
        values,
    };
    debug!(expression = %plan, condition = ?plan.condition_expression, "compiled update");
    plan
}

type Entry<'a> = (KeyPath, &'a FieldUpdate);

fn compile_actions(
    collection: &Collection,
    updates: &Updates,
    config: &DocumentConfig,
    session: &mut NameSession,
) -> DocumentResult<(Vec<String>, Vec<String>)> {
    if updates.is_empty() {
        return Err(DocumentError::InvalidUpdate(
            "at least one field must be updated".to_owned(),
        ));
    }

    let entries = validated_entries(updates, config)?;
    let mut set_actions = Vec::new();
    let mut remove_actions = Vec::new();

    for (path, update) in &entries {
        let target = session.document_path(path);
        match update {
            FieldUpdate::Set(value) => {
                let token = session.intern_value(to_attribute(value));
                set_actions.push(format!("{target} = {token}"));
            }
            FieldUpdate::Remove => remove_actions.push(target),
        }
    }

    for pattern in &collection.access_patterns {
        let index = collection.index_for(pattern)?;
        let keys = [
            (
                KeyRole::Partition,
                &pattern.partition_key_paths,
                Some(&index.partition_attr),
            ),
            (
                KeyRole::Sort,
                &pattern.sort_key_paths,
                index.sort_attr.as_ref(),
            ),
        ];
        for (role, paths, attr) in keys {
            if paths.is_empty() {
                continue;
            }
            let Some(attr) = attr else {
                return Err(DocumentError::InvalidAccessPattern(format!(
                    "index {} has no sort key but sort key fields are declared",
                    index.name
                )));
            };
            let parts = paths
                .iter()
                .map(|declared| key_part(&entries, declared))
                .collect::<DocumentResult<Vec<_>>>()?;
            match composite::assemble(role, &collection.name, &parts)? {
                CompositeKey::Skip => {}
                CompositeKey::Set(key) => {
                    let target = session.intern(attr);
                    let token = session.intern_value(AttributeValue::S(key));
                    set_actions.push(format!("{target} = {token}"));
                }
                CompositeKey::Remove => remove_actions.push(session.intern(attr)),
            }
        }
    }

    Ok((set_actions, remove_actions))
}

fn validated_entries<'a>(
    updates: &'a Updates,
    config: &DocumentConfig,
) -> DocumentResult<Vec<Entry<'a>>> {
    let mut entries: Vec<Entry<'a>> = Vec::with_capacity(updates.len());
    for (dotted, update) in updates.iter() {
        let path = KeyPath::parse(dotted)?;
        let Some(update) = update else {
            return Err(DocumentError::InvalidUpdate(format!(
                "field {path} has no value; use a remove to delete it"
            )));
        };
        if path.head() == config.id_field {
            return Err(DocumentError::InvalidUpdate(format!(
                "field {} identifies the document and cannot be updated",
                config.id_field
            )));
        }
        if let Some((other, _)) = entries
            .iter()
            .find(|(other, _)| keypath::paths_overlap(other, &path))
        {
            return Err(DocumentError::InvalidUpdate(format!(
                "fields {other} and {path} overlap"
            )));
        }
        entries.push((path, update));
    }
    Ok(entries)
}

/// How a write changes one declared key field.
///
/// A write below a key field (a descendant match) is rejected: the full key
/// value cannot be known without reading the stored item.
fn key_part<'a>(entries: &'a [Entry<'a>], declared: &KeyPath) -> DocumentResult<KeyPart<'a>> {
    let Some(found) = keypath::match_path(entries.iter().map(|(p, _)| p), declared) else {
        return Ok(KeyPart::Untouched);
    };
    let update_path = found.update_path();
    let update = entries
        .iter()
        .find(|(p, _)| p == update_path)
        .map(|(_, u)| *u);

    match (found, update) {
        (PathMatch::Descendant { update, .. }, _) => Err(DocumentError::InvalidUpdateValue(
            format!("{update} edits part of key field {declared}; update {declared} as a whole"),
        )),
        (PathMatch::Exact(_), Some(FieldUpdate::Set(value))) => Ok(KeyPart::of(Some(value))),
        (PathMatch::Ancestor { residual, .. }, Some(FieldUpdate::Set(value))) => {
            Ok(KeyPart::of(keypath::resolve(value, residual)))
        }
        (_, Some(FieldUpdate::Remove) | None) => Ok(KeyPart::Absent),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::collection::{AccessPattern, IndexLayout, TableLayout};

    fn users() -> Collection {
        Collection::new(
            "users",
            TableLayout::default().with_index(IndexLayout::new("byEmail", "gsi1pk")),
        )
        .with_access_pattern(AccessPattern::new("byEmail", &["email"], &[]).unwrap())
    }

    fn orders() -> Collection {
        Collection::new(
            "orders",
            TableLayout::default()
                .with_index(IndexLayout::new("byCustomer", "gsi1pk").with_sort_attr("gsi1sk")),
        )
        .with_access_pattern(
            AccessPattern::new(
                "byCustomer",
                &["customer.id", "region"],
                &["placedAt", "status"],
            )
            .unwrap(),
        )
    }

    fn config() -> DocumentConfig {
        DocumentConfig::default()
    }

    #[test]
    fn test_should_compile_email_change_with_index_key() {
        let updates = Updates::new().set("email", "new@x.com");
        let plan = compile(&users(), &updates, &config()).unwrap();

        assert_eq!(plan.expression(), "SET #value.email = :v0, gsi1pk = :v1");
        assert!(plan.remove_actions.is_empty());
        assert_eq!(plan.names, BTreeMap::from([("#value".to_owned(), "value".to_owned())]));
        assert_eq!(plan.values[":v0"], AttributeValue::from("new@x.com"));
        assert_eq!(plan.values[":v1"], AttributeValue::from("users|new@x.com"));
        assert_eq!(plan.condition_expression, None);
    }

    #[test]
    fn test_should_leave_index_alone_for_unrelated_fields() {
        let updates = Updates::new().set("name", "Ada").set("count", 3);
        let plan = compile(&users(), &updates, &config()).unwrap();
        assert_eq!(plan.expression(), "SET #value.#n0 = :v0, #value.#n1 = :v1");
        assert_eq!(plan.names["#n0"], "count");
        assert_eq!(plan.names["#n1"], "name");
    }

    #[test]
    fn test_should_remove_index_key_with_its_field() {
        let updates = Updates::new().remove("email");
        let plan = compile(&users(), &updates, &config()).unwrap();
        assert_eq!(plan.expression(), "REMOVE #value.email, gsi1pk");
        assert!(plan.values.is_empty());
    }

    #[test]
    fn test_should_reject_empty_updates() {
        let err = compile(&users(), &Updates::new(), &config()).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdate(_)));
    }

    #[test]
    fn test_should_reject_undefined_value() {
        let mut updates = Updates::new();
        updates.insert("email", None);
        let err = compile(&users(), &updates, &config()).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdate(_)));
    }

    #[test]
    fn test_should_reject_id_update() {
        let updates = Updates::new().set("id", "other");
        let err = compile(&users(), &updates, &config()).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdate(_)));
    }

    #[test]
    fn test_should_reject_overlapping_paths() {
        let updates = Updates::new()
            .set("address", json!({"city": "Paris"}))
            .set("address.city", "Lyon");
        let err = compile(&users(), &updates, &config()).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdate(_)));
    }

    #[test]
    fn test_should_require_whole_partition_key() {
        let updates = Updates::new().set("region", "eu");
        let err = compile(&orders(), &updates, &config()).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdates(_)));
    }

    #[test]
    fn test_should_assemble_partition_through_ancestor_update() {
        let updates = Updates::new()
            .set("customer", json!({"id": "c1", "name": "Ada"}))
            .set("region", "eu");
        let plan = compile(&orders(), &updates, &config()).unwrap();
        assert_eq!(
            plan.expression(),
            "SET #value.customer = :v0, #value.#n0 = :v1, gsi1pk = :v2"
        );
        assert_eq!(plan.values[":v2"], AttributeValue::from("orders|c1|eu"));
    }

    #[test]
    fn test_should_reject_partition_missing_inside_replaced_object() {
        let updates = Updates::new()
            .set("customer", json!({"name": "Ada"}))
            .set("region", "eu");
        let err = compile(&orders(), &updates, &config()).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdates(_)));
    }

    #[test]
    fn test_should_remove_sort_key_when_all_fields_removed() {
        let updates = Updates::new().remove("placedAt").remove("status");
        let plan = compile(&orders(), &updates, &config()).unwrap();
        assert_eq!(
            plan.expression(),
            "REMOVE #value.placedAt, #value.#n0, gsi1sk"
        );
    }

    #[test]
    fn test_should_reject_partial_sort_key() {
        let updates = Updates::new().set("placedAt", "2024-01-31");
        let err = compile(&orders(), &updates, &config()).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdateValue(_)));
    }

    #[test]
    fn test_should_reject_edit_below_key_field() {
        let collection = Collection::new(
            "users",
            TableLayout::default().with_index(IndexLayout::new("byProfile", "gsi1pk")),
        )
        .with_access_pattern(AccessPattern::new("byProfile", &["profile"], &[]).unwrap());
        let updates = Updates::new().set("profile.nick", "ada");
        let err = compile(&collection, &updates, &config()).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdateValue(_)));
    }

    #[test]
    fn test_should_map_function_named_field() {
        let updates = Updates::new().set("attribute_exists", 1);
        let plan = compile(&users(), &updates, &config()).unwrap();
        assert_eq!(plan.expression(), "SET #value.#n0 = :v0");
        assert_eq!(plan.names["#n0"], "attribute_exists");
    }

    #[test]
    fn test_should_leave_sort_key_alone_when_untouched() {
        let updates = Updates::new().set("note", "x");
        let plan = compile(&orders(), &updates, &config()).unwrap();
        assert_eq!(plan.expression(), "SET #value.note = :v0");
        let touches_sort_key = plan
            .set_actions
            .iter()
            .chain(&plan.remove_actions)
            .any(|action| action.contains("gsi1sk"));
        assert!(!touches_sort_key);
    }

    #[test]
    fn test_should_remove_single_field_sort_key() {
        let tasks = Collection::new(
            "tasks",
            TableLayout::default()
                .with_index(IndexLayout::new("byAssignee", "gsi1pk").with_sort_attr("gsi1sk")),
        )
        .with_access_pattern(
            AccessPattern::new("byAssignee", &["assignee"], &["dueAt"]).unwrap(),
        );
        let updates = Updates::new().remove("dueAt");
        let plan = compile(&tasks, &updates, &config()).unwrap();
        assert!(plan.set_actions.is_empty());
        assert_eq!(plan.expression(), "REMOVE #value.dueAt, gsi1sk");
    }

    #[test]
    fn test_should_keep_wrapper_and_reserved_names_apart() {
        let updates = Updates::new().set("value", 1).set("count", 2);
        let plan = compile(&users(), &updates, &config()).unwrap();
        let expression = plan.expression();
        assert_eq!(expression, "SET #value.#n0 = :v0, #value.#value = :v1");
        assert_eq!(
            plan.names,
            BTreeMap::from([
                ("#n0".to_owned(), "count".to_owned()),
                ("#value".to_owned(), "value".to_owned()),
            ])
        );
        let raw_reserved = expression
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '#' || c == ':'))
            .filter(|word| !word.starts_with('#') && !word.starts_with(':'))
            .any(crate::expression::reserved::is_reserved);
        assert!(!raw_reserved);
    }

    #[test]
    fn test_should_report_missing_index() {
        let collection = Collection::new("users", TableLayout::default())
            .with_access_pattern(AccessPattern::new("byEmail", &["email"], &[]).unwrap());
        let updates = Updates::new().set("name", "Ada");
        let err = compile(&collection, &updates, &config()).unwrap_err();
        assert!(matches!(err, DocumentError::IndexNotFound { .. }));
    }

    #[test]
    fn test_should_guard_update_with_existence_and_caller_condition() {
        let updates = Updates::new().set("name", "Ada");
        let condition = Condition::Equals(KeyPath::parse("version").unwrap(), json!(1));
        let plan = compile_guarded(&users(), &updates, Some(&condition), &config()).unwrap();
        assert_eq!(
            plan.condition_expression.as_deref(),
            Some("attribute_exists(pk) AND (#value.version = :v1)")
        );
    }

    #[test]
    fn test_should_treat_null_as_remove_in_json_patch() {
        let Value::Object(patch) = json!({"email": null, "name": "Ada"}) else {
            unreachable!()
        };
        let plan = compile(&users(), &Updates::from(patch), &config()).unwrap();
        assert_eq!(
            plan.expression(),
            "SET #value.#n0 = :v0 REMOVE #value.email, gsi1pk"
        );
    }
}
