//! Evaluation of parsed expressions against stored items.
//!
//! Placeholders are resolved through the request's name and value maps.
//! Conditions evaluate to a boolean; updates produce a new item and leave
//! the original untouched.

use std::collections::BTreeMap;

use docstack_model::{AttributeValue, Item};

use super::ast::{AttributePath, CompareOp, Expr, Operand, UpdateExpr};
use super::parser::ExpressionError;

// ---------------------------------------------------------------------------
// Evaluation context
// ---------------------------------------------------------------------------

/// An item bound to the substitutions of one request.
#[derive(Debug)]
pub struct EvalContext<'a> {
    /// The item being evaluated; empty when no item exists yet.
    pub item: &'a Item,
    /// `#name` substitutions.
    pub names: &'a BTreeMap<String, String>,
    /// `:value` substitutions.
    pub values: &'a BTreeMap<String, AttributeValue>,
}

impl EvalContext<'_> {
    /// Evaluate a condition against the item.
    pub fn evaluate(&self, expr: &Expr) -> Result<bool, ExpressionError> {
        match expr {
            Expr::Compare { left, op, right } => {
                let left = self.resolve_operand(left)?;
                let right = self.resolve_operand(right)?;
                // Comparisons involving a missing attribute are false.
                Ok(match (left, right) {
                    (Some(l), Some(r)) => match op {
                        CompareOp::Eq => values_equal(l, r),
                        CompareOp::Ne => !values_equal(l, r),
                    },
                    _ => false,
                })
            }
            Expr::Exists(path) => Ok(self.resolve_path(path)?.is_some()),
            Expr::NotExists(path) => Ok(self.resolve_path(path)?.is_none()),
            Expr::And(left, right) => Ok(self.evaluate(left)? && self.evaluate(right)?),
            Expr::Or(left, right) => Ok(self.evaluate(left)? || self.evaluate(right)?),
            Expr::Not(inner) => self.evaluate(inner).map(|v| !v),
        }
    }

    /// Resolve an operand to a value, `None` if the attribute is missing.
    pub fn resolve_operand(
        &self,
        operand: &Operand,
    ) -> Result<Option<&AttributeValue>, ExpressionError> {
        match operand {
            Operand::Value(name) => self
                .values
                .get(name)
                .map(Some)
                .ok_or_else(|| ExpressionError::UnresolvedValue { name: name.clone() }),
            Operand::Path(path) => self.resolve_path(path),
        }
    }

    /// Walk a path through nested maps.
    pub fn resolve_path(
        &self,
        path: &AttributePath,
    ) -> Result<Option<&AttributeValue>, ExpressionError> {
        let names = self.resolve_names(path)?;
        let mut current: Option<&AttributeValue> = None;
        for (i, name) in names.iter().enumerate() {
            current = if i == 0 {
                self.item.get(name)
            } else {
                current.and_then(AttributeValue::as_m).and_then(|m| m.get(name))
            };
            if current.is_none() {
                return Ok(None);
            }
        }
        Ok(current)
    }

    /// Substitute `#name` placeholders in a path.
    pub fn resolve_names(&self, path: &AttributePath) -> Result<Vec<String>, ExpressionError> {
        path.elements
            .iter()
            .map(|element| {
                if element.starts_with('#') {
                    self.names
                        .get(element)
                        .cloned()
                        .ok_or_else(|| ExpressionError::UnresolvedName {
                            name: element.clone(),
                        })
                } else {
                    Ok(element.clone())
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Update application
// ---------------------------------------------------------------------------

impl EvalContext<'_> {
    /// Apply an update, returning the modified copy of the item.
    ///
    /// Right-hand sides are resolved against the original item. Intermediate
    /// maps on `SET` paths are created as needed.
    pub fn apply_update(&self, update: &UpdateExpr) -> Result<Item, ExpressionError> {
        let mut result = self.item.clone();

        for action in &update.set_actions {
            let path = self.resolve_names(&action.path)?;
            let value = self
                .resolve_operand(&action.value)?
                .cloned()
                .ok_or_else(|| ExpressionError::InvalidPath {
                    path: action.path.to_string(),
                    message: "the value operand refers to a missing attribute".to_owned(),
                })?;
            set_path_value(&mut result, &path, value).map_err(|message| {
                ExpressionError::InvalidPath {
                    path: action.path.to_string(),
                    message,
                }
            })?;
        }

        for path in &update.remove_actions {
            let path = self.resolve_names(path)?;
            apply_remove(&mut result, &path);
        }

        Ok(result)
    }
}

/// Attribute values compare by type and content; numbers compare by value.
fn values_equal(left: &AttributeValue, right: &AttributeValue) -> bool {
    match (left, right) {
        (AttributeValue::N(l), AttributeValue::N(r)) => match (l.parse::<f64>(), r.parse::<f64>()) {
            (Ok(l), Ok(r)) => (l - r).abs() < f64::EPSILON * l.abs().max(1.0),
            _ => l == r,
        },
        _ => left == right,
    }
}

fn set_path_value(item: &mut Item, path: &[String], value: AttributeValue) -> Result<(), String> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(());
    };

    let mut current = item;
    for name in parents {
        let entry = current
            .entry(name.clone())
            .or_insert_with(|| AttributeValue::M(BTreeMap::new()));
        current = match entry {
            AttributeValue::M(map) => map,
            other => {
                return Err(format!(
                    "{name} is of type {} and cannot hold nested attributes",
                    other.type_descriptor()
                ));
            }
        };
    }
    current.insert(last.clone(), value);
    Ok(())
}

fn apply_remove(item: &mut Item, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = item;
    for name in parents {
        match current.get_mut(name) {
            Some(AttributeValue::M(map)) => current = map,
            _ => return,
        }
    }
    current.remove(last);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::{parse_condition, parse_update};

    fn s(v: &str) -> AttributeValue {
        AttributeValue::S(v.to_owned())
    }

    fn item() -> Item {
        Item::from([
            ("pk".to_owned(), s("users|u1")),
            (
                "value".to_owned(),
                AttributeValue::M(BTreeMap::from([
                    ("email".to_owned(), s("a@x.com")),
                    ("count".to_owned(), AttributeValue::N("3".to_owned())),
                ])),
            ),
        ])
    }

    fn names() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("#value".to_owned(), "value".to_owned()),
            ("#n0".to_owned(), "count".to_owned()),
        ])
    }

    #[test]
    fn test_should_evaluate_existence_and_comparisons() {
        let item = item();
        let names = names();
        let values = BTreeMap::from([
            (":v0".to_owned(), AttributeValue::N("3.0".to_owned())),
            (":v1".to_owned(), s("b@x.com")),
        ]);
        let ctx = EvalContext {
            item: &item,
            names: &names,
            values: &values,
        };
        let eval = |e: &str| ctx.evaluate(&parse_condition(e).unwrap()).unwrap();

        assert!(eval("attribute_exists(pk)"));
        assert!(!eval("attribute_not_exists(pk)"));
        assert!(eval("#value.#n0 = :v0"));
        assert!(eval("#value.email <> :v1"));
        assert!(!eval("#value.missing <> :v1"));
        assert!(eval("NOT (#value.email = :v1) AND attribute_exists(#value.email)"));
    }

    #[test]
    fn test_should_fail_on_unresolved_placeholders() {
        let item = item();
        let names = BTreeMap::new();
        let values = BTreeMap::new();
        let ctx = EvalContext {
            item: &item,
            names: &names,
            values: &values,
        };
        let err = ctx
            .evaluate(&parse_condition("attribute_exists(#value)").unwrap())
            .unwrap_err();
        assert!(matches!(err, ExpressionError::UnresolvedName { .. }));
        let err = ctx
            .evaluate(&parse_condition("pk = :v9").unwrap())
            .unwrap_err();
        assert!(matches!(err, ExpressionError::UnresolvedValue { .. }));
    }

    #[test]
    fn test_should_apply_nested_set_and_remove() {
        let item = item();
        let names = names();
        let values = BTreeMap::from([
            (":v0".to_owned(), s("new@x.com")),
            (":v1".to_owned(), s("users|new@x.com")),
            (":v2".to_owned(), s("Paris")),
        ]);
        let ctx = EvalContext {
            item: &item,
            names: &names,
            values: &values,
        };
        let update = parse_update(
            "SET #value.email = :v0, gsi1pk = :v1, #value.address.city = :v2 REMOVE #value.#n0",
        )
        .unwrap();
        let updated = ctx.apply_update(&update).unwrap();

        assert_eq!(updated["gsi1pk"], s("users|new@x.com"));
        let body = updated["value"].as_m().unwrap();
        assert_eq!(body["email"], s("new@x.com"));
        assert!(!body.contains_key("count"));
        assert_eq!(body["address"].as_m().unwrap()["city"], s("Paris"));
        assert_eq!(item["value"].as_m().unwrap()["email"], s("a@x.com"));
    }

    #[test]
    fn test_should_reject_set_below_scalar() {
        let item = item();
        let names = names();
        let values = BTreeMap::from([(":v0".to_owned(), s("x"))]);
        let ctx = EvalContext {
            item: &item,
            names: &names,
            values: &values,
        };
        let update = parse_update("SET #value.email.local = :v0").unwrap();
        let err = ctx.apply_update(&update).unwrap_err();
        assert!(matches!(err, ExpressionError::InvalidPath { .. }));
    }
}
