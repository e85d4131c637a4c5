//! Syntax tree for the supported expression subset.

use std::fmt;

/// A dotted attribute path. Each element is either a plain name or a `#name`
/// placeholder, kept as written until evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath {
    /// Path elements, outermost first.
    pub elements: Vec<String>,
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.elements.join("."))
    }
}

/// A comparison operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// An attribute of the item.
    Path(AttributePath),
    /// A `:value` placeholder.
    Value(String),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
}

/// A condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `left op right`
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// `attribute_exists(path)`
    Exists(AttributePath),
    /// `attribute_not_exists(path)`
    NotExists(AttributePath),
    /// `left AND right`
    And(Box<Expr>, Box<Expr>),
    /// `left OR right`
    Or(Box<Expr>, Box<Expr>),
    /// `NOT inner`
    Not(Box<Expr>),
}

/// One `SET path = operand` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAction {
    /// Target path.
    pub path: AttributePath,
    /// New value.
    pub value: Operand,
}

/// An update expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateExpr {
    /// `SET` actions in order.
    pub set_actions: Vec<SetAction>,
    /// `REMOVE` paths in order.
    pub remove_actions: Vec<AttributePath>,
}

impl UpdateExpr {
    /// Every path the update writes or removes.
    pub fn targets(&self) -> impl Iterator<Item = &AttributePath> {
        self.set_actions
            .iter()
            .map(|a| &a.path)
            .chain(&self.remove_actions)
    }
}
