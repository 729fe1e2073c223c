//! AST for the rule language.
//!
//! `Display` on every node renders text that `crate::parser` accepts again.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type Name = String;

// ============================================================================
// Values and terms
// ============================================================================

/// A ground constant.
///
/// Ordering is value-based: numbers compare numerically, strings
/// lexicographically, and every number sorts before every string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(i64),
    String(String),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Render without quoting syntax (`"a"` → `a`, `500` → `500`).
    pub fn render(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
        }
    }

    /// Ordering between two values of the same kind; `None` across kinds.
    pub fn compare_same_kind(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Term {
    Const { value: Value },
    Var { name: Name },
    Wildcard,
}

impl Term {
    pub fn constant(value: impl Into<Value>) -> Self {
        Term::Const {
            value: value.into(),
        }
    }

    pub fn var(name: impl Into<Name>) -> Self {
        Term::Var { name: name.into() }
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Term::Var { name } => Some(name),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Term::Const { value } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Const { value } => write!(f, "{value}"),
            Term::Var { name } => f.write_str(name),
            Term::Wildcard => f.write_str("_"),
        }
    }
}

// ============================================================================
// Atoms and facts
// ============================================================================

/// `predicate(t0, t1, ...)`; may contain variables and wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    pub predicate: Name,
    pub args: Vec<Term>,
}

impl Atom {
    pub fn new(predicate: impl Into<Name>, args: Vec<Term>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|t| matches!(t, Term::Const { .. }))
    }

    /// Variable names in argument order (repeats included).
    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Term::as_var)
    }

    pub fn has_wildcard(&self) -> bool {
        self.args.iter().any(|t| matches!(t, Term::Wildcard))
    }

    /// `Some(fact)` when every argument is a constant.
    pub fn to_fact(&self) -> Option<Fact> {
        let args = self
            .args
            .iter()
            .map(|t| t.as_const().cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Fact {
            predicate: self.predicate.clone(),
            args,
        })
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

/// A fully grounded atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: Name,
    pub args: Vec<Value>,
}

impl Fact {
    pub fn new(predicate: impl Into<Name>, args: Vec<Value>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn to_atom(&self) -> Atom {
        Atom {
            predicate: self.predicate.clone(),
            args: self.args.iter().cloned().map(Term::constant).collect(),
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

// ============================================================================
// Literals and clauses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Comparisons across value kinds only satisfy `!=`.
    pub fn holds(self, left: &Value, right: &Value) -> bool {
        let Some(ord) = left.compare_same_kind(right) else {
            return self == CompareOp::Ne;
        };
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Literal {
    Positive { atom: Atom },
    Negative { atom: Atom },
    Compare { op: CompareOp, left: Term, right: Term },
}

impl Literal {
    pub fn atom(&self) -> Option<&Atom> {
        match self {
            Literal::Positive { atom } | Literal::Negative { atom } => Some(atom),
            Literal::Compare { .. } => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Positive { atom } => write!(f, "{atom}"),
            Literal::Negative { atom } => write!(f, "!{atom}"),
            Literal::Compare { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
        }
    }
}

/// `head :- body.`; an empty body makes the clause a fact when the head is
/// ground.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Clause {
    pub head: Atom,
    pub body: Vec<Literal>,
}

impl Clause {
    pub fn fact(head: Atom) -> Self {
        Self { head, body: vec![] }
    }

    pub fn is_bodiless(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            f.write_str(" :- ")?;
            for (i, lit) in self.body.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{lit}")?;
            }
        }
        f.write_str(".")
    }
}
