//! Faultline engine: stratified semi-naive Datalog evaluation.
//!
//! The engine takes a [`Program`] (rules + ground facts), analyzes it
//! (arity, safety, stratification), computes the least fixpoint, and returns
//! a [`Closure`] that answers pattern lookups.
//!
//! ```text
//! Program ──analyze──▶ AnalyzedProgram ──SemiNaiveEvaluator──▶ Closure ──matches(atom)──▶ [Fact]
//! ```
//!
//! A closure is owned by one caller and discarded after use; nothing is
//! cached between evaluations.

pub mod eval;
pub mod program;
pub mod store;

use std::collections::BTreeMap;

use faultline_dsl::{Atom, Fact, Term, Value};
use thiserror::Error;

pub use eval::{EvalLimits, SemiNaiveEvaluator};
pub use program::{AnalyzedProgram, Program};
pub use store::{FactStore, Relation};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("arity mismatch for `{predicate}`: expected {expected}, found {found} in {location}")]
    ArityMismatch {
        predicate: String,
        expected: usize,
        found: usize,
        location: String,
    },
    #[error("fact is not ground: `{fact}`")]
    NonGroundFact { fact: String },
    #[error("unsafe rule `{rule}`: {reason}")]
    UnsafeRule { rule: String, reason: String },
    #[error("program is not stratifiable: `{predicate}` depends negatively on itself")]
    Unstratifiable { predicate: String },
    #[error("derived fact limit of {limit} exceeded")]
    FactLimitExceeded { limit: usize },
    #[error("evaluation interrupted")]
    Interrupted,
}

/// Cooperative cancellation for long evaluations.
pub trait Interrupt: Send + Sync {
    fn is_interrupted(&self) -> bool;
}

/// An [`Interrupt`] that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInterrupt;

impl Interrupt for NeverInterrupt {
    fn is_interrupted(&self) -> bool {
        false
    }
}

impl<F> Interrupt for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_interrupted(&self) -> bool {
        self()
    }
}

/// Evaluates a program to its closure.
pub trait RuleEvaluator: Send + Sync {
    fn evaluate(&self, program: &Program, interrupt: &dyn Interrupt) -> Result<Closure, EvalError>;
}

/// Base plus derived facts of one evaluated program.
#[derive(Debug, Clone)]
pub struct Closure {
    store: FactStore,
    arities: BTreeMap<String, usize>,
}

impl Closure {
    pub(crate) fn new(store: FactStore, arities: BTreeMap<String, usize>) -> Self {
        Self { store, arities }
    }

    /// Every fact with the pattern's predicate and arity whose constant
    /// positions equal the pattern's constants.
    ///
    /// Variables and wildcards match any value; a variable repeated in the
    /// pattern is *not* constrained to equal itself here.
    pub fn matches(&self, pattern: &Atom) -> Vec<Fact> {
        let Some(relation) = self.store.relation(&pattern.predicate) else {
            return Vec::new();
        };
        if relation.arity() != pattern.arity() {
            return Vec::new();
        }
        let bound: Vec<Option<&Value>> = pattern.args.iter().map(Term::as_const).collect();
        relation
            .select(&bound)
            .into_iter()
            .map(|row| Fact::new(pattern.predicate.clone(), row.to_vec()))
            .collect()
    }

    /// Reject a pattern whose arity disagrees with the program's use of the
    /// same predicate. Unknown predicates are accepted (they match nothing).
    pub fn check_pattern(&self, pattern: &Atom) -> Result<(), EvalError> {
        match self.arities.get(&pattern.predicate) {
            Some(&expected) if expected != pattern.arity() => Err(EvalError::ArityMismatch {
                predicate: pattern.predicate.clone(),
                expected,
                found: pattern.arity(),
                location: format!("query pattern `{pattern}`"),
            }),
            _ => Ok(()),
        }
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        self.store.contains(&fact.predicate, &fact.args)
    }

    pub fn fact_count(&self) -> usize {
        self.store.len()
    }

    /// Predicates known to the program (including ones with no facts), with
    /// their arities, sorted by name.
    pub fn predicates(&self) -> impl Iterator<Item = (&str, usize)> {
        self.arities.iter().map(|(name, arity)| (name.as_str(), *arity))
    }
}
