//! Program analysis: arity consistency, range restriction, stratification.
//!
//! Analysis turns a [`Program`] into an [`AnalyzedProgram`]:
//! - ground facts (including bodiless rules with ground heads),
//! - rules compiled to slot form (variables numbered per rule),
//! - rules grouped by stratum so negation only reads completed relations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use faultline_dsl::{Atom, Clause, CompareOp, Fact, Literal, Term, Value};

use crate::EvalError;

/// Rules plus base facts, as handed to an evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub rules: Vec<Clause>,
    pub facts: Vec<Fact>,
}

impl Program {
    pub fn new(rules: Vec<Clause>, facts: Vec<Fact>) -> Self {
        Self { rules, facts }
    }

    pub fn analyze(&self) -> Result<AnalyzedProgram, EvalError> {
        let arities = check_arities(self)?;

        let mut facts = self.facts.clone();
        let mut rules = Vec::new();
        for clause in &self.rules {
            if clause.is_bodiless() {
                let fact = clause.head.to_fact().ok_or_else(|| EvalError::NonGroundFact {
                    fact: clause.to_string(),
                })?;
                facts.push(fact);
            } else {
                check_safety(clause)?;
                rules.push(clause);
            }
        }

        let strata_of = stratify(&rules, &arities)?;
        let height = strata_of.values().copied().max().map_or(0, |m| m + 1);
        let mut strata: Vec<Stratum> = (0..height).map(|_| Stratum::default()).collect();
        for clause in rules {
            let level = strata_of.get(&clause.head.predicate).copied().unwrap_or(0);
            let stratum = &mut strata[level];
            stratum.predicates.insert(clause.head.predicate.clone());
            stratum.rules.push(CompiledRule::compile(clause));
        }
        strata.retain(|s| !s.rules.is_empty());

        Ok(AnalyzedProgram {
            facts,
            strata,
            arities,
        })
    }
}

/// A program that passed analysis and is ready to evaluate.
#[derive(Debug, Clone)]
pub struct AnalyzedProgram {
    pub(crate) facts: Vec<Fact>,
    pub(crate) strata: Vec<Stratum>,
    pub(crate) arities: BTreeMap<String, usize>,
}

impl AnalyzedProgram {
    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    pub fn rule_count(&self) -> usize {
        self.strata.iter().map(|s| s.rules.len()).sum()
    }

    pub fn strata_count(&self) -> usize {
        self.strata.len()
    }

    pub fn arity(&self, predicate: &str) -> Option<usize> {
        self.arities.get(predicate).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Stratum {
    /// Head predicates defined in this stratum.
    pub(crate) predicates: BTreeSet<String>,
    pub(crate) rules: Vec<CompiledRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    Const(Value),
    Var(usize),
    Wildcard,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledAtom {
    pub(crate) predicate: String,
    pub(crate) slots: Vec<Slot>,
}

impl CompiledAtom {
    fn vars(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().filter_map(|s| match s {
            Slot::Var(i) => Some(*i),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Filter {
    Absent(CompiledAtom),
    Compare { op: CompareOp, left: Slot, right: Slot },
}

impl Filter {
    pub(crate) fn vars(&self) -> Vec<usize> {
        match self {
            Filter::Absent(atom) => atom.vars().collect(),
            Filter::Compare { left, right, .. } => [left, right]
                .into_iter()
                .filter_map(|s| match s {
                    Slot::Var(i) => Some(*i),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub(crate) text: String,
    pub(crate) head: CompiledAtom,
    pub(crate) positives: Vec<CompiledAtom>,
    pub(crate) filters: Vec<Filter>,
    pub(crate) var_count: usize,
}

impl CompiledRule {
    fn compile(clause: &Clause) -> Self {
        // Number variables by first occurrence in the positive atoms; safety
        // guarantees every other variable occurs there too.
        let mut vars: HashMap<&str, usize> = HashMap::new();
        for lit in &clause.body {
            if let Literal::Positive { atom } = lit {
                for name in atom.vars() {
                    let next = vars.len();
                    vars.entry(name).or_insert(next);
                }
            }
        }

        let slot = |term: &Term| match term {
            Term::Const { value } => Slot::Const(value.clone()),
            Term::Var { name } => vars.get(name.as_str()).map_or(Slot::Wildcard, |i| Slot::Var(*i)),
            Term::Wildcard => Slot::Wildcard,
        };
        let compile_atom = |atom: &Atom| CompiledAtom {
            predicate: atom.predicate.clone(),
            slots: atom.args.iter().map(&slot).collect(),
        };

        let mut positives = Vec::new();
        let mut filters = Vec::new();
        for lit in &clause.body {
            match lit {
                Literal::Positive { atom } => positives.push(compile_atom(atom)),
                Literal::Negative { atom } => filters.push(Filter::Absent(compile_atom(atom))),
                Literal::Compare { op, left, right } => filters.push(Filter::Compare {
                    op: *op,
                    left: slot(left),
                    right: slot(right),
                }),
            }
        }

        Self {
            text: clause.to_string(),
            head: compile_atom(&clause.head),
            positives,
            filters,
            var_count: vars.len(),
        }
    }

    /// Positions of positive atoms whose predicate is defined in `stratum`.
    pub(crate) fn recursive_positions(&self, stratum: &BTreeSet<String>) -> Vec<usize> {
        self.positives
            .iter()
            .enumerate()
            .filter(|(_, atom)| stratum.contains(&atom.predicate))
            .map(|(i, _)| i)
            .collect()
    }
}

// ============================================================================
// Checks
// ============================================================================

fn check_arities(program: &Program) -> Result<BTreeMap<String, usize>, EvalError> {
    let mut arities: BTreeMap<String, usize> = BTreeMap::new();
    let mut record = |predicate: &str, found: usize, location: &dyn Fn() -> String| {
        match arities.get(predicate) {
            Some(&expected) if expected != found => Err(EvalError::ArityMismatch {
                predicate: predicate.to_string(),
                expected,
                found,
                location: location(),
            }),
            Some(_) => Ok(()),
            None => {
                arities.insert(predicate.to_string(), found);
                Ok(())
            }
        }
    };

    for fact in &program.facts {
        record(&fact.predicate, fact.arity(), &|| format!("fact `{fact}`"))?;
    }
    for clause in &program.rules {
        record(&clause.head.predicate, clause.head.arity(), &|| {
            format!("head of `{clause}`")
        })?;
        for atom in clause.body.iter().filter_map(Literal::atom) {
            record(&atom.predicate, atom.arity(), &|| format!("body of `{clause}`"))?;
        }
    }
    Ok(arities)
}

fn check_safety(clause: &Clause) -> Result<(), EvalError> {
    let unsafe_rule = |reason: String| EvalError::UnsafeRule {
        rule: clause.to_string(),
        reason,
    };

    let bound: BTreeSet<&str> = clause
        .body
        .iter()
        .filter_map(|lit| match lit {
            Literal::Positive { atom } => Some(atom.vars()),
            _ => None,
        })
        .flatten()
        .collect();

    if clause.head.has_wildcard() {
        return Err(unsafe_rule("wildcard in rule head".to_string()));
    }
    if let Some(var) = clause.head.vars().find(|v| !bound.contains(v)) {
        return Err(unsafe_rule(format!(
            "head variable `{var}` does not occur in a positive body atom"
        )));
    }

    for lit in &clause.body {
        match lit {
            Literal::Positive { .. } => {}
            Literal::Negative { atom } => {
                if let Some(var) = atom.vars().find(|v| !bound.contains(v)) {
                    return Err(unsafe_rule(format!(
                        "variable `{var}` in `{lit}` does not occur in a positive body atom"
                    )));
                }
            }
            Literal::Compare { left, right, .. } => {
                for term in [left, right] {
                    match term {
                        Term::Wildcard => {
                            return Err(unsafe_rule(format!("wildcard in comparison `{lit}`")));
                        }
                        Term::Var { name } if !bound.contains(name.as_str()) => {
                            return Err(unsafe_rule(format!(
                                "variable `{name}` in `{lit}` does not occur in a positive body atom"
                            )));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
    Ok(())
}

/// Assign each predicate a stratum such that `head >= body` for positive
/// dependencies and `head > body` for negated ones.
fn stratify(
    rules: &[&Clause],
    arities: &BTreeMap<String, usize>,
) -> Result<HashMap<String, usize>, EvalError> {
    let mut level: HashMap<String, usize> = arities.keys().map(|p| (p.clone(), 0)).collect();
    // A valid assignment never needs more levels than there are predicates.
    let ceiling = arities.len();

    loop {
        let mut changed = false;
        for clause in rules {
            let head = clause.head.predicate.as_str();
            for lit in &clause.body {
                let (atom, step) = match lit {
                    Literal::Positive { atom } => (atom, 0),
                    Literal::Negative { atom } => (atom, 1),
                    Literal::Compare { .. } => continue,
                };
                let required = level.get(&atom.predicate).copied().unwrap_or(0) + step;
                let current = level.get(head).copied().unwrap_or(0);
                if current < required {
                    if required > ceiling {
                        return Err(EvalError::Unstratifiable {
                            predicate: head.to_string(),
                        });
                    }
                    level.insert(head.to_string(), required);
                    changed = true;
                }
            }
        }
        if !changed {
            return Ok(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_dsl::parse_unit;

    fn program(text: &str) -> Program {
        Program::new(parse_unit(text).expect("parse"), vec![])
    }

    #[test]
    fn bodiless_ground_rules_become_facts() {
        let analyzed = program(r#"calls("a", "b"). p(X) :- calls(X, _)."#)
            .analyze()
            .expect("analyze");
        assert_eq!(analyzed.fact_count(), 1);
        assert_eq!(analyzed.rule_count(), 1);
    }

    #[test]
    fn negation_raises_the_stratum() {
        let analyzed = program(
            r#"
            reach(X, Y) :- edge(X, Y).
            reach(X, Z) :- edge(X, Y), reach(Y, Z).
            unreached(X, Y) :- node(X), node(Y), !reach(X, Y).
            "#,
        )
        .analyze()
        .expect("analyze");
        assert_eq!(analyzed.strata_count(), 2);
        assert!(analyzed.strata[0].predicates.contains("reach"));
        assert!(analyzed.strata[1].predicates.contains("unreached"));
    }

    #[test]
    fn negative_cycle_is_unstratifiable() {
        let err = program("p(X) :- q(X), !r(X). r(X) :- q(X), !p(X).")
            .analyze()
            .expect_err("should fail");
        assert!(matches!(err, EvalError::Unstratifiable { .. }), "{err}");
    }

    #[test]
    fn head_wildcard_is_unsafe() {
        let err = program("p(_) :- q(X).").analyze().expect_err("should fail");
        assert!(matches!(err, EvalError::UnsafeRule { .. }), "{err}");
    }

    #[test]
    fn recursive_positions_only_cover_same_stratum_atoms() {
        let analyzed = program("t(X, Z) :- e(X, Y), t(Y, Z). t(X, Y) :- e(X, Y).")
            .analyze()
            .expect("analyze");
        let stratum = &analyzed.strata[0];
        assert_eq!(stratum.rules[0].recursive_positions(&stratum.predicates), vec![1]);
        assert!(stratum.rules[1].recursive_positions(&stratum.predicates).is_empty());
    }
}
