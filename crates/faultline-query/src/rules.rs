//! Operator-maintained base rules and per-request program assembly.

use faultline_dsl::{parse_unit, Atom, Clause, Fact, Literal, ParseError, Term};
use faultline_engine::Program;

/// Rules applied to every request, ahead of the request's own rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRules {
    clauses: Vec<Clause>,
}

impl Default for BaseRules {
    fn default() -> Self {
        Self::standard()
    }
}

impl BaseRules {
    /// Transitive dependencies over `calls/2`:
    ///
    /// ```text
    /// depends_on(X, Y) :- calls(X, Y).
    /// depends_on(X, Z) :- calls(X, Y), depends_on(Y, Z).
    /// ```
    pub fn standard() -> Self {
        let atom = |predicate: &str, vars: &[&str]| {
            Atom::new(predicate, vars.iter().map(|v| Term::var(*v)).collect())
        };
        let positive = |atom: Atom| Literal::Positive { atom };
        Self {
            clauses: vec![
                Clause {
                    head: atom("depends_on", &["X", "Y"]),
                    body: vec![positive(atom("calls", &["X", "Y"]))],
                },
                Clause {
                    head: atom("depends_on", &["X", "Z"]),
                    body: vec![
                        positive(atom("calls", &["X", "Y"])),
                        positive(atom("depends_on", &["Y", "Z"])),
                    ],
                },
            ],
        }
    }

    pub fn empty() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    pub fn from_text(text: &str) -> Result<Self, ParseError> {
        Ok(Self {
            clauses: parse_unit(text)?,
        })
    }

    /// Append rules parsed from `text` (e.g. an operator rules file).
    pub fn extend_from_text(&mut self, text: &str) -> Result<usize, ParseError> {
        let parsed = parse_unit(text)?;
        let added = parsed.len();
        self.clauses.extend(parsed);
        Ok(added)
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Base rules first, then request rules, then the aggregated facts. Nothing
/// is validated here; the evaluator reports arity or safety problems.
pub fn assemble_program(base: &BaseRules, request_rules: Vec<Clause>, facts: Vec<Fact>) -> Program {
    let mut rules = Vec::with_capacity(base.len() + request_rules.len());
    rules.extend(base.clauses().iter().cloned());
    rules.extend(request_rules);
    Program::new(rules, facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_dsl::Value;

    #[test]
    fn standard_rules_print_as_the_documented_text() {
        let printed: Vec<String> = BaseRules::standard()
            .clauses()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            printed,
            vec![
                "depends_on(X, Y) :- calls(X, Y).",
                "depends_on(X, Z) :- calls(X, Y), depends_on(Y, Z).",
            ]
        );
    }

    #[test]
    fn request_rules_extend_but_never_replace_base_rules() {
        let base = BaseRules::standard();
        let request = parse_unit("depends_on(X, Y) :- manual_dep(X, Y).").expect("parse");
        let facts = vec![Fact::new("calls", vec![Value::from("a"), Value::from("b")])];

        let program = assemble_program(&base, request.clone(), facts.clone());
        assert_eq!(program.rules.len(), 3);
        assert_eq!(&program.rules[..2], base.clauses());
        assert_eq!(program.rules[2], request[0]);
        assert_eq!(program.facts, facts);
    }

    #[test]
    fn extra_rules_append_to_the_base_set() {
        let mut base = BaseRules::standard();
        let added = base
            .extend_from_text("# extra\nupstream(X, Y) :- depends_on(Y, X).")
            .expect("parse");
        assert_eq!(added, 1);
        assert_eq!(base.len(), 3);
    }
}
