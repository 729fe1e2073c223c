//! Turns matched facts back into named bindings.

use faultline_dsl::{Atom, Fact, Term};

use crate::error::QueryError;
use crate::model::{BindingValue, ResultBinding};

/// One binding per fact. Keys follow the variables' first positions in the
/// pattern; wildcard and constant positions never produce keys. A fact that
/// gives a repeated variable two different values does not match.
pub fn project(pattern: &Atom, facts: &[Fact]) -> Result<Vec<ResultBinding>, QueryError> {
    let mut results = Vec::with_capacity(facts.len());
    'facts: for fact in facts {
        if fact.arity() != pattern.arity() {
            return Err(QueryError::Projection(format!(
                "fact `{fact}` has arity {}, pattern `{pattern}` has arity {}",
                fact.arity(),
                pattern.arity()
            )));
        }

        let mut binding = ResultBinding::new();
        for (term, value) in pattern.args.iter().zip(&fact.args) {
            let Term::Var { name } = term else {
                continue;
            };
            let value = BindingValue::from(value);
            match binding.get(name) {
                Some(existing) if *existing != value => continue 'facts,
                Some(_) => {}
                None => binding.insert(name.as_str(), value),
            }
        }
        results.push(binding);
    }
    Ok(results)
}
