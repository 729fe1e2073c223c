//! Splits request text into request-scoped rules and the query pattern.

use faultline_dsl::{parse_unit, Atom, Clause};

use crate::error::QueryShapeError;

/// A parsed request: rules that live for this request only, plus the atom
/// to look up once they have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestProgram {
    pub rules: Vec<Clause>,
    pub pattern: Atom,
}

/// The last clause must be bodiless and becomes the pattern; everything
/// before it is a request-scoped rule (or fact).
pub fn parse_request(text: &str) -> Result<RequestProgram, QueryShapeError> {
    let mut clauses = parse_unit(text)?;
    let last = clauses.pop().ok_or(QueryShapeError::EmptyQuery)?;
    if !last.is_bodiless() {
        return Err(QueryShapeError::InvalidQueryShape {
            clause: last.to_string(),
        });
    }
    Ok(RequestProgram {
        rules: clauses,
        pattern: last.head,
    })
}
