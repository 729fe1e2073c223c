//! Faultline rule language.
//!
//! Telemetry (log lines, trace spans, the static service graph) is treated as
//! a set of ground facts; operators and callers describe diagnoses as
//! Datalog-style rules over those facts. This crate owns the surface syntax:
//!
//! ```text
//! # facts
//! calls("api-gateway", "order-service").
//!
//! # rules (negation and comparisons are allowed in bodies)
//! depends_on(X, Z) :- calls(X, Y), depends_on(Y, Z).
//! slow(T, S) :- span(T, _, _, S, _, D), D > 50, !ignored(S).
//!
//! # a query is a bodiless atom; its trailing `.` is optional
//! depends_on(X, "order-service")
//! ```
//!
//! Evaluation lives in `faultline-engine`; this crate only parses, prints and
//! digests programs.

pub mod ast;
pub mod digest;
pub mod parser;

pub use ast::{Atom, Clause, CompareOp, Fact, Literal, Term, Value};
pub use parser::{parse_atom, parse_clause, parse_unit, ParseError};
