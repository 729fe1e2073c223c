use faultline_dsl::{parse_clause, Atom, Clause, CompareOp, Literal, Term, Value};
use proptest::prelude::*;

fn predicate() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9_]{0,6}(\\.[a-z0-9_]{1,4})?").unwrap()
}

fn variable() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Z][A-Za-z0-9_]{0,6}").unwrap()
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Number),
        // Includes quotes, backslashes and control characters the printer must escape.
        proptest::string::string_regex("[ -~\\n\\t\\r]{0,12}")
            .unwrap()
            .prop_map(Value::String),
    ]
}

fn term() -> impl Strategy<Value = Term> {
    prop_oneof![
        value().prop_map(|value| Term::Const { value }),
        variable().prop_map(|name| Term::Var { name }),
        Just(Term::Wildcard),
    ]
}

fn atom() -> impl Strategy<Value = Atom> {
    (predicate(), proptest::collection::vec(term(), 0..4))
        .prop_map(|(predicate, args)| Atom { predicate, args })
}

fn compare_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Lt),
        Just(CompareOp::Le),
        Just(CompareOp::Gt),
        Just(CompareOp::Ge),
    ]
}

fn literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        atom().prop_map(|atom| Literal::Positive { atom }),
        atom().prop_map(|atom| Literal::Negative { atom }),
        (compare_op(), term(), term()).prop_map(|(op, left, right)| Literal::Compare {
            op,
            left,
            right
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn printed_clauses_parse_back(head in atom(), body in proptest::collection::vec(literal(), 0..4)) {
        let clause = Clause { head, body };
        let text = clause.to_string();
        let parsed = parse_clause(&text).map_err(|e| TestCaseError::fail(format!("{e}: {text}")))?;
        prop_assert_eq!(parsed, clause);
    }
}
