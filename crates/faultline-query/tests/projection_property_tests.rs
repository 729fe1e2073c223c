use faultline_dsl::{Atom, Fact, Term, Value};
use faultline_query::{project, BindingValue};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Arg {
    Var(&'static str),
    Wildcard,
    Const,
}

fn arg() -> impl Strategy<Value = Arg> {
    prop_oneof![
        prop::sample::select(vec!["A", "B", "Service", "TraceID"]).prop_map(Arg::Var),
        Just(Arg::Wildcard),
        Just(Arg::Const),
    ]
}

fn pattern(args: &[Arg]) -> Atom {
    Atom::new(
        "p",
        args.iter()
            .map(|a| match a {
                Arg::Var(name) => Term::var(*name),
                Arg::Wildcard => Term::Wildcard,
                Arg::Const => Term::constant("c"),
            })
            .collect(),
    )
}

fn first_occurrences(args: &[Arg]) -> Vec<&'static str> {
    let mut seen = Vec::new();
    for a in args {
        if let Arg::Var(name) = a {
            if !seen.contains(name) {
                seen.push(*name);
            }
        }
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn keys_are_distinct_variables_in_first_position_order(args in prop::collection::vec(arg(), 1..6)) {
        let fact = Fact::new("p", vec![Value::from("v"); args.len()]);
        let results = project(&pattern(&args), &[fact]).expect("project");

        prop_assert_eq!(results.len(), 1);
        let keys: Vec<&str> = results[0].keys().collect();
        prop_assert_eq!(keys, first_occurrences(&args));
        prop_assert!(results[0].iter().all(|(_, v)| *v == BindingValue::from("v")));
    }

    #[test]
    fn repeated_variable_needs_equal_values(arity in 2usize..6) {
        let args = vec![Arg::Var("A"); arity];
        let distinct = Fact::new("p", (0..arity as i64).map(Value::Number).collect());
        let same = Fact::new("p", vec![Value::Number(7); arity]);

        let results = project(&pattern(&args), &[distinct, same]).expect("project");
        prop_assert_eq!(results.len(), 1);
        prop_assert_eq!(results[0].get("A"), Some(&BindingValue::from(7i64)));
    }
}
