use std::{env, fs};

use faultline_dsl::parse_unit;

fn main() {
    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: faultline_parse_rules <rules.dl>");
        std::process::exit(2);
    };
    if args.next().is_some() {
        eprintln!("usage: faultline_parse_rules <rules.dl>");
        std::process::exit(2);
    }

    let text = match fs::read_to_string(&path) {
        Ok(v) => v,
        Err(err) => {
            eprintln!("failed to read `{path}`: {err}");
            std::process::exit(2);
        }
    };

    match parse_unit(&text) {
        Ok(clauses) => {
            let bodiless = clauses.iter().filter(|c| c.is_bodiless()).count();
            println!(
                "ok(rules): clauses={} rules={} bodiless={} digest={}",
                clauses.len(),
                clauses.len() - bodiless,
                bodiless,
                faultline_dsl::digest::program_digest_v1(&text)
            );
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
