//! `nom` parser for the rule language.
//!
//! Grammar (informal):
//!
//! ```text
//! unit     := clause* final?
//! clause   := atom (":-" literal ("," literal)*)? "."
//! final    := atom (":-" literal ("," literal)*)?        -- last clause, `.` optional
//! literal  := "!" atom | term op term | atom
//! atom     := pred ("(" (term ("," term)*)? ")")?
//! term     := string | integer | Variable | "_"
//! pred     := [a-z][A-Za-z0-9_]* ("." [A-Za-z0-9_]+)*
//! ```
//!
//! `#` starts a comment that runs to the end of the line.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1},
    character::complete::{char as pchar, digit1, multispace1, not_line_ending},
    combinator::{cut, map, not, opt, peek, recognize, value},
    error::ErrorKind,
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

use crate::ast::{Atom, Clause, CompareOp, Literal, Term, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    fn at(text: &str, rest: &str, message: impl Into<String>) -> Self {
        let offset = text.len().saturating_sub(rest.len());
        let consumed = &text[..offset];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rfind('\n')
            .map(|nl| consumed[nl + 1..].chars().count())
            .unwrap_or_else(|| consumed.chars().count())
            + 1;
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Parse a sequence of clauses. The final clause may omit its `.`.
pub fn parse_unit(text: &str) -> Result<Vec<Clause>, ParseError> {
    let mut clauses = Vec::new();
    let mut input = skip_trivia(text);

    while !input.is_empty() {
        let (rest, clause) = clause_core(input).map_err(|e| {
            ParseError::at(text, failure_point(&e, input), describe(&e, "expected a clause"))
        })?;
        clauses.push(clause);

        let rest = skip_trivia(rest);
        if let Some(after_dot) = rest.strip_prefix('.') {
            input = skip_trivia(after_dot);
        } else if rest.is_empty() {
            input = rest;
        } else {
            return Err(ParseError::at(
                text,
                rest,
                format!("expected `.` or `:-` before `{}`", snippet(rest)),
            ));
        }
    }

    Ok(clauses)
}

/// Parse exactly one clause (trailing `.` optional).
pub fn parse_clause(text: &str) -> Result<Clause, ParseError> {
    let mut clauses = parse_unit(text)?;
    match clauses.len() {
        1 => Ok(clauses.remove(0)),
        0 => Err(ParseError::at(text, "", "expected a clause, found nothing")),
        n => Err(ParseError::at(
            text,
            "",
            format!("expected a single clause, found {n}"),
        )),
    }
}

/// Parse a single atom (trailing `.` optional).
pub fn parse_atom(text: &str) -> Result<Atom, ParseError> {
    let input = skip_trivia(text);
    let (rest, parsed) = atom(input).map_err(|e| {
        ParseError::at(text, failure_point(&e, input), describe(&e, "expected an atom"))
    })?;
    let rest = skip_trivia(rest);
    let rest = rest.strip_prefix('.').map(skip_trivia).unwrap_or(rest);
    if !rest.is_empty() {
        return Err(ParseError::at(
            text,
            rest,
            format!("unexpected input after atom: `{}`", snippet(rest)),
        ));
    }
    Ok(parsed)
}

fn failure_point<'a>(err: &nom::Err<nom::error::Error<&'a str>>, fallback: &'a str) -> &'a str {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
        nom::Err::Incomplete(_) => fallback,
    }
}

fn describe(err: &nom::Err<nom::error::Error<&str>>, fallback: &str) -> String {
    match err {
        nom::Err::Failure(e) if e.code == ErrorKind::TooLarge => {
            "integer literal out of range for i64".to_string()
        }
        nom::Err::Failure(e) if e.code == ErrorKind::Char => match e.input.chars().next() {
            Some(c) => format!("expected `,` or `)` in argument list, found `{c}`"),
            None => "unclosed argument list".to_string(),
        },
        _ => fallback.to_string(),
    }
}

fn snippet(rest: &str) -> String {
    let line = rest.lines().next().unwrap_or_default();
    line.chars().take(24).collect()
}

// ============================================================================
// Trivia
// ============================================================================

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(pchar('#'), not_line_ending))(input)
}

fn trivia(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, comment))))(input)
}

fn skip_trivia(input: &str) -> &str {
    match trivia(input) {
        Ok((rest, ())) => rest,
        Err(_) => input,
    }
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(trivia, inner, trivia)
}

// ============================================================================
// Clauses and literals
// ============================================================================

fn clause_core(input: &str) -> IResult<&str, Clause> {
    let (input, head) = ws(atom)(input)?;
    let (input, body) = opt(preceded(
        ws(tag(":-")),
        separated_list1(ws(pchar(',')), ws(literal)),
    ))(input)?;
    Ok((
        input,
        Clause {
            head,
            body: body.unwrap_or_default(),
        },
    ))
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((negative_literal, compare_literal, positive_literal))(input)
}

fn negative_literal(input: &str) -> IResult<&str, Literal> {
    map(preceded(pair(pchar('!'), trivia), atom), |atom| {
        Literal::Negative { atom }
    })(input)
}

fn positive_literal(input: &str) -> IResult<&str, Literal> {
    map(atom, |atom| Literal::Positive { atom })(input)
}

fn compare_literal(input: &str) -> IResult<&str, Literal> {
    map(
        tuple((term, ws(compare_op), term)),
        |(left, op, right)| Literal::Compare { op, left, right },
    )(input)
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    // Longest operators first so `<=` is not read as `<`.
    alt((
        value(CompareOp::Ne, tag("!=")),
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::Eq, tag("=")),
    ))(input)
}

// ============================================================================
// Atoms and terms
// ============================================================================

fn atom(input: &str) -> IResult<&str, Atom> {
    let (input, predicate) = predicate_name(input)?;
    // Once `(` is seen the atom is committed: a bad argument list is reported
    // where it goes wrong, not at the predicate.
    let (input, args) = opt(preceded(
        pair(trivia, pchar('(')),
        cut(terminated(
            separated_list0(ws(pchar(',')), ws(term)),
            pair(trivia, pchar(')')),
        )),
    ))(input)?;
    Ok((
        input,
        Atom {
            predicate: predicate.to_string(),
            args: args.unwrap_or_default(),
        },
    ))
}

fn predicate_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        pair(
            take_while1(|c: char| c.is_ascii_lowercase()),
            take_while(is_ident_continue),
        ),
        many0(pair(pchar('.'), take_while1(is_ident_continue))),
    ))(input)
}

fn term(input: &str) -> IResult<&str, Term> {
    alt((
        map(string_lit, Term::constant),
        map(integer, Term::constant),
        wildcard,
        map(variable, Term::var),
    ))(input)
}

fn wildcard(input: &str) -> IResult<&str, Term> {
    value(
        Term::Wildcard,
        pair(pchar('_'), not(peek(take_while1(is_ident_continue)))),
    )(input)
}

fn variable(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            take_while1(|c: char| c.is_ascii_uppercase() || c == '_'),
            take_while(is_ident_continue),
        )),
        |s: &str| s.to_string(),
    )(input)
}

fn integer(input: &str) -> IResult<&str, i64> {
    let (rest, digits) = recognize(pair(opt(pchar('-')), digit1))(input)?;
    match digits.parse::<i64>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        ))),
    }
}

fn string_lit(input: &str) -> IResult<&str, String> {
    let esc = escaped_transform(
        is_not("\\\""),
        '\\',
        alt((
            value("\\", tag("\\")),
            value("\"", tag("\"")),
            value("\n", tag("n")),
            value("\t", tag("t")),
            value("\r", tag("r")),
        )),
    );
    // `escaped_transform` rejects empty input, so `""` needs its own arm.
    alt((
        value(String::new(), tag("\"\"")),
        delimited(pchar('"'), esc, pchar('"')),
    ))(input)
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
