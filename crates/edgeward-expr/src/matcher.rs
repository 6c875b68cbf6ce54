//! Clause recognition.
//!
//! Each matcher is a complete winnow parser for one clause shape. They are
//! tried in a fixed order and the first one that consumes the whole clause
//! wins. Header and file-extension shapes come before the generic `http.*`
//! shapes because the generic field grammar would otherwise accept them.

use winnow::ascii::{multispace0, multispace1};
use winnow::combinator::{alt, delimited, opt, preceded, separated, terminated};
use winnow::error::{ContextError, ErrMode, ModalResult};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use edgeward_contracts::condition::{Condition, ConditionValue, Field, Operator};

type ClauseMatcher = fn(&mut &str) -> ModalResult<Condition>;

/// Recognizers in precedence order.
const MATCHERS: &[(&str, ClauseMatcher)] = &[
    ("header_not_contains", header_not_contains),
    ("header_any", header_any),
    ("header_all_ne", header_all_ne),
    ("extension_not_in", extension_not_in),
    ("extension_in", extension_in),
    ("extension_compare", extension_compare),
    ("generic_not_contains", generic_not_contains),
    ("generic_wildcard", generic_wildcard),
    ("generic_compare", generic_compare),
    ("generic_starts_with", generic_starts_with),
    ("generic_ends_with", generic_ends_with),
    ("ip_src_in", ip_src_in),
    ("country_in", country_in),
    ("known_bot", known_bot),
    ("verified_bot_set", verified_bot_set),
    ("verified_bot_compare", verified_bot_compare),
];

/// Recognize one clause. Returns `None` if no matcher accepts it.
pub fn match_clause(clause: &str) -> Option<Condition> {
    let clause = clause.trim();
    MATCHERS.iter().find_map(|(name, matcher)| {
        let mut matcher = *matcher;
        matcher.parse(clause).ok().inspect(|_| {
            tracing::trace!(matcher = *name, clause, "clause recognized");
        })
    })
}

/// Recognize the mandatory `http.host eq "<domain>"` clause.
pub fn match_host(clause: &str) -> Option<String> {
    host_clause.parse(clause.trim()).ok()
}

/// Map a wire field path (after `http.`) to its logical field.
pub fn field_from_wire(path: &str) -> Field {
    match path {
        "request.full_uri" => Field::FullUri,
        "request.uri.path.extension" => Field::FileExtension,
        other => Field::Generic(other.to_string()),
    }
}

// -- Lexical pieces ---------------------------------------------------------

pub(crate) fn quoted(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        match any.parse_next(input)? {
            '"' => return Ok(s),
            '\\' => match any.parse_next(input)? {
                '"' => s.push('"'),
                '\\' => s.push('\\'),
                other => {
                    s.push('\\');
                    s.push(other);
                }
            },
            c => s.push(c),
        }
    }
}

fn raw_quoted(input: &mut &str) -> ModalResult<String> {
    delimited("r\"", take_while(0.., |c: char| c != '"'), '"')
        .map(str::to_string)
        .parse_next(input)
}

fn quoted_set(input: &mut &str) -> ModalResult<Vec<String>> {
    delimited(
        ('{', multispace0),
        separated(1.., quoted, multispace1),
        (multispace0, '}'),
    )
    .parse_next(input)
}

fn bare_set(input: &mut &str) -> ModalResult<Vec<String>> {
    let items: Vec<&str> = delimited(
        ('{', multispace0),
        separated(
            1..,
            take_while(1.., |c: char| !c.is_whitespace() && c != '}' && c != '{' && c != '"'),
            multispace1,
        ),
        (multispace0, '}'),
    )
    .parse_next(input)?;
    Ok(items.into_iter().map(str::to_string).collect())
}

fn negation(input: &mut &str) -> ModalResult<bool> {
    opt(("not", multispace1)).map(|n| n.is_some()).parse_next(input)
}

/// `word` surrounded by mandatory whitespace.
fn keyword<'i>(word: &'static str) -> impl Parser<&'i str, &'i str, ErrMode<ContextError>> {
    delimited(multispace1, word, multispace1)
}

fn eq_ne(input: &mut &str) -> ModalResult<Operator> {
    alt(("eq".value(Operator::Eq), "ne".value(Operator::Ne))).parse_next(input)
}

/// `http.<path>` with the path mapped to a logical field.
fn http_field(input: &mut &str) -> ModalResult<Field> {
    preceded(
        "http.",
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    )
    .map(field_from_wire)
    .parse_next(input)
}

/// `http.request.headers["<name>"][*]`, yielding the header name.
fn header_target(input: &mut &str) -> ModalResult<String> {
    delimited("http.request.headers[", quoted, "][*]").parse_next(input)
}

fn host_clause(input: &mut &str) -> ModalResult<String> {
    preceded(("http.host", keyword("eq")), quoted).parse_next(input)
}

// -- Matchers ---------------------------------------------------------------

fn header(name: String, operator: Operator, value: String) -> Condition {
    Condition {
        name: Some(name),
        ..Condition::new(Field::Header, operator, ConditionValue::One(value))
    }
}

fn header_not_contains(input: &mut &str) -> ModalResult<Condition> {
    let (name, value) = delimited(
        ("not", multispace1, "any("),
        (terminated(header_target, keyword("contains")), quoted),
        ')',
    )
    .parse_next(input)?;
    Ok(header(name, Operator::NotContains, value))
}

fn header_any(input: &mut &str) -> ModalResult<Condition> {
    let (name, _, op, _, value) = delimited(
        "any(",
        (
            header_target,
            multispace1,
            alt(("eq".value(Operator::Eq), "contains".value(Operator::Contains))),
            multispace1,
            quoted,
        ),
        ')',
    )
    .parse_next(input)?;
    Ok(header(name, op, value))
}

fn header_all_ne(input: &mut &str) -> ModalResult<Condition> {
    let (name, value) = delimited("all(", (terminated(header_target, keyword("ne")), quoted), ')')
        .parse_next(input)?;
    Ok(header(name, Operator::Ne, value))
}

fn extension_set(input: &mut &str) -> ModalResult<Condition> {
    let negated = negation.parse_next(input)?;
    let items = preceded(("http.request.uri.path.extension", keyword("in")), quoted_set)
        .parse_next(input)?;
    let op = if negated { Operator::NotIn } else { Operator::In };
    Ok(Condition::new(Field::FileExtension, op, ConditionValue::Many(items)))
}

fn extension_not_in(input: &mut &str) -> ModalResult<Condition> {
    extension_set
        .verify(|c: &Condition| c.operator == Operator::NotIn)
        .parse_next(input)
}

fn extension_in(input: &mut &str) -> ModalResult<Condition> {
    extension_set
        .verify(|c: &Condition| c.operator == Operator::In)
        .parse_next(input)
}

fn extension_compare(input: &mut &str) -> ModalResult<Condition> {
    let (_, _, op, _, value) = (
        "http.request.uri.path.extension",
        multispace1,
        eq_ne,
        multispace1,
        quoted,
    )
        .parse_next(input)?;
    Ok(Condition::new(Field::FileExtension, op, ConditionValue::One(value)))
}

fn generic_not_contains(input: &mut &str) -> ModalResult<Condition> {
    let (field, value) = preceded(
        ("not", multispace1),
        (terminated(http_field, keyword("contains")), quoted),
    )
    .parse_next(input)?;
    Ok(Condition::new(field, Operator::NotContains, ConditionValue::One(value)))
}

fn generic_wildcard(input: &mut &str) -> ModalResult<Condition> {
    let (field, value) =
        (terminated(http_field, keyword("wildcard")), raw_quoted).parse_next(input)?;
    Ok(Condition::new(field, Operator::Wildcard, ConditionValue::One(value)))
}

fn generic_compare(input: &mut &str) -> ModalResult<Condition> {
    let (field, _, op, _, value) = (
        http_field,
        multispace1,
        alt((
            "eq".value(Operator::Eq),
            "ne".value(Operator::Ne),
            "contains".value(Operator::Contains),
        )),
        multispace1,
        quoted,
    )
        .parse_next(input)?;
    Ok(Condition::new(field, op, ConditionValue::One(value)))
}

fn string_function(name: &'static str, op: Operator) -> impl FnMut(&mut &str) -> ModalResult<Condition> {
    move |input: &mut &str| {
        let (field, value) = delimited(
            (name, '('),
            (terminated(http_field, (',', multispace0)), quoted),
            ')',
        )
        .parse_next(input)?;
        Ok(Condition::new(field, op, ConditionValue::One(value)))
    }
}

fn generic_starts_with(input: &mut &str) -> ModalResult<Condition> {
    string_function("starts_with", Operator::StartsWith).parse_next(input)
}

fn generic_ends_with(input: &mut &str) -> ModalResult<Condition> {
    string_function("ends_with", Operator::EndsWith).parse_next(input)
}

fn ip_src_in(input: &mut &str) -> ModalResult<Condition> {
    let items = preceded(("ip.src", keyword("in")), bare_set).parse_next(input)?;
    Ok(Condition::new(Field::IpSrc, Operator::In, ConditionValue::Many(items)))
}

fn country_in(input: &mut &str) -> ModalResult<Condition> {
    let negated = negation.parse_next(input)?;
    let items = preceded(("ip.src.country", keyword("in")), quoted_set).parse_next(input)?;
    let op = if negated { Operator::NotIn } else { Operator::In };
    Ok(Condition::new(Field::IpSrcCountry, op, ConditionValue::Many(items)))
}

fn known_bot(input: &mut &str) -> ModalResult<Condition> {
    let negated = terminated(negation, "cf.client.bot").parse_next(input)?;
    Ok(Condition::new(Field::BotKnown, Operator::Eq, ConditionValue::Flag(!negated)))
}

fn verified_bot_set(input: &mut &str) -> ModalResult<Condition> {
    let negated = negation.parse_next(input)?;
    let items =
        preceded(("cf.verified_bot_category", keyword("in")), quoted_set).parse_next(input)?;
    let op = if negated { Operator::NotIn } else { Operator::In };
    Ok(Condition::new(Field::BotVerifiedCategory, op, ConditionValue::Many(items)))
}

fn verified_bot_compare(input: &mut &str) -> ModalResult<Condition> {
    let (_, _, op, _, value) =
        ("cf.verified_bot_category", multispace1, eq_ne, multispace1, quoted).parse_next(input)?;
    Ok(Condition::new(Field::BotVerifiedCategory, op, ConditionValue::One(value)))
}
