//! Parsing expressions back into condition groups.
//!
//! The accepted grammar is one level of grouping:
//!
//! ```text
//! expr  := group (" or " group)*
//! group := "(" [clause " and "]* host ")"
//! host  := http.host eq "<domain>"
//! ```
//!
//! Anything else is `UnsupportedExpression`. Clauses that no matcher
//! recognizes are not errors; they are reported in [`Decompiled::skipped`].

use serde::Serialize;

use edgeward_contracts::{
    condition::{Condition, ConditionGroup, LogicalOperator},
    error::{EdgewardError, EdgewardResult},
};

use crate::{group, matcher};

/// A clause the matcher did not recognize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedClause {
    /// Index of the group the clause was in.
    pub group: usize,
    /// Position of the clause inside its group.
    pub position: usize,
    /// The clause text as found in the expression.
    pub raw: String,
}

/// Result of decompiling one expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decompiled {
    /// The domain named by the host clauses.
    pub host: String,
    pub groups: Vec<ConditionGroup>,
    pub skipped: Vec<SkippedClause>,
}

impl Decompiled {
    /// True if every clause was recognized.
    pub fn is_lossless(&self) -> bool {
        self.skipped.is_empty()
    }

    /// The groups as a flat, tagged condition list.
    pub fn conditions(&self) -> Vec<Condition> {
        group::flatten(&self.groups)
    }
}

/// Decompile an expression produced by [`compile`](crate::compile::compile).
pub fn decompile(expr: &str) -> EdgewardResult<Decompiled> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(unsupported("expression is empty"));
    }

    let mut host: Option<String> = None;
    let mut groups = Vec::new();
    let mut skipped = Vec::new();
    let raw_groups = split_top_level(expr, "or")?;
    let group_count = raw_groups.len();

    for (group_index, raw_group) in raw_groups.into_iter().enumerate() {
        let inner = strip_parens(raw_group)?;
        let mut clauses = split_top_level(inner, "and")?;

        let group_host = clauses
            .pop()
            .and_then(matcher::match_host)
            .ok_or_else(|| unsupported(format!("group {group_index} has no trailing host clause")))?;
        match &host {
            Some(h) if *h != group_host => {
                return Err(unsupported(format!(
                    "groups name different hosts: {h:?} and {group_host:?}"
                )));
            }
            Some(_) => {}
            None => host = Some(group_host),
        }

        let mut conditions = Vec::with_capacity(clauses.len());
        for (position, clause) in clauses.into_iter().enumerate() {
            check_clause(clause)?;
            match matcher::match_clause(clause) {
                Some(condition) => conditions.push(condition),
                None => {
                    tracing::warn!(group = group_index, position, clause, "unrecognized clause skipped");
                    skipped.push(SkippedClause {
                        group: group_index,
                        position,
                        raw: clause.trim().to_string(),
                    });
                }
            }
        }

        match ConditionGroup::new(conditions) {
            Some(g) => groups.push(g),
            // A host-only group is the whole expression, or every clause
            // in it was skipped.
            None if group_count == 1 || skipped.iter().any(|s| s.group == group_index) => {}
            None => {
                return Err(unsupported(format!(
                    "host-only group {group_index} inside a disjunction"
                )));
            }
        }
    }

    let host = host.ok_or_else(|| unsupported("expression has no host clause"))?;
    let groups = group::partition(groups.into_iter().flat_map(tag_group).collect());
    Ok(Decompiled { host, groups, skipped })
}

/// Mark each group's first condition as a group boundary so the partition
/// keeps the groups apart.
fn tag_group(group: ConditionGroup) -> Vec<Condition> {
    group.tagged(LogicalOperator::Or).into_conditions()
}

/// Reject clauses that only make sense in a nested grammar.
fn check_clause(clause: &str) -> EdgewardResult<()> {
    let clause = clause.trim();
    if clause.starts_with('(') {
        return Err(unsupported(format!("nested group {clause:?}")));
    }
    if split_top_level(clause, "or")?.len() > 1 {
        return Err(unsupported(format!("'or' inside a group: {clause:?}")));
    }
    if matcher::match_host(clause).is_some() {
        return Err(unsupported("more than one host clause in a group"));
    }
    Ok(())
}

/// Strip the outer parentheses of a group, which must enclose all of it.
fn strip_parens(raw: &str) -> EdgewardResult<&str> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| unsupported(format!("group is not parenthesized: {raw:?}")))?;
    // `(a) and (b)` strips to `a) and (b`, which does not balance.
    if !is_balanced(inner) {
        return Err(unsupported(format!("group is not parenthesized: {raw:?}")));
    }
    Ok(inner)
}

/// Tracks whether a byte offset is inside a string literal.
///
/// All syntax characters are ASCII, so scanning bytes never splits a UTF-8
/// sequence at a boundary we slice on.
#[derive(Default)]
struct Lexer {
    quote: Option<QuoteKind>,
    escaped: bool,
    depth: i32,
    /// The last two bytes fed, most recent first.
    history: [Option<u8>; 2],
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum QuoteKind {
    Escaped,
    Raw,
}

impl Lexer {
    /// Feed the next byte.
    fn step(&mut self, byte: u8) {
        let raw_prefix = self.history[0] == Some(b'r') && self.history[1].map_or(true, starts_token);
        self.history = [Some(byte), self.history[0]];
        match self.quote {
            Some(QuoteKind::Escaped) => {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.quote = None;
                }
            }
            Some(QuoteKind::Raw) => {
                if byte == b'"' {
                    self.quote = None;
                }
            }
            None => match byte {
                b'"' if raw_prefix => self.quote = Some(QuoteKind::Raw),
                b'"' => self.quote = Some(QuoteKind::Escaped),
                b'(' => self.depth += 1,
                b')' => self.depth -= 1,
                _ => {}
            },
        }
    }

    fn at_top_level(&self) -> bool {
        self.quote.is_none() && self.depth == 0
    }
}

/// True when a token may begin right after `byte`.
fn starts_token(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'(' | b'{' | b'[' | b',')
}

fn is_balanced(text: &str) -> bool {
    let mut lexer = Lexer::default();
    for &b in text.as_bytes() {
        lexer.step(b);
        if lexer.depth < 0 {
            return false;
        }
    }
    lexer.at_top_level()
}

/// Split on `<ws>keyword<ws>` occurring outside quotes and parentheses.
fn split_top_level<'a>(text: &'a str, keyword: &str) -> EdgewardResult<Vec<&'a str>> {
    let bytes = text.as_bytes();
    let kw = keyword.as_bytes();
    let mut lexer = Lexer::default();
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if lexer.at_top_level() && bytes[i].is_ascii_whitespace() {
            let kw_start = skip_ws(bytes, i);
            let kw_end = kw_start + kw.len();
            if bytes.get(kw_start..kw_end) == Some(kw)
                && bytes.get(kw_end).is_some_and(u8::is_ascii_whitespace)
            {
                pieces.push(&text[start..i]);
                i = skip_ws(bytes, kw_end);
                start = i;
                continue;
            }
        }
        lexer.step(bytes[i]);
        if lexer.depth < 0 {
            return Err(unsupported(format!("unbalanced ')' in {text:?}")));
        }
        i += 1;
    }

    if !lexer.at_top_level() {
        return Err(unsupported(format!("unterminated string or group in {text:?}")));
    }
    pieces.push(&text[start..]);
    Ok(pieces)
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn unsupported(reason: impl Into<String>) -> EdgewardError {
    EdgewardError::UnsupportedExpression { reason: reason.into() }
}
