//! Rendering conditions into the edge filter-expression language.

use edgeward_contracts::{
    condition::{Condition, ConditionGroup, ConditionValue, Field, Operator},
    error::{EdgewardError, EdgewardResult},
    policy::{Category, DesiredRule, PolicyRule},
};

/// Literal expression of the zone-wide DDoS override rule.
pub const MATCH_ALL: &str = "true";

/// Quote a string value, escaping `\` and `"`.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// The mandatory host clause of every group.
pub fn host_clause(domain: &str) -> String {
    format!("http.host eq {}", quote(domain))
}

/// Compile OR-ed groups for `domain` into one expression.
///
/// Every group gets a trailing host clause. With no groups at all the
/// expression is the host clause alone.
pub fn compile(groups: &[ConditionGroup], domain: &str) -> EdgewardResult<String> {
    if domain.trim().is_empty() {
        return Err(invalid("domain must not be empty"));
    }
    let host = host_clause(domain);
    if groups.is_empty() {
        return Ok(format!("({host})"));
    }

    let rendered = groups
        .iter()
        .map(|group| {
            let mut parts = group
                .iter()
                .map(render_condition)
                .collect::<EdgewardResult<Vec<_>>>()?;
            parts.push(host.clone());
            Ok(format!("({})", parts.join(" and ")))
        })
        .collect::<EdgewardResult<Vec<_>>>()?;

    Ok(rendered.join(" or "))
}

/// Compile a structured rule into the desired state the reconciler converges to.
///
/// A rule with no groups is absent, except for cache rules (host only) and the
/// DDoS override (always present, matches everything).
pub fn compile_rule(rule: &PolicyRule) -> EdgewardResult<DesiredRule> {
    let expression = match rule.category {
        Category::DdosOverride => MATCH_ALL.to_string(),
        Category::Cache => compile(&rule.groups, &rule.domain)?,
        _ if rule.groups.is_empty() => {
            return Ok(DesiredRule::absent(rule.category, rule.domain.clone()));
        }
        _ => compile(&rule.groups, &rule.domain)?,
    };
    Ok(DesiredRule::present(
        rule.category,
        rule.domain.clone(),
        rule.action.clone(),
        expression,
    )
    .with_parameters(rule.action_parameters.clone()))
}

/// Render one condition according to the field's syntax.
pub fn render_condition(c: &Condition) -> EdgewardResult<String> {
    match &c.field {
        Field::Header => render_header(c),
        Field::FullUri => render_string_field("http.request.full_uri", c),
        Field::Generic(name) => {
            validate_generic_name(name)?;
            render_string_field(&format!("http.{name}"), c)
        }
        Field::FileExtension => {
            let target = "http.request.uri.path.extension";
            match c.operator {
                Operator::In | Operator::NotIn => Ok(format!(
                    "{}{target} in {}",
                    negation(c.operator),
                    quoted_set(&set_items(c)?)
                )),
                Operator::Eq | Operator::Ne => {
                    Ok(format!("{target} {} {}", c.operator, quote(scalar(c)?)))
                }
                _ => Err(unsupported_operator(c)),
            }
        }
        Field::IpSrc => match c.operator {
            Operator::In => {
                let items = set_items(c)?;
                if let Some(bad) = items.iter().find(|i| !is_bare_token(i)) {
                    return Err(invalid(format!("IP set entry {bad:?} is not a bare token")));
                }
                Ok(format!("ip.src in {{{}}}", items.join(" ")))
            }
            _ => Err(unsupported_operator(c)),
        },
        Field::IpSrcCountry => match c.operator {
            Operator::In | Operator::NotIn => Ok(format!(
                "{}ip.src.country in {}",
                negation(c.operator),
                quoted_set(&set_items(c)?)
            )),
            _ => Err(unsupported_operator(c)),
        },
        Field::BotKnown => {
            let flag = match (&c.operator, &c.value) {
                (Operator::Eq, ConditionValue::Flag(b)) => *b,
                (Operator::Eq, ConditionValue::One(s)) if s == "true" || s == "false" => s == "true",
                (Operator::Eq, _) => return Err(invalid("bot_known takes a boolean value")),
                _ => return Err(unsupported_operator(c)),
            };
            Ok(if flag { "cf.client.bot" } else { "not cf.client.bot" }.to_string())
        }
        Field::BotVerifiedCategory => match c.operator {
            Operator::Eq | Operator::Ne => Ok(format!(
                "cf.verified_bot_category {} {}",
                c.operator,
                quote(scalar(c)?)
            )),
            Operator::In | Operator::NotIn => Ok(format!(
                "{}cf.verified_bot_category in {}",
                negation(c.operator),
                quoted_set(&set_items(c)?)
            )),
            _ => Err(unsupported_operator(c)),
        },
    }
}

fn render_header(c: &Condition) -> EdgewardResult<String> {
    let name = c
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("header condition needs a header name"))?;
    let target = format!("http.request.headers[{}][*]", quote(name));
    let value = quote(scalar(c)?);
    match c.operator {
        Operator::Eq => Ok(format!("any({target} eq {value})")),
        Operator::Ne => Ok(format!("all({target} ne {value})")),
        Operator::Contains => Ok(format!("any({target} contains {value})")),
        Operator::NotContains => Ok(format!("not any({target} contains {value})")),
        _ => Err(unsupported_operator(c)),
    }
}

/// Full URI and generic `http.*` fields share one operator table.
fn render_string_field(target: &str, c: &Condition) -> EdgewardResult<String> {
    let value = scalar(c)?;
    match c.operator {
        Operator::Wildcard => {
            if value.contains('"') {
                return Err(invalid("wildcard pattern cannot contain a double quote"));
            }
            Ok(format!("{target} wildcard r\"{value}\""))
        }
        Operator::NotContains => Ok(format!("not {target} contains {}", quote(value))),
        Operator::StartsWith => Ok(format!("starts_with({target}, {})", quote(value))),
        Operator::EndsWith => Ok(format!("ends_with({target}, {})", quote(value))),
        Operator::Eq | Operator::Ne | Operator::Contains => {
            Ok(format!("{target} {} {}", c.operator, quote(value)))
        }
        Operator::In | Operator::NotIn => Err(unsupported_operator(c)),
    }
}

fn validate_generic_name(name: &str) -> EdgewardResult<()> {
    let well_formed = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !well_formed {
        return Err(invalid(format!("field name {name:?} is not a valid http.* path")));
    }
    if name == "host" {
        return Err(invalid("http.host is implied by the rule domain"));
    }
    Ok(())
}

fn scalar(c: &Condition) -> EdgewardResult<&str> {
    c.value.as_str().ok_or_else(|| {
        invalid(format!(
            "operator {} on {} takes a single string value",
            c.operator, c.field
        ))
    })
}

fn set_items(c: &Condition) -> EdgewardResult<Vec<String>> {
    if matches!(c.value, ConditionValue::Flag(_)) {
        return Err(invalid(format!("operator {} takes a set of values", c.operator)));
    }
    let items = c.value.items();
    if items.is_empty() {
        return Err(invalid(format!("operator {} on {} needs at least one value", c.operator, c.field)));
    }
    Ok(items)
}

fn quoted_set(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| quote(i)).collect();
    format!("{{{}}}", quoted.join(" "))
}

fn negation(op: Operator) -> &'static str {
    if op == Operator::NotIn {
        "not "
    } else {
        ""
    }
}

fn is_bare_token(s: &str) -> bool {
    !s.is_empty() && !s.contains(|c: char| c.is_whitespace() || matches!(c, '{' | '}' | '"'))
}

fn unsupported_operator(c: &Condition) -> EdgewardError {
    invalid(format!("operator {} is not supported for field {}", c.operator, c.field))
}

fn invalid(reason: impl Into<String>) -> EdgewardError {
    EdgewardError::InvalidCondition { reason: reason.into() }
}
