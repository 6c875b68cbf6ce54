//! The condition model.
//!
//! A `Condition` is one clause of a rule expression in its structured, UI
//! facing shape. Conditions carry no behavior: rendering lives in
//! `edgeward-expr::compile` and recognition in `edgeward-expr::matcher`.
//!
//! The JSON shape matches what the policy UI sends:
//!
//! ```json
//! { "field": "header", "name": "X-Test", "operator": "eq",
//!   "value": "1", "logicalOperator": "and" }
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// The request attribute a condition inspects.
///
/// Serialized as a plain string. Any name outside the fixed catalog is a
/// `Generic` field and renders as `http.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Field {
    /// A request header; the header name lives in `Condition::name`.
    Header,
    /// `http.request.full_uri`.
    FullUri,
    /// `http.request.uri.path.extension`.
    FileExtension,
    /// `cf.client.bot`.
    BotKnown,
    /// `cf.verified_bot_category`.
    BotVerifiedCategory,
    /// `ip.src`.
    IpSrc,
    /// `ip.src.country`.
    IpSrcCountry,
    /// Any other `http.<path>` field, stored without the `http.` prefix.
    Generic(String),
}

impl Field {
    pub fn as_str(&self) -> &str {
        match self {
            Field::Header => "header",
            Field::FullUri => "full_uri",
            Field::FileExtension => "file_extension",
            Field::BotKnown => "bot_known",
            Field::BotVerifiedCategory => "bot_verified_category",
            Field::IpSrc => "ip_src",
            Field::IpSrcCountry => "ip_src_country",
            Field::Generic(name) => name,
        }
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        match s.as_str() {
            "header" => Field::Header,
            "full_uri" => Field::FullUri,
            "file_extension" => Field::FileExtension,
            "bot_known" => Field::BotKnown,
            "bot_verified_category" => Field::BotVerifiedCategory,
            "ip_src" => Field::IpSrc,
            "ip_src_country" => Field::IpSrcCountry,
            _ => Field::Generic(s),
        }
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        match field {
            Field::Generic(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Contains,
    NotContains,
    In,
    #[serde(alias = "not in")]
    NotIn,
    Wildcard,
    StartsWith,
    EndsWith,
}

impl Operator {
    /// The token used for this operator in the expression language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Wildcard => "wildcard",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
        }
    }

    /// True for operators that take a set of values.
    pub fn is_set(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The right-hand side of a condition.
///
/// Set operators carry `Many`; `bot_known` carries `Flag`; everything else
/// carries `One`. The UI sends file-extension sets as a comma-joined string,
/// which `items()` splits. That shape is accepted on input only: the
/// decompiler and [`Condition::new`] both produce `Many` for set operators
/// and `Flag` for `bot_known`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Flag(bool),
    One(String),
    Many(Vec<String>),
}

impl ConditionValue {
    /// The value as a list of trimmed, non-empty items.
    pub fn items(&self) -> Vec<String> {
        match self {
            ConditionValue::Flag(b) => vec![b.to_string()],
            ConditionValue::One(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            ConditionValue::Many(items) => items.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConditionValue::One(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(s: &str) -> Self {
        ConditionValue::One(s.to_string())
    }
}

impl From<Vec<String>> for ConditionValue {
    fn from(items: Vec<String>) -> Self {
        ConditionValue::Many(items)
    }
}

/// How a condition joins the one before it in a flat condition list.
///
/// The first condition of a list is always `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    None,
    And,
    Or,
}

fn null_as_none<'de, D>(deserializer: D) -> Result<LogicalOperator, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<LogicalOperator>::deserialize(deserializer)?.unwrap_or_default())
}

/// One clause of a policy expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field: Field,

    /// Header name. Present only when `field` is `Header`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub operator: Operator,

    pub value: ConditionValue,

    /// Join with the previous condition; only meaningful in flat lists.
    #[serde(default, deserialize_with = "null_as_none")]
    pub logical_operator: LogicalOperator,
}

impl Condition {
    /// A condition on `field`, with the value in its canonical shape: a
    /// comma-joined `One` under a set operator becomes `Many`, and a
    /// `"true"`/`"false"` bot flag becomes `Flag`.
    pub fn new(field: Field, operator: Operator, value: impl Into<ConditionValue>) -> Self {
        let value = match value.into() {
            one @ ConditionValue::One(_) if operator.is_set() => ConditionValue::Many(one.items()),
            ConditionValue::One(s) if field == Field::BotKnown && (s == "true" || s == "false") => {
                ConditionValue::Flag(s == "true")
            }
            value => value,
        };
        Self {
            field,
            name: None,
            operator,
            value,
            logical_operator: LogicalOperator::None,
        }
    }

    /// A header condition.
    pub fn header(name: impl Into<String>, operator: Operator, value: &str) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(Field::Header, operator, value)
        }
    }

    /// Return a copy joined to its predecessor with `op`.
    pub fn joined(mut self, op: LogicalOperator) -> Self {
        self.logical_operator = op;
        self
    }
}

/// A non-empty sequence of conditions that are implicitly AND-ed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConditionGroup {
    conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// Build a group, returning `None` for an empty condition list.
    pub fn new(conditions: Vec<Condition>) -> Option<Self> {
        if conditions.is_empty() {
            None
        } else {
            Some(Self { conditions })
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.conditions.iter()
    }

    pub fn into_conditions(self) -> Vec<Condition> {
        self.conditions
    }

    /// Re-tag the group: the first condition joins with `leading`, every
    /// other condition with `and`.
    pub fn tagged(mut self, leading: LogicalOperator) -> Self {
        for (i, c) in self.conditions.iter_mut().enumerate() {
            c.logical_operator = if i == 0 { leading } else { LogicalOperator::And };
        }
        self
    }
}

impl<'a> IntoIterator for &'a ConditionGroup {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}
