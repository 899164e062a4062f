//! The boolean condition language used by flag and cuisine rules.
//!
//! Rule files author conditions as nested JSON:
//!
//! ```json
//! {"allOf": [
//!   {"has_transform": "tf:cure"},
//!   {"param": {"transform": "tf:cure", "key": "nitrite_ppm", "op": "in", "value": ["high"]}},
//!   {"noneOf": [{"has_part": "part:milk"}]}
//! ]}
//! ```
//!
//! [`Condition::parse`] turns that into a typed tree once, at load time, so
//! evaluation never interprets raw JSON.

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

/// Comparison operator of a parameter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Parameter is present.
    Exists,
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Numerically greater.
    Gt,
    /// Numerically greater or equal.
    Gte,
    /// Numerically less.
    Lt,
    /// Numerically less or equal.
    Lte,
    /// Member of a list.
    In,
    /// Not a member of a list.
    NotIn,
}

impl CompareOp {
    /// Parses an operator name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exists" => Self::Exists,
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "in" => Self::In,
            "not_in" => Self::NotIn,
            _ => return None,
        })
    }

    /// Returns true if this operator needs an operand value.
    #[must_use]
    pub fn needs_value(self) -> bool {
        self != Self::Exists
    }
}

/// A parameter comparison against a TPT's identity steps.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTest {
    /// Transform id the parameter belongs to.
    pub transform: String,
    /// Parameter key.
    pub key: String,
    /// Operator.
    pub op: CompareOp,
    /// Operand (`None` only for `exists`).
    pub value: Option<Value>,
}

/// A typed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Every child holds.
    AllOf(Vec<Condition>),
    /// At least one child holds.
    AnyOf(Vec<Condition>),
    /// No child holds.
    NoneOf(Vec<Condition>),
    /// The identity path contains this transform.
    HasTransform(String),
    /// The TPT is on this part.
    HasPart(String),
    /// The TPT's taxon falls under this prefix.
    TaxonPrefix(String),
    /// A parameter comparison.
    Param(ParamTest),
}

/// Error raised while parsing a condition tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// The node is not a single-key object.
    #[error("condition node must be an object with exactly one key, got {0}")]
    Shape(String),
    /// The node key is not a known combinator or predicate.
    #[error("unknown condition key `{0}`")]
    UnknownKey(String),
    /// A combinator was not given an array.
    #[error("`{0}` expects an array of conditions")]
    ExpectedArray(String),
    /// A predicate was not given a string.
    #[error("`{0}` expects a string id")]
    ExpectedString(String),
    /// A parameter predicate is malformed.
    #[error("malformed param predicate: {0}")]
    Param(String),
}

impl Condition {
    /// Parses a JSON condition tree.
    ///
    /// # Errors
    ///
    /// Returns a [`ConditionError`] naming the first malformed node.
    pub fn parse(value: &Value) -> Result<Self, ConditionError> {
        let obj = match value.as_object() {
            Some(obj) if obj.len() == 1 => obj,
            _ => return Err(ConditionError::Shape(value.to_string())),
        };
        let Some((key, body)) = obj.iter().next() else {
            return Err(ConditionError::Shape(value.to_string()));
        };
        match key.as_str() {
            "allOf" => Ok(Self::AllOf(parse_children(key, body)?)),
            "anyOf" => Ok(Self::AnyOf(parse_children(key, body)?)),
            "noneOf" => Ok(Self::NoneOf(parse_children(key, body)?)),
            "has_transform" => Ok(Self::HasTransform(expect_str(key, body)?)),
            "has_part" => Ok(Self::HasPart(expect_str(key, body)?)),
            "taxon_prefix" => Ok(Self::TaxonPrefix(expect_str(key, body)?)),
            "param" => Ok(Self::Param(parse_param(body)?)),
            other => Err(ConditionError::UnknownKey(other.to_owned())),
        }
    }

    /// Returns every transform id referenced by this tree.
    #[must_use]
    pub fn referenced_transforms(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.walk(&mut |node| match node {
            Self::HasTransform(id) => {
                out.insert(id.as_str());
            }
            Self::Param(test) => {
                out.insert(test.transform.as_str());
            }
            _ => {}
        });
        out
    }

    /// Returns every part id referenced by this tree.
    #[must_use]
    pub fn referenced_parts(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.walk(&mut |node| {
            if let Self::HasPart(id) = node {
                out.insert(id.as_str());
            }
        });
        out
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        visit(self);
        if let Self::AllOf(children) | Self::AnyOf(children) | Self::NoneOf(children) = self {
            for child in children {
                child.walk(visit);
            }
        }
    }
}

fn parse_children(key: &str, body: &Value) -> Result<Vec<Condition>, ConditionError> {
    body.as_array()
        .ok_or_else(|| ConditionError::ExpectedArray(key.to_owned()))?
        .iter()
        .map(Condition::parse)
        .collect()
}

fn expect_str(key: &str, body: &Value) -> Result<String, ConditionError> {
    body.as_str()
        .map(str::to_owned)
        .ok_or_else(|| ConditionError::ExpectedString(key.to_owned()))
}

fn parse_param(body: &Value) -> Result<ParamTest, ConditionError> {
    let field = |name: &str| -> Result<String, ConditionError> {
        body.get(name)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ConditionError::Param(format!("missing string field `{name}`")))
    };
    let transform = field("transform")?;
    let key = field("key")?;
    let op_name = field("op")?;
    let op = CompareOp::from_name(&op_name)
        .ok_or_else(|| ConditionError::Param(format!("unknown operator `{op_name}`")))?;
    let value = body.get("value").cloned();
    if op.needs_value() && value.is_none() {
        return Err(ConditionError::Param(format!("operator `{op_name}` needs a value")));
    }
    if matches!(op, CompareOp::In | CompareOp::NotIn)
        && !value.as_ref().is_some_and(Value::is_array)
    {
        return Err(ConditionError::Param(format!(
            "operator `{op_name}` needs an array value"
        )));
    }
    Ok(ParamTest {
        transform,
        key,
        op,
        value,
    })
}
