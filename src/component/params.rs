use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};

// ---------------------------------------------------------------------------
// ParamValue – a single constructor argument
// ---------------------------------------------------------------------------

/// A dynamically-typed parameter value as it appears in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::String(s) => write!(f, "'{s}'"),
            ParamValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl ParamValue {
    /// Convert a parsed YAML node. Mappings and tagged values have no
    /// parameter representation and yield `None`.
    pub fn from_yaml(value: &Value) -> Option<ParamValue> {
        match value {
            Value::Null => Some(ParamValue::Null),
            Value::Bool(b) => Some(ParamValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ParamValue::Integer(i))
                } else {
                    n.as_f64().map(ParamValue::Float)
                }
            }
            Value::String(s) => Some(ParamValue::String(s.clone())),
            Value::Sequence(items) => items
                .iter()
                .map(ParamValue::from_yaml)
                .collect::<Option<Vec<_>>>()
                .map(ParamValue::List),
            Value::Mapping(_) | Value::Tagged(_) => None,
        }
    }

    pub fn to_yaml(&self) -> Value {
        match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Integer(i) => Value::Number((*i).into()),
            ParamValue::Float(v) => Value::Number((*v).into()),
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::List(items) => Value::Sequence(items.iter().map(|v| v.to_yaml()).collect()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "bool",
            ParamValue::Integer(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::String(_) => "string",
            ParamValue::List(_) => "list",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers are accepted wherever a float is expected.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Integer(i)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::List(items.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// ParamSchema – declared constructor arguments
// ---------------------------------------------------------------------------

/// One declared argument. `default == None` marks it as required.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub default: Option<ParamValue>,
}

/// The explicit argument list of a component class, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    decls: Vec<ParamDecl>,
}

/// Why a set of overrides could not be merged into a schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentMismatch {
    pub missing: Vec<String>,
    pub unknown: Vec<String>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str) -> Self {
        self.decls.push(ParamDecl {
            name: name.to_string(),
            default: None,
        });
        self
    }

    pub fn optional(mut self, name: &str, default: impl Into<ParamValue>) -> Self {
        self.decls.push(ParamDecl {
            name: name.to_string(),
            default: Some(default.into()),
        });
        self
    }

    pub fn decls(&self) -> &[ParamDecl] {
        &self.decls
    }

    pub fn declares(&self, name: &str) -> bool {
        self.decls.iter().any(|d| d.name == name)
    }

    /// Names of the arguments that have no declared default.
    pub fn required_names(&self) -> Vec<&str> {
        self.decls
            .iter()
            .filter(|d| d.default.is_none())
            .map(|d| d.name.as_str())
            .collect()
    }

    /// Copy of this schema with some defaults replaced (or supplied).
    /// Returns the names that this schema does not declare as the error.
    pub fn with_defaults(
        &self,
        defaults: &BTreeMap<String, ParamValue>,
    ) -> Result<ParamSchema, Vec<String>> {
        let unknown: Vec<String> = defaults
            .keys()
            .filter(|name| !self.declares(name))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(unknown);
        }

        let decls = self
            .decls
            .iter()
            .map(|d| ParamDecl {
                name: d.name.clone(),
                default: defaults.get(&d.name).cloned().or_else(|| d.default.clone()),
            })
            .collect();
        Ok(ParamSchema { decls })
    }

    /// Merge override arguments over the declared defaults.
    ///
    /// The result lists every declared argument in declaration order with its
    /// effective value.
    pub fn merge(&self, overrides: &[(String, ParamValue)]) -> Result<Params, ArgumentMismatch> {
        let mut mismatch = ArgumentMismatch::default();

        for (name, _) in overrides {
            if !self.declares(name) {
                mismatch.unknown.push(name.clone());
            }
        }

        let mut entries = Vec::with_capacity(self.decls.len());
        for decl in &self.decls {
            let supplied = overrides
                .iter()
                .rev()
                .find(|(name, _)| *name == decl.name)
                .map(|(_, v)| v.clone());
            match supplied.or_else(|| decl.default.clone()) {
                Some(value) => entries.push((decl.name.clone(), value)),
                None => mismatch.missing.push(decl.name.clone()),
            }
        }

        if mismatch.missing.is_empty() && mismatch.unknown.is_empty() {
            Ok(Params { entries })
        } else {
            Err(mismatch)
        }
    }
}

// ---------------------------------------------------------------------------
// Params – effective arguments of an instance
// ---------------------------------------------------------------------------

/// Ordered name → value mapping of the arguments an instance was built with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn require(&self, name: &str) -> ConfigResult<&ParamValue> {
        self.get(name).ok_or_else(|| ConfigError::InvalidParameter {
            param: name.to_string(),
            expected: "a value",
            found: "nothing".to_string(),
        })
    }

    fn mismatch(name: &str, expected: &'static str, found: &ParamValue) -> ConfigError {
        ConfigError::InvalidParameter {
            param: name.to_string(),
            expected,
            found: format!("{} {found}", found.type_name()),
        }
    }

    pub fn bool(&self, name: &str) -> ConfigResult<bool> {
        let value = self.require(name)?;
        value.as_bool().ok_or_else(|| Self::mismatch(name, "bool", value))
    }

    pub fn f64(&self, name: &str) -> ConfigResult<f64> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| Self::mismatch(name, "number", value))
    }

    pub fn usize(&self, name: &str) -> ConfigResult<usize> {
        let value = self.require(name)?;
        value
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| Self::mismatch(name, "non-negative integer", value))
    }

    pub fn str(&self, name: &str) -> ConfigResult<&str> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| Self::mismatch(name, "string", value))
    }

    /// A list of non-negative integers; a bare integer is read as a one-element list.
    pub fn usize_list(&self, name: &str) -> ConfigResult<Vec<usize>> {
        let value = self.require(name)?;
        let as_usize = |v: &ParamValue| v.as_i64().and_then(|i| usize::try_from(i).ok());
        match value {
            ParamValue::List(items) => items
                .iter()
                .map(as_usize)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| Self::mismatch(name, "list of non-negative integers", value)),
            other => as_usize(other)
                .map(|i| vec![i])
                .ok_or_else(|| Self::mismatch(name, "list of non-negative integers", value)),
        }
    }
}
