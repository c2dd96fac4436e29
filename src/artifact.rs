//! Artifact model and dotted-path parameter resolution.
//!
//! The artifact is the single JSON document an analyzer receives on stdin.
//! It has no fixed schema: fields are looked up by path (`"config.proxy.http"`
//! or `["config", "proxy", "http"]`). A key that is absent or explicitly
//! `null` at any step stops the walk.

use std::io::Read;

use serde_json::Value;

use crate::errors::{AnalyzerError, AnalyzerResult};

/// A lookup path: a sequence of object keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamPath<'a>(Vec<&'a str>);

impl<'a> ParamPath<'a> {
    pub fn keys(&self) -> &[&'a str] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ParamPath<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl<'a> From<&'a str> for ParamPath<'a> {
    fn from(dotted: &'a str) -> Self {
        if dotted.is_empty() {
            return Self(Vec::new());
        }
        Self(dotted.split('.').collect())
    }
}

impl<'a> From<&'a [&'a str]> for ParamPath<'a> {
    fn from(keys: &'a [&'a str]) -> Self {
        Self(keys.to_vec())
    }
}

impl<'a, const N: usize> From<[&'a str; N]> for ParamPath<'a> {
    fn from(keys: [&'a str; N]) -> Self {
        Self(keys.to_vec())
    }
}

/// Walk `tree` one key at a time.
///
/// Returns `None` as soon as a key is missing, maps to `null`, or the current
/// node is not an object. An empty path yields the tree itself.
pub fn resolve<'v>(tree: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    match keys.split_first() {
        None => Some(tree),
        Some((head, rest)) => match tree.get(*head) {
            None | Some(Value::Null) => None,
            Some(child) => resolve(child, rest),
        },
    }
}

/// Resolve `path` inside an arbitrary subtree.
pub fn resolve_in<'v, 'p>(tree: &'v Value, path: impl Into<ParamPath<'p>>) -> Option<&'v Value> {
    let path = path.into();
    resolve(tree, path.keys())
}

/// The immutable input document of one analyzer run.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    root: Value,
}

impl Artifact {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Decode one JSON document from a reader.
    pub fn from_reader<R: Read>(reader: R) -> AnalyzerResult<Self> {
        let root: Value = serde_json::from_reader(reader).map_err(|e| {
            AnalyzerError::invalid(format!("Invalid input artifact: {}", e))
        })?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Value at `path`, if the whole path resolves.
    pub fn get<'p>(&self, path: impl Into<ParamPath<'p>>) -> Option<&Value> {
        resolve_in(&self.root, path)
    }

    /// Value at `path`, or the caller-supplied default.
    pub fn get_or<'p>(&self, path: impl Into<ParamPath<'p>>, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    /// Value at `path`, or the fail-fast error carrying `message`.
    pub fn require<'p>(&self, path: impl Into<ParamPath<'p>>, message: &str) -> AnalyzerResult<&Value> {
        self.get(path).ok_or_else(|| AnalyzerError::missing(message))
    }

    /// Optional string field. Values of another type are rejected.
    pub fn get_str<'p>(&self, path: impl Into<ParamPath<'p>>) -> AnalyzerResult<Option<&str>> {
        let path = path.into();
        match resolve(&self.root, path.keys()) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(AnalyzerError::invalid(format!("{} must be a string", path))),
        }
    }

    /// String field with a default.
    pub fn str_or<'a, 'p>(&'a self, path: impl Into<ParamPath<'p>>, default: &'a str) -> AnalyzerResult<&'a str> {
        Ok(self.get_str(path)?.unwrap_or(default))
    }

    /// Required string field.
    pub fn require_str<'p>(&self, path: impl Into<ParamPath<'p>>, message: &str) -> AnalyzerResult<&str> {
        self.get_str(path)?.ok_or_else(|| AnalyzerError::missing(message))
    }

    /// Integer field with a default. Numeric strings (`"3"`) and integral
    /// floats (`3.0`) are accepted; `2.5` is an error.
    pub fn int_or<'p>(&self, path: impl Into<ParamPath<'p>>, default: i64) -> AnalyzerResult<i64> {
        let path = path.into();
        match resolve(&self.root, path.keys()) {
            None => Ok(default),
            Some(value) => as_int(value)
                .ok_or_else(|| AnalyzerError::invalid(format!("{} must be an integer", path))),
        }
    }

    /// Boolean field with a default. Accepts `true`/`"true"`/`"True"`/`1`.
    pub fn bool_or<'p>(&self, path: impl Into<ParamPath<'p>>, default: bool) -> bool {
        match self.get(path) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "True" | "1"),
            Some(_) => default,
        }
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
