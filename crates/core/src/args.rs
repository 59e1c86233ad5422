//! Argument resolution and canonicalization.
//!
//! Callers hand a query either a static argument value, a thunk producing one,
//! or the skip marker. [`ArgsSource::resolve`] turns that into a
//! [`ResolvedArgs`]: either the skip sentinel or a [`CanonicalArgs`] snapshot.
//!
//! Two canonical argument sets are equal iff their canonical JSON encodings are
//! byte-identical. The encoding sorts object keys recursively, so it does not
//! depend on the insertion order of the caller's map nor on whether
//! `serde_json` was built with `preserve_order`.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::fmt;
use std::hash::{Hash, Hasher};
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};

/// The literal marker that means "do not subscribe".
pub const SKIP_MARKER: &str = "skip";

/// A raw argument value as produced by a caller or a thunk.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgsInput {
    /// Do not subscribe.
    Skip,
    /// An argument value; must be an object or `null`.
    Value(Value),
}

impl ArgsInput {
    /// Serializes any value into an argument input.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(ArgsInput::Value(serde_json::to_value(value)?))
    }

    /// An empty argument object.
    pub fn empty() -> Self {
        ArgsInput::Value(Value::Object(serde_json::Map::new()))
    }
}

impl From<Value> for ArgsInput {
    fn from(value: Value) -> Self {
        ArgsInput::Value(value)
    }
}

/// A thunk producing arguments, invoked on every recomputation.
pub type ArgsThunk = Rc<dyn Fn() -> Result<ArgsInput>>;

/// Where a query's arguments come from.
#[derive(Clone)]
pub enum ArgsSource {
    /// Fixed arguments.
    Static(ArgsInput),
    /// Arguments derived on demand. The thunk is never cached; staleness of
    /// its own captured state is the caller's concern.
    Thunk(ArgsThunk),
}

impl ArgsSource {
    /// Creates a source from a thunk.
    pub fn thunk<F>(f: F) -> Self
    where
        F: Fn() -> Result<ArgsInput> + 'static,
    {
        ArgsSource::Thunk(Rc::new(f))
    }

    /// Source that always skips.
    pub fn skip() -> Self {
        ArgsSource::Static(ArgsInput::Skip)
    }

    /// Resolves the source into canonical arguments or the skip sentinel.
    ///
    /// Errors raised by a thunk propagate unchanged.
    pub fn resolve(&self) -> Result<ResolvedArgs> {
        match self {
            ArgsSource::Static(input) => ResolvedArgs::from_input(input.clone()),
            ArgsSource::Thunk(thunk) => ResolvedArgs::from_input(thunk()?),
        }
    }
}

impl fmt::Debug for ArgsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsSource::Static(input) => f.debug_tuple("Static").field(input).finish(),
            ArgsSource::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl From<Value> for ArgsSource {
    fn from(value: Value) -> Self {
        ArgsSource::Static(ArgsInput::Value(value))
    }
}

impl From<ArgsInput> for ArgsSource {
    fn from(input: ArgsInput) -> Self {
        ArgsSource::Static(input)
    }
}

impl From<CanonicalArgs> for ArgsSource {
    fn from(args: CanonicalArgs) -> Self {
        ArgsSource::Static(ArgsInput::Value(args.to_value()))
    }
}

/// Either canonical arguments or the skip sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResolvedArgs {
    /// Do not subscribe.
    Skip,
    /// Canonical arguments.
    Args(CanonicalArgs),
}

impl ResolvedArgs {
    /// Normalizes a raw argument input.
    pub fn from_input(input: ArgsInput) -> Result<Self> {
        match input {
            ArgsInput::Skip => Ok(ResolvedArgs::Skip),
            ArgsInput::Value(Value::String(s)) if s == SKIP_MARKER => Ok(ResolvedArgs::Skip),
            ArgsInput::Value(value) => CanonicalArgs::from_value(value).map(ResolvedArgs::Args),
        }
    }

    /// Returns true for the skip sentinel.
    #[inline]
    pub fn is_skip(&self) -> bool {
        matches!(self, ResolvedArgs::Skip)
    }

    /// Returns the canonical arguments, if not skipped.
    #[inline]
    pub fn args(&self) -> Option<&CanonicalArgs> {
        match self {
            ResolvedArgs::Skip => None,
            ResolvedArgs::Args(args) => Some(args),
        }
    }
}

/// Compares two resolved argument sets. Skip equals only Skip.
pub fn args_equal(a: &ResolvedArgs, b: &ResolvedArgs) -> bool {
    a == b
}

/// A canonical, comparable snapshot of query arguments.
#[derive(Clone)]
pub struct CanonicalArgs {
    /// Owned snapshot; keys sorted
    map: BTreeMap<String, Value>,
    /// Canonical JSON encoding, computed once
    encoded: Rc<str>,
}

impl CanonicalArgs {
    /// Empty arguments (`{}`).
    pub fn empty() -> Self {
        Self {
            map: BTreeMap::new(),
            encoded: Rc::from("{}"),
        }
    }

    /// Builds canonical arguments from a JSON value.
    ///
    /// `null` normalizes to `{}`; any other non-object value is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::empty()),
            Value::Object(obj) => {
                let map: BTreeMap<String, Value> =
                    obj.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
                let mut encoded = String::new();
                write_object(&mut encoded, map.iter());
                Ok(Self {
                    map,
                    encoded: Rc::from(encoded),
                })
            }
            other => Err(Error::invalid_args(format!(
                "arguments must be an object, got {}",
                kind_name(&other)
            ))),
        }
    }

    /// Builds canonical arguments from any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// Returns the canonical JSON encoding.
    #[inline]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Looks up one argument.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Returns the number of arguments.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if there are no arguments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a fresh JSON object holding the arguments.
    pub fn to_value(&self) -> Value {
        Value::Object(self.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl Default for CanonicalArgs {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for CanonicalArgs {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for CanonicalArgs {}

impl Hash for CanonicalArgs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl fmt::Debug for CanonicalArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalArgs({})", self.encoded)
    }
}

impl fmt::Display for CanonicalArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl Serialize for CanonicalArgs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.map.serialize(serializer)
    }
}

/// Produces the canonical JSON encoding of an arbitrary value.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Rebuilds objects so that nested maps are in key order regardless of the
/// `serde_json` map implementation.
fn sort_value(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        Value::Object(obj) => {
            let mut entries: Vec<(String, Value)> =
                obj.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().collect())
        }
        Value::Number(n) => Value::Number(integral_number(n)),
        other => other,
    }
}

/// Rewrites an integral float as an integer, so `1.0` and `1` encode alike.
fn integral_number(n: Number) -> Number {
    let f = match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 => f,
        _ => return n,
    };
    if f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Number::from(f as i64)
    } else if f >= 0.0 && f < u64::MAX as f64 {
        Number::from(f as u64)
    } else {
        n
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(obj) => {
            let mut entries: Vec<(&String, &Value)> = obj.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            write_object(out, entries.into_iter());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Number(n) => out.push_str(&integral_number(n.clone()).to_string()),
        // Other scalars use serde_json's own compact formatting.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object<'a>(out: &mut String, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    out.push('{');
    for (i, (key, value)) in entries.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}
