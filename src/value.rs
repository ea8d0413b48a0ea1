//! Runtime value model.
//!
//! Validators check `Value` trees. The enum mirrors the value domain the
//! descriptor language talks about: JSON-ish scalars plus `Undefined`, dates,
//! binary blobs, keyed/unkeyed collections and class-tagged instances.
//!
//! Two equality notions live here and must not be conflated:
//! - `PartialEq` on `Value` is structural with `f64 ==` on numbers, so
//!   `NaN != NaN`. Constant checks and discriminator dispatch use this.
//! - `ConstantSet` membership hashes numbers via `OrderedFloat`, so `NaN`
//!   *is* findable in a set (SameValueZero, same as a host `Set.has`).

use std::collections::HashSet;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;

// ------------------------------ Class tags -------------------------------- //

/// A nominal class marker compared by identity, with an optional parent so
/// instance checks can walk an inheritance chain.
#[derive(Clone)]
pub struct ClassTag(Rc<ClassTagInner>);

struct ClassTagInner {
    name: String,
    parent: Option<ClassTag>,
}

impl ClassTag {
    pub fn new(name: impl Into<String>) -> Self {
        ClassTag(Rc::new(ClassTagInner { name: name.into(), parent: None }))
    }

    pub fn subclass(name: impl Into<String>, parent: &ClassTag) -> Self {
        ClassTag(Rc::new(ClassTagInner {
            name: name.into(),
            parent: Some(parent.clone()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// True if `self` is `other` or transitively inherits from it.
    pub fn extends(&self, other: &ClassTag) -> bool {
        let mut cursor = Some(self);
        while let Some(tag) = cursor {
            if Rc::ptr_eq(&tag.0, &other.0) {
                return true;
            }
            cursor = tag.0.parent.as_ref();
        }
        false
    }
}

impl PartialEq for ClassTag {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for ClassTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassTag({})", self.0.name)
    }
}

// -------------------------------- Values ---------------------------------- //

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    /// Plain object; field order preserved.
    Object(IndexMap<String, Value>),
    /// Keyed collection with arbitrary keys; entry order preserved.
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Instance(ClassTag),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Instance(_) => "instance",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// "Typical object" in the original's sense: a plain keyed object, not an
    /// array/map/set/date/instance.
    pub fn is_plain_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Compact single-line rendering for error messages and map-key paths.
    pub fn render(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => render_number(*n),
            Value::String(s) => json_quote(s),
            Value::Date(d) => format!("Date({})", d.to_rfc3339()),
            Value::Binary(b) => format!("<binary {}b>", b.len()),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(Value::render).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Object(map) => {
                let inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", json_quote(k), v.render()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Map(entries) => format!("<map {} entries>", entries.len()),
            Value::Set(items) => format!("<set {} elements>", items.len()),
            Value::Instance(tag) => format!("<instance of {}>", tag.name()),
        }
    }

    /// The string an object lookup would use for this value as a property key
    /// (host semantics: `obj[5]` reads `obj["5"]`, `obj[undefined]` reads
    /// `obj["undefined"]`).
    pub fn property_key(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => render_number(*n),
            other => other.render(),
        }
    }
}

fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < MAX_SAFE_INTEGER {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

pub(crate) fn json_quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
}

/// Largest integer exactly representable in an f64.
pub(crate) const MAX_SAFE_INTEGER: f64 = 9007199254740991.0;

/// Structural equality; numbers via `f64 ==` (`NaN != NaN`), instances by
/// class identity, maps/sets order-insensitively.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| bv == v))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(bk, bv)| bk == k && bv == v)
                    })
            }
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|v| b.contains(v))
            }
            (Value::Instance(a), Value::Instance(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

// ----------------------------- Constant sets ------------------------------ //

/// Hashable projection of a constant value, for O(1) membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Undefined,
    Null,
    Bool(bool),
    Number(OrderedFloat<f64>),
    String(String),
}

impl ConstKey {
    fn of(value: &Value) -> Option<ConstKey> {
        match value {
            Value::Undefined => Some(ConstKey::Undefined),
            Value::Null => Some(ConstKey::Null),
            Value::Bool(b) => Some(ConstKey::Bool(*b)),
            Value::Number(n) => Some(ConstKey::Number(OrderedFloat(*n))),
            Value::String(s) => Some(ConstKey::String(s.clone())),
            _ => None,
        }
    }
}

/// A set of literal values: hashable ones in a `HashSet`, everything else
/// (dates, binaries, composites) in a small side list matched structurally.
#[derive(Debug, Clone)]
pub struct ConstantSet {
    keys: HashSet<ConstKey>,
    exotic: Vec<Value>,
    rendered: String,
}

impl ConstantSet {
    pub fn new(values: &[Value]) -> Self {
        let mut keys = HashSet::new();
        let mut exotic = Vec::new();
        for value in values {
            match ConstKey::of(value) {
                Some(key) => {
                    keys.insert(key);
                }
                None => {
                    if !exotic.contains(value) {
                        exotic.push(value.clone());
                    }
                }
            }
        }
        let rendered = {
            let parts: Vec<String> = values.iter().map(Value::render).collect();
            format!("[{}]", parts.join(", "))
        };
        ConstantSet { keys, exotic, rendered }
    }

    pub fn contains(&self, value: &Value) -> bool {
        match ConstKey::of(value) {
            Some(key) => self.keys.contains(&key),
            None => self.exotic.contains(value),
        }
    }

    /// The literal listing used inside failure expressions.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }
}

impl PartialEq for ConstantSet {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys && self.exotic == other.exotic
    }
}

// ------------------------------- Tests ------------------------------------ //
