//! The [`Value`] type: every runtime value a template expression can produce.

use crate::ast::MacroDef;
use crate::immutable_string::ImmutableString;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A host-provided object exposed to templates as an attribute-accessible value.
///
/// A caller wraps their data in a type implementing this trait and hands it to the context as a
/// [`Value::Host`], instead of the renderer needing to reflect over an arbitrary foreign type.
/// Attribute access on a host object consults the process-wide attribute cache (see
/// [`crate::attr_cache`]) keyed by `(TypeId, name)` to remember whether a name was last resolved
/// as a field or a method, without re-probing both every time.
pub trait HostObject: Any + fmt::Debug + Send + Sync {
    /// A stable name for this type, used in error messages.
    fn type_name(&self) -> &'static str;

    /// Look up an exported field by name.
    fn get_field(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    /// Invoke a zero-argument method by name. The ancestor distinguishes value- and
    /// pointer-receiver methods; that distinction has no meaning behind a single trait object,
    /// so both collapse into this one dispatch point.
    fn call_method(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;
}

/// A runtime template value.
///
/// Every variant is cheap to clone: scalars are `Copy`-sized, and the collection/host/macro
/// variants are reference-counted. [`Value`] is used both as the run-time result of evaluating
/// an expression and as the representation of literals baked into the AST, so it must be safe to
/// share a compiled [`crate::ast::Template`] across threads ([`Send`] + [`Sync`]).
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(ImmutableString),
    Array(Arc<Vec<Value>>),
    Map(Arc<BTreeMap<ImmutableString, Value>>),
    Host(Arc<dyn HostObject>),
    /// A callable macro, produced by evaluating a `macro` definition or an imported binding.
    Macro(Arc<MacroDef>),
}

impl Default for Value {
    #[inline(always)]
    fn default() -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    #[inline(always)]
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<i64> for Value {
    #[inline(always)]
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<f64> for Value {
    #[inline(always)]
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<&str> for Value {
    #[inline(always)]
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}
impl From<String> for Value {
    #[inline(always)]
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}
impl From<ImmutableString> for Value {
    #[inline(always)]
    fn from(s: ImmutableString) -> Self {
        Value::Str(s)
    }
}
impl From<Vec<Value>> for Value {
    #[inline(always)]
    fn from(v: Vec<Value>) -> Self {
        Value::Array(Arc::new(v))
    }
}
impl From<BTreeMap<ImmutableString, Value>> for Value {
    #[inline(always)]
    fn from(m: BTreeMap<ImmutableString, Value>) -> Self {
        Value::Map(Arc::new(m))
    }
}

impl Value {
    /// A human-facing name for this value's type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Host(h) => h.type_name(),
            Value::Macro(_) => "macro",
        }
    }

    /// Twig truthiness: nil is false, booleans as-is, zero numbers are false, empty
    /// strings/collections are false, everything else is true.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Host(_) | Value::Macro(_) => true,
        }
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Parse this value as a number. Strings are parsed; everything else that isn't already
    /// numeric fails.
    #[must_use]
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.as_str().trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Render this value the way `{{ }}` stringifies it.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.as_str().to_string(),
            Value::Array(a) => a
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(""),
            Value::Map(_) => String::new(),
            Value::Host(h) => format!("{h:?}"),
            Value::Macro(_) => String::new(),
        }
    }

    /// Write this value's display form directly to `w`, avoiding an intermediate `String` for
    /// the common scalar cases.
    pub fn write_display(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        match self {
            Value::Nil | Value::Map(_) | Value::Macro(_) => Ok(()),
            Value::Bool(b) => write!(w, "{b}"),
            Value::Int(i) => write!(w, "{i}"),
            Value::Float(f) => w.write_str(&format_float(*f)),
            Value::Str(s) => w.write_str(s.as_str()),
            Value::Array(a) => {
                for item in a.iter() {
                    item.write_display(w)?;
                }
                Ok(())
            }
            Value::Host(h) => write!(w, "{h:?}"),
        }
    }

    /// Canonical equality per the coercion rules: numeric comparison if both sides are numeric,
    /// otherwise compare by canonical string form.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return self.to_number() == other.to_number();
        }
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|v2| v.loose_eq(v2)))
            }
            _ => self.to_display_string() == other.to_display_string(),
        }
    }

    /// Iterate this value the way a `for` loop does: ordered sequences preserve order, mappings
    /// yield `(key, value)` pairs in implementation-defined order, strings yield one-character
    /// strings per Unicode scalar value. Anything else yields no iterations.
    #[must_use]
    pub fn iterate(&self) -> Vec<(Value, Value)> {
        match self {
            Value::Array(a) => a
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::Int(i as i64), v.clone()))
                .collect(),
            Value::Map(m) => m
                .iter()
                .map(|(k, v)| (Value::Str(k.clone()), v.clone()))
                .collect(),
            Value::Str(s) => s
                .as_str()
                .chars()
                .enumerate()
                .map(|(i, c)| (Value::Int(i as i64), Value::Str(c.to_string().into())))
                .collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(a.len()),
            Value::Map(m) => Some(m.len()),
            Value::Str(s) => Some(s.as_str().chars().count()),
            _ => None,
        }
    }
}

/// Format a float the way templates expect: integral floats print without a trailing `.0`... no
/// -- they keep one decimal the way most template engines do (`1` -> `"1"` only for integers;
/// floats always show at least one fractional digit) to stay distinguishable from `Value::Int`.
fn format_float(f: f64) -> String {
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Str("".into()).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(!Value::from(Vec::<Value>::new()).is_truthy());
    }

    #[test]
    fn numeric_equality_crosses_int_and_float() {
        assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
        assert!(!Value::Int(2).loose_eq(&Value::Float(2.5)));
    }

    #[test]
    fn float_display_keeps_one_decimal() {
        assert_eq!(Value::Float(3.0).to_display_string(), "3.0");
        assert_eq!(Value::Float(3.5).to_display_string(), "3.5");
    }
}
