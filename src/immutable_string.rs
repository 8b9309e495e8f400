//! The `ImmutableString` type: a cheaply-cloneable, shared, immutable string.

use smartstring::{LazyCompact, SmartString};
use std::{
    borrow::Borrow,
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    sync::Arc,
};

/// Inline small-string storage backed by `smartstring`'s compact representation.
pub type SmartStr = SmartString<LazyCompact>;

/// An immutable, reference-counted string.
///
/// Wraps an [`Arc`]`<`[`SmartStr`]`>` so that cloning never copies the underlying bytes; this
/// is the value type used everywhere a template name, variable name, or string literal is
/// passed around (context keys, AST literals, rendered fragments).
#[derive(Clone, Eq)]
pub struct ImmutableString(Arc<SmartStr>);

impl Default for ImmutableString {
    #[inline(always)]
    fn default() -> Self {
        Self(Arc::new(SmartStr::new()))
    }
}

impl Deref for ImmutableString {
    type Target = str;

    #[inline(always)]
    fn deref(&self) -> &str {
        self.0.as_str()
    }
}

impl Borrow<str> for ImmutableString {
    #[inline(always)]
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for ImmutableString {
    #[inline(always)]
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for ImmutableString {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.as_str() == other.0.as_str()
    }
}

impl PartialEq<str> for ImmutableString {
    #[inline(always)]
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

impl PartialEq<&str> for ImmutableString {
    #[inline(always)]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_str() == *other
    }
}

impl Hash for ImmutableString {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_str().hash(state)
    }
}

impl Ord for ImmutableString {
    #[inline(always)]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_str().cmp(other.0.as_str())
    }
}

impl PartialOrd for ImmutableString {
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ImmutableString {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl fmt::Debug for ImmutableString {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_str(), f)
    }
}

impl From<&str> for ImmutableString {
    #[inline(always)]
    fn from(s: &str) -> Self {
        Self(Arc::new(SmartStr::from(s)))
    }
}

impl From<String> for ImmutableString {
    #[inline(always)]
    fn from(s: String) -> Self {
        Self(Arc::new(SmartStr::from(s)))
    }
}

impl From<SmartStr> for ImmutableString {
    #[inline(always)]
    fn from(s: SmartStr) -> Self {
        Self(Arc::new(s))
    }
}

impl ImmutableString {
    /// Borrow the string slice.
    #[inline(always)]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Number of bytes, not characters.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if this and `other` point at the same allocation.
    #[inline(always)]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
