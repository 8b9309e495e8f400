//! Process-wide string interner.
//!
//! Short strings (tag keywords, punctuation, common attribute names) are canonicalized so that
//! repeated lexing of the same template text, or repeated attribute lookups across unrelated
//! templates, reuse one allocation. Lookups take the read lock; a miss upgrades to the write
//! lock and re-checks before inserting, so two threads racing to intern the same new string
//! never both allocate and install a copy.

use crate::immutable_string::ImmutableString;
use ahash::RandomState;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Once, RwLock};

/// Strings longer than this are never interned: the dedup savings are not worth the lock traffic.
const MAX_INTERNED_LEN: usize = 64;

static INTERNER: Lazy<RwLock<HashMap<Box<str>, ImmutableString, RandomState>>> =
    Lazy::new(|| RwLock::new(HashMap::with_hasher(RandomState::new())));

static PRELOAD: Once = Once::new();

/// Tag keywords and punctuation the lexer emits constantly; preloaded so the very first template
/// lexed on a fresh process still gets lock-free-ish fast paths (a read-lock hit, no insert).
const PRELOADED: &[&str] = &[
    "if", "elseif", "else", "endif", "for", "endfor", "block", "endblock", "extends", "include",
    "set", "do", "macro", "endmacro", "import", "from", "spaceless", "endspaceless", "apply",
    "endapply", "verbatim", "endverbatim", "in", "is", "not", "and", "or", "as", "with",
    "ignore", "missing", "only", ".", ",", ":", "|", "(", ")", "[", "]", "{", "}",
];

fn ensure_preloaded() {
    PRELOAD.call_once(|| {
        let mut map = INTERNER.write().unwrap_or_else(|e| e.into_inner());
        for s in PRELOADED {
            map.entry((*s).into()).or_insert_with(|| ImmutableString::from(*s));
        }
    });
}

/// Intern `s`, returning a shared, canonical [`ImmutableString`].
///
/// Strings over [`MAX_INTERNED_LEN`] bytes are allocated fresh every call rather than entered
/// into the global table. Called from the lexer for tag keywords, punctuation, operators, and
/// short identifiers, which is why [`PRELOADED`] is seeded with exactly that vocabulary.
#[must_use]
pub fn intern(s: &str) -> ImmutableString {
    ensure_preloaded();
    if s.len() > MAX_INTERNED_LEN {
        return ImmutableString::from(s);
    }

    if let Ok(map) = INTERNER.read() {
        if let Some(existing) = map.get(s) {
            return existing.clone();
        }
    }

    let mut map = INTERNER.write().unwrap_or_else(|e| e.into_inner());
    // Double-checked: someone may have raced us between the read and write lock.
    if let Some(existing) = map.get(s) {
        return existing.clone();
    }
    let canonical = ImmutableString::from(s);
    map.insert(s.into(), canonical.clone());
    canonical
}

/// Number of distinct strings currently interned. Exposed for tests and diagnostics.
#[must_use]
pub fn interned_count() -> usize {
    ensure_preloaded();
    INTERNER.read().map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedups_short_strings() {
        let a = intern("block");
        let b = intern("block");
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn long_strings_are_not_interned() {
        let long = "x".repeat(MAX_INTERNED_LEN + 1);
        let a = intern(&long);
        let b = intern(&long);
        assert_eq!(a.as_str(), b.as_str());
        assert!(!a.ptr_eq(&b));
    }
}
