//! Process-wide cache remembering how a `(host type, attribute name)` pair last resolved.
//!
//! [`HostObject`] offers two independent lookup paths (`get_field`, `call_method`) and a
//! `GetAttr` node doesn't know up front which one a given name will hit. Probing both on every
//! access is wasted work when the same attribute is read thousands of times across a render, so
//! the first successful resolution is recorded here and consulted before the next attempt.

use ahash::RandomState;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::RwLock;

/// Which of [`crate::value::HostObject`]'s two lookup paths resolved an attribute name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Field,
    Method,
}

type Key = (TypeId, Box<str>);

static CACHE: Lazy<RwLock<HashMap<Key, Resolution, RandomState>>> =
    Lazy::new(|| RwLock::new(HashMap::with_hasher(RandomState::new())));

/// Maximum number of distinct `(type, name)` entries retained before the cache is cleared and
/// started over. Unlike the string interner, wrongly evicted entries only cost a redundant probe
/// next time, never incorrect behavior, so a blunt "clear everything" reset is sufficient.
const MAX_ENTRIES: usize = 4096;

/// Look up a previously recorded resolution for `(type_id, name)`.
///
/// Takes the key by value rather than borrowing, since a `Box<str>` must be built to probe the
/// map either way (`HashMap` has no blanket `Borrow<(TypeId, &str)>` for `(TypeId, Box<str>)`
/// keys); double-checked insertion in [`record`] means this allocation is only paid once per
/// distinct name, not once per render.
#[must_use]
pub fn lookup(type_id: TypeId, name: &str) -> Option<Resolution> {
    let key: Key = (type_id, name.into());
    CACHE.read().unwrap_or_else(|e| e.into_inner()).get(&key).copied()
}

/// Record how `(type_id, name)` resolved, so the next access skips straight to it.
pub fn record(type_id: TypeId, name: &str, resolution: Resolution) {
    let key: Key = (type_id, name.into());
    let mut cache = CACHE.write().unwrap_or_else(|e| e.into_inner());
    if cache.len() >= MAX_ENTRIES && !cache.contains_key(&key) {
        cache.clear();
    }
    // Double-checked: another thread may have inserted the same key while we waited for the
    // write lock.
    cache.entry(key).or_insert(resolution);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct A;
    #[derive(Debug)]
    struct B;

    #[test]
    fn records_and_recalls_per_type() {
        record(TypeId::of::<A>(), "name", Resolution::Field);
        record(TypeId::of::<B>(), "name", Resolution::Method);
        assert_eq!(lookup(TypeId::of::<A>(), "name"), Some(Resolution::Field));
        assert_eq!(lookup(TypeId::of::<B>(), "name"), Some(Resolution::Method));
        assert_eq!(lookup(TypeId::of::<A>(), "other"), None);
    }

    #[test]
    fn first_recorded_resolution_wins() {
        record(TypeId::of::<A>(), "sticky", Resolution::Field);
        record(TypeId::of::<A>(), "sticky", Resolution::Method);
        assert_eq!(lookup(TypeId::of::<A>(), "sticky"), Some(Resolution::Field));
    }
}
