//! The Core extension: the filters, functions, and tests every engine carries out of the box.
//!
//! This registry has no notion of a loadable, composable unit beyond "a named callable" -- the
//! three flat maps already living on [`crate::engine::Engine`] are the whole story, so
//! `register_core` is a plain free function rather than a trait with its own module type. Split
//! into one file per callable kind rather than one per package, since there is only ever the one
//! built-in package; a caller wanting more just calls `register_filter`/`register_function`/
//! `register_test` directly, and a user registration of the same name silently shadows these.

mod core_filters;
mod core_functions;
mod core_tests;

use crate::engine::Engine;

pub fn register_core(engine: &Engine) {
    core_filters::register(engine);
    core_functions::register(engine);
    core_tests::register(engine);
}
