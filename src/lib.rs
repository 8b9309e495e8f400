//! # twigrs - a Twig-compatible template engine core
//!
//! `twigrs` is the core of a server-side text-template engine compatible with the
//! [Twig](https://twig.symfony.com/) template language: a lexer, a recursive-descent parser
//! producing a typed AST, a renderer supporting template inheritance (`extends`/`block`/
//! `parent()`), macro/import namespaces with lexical scoping, and an extension registry of
//! filters, functions, and tests.
//!
//! Loading template source from a filesystem, a database, or any other backing store is left to
//! the embedder: implement [`Loader`] and hand it to [`Engine::add_loader`].
//!
//! ```no_run
//! use twigrs::{Engine, EngineOptions, Loader};
//! use std::collections::{BTreeMap, HashMap};
//! use std::sync::{Arc, Mutex};
//!
//! struct MapLoader(Mutex<HashMap<String, String>>);
//! impl Loader for MapLoader {
//!     fn load(&self, name: &str) -> Option<String> {
//!         self.0.lock().unwrap().get(name).cloned()
//!     }
//! }
//!
//! let engine = Engine::new(EngineOptions::default());
//! let mut templates = HashMap::new();
//! templates.insert("hello.html.twig".to_string(), "Hello, {{ name }}!".to_string());
//! engine.add_loader(Arc::new(MapLoader(Mutex::new(templates))));
//!
//! let mut vars = BTreeMap::new();
//! vars.insert("name".into(), "world".into());
//! let out = engine.render_to_string("hello.html.twig", vars).unwrap();
//! assert_eq!(out, "Hello, world!");
//! ```

mod ast;
mod attr_cache;
mod context;
mod engine;
mod error;
mod immutable_string;
mod interner;
mod loader;
mod packages;
mod parse;
mod pool;
mod render;
mod token;
mod value;

pub use ast::Template;
pub use engine::{Engine, EngineOptions, FilterFn, FunctionFn, TestFn};
pub use error::{
    LexError, ParseError, ParseErrorType, RenderError, RenderErrorKind, SecurityError,
    TemplateError, TemplateNotFound,
};
pub use immutable_string::ImmutableString;
pub use loader::{resolve_relative, Loader};
pub use token::Position;
pub use value::{HostObject, Value};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    struct MapLoader(Mutex<HashMap<String, String>>);
    impl Loader for MapLoader {
        fn load(&self, name: &str) -> Option<String> {
            self.0.lock().unwrap().get(name).cloned()
        }
    }

    fn engine_with(templates: &[(&str, &str)]) -> Engine {
        let engine = Engine::new(EngineOptions::default());
        let map: HashMap<String, String> = templates.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        engine.add_loader(Arc::new(MapLoader(Mutex::new(map))));
        engine
    }

    #[test]
    fn readme_example_renders() {
        let engine = engine_with(&[("hello.html.twig", "Hello, {{ name }}!")]);
        let mut vars = BTreeMap::new();
        vars.insert(ImmutableString::from("name"), Value::from("world"));
        assert_eq!(engine.render_to_string("hello.html.twig", vars).unwrap(), "Hello, world!");
    }

    #[test]
    fn filters_and_tests_are_preloaded() {
        let engine = engine_with(&[("t", "{{ name|upper }} {{ items is iterable }}")]);
        let mut vars = BTreeMap::new();
        vars.insert(ImmutableString::from("name"), Value::from("ada"));
        vars.insert(ImmutableString::from("items"), Value::from(vec![Value::Int(1)]));
        assert_eq!(engine.render_to_string("t", vars).unwrap(), "ADA true");
    }

    #[test]
    fn unknown_filter_surfaces_as_template_error() {
        let engine = engine_with(&[("t", "{{ name|nope }}")]);
        let mut vars = BTreeMap::new();
        vars.insert(ImmutableString::from("name"), Value::from("x"));
        let err = engine.render_to_string("t", vars).unwrap_err();
        assert!(matches!(err, TemplateError::Render(_)));
    }
}
