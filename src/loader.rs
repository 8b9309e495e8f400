//! The [`Loader`] contract: how an [`crate::engine::Engine`] turns a template name into source
//! text.
//!
//! No concrete filesystem or in-memory loader lives here; providing one is a hosting concern, not
//! a core one. A minimal in-memory loader used only by this crate's own integration tests lives
//! under `tests/`.

use std::time::SystemTime;

/// Resolves template names to source text.
///
/// Implementations must be safe to call from multiple threads concurrently: the engine's
/// template cache may call `load` for the same miss from two renders racing each other, and both
/// results are acceptable (the cache's double-checked insertion keeps only one).
pub trait Loader: Send + Sync {
    /// Fetch the source text for `name`, or `None` if this loader does not have it. A loader
    /// chain tries each loader in order and only raises `TemplateNotFound` once all of them
    /// return `None`.
    fn load(&self, name: &str) -> Option<String>;

    /// Cheaper existence check than `load` where a loader can answer it without reading the full
    /// source (e.g. a filesystem `stat`). The default falls back to `load` and discards the
    /// result.
    fn exists(&self, name: &str) -> bool {
        self.load(name).is_some()
    }

    /// Last-modified time, if the loader can report one. Used only by hosts that want to
    /// invalidate a cached compiled template on source change; the core cache never calls this
    /// on its own.
    fn modified_time(&self, name: &str) -> Option<SystemTime> {
        let _ = name;
        None
    }
}

/// Resolve a name referenced relative to `from` (the template doing the referencing).
///
/// A name starting with `./` or `../` is resolved against the directory component of `from`;
/// any other name (including one with no leading `.`) is treated as already root-relative and
/// returned unchanged. Mirrors the path-joining most template loaders use for includes so that
/// `{% include './partials/row.html.twig' %}` means "next to me" regardless of where the calling
/// template itself was loaded from.
#[must_use]
pub fn resolve_relative(from: &str, name: &str) -> String {
    if !name.starts_with("./") && !name.starts_with("../") {
        return name.to_string();
    }

    let base_dir = match from.rfind('/') {
        Some(idx) => &from[..idx],
        None => "",
    };

    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in name.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_names_pass_through() {
        assert_eq!(resolve_relative("pages/home.html.twig", "base.html.twig"), "base.html.twig");
    }

    #[test]
    fn dot_relative_resolves_against_caller_directory() {
        assert_eq!(
            resolve_relative("pages/home.html.twig", "./partials/row.html.twig"),
            "pages/partials/row.html.twig"
        );
    }

    #[test]
    fn dot_dot_relative_walks_up_a_directory() {
        assert_eq!(
            resolve_relative("pages/sub/home.html.twig", "../base.html.twig"),
            "pages/base.html.twig"
        );
    }

    #[test]
    fn relative_from_top_level_template_has_no_directory_prefix() {
        assert_eq!(resolve_relative("home.html.twig", "./row.html.twig"), "row.html.twig");
    }
}
