//! [`Engine`]: the public facade tying the loader chain, template cache, and extension
//! registries together, and the two render entry points.

use crate::ast::Template;
use crate::context::RenderContext;
use crate::error::{TemplateError, TemplateNotFound};
use crate::immutable_string::ImmutableString;
use crate::loader::Loader;
use crate::parse;
use crate::pool::Pool;
use crate::render::Renderer;
use crate::value::Value;
use ahash::RandomState;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A registered filter: `(input, args) -> output`.
pub type FilterFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync>;
/// A registered test: `(input, args) -> bool`.
pub type TestFn = Arc<dyn Fn(&Value, &[Value]) -> Result<bool, String> + Send + Sync>;
/// A registered global function: `(engine, render context, args) -> output`. Takes the engine
/// and context (rather than just `args`, like filters/tests) because functions like `include`
/// need to resolve and render another template mid-expression.
pub type FunctionFn = Arc<dyn Fn(&Engine, &RenderContext, &[Value]) -> Result<Value, String> + Send + Sync>;

/// Construction-time knobs for an [`Engine`]: a plain data bag passed once at construction, not
/// mutated by rendering.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound on how many `extends`/`include`/`import` hops may chain before rendering
    /// aborts with a resolution error, guarding against an accidental include cycle.
    pub max_template_depth: u32,
    /// Capacity passed to the per-engine template and render-context pools.
    pub cache_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { max_template_depth: 64, cache_capacity: 256 }
    }
}

/// Owns the loader chain, the compiled-template cache, the filter/function/test registries, and
/// a render-context pool. Cheap to share: every internal collection is behind an `RwLock`, so an
/// `Engine` is `Send + Sync` and the same instance renders concurrently from many threads.
pub struct Engine {
    loaders: RwLock<Vec<Arc<dyn Loader>>>,
    cache: RwLock<HashMap<ImmutableString, Arc<Template>, RandomState>>,
    filters: RwLock<HashMap<ImmutableString, FilterFn, RandomState>>,
    functions: RwLock<HashMap<ImmutableString, FunctionFn, RandomState>>,
    tests: RwLock<HashMap<ImmutableString, TestFn, RandomState>>,
    globals: RwLock<BTreeMap<ImmutableString, Value>>,
    pub(crate) context_pool: Pool<RenderContext>,
    pub(crate) options: EngineOptions,
}

impl Engine {
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        let engine = Self {
            loaders: RwLock::new(Vec::new()),
            cache: RwLock::new(HashMap::with_hasher(RandomState::new())),
            filters: RwLock::new(HashMap::with_hasher(RandomState::new())),
            functions: RwLock::new(HashMap::with_hasher(RandomState::new())),
            tests: RwLock::new(HashMap::with_hasher(RandomState::new())),
            globals: RwLock::new(BTreeMap::new()),
            context_pool: Pool::new(options.cache_capacity.max(16)),
            options,
        };
        crate::packages::register_core(&engine);
        engine
    }

    pub fn add_loader(&self, loader: Arc<dyn Loader>) {
        self.loaders.write().unwrap_or_else(|e| e.into_inner()).push(loader);
    }

    pub fn register_filter(&self, name: impl Into<ImmutableString>, f: FilterFn) {
        self.filters.write().unwrap_or_else(|e| e.into_inner()).insert(name.into(), f);
    }

    pub fn register_function(&self, name: impl Into<ImmutableString>, f: FunctionFn) {
        self.functions.write().unwrap_or_else(|e| e.into_inner()).insert(name.into(), f);
    }

    pub fn register_test(&self, name: impl Into<ImmutableString>, f: TestFn) {
        self.tests.write().unwrap_or_else(|e| e.into_inner()).insert(name.into(), f);
    }

    pub fn add_global(&self, name: impl Into<ImmutableString>, value: Value) {
        self.globals.write().unwrap_or_else(|e| e.into_inner()).insert(name.into(), value);
    }

    pub(crate) fn get_filter(&self, name: &str) -> Option<FilterFn> {
        self.filters.read().unwrap_or_else(|e| e.into_inner()).get(name).cloned()
    }

    pub(crate) fn get_function(&self, name: &str) -> Option<FunctionFn> {
        self.functions.read().unwrap_or_else(|e| e.into_inner()).get(name).cloned()
    }

    pub(crate) fn get_test(&self, name: &str) -> Option<TestFn> {
        self.tests.read().unwrap_or_else(|e| e.into_inner()).get(name).cloned()
    }

    pub(crate) fn globals_snapshot(&self) -> BTreeMap<ImmutableString, Value> {
        self.globals.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Fetch a compiled template by name, parsing and caching it on first use.
    ///
    /// Double-checked insertion: a cache miss parses outside any lock, then re-checks under the
    /// write lock before inserting, so two threads racing on the same miss never both pay for
    /// the parse being kept, and neither blocks the other's unrelated cache reads.
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        if let Some(t) = self.cache.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            return Ok(t.clone());
        }

        let source = self.load_source(name).ok_or_else(|| TemplateNotFound { name: name.to_string() })?;
        let parsed = Arc::new(parse::parse(name, source).map_err(TemplateError::from)?);

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let entry = cache.entry(name.into()).or_insert(parsed);
        Ok(entry.clone())
    }

    /// Whether a named template can currently be resolved, without parsing it. Used by
    /// `{% include ... ignore missing %}` before attempting a real load.
    #[must_use]
    pub fn template_exists(&self, name: &str) -> bool {
        if self.cache.read().unwrap_or_else(|e| e.into_inner()).contains_key(name) {
            return true;
        }
        self.loaders.read().unwrap_or_else(|e| e.into_inner()).iter().any(|l| l.exists(name))
    }

    fn load_source(&self, name: &str) -> Option<String> {
        for loader in self.loaders.read().unwrap_or_else(|e| e.into_inner()).iter() {
            if let Some(src) = loader.load(name) {
                return Some(src);
            }
        }
        None
    }

    /// Render `name` with `vars`, returning the output as an owned `String`.
    pub fn render_to_string(&self, name: &str, vars: BTreeMap<ImmutableString, Value>) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.render_to_writer(name, vars, &mut out)?;
        Ok(out)
    }

    /// Render `name` with `vars`, writing output directly to `w` rather than buffering it.
    pub fn render_to_writer(
        &self,
        name: &str,
        vars: BTreeMap<ImmutableString, Value>,
        w: &mut dyn std::fmt::Write,
    ) -> Result<(), TemplateError> {
        debug!(template = name, "rendering template");
        let template = self.get_template(name)?;
        let renderer = Renderer::new(self);
        renderer.render_root(&template, vars, w).map_err(|e| {
            let terr = TemplateError::from(e);
            let msg = terr.clone().with_context(name, &template.source);
            debug!(template = name, error = %msg, "render failed");
            terr
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cached_templates", &self.cache.read().unwrap_or_else(|e| e.into_inner()).len())
            .finish_non_exhaustive()
    }
}

#[allow(dead_code)]
fn _assert_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<Engine>();
}
