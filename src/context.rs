//! [`RenderContext`]: the mutable, per-render state threaded through a single `render_to_*` call.
//!
//! Confined to one render on one thread, unlike the [`crate::engine::Engine`] it borrows from,
//! so it reaches for `Rc`/`RefCell` rather than the `Arc`/`RwLock` pairs used for state shared
//! across threads.

use crate::ast::{MacroDef, Stmt};
use crate::immutable_string::ImmutableString;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;

/// One `{% block %}` body as recorded during the inheritance walk: the most-derived override is
/// pushed last, so `parent()` steps backwards through the vector from the current index.
pub type BlockChain = Vec<Arc<[Stmt]>>;

/// Per-render state for a single template evaluation.
///
/// An `extends` chain shares one `RenderContext` for its entire walk (each ancestor just
/// contributes its blocks/macros/top-level `set` into it), while `include`/`import`/a `for` loop
/// body each get their own, linked to the calling scope via `parent` unless `include ... only`
/// asks for isolation instead. Variable and macro lookups always walk the parent chain; only a
/// macro call constructs a context with no parent link at all, since macros are lexically scoped
/// to their own definition (see `render.rs`).
#[derive(Default)]
pub struct RenderContext {
    vars: RefCell<HashMap<ImmutableString, Value>>,
    blocks: RefCell<HashMap<ImmutableString, BlockChain>>,
    macros: RefCell<HashMap<ImmutableString, Arc<MacroDef>>>,
    parent: RefCell<Option<Rc<RenderContext>>>,
    /// `(block name, chain index currently rendering)`, pushed on block entry and popped on
    /// exit; `parent()` reads the top entry to know which chain position to step back from.
    block_stack: RefCell<Vec<(ImmutableString, usize)>>,
}

impl RenderContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` in this context's own scope (not the parent chain).
    pub fn set_var(&self, name: ImmutableString, value: Value) {
        self.vars.borrow_mut().insert(name, value);
    }

    /// Resolve a variable: this context's own scope first, then the parent chain if one is
    /// linked. Unbound names evaluate to [`Value::Nil`] rather than erroring, matching the
    /// Twig convention that undefined is not a template author error.
    #[must_use]
    pub fn get_var(&self, name: &str) -> Value {
        if let Some(v) = self.vars.borrow().get(name) {
            return v.clone();
        }
        if let Some(parent) = self.parent.borrow().as_ref() {
            return parent.get_var(name);
        }
        Value::Nil
    }

    /// Bind a local macro (from a `{% macro %}` definition or an `import`/`from` alias).
    pub fn set_macro(&self, name: ImmutableString, def: Arc<MacroDef>) {
        self.macros.borrow_mut().insert(name, def);
    }

    /// Macros defined directly in this scope (not the parent chain), wrapped as a namespace
    /// map the way `import`/`from` bindings are represented. Backs the `_self` magic variable,
    /// which refers only to the macros of the template currently executing, never an ancestor's.
    #[must_use]
    pub fn own_macros_as_namespace(&self) -> BTreeMap<ImmutableString, Value> {
        self.macros.borrow().iter().map(|(k, v)| (k.clone(), Value::Macro(v.clone()))).collect()
    }

    #[must_use]
    pub fn get_macro(&self, name: &str) -> Option<Arc<MacroDef>> {
        if let Some(m) = self.macros.borrow().get(name) {
            return Some(m.clone());
        }
        self.parent.borrow().as_ref().and_then(|p| p.get_macro(name))
    }

    /// Record a `{% block name %}...{% endblock %}` body, pushing onto any chain already
    /// recorded for `name` by a more-derived template walked earlier.
    pub fn define_block(&self, name: ImmutableString, body: Arc<[Stmt]>) {
        self.blocks.borrow_mut().entry(name).or_default().push(body);
    }

    /// The full override chain for `name`, most-derived first (reversed from definition order,
    /// since child templates are walked before their ancestors during `extends` resolution and
    /// append to the same chain).
    #[must_use]
    pub fn block_chain(&self, name: &str) -> Option<BlockChain> {
        if let Some(chain) = self.blocks.borrow().get(name) {
            if !chain.is_empty() {
                return Some(chain.clone());
            }
        }
        self.parent.borrow().as_ref().and_then(|p| p.block_chain(name))
    }

    pub fn merge_blocks_from(&self, other: &RenderContext) {
        for (name, chain) in other.blocks.borrow().iter() {
            self.blocks
                .borrow_mut()
                .entry(name.clone())
                .or_default()
                .extend(chain.iter().cloned());
        }
    }

    pub fn set_parent(&self, parent: Rc<RenderContext>) {
        *self.parent.borrow_mut() = Some(parent);
    }

    /// Sever the parent link before returning this context to its pool, so a pooled-and-reused
    /// context never accidentally keeps a previous render's chain alive.
    pub fn unlink_parent(&self) {
        *self.parent.borrow_mut() = None;
    }

    pub fn push_block_frame(&self, name: ImmutableString, index: usize) {
        self.block_stack.borrow_mut().push((name, index));
    }

    pub fn pop_block_frame(&self) {
        self.block_stack.borrow_mut().pop();
    }

    /// The `(name, index)` of the block currently being rendered, used by `parent()` to find the
    /// next-less-derived entry in that block's override chain.
    #[must_use]
    pub fn current_block_frame(&self) -> Option<(ImmutableString, usize)> {
        self.block_stack.borrow().last().cloned()
    }

    pub fn clear(&mut self) {
        self.vars.borrow_mut().clear();
        self.blocks.borrow_mut().clear();
        self.macros.borrow_mut().clear();
        self.parent.borrow_mut().take();
        self.block_stack.borrow_mut().clear();
    }
}

impl crate::pool::Resettable for RenderContext {
    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_variable_is_nil() {
        let ctx = RenderContext::new();
        assert!(ctx.get_var("missing").is_nil());
    }

    #[test]
    fn child_context_falls_back_to_parent_scope() {
        let parent = Rc::new(RenderContext::new());
        parent.set_var("name".into(), Value::from("world"));
        let child = RenderContext::new();
        child.set_parent(parent);
        assert_eq!(child.get_var("name").to_display_string(), "world");
    }

    #[test]
    fn own_scope_shadows_parent_scope() {
        let parent = Rc::new(RenderContext::new());
        parent.set_var("name".into(), Value::from("outer"));
        let child = RenderContext::new();
        child.set_parent(parent);
        child.set_var("name".into(), Value::from("inner"));
        assert_eq!(child.get_var("name").to_display_string(), "inner");
    }

    #[test]
    fn block_chain_accumulates_most_derived_first() {
        let ctx = RenderContext::new();
        ctx.define_block("content".into(), Arc::from(vec![]));
        ctx.define_block("content".into(), Arc::from(vec![]));
        assert_eq!(ctx.block_chain("content").unwrap().len(), 2);
    }
}
