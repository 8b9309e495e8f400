//! The renderer: walks a [`Template`]'s AST against a [`RenderContext`], producing output.
//!
//! A [`Renderer`] is built fresh for each `render_to_*` call and borrows the [`Engine`] for its
//! whole lifetime, so the depth counter it carries (see [`Renderer::check_depth`]) naturally
//! resets between unrelated renders without needing to be decremented on every return path.

use crate::ast::{AttrKey, BinOp, Expr, MacroDef, ObjectKey, Stmt, Template, UnOp};
use crate::attr_cache::{self, Resolution};
use crate::context::RenderContext;
use crate::engine::Engine;
use crate::error::{RenderError, RenderErrorKind};
use crate::immutable_string::ImmutableString;
use crate::loader::resolve_relative;
use crate::token::Position;
use crate::value::{HostObject, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::rc::Rc;
use std::sync::Arc;

pub struct Renderer<'a> {
    engine: &'a Engine,
    /// Total templates loaded (by `extends`, `include`, or `import`/`from`) during this render.
    /// Never decremented: the bound is on total work this render does, not on call-stack depth,
    /// which also catches an `extends` cycle without needing a visited-set.
    depth: Cell<u32>,
}

impl<'a> Renderer<'a> {
    #[must_use]
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine, depth: Cell::new(0) }
    }

    fn check_depth(&self, pos: Position) -> Result<(), RenderError> {
        let next = self.depth.get() + 1;
        if next > self.engine.options.max_template_depth {
            return Err(RenderError::new(
                RenderErrorKind::TemplateDepthExceeded { limit: self.engine.options.max_template_depth },
                pos,
            ));
        }
        self.depth.set(next);
        Ok(())
    }

    /// Acquire a render context from the engine's pool rather than allocating one fresh.
    fn acquire_context(&self) -> Rc<RenderContext> {
        Rc::new(self.engine.context_pool.acquire())
    }

    /// Return a context to the engine's pool. Only the owner of the last `Rc` reference can give
    /// it back (a context whose `parent` link is still held by a child is silently dropped
    /// instead, since its `Rc::try_unwrap` fails).
    fn release_context(&self, ctx: Rc<RenderContext>) {
        if let Ok(inner) = Rc::try_unwrap(ctx) {
            self.engine.context_pool.release(inner);
        }
    }

    /// Entry point used by [`Engine::render_to_writer`][crate::engine::Engine::render_to_writer].
    pub fn render_root(
        &self,
        template: &Arc<Template>,
        vars: BTreeMap<ImmutableString, Value>,
        w: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let ctx = self.acquire_context();
        for (k, v) in self.engine.globals_snapshot() {
            ctx.set_var(k, v);
        }
        for (k, v) in vars {
            ctx.set_var(k, v);
        }
        let result = self.render_extends_chain(template, &ctx, template.name.as_str(), w);
        self.release_context(ctx);
        result
    }

    /// Walk an `extends` chain: collect every template's blocks/macros/top-level prelude into
    /// `ctx` (most-derived first), then render the root-most ancestor's body for real. A
    /// template with no `extends` is its own root and renders immediately.
    fn render_extends_chain(
        &self,
        template: &Template,
        ctx: &Rc<RenderContext>,
        name: &str,
        w: &mut dyn Write,
    ) -> Result<(), RenderError> {
        self.collect_blocks_and_prelude(template, ctx, name)?;

        let extends = template.body.iter().find_map(|s| match s {
            Stmt::Extends { template, pos } => Some((template, *pos)),
            _ => None,
        });

        match extends {
            Some((extends_expr, pos)) => {
                let requested = self.eval_expr(extends_expr, ctx, name)?.to_display_string();
                let resolved = resolve_relative(name, &requested);
                self.check_depth(pos)?;
                let parent = self.engine.get_template(&resolved).map_err(|_| {
                    RenderError::new(
                        RenderErrorKind::TemplateResolution { resolved: resolved.clone(), original: requested },
                        pos,
                    )
                })?;
                self.render_extends_chain(&parent, ctx, &resolved, w)
            }
            None => self.render_stmts(&template.body, ctx, name, w),
        }
    }

    /// Records `{% block %}` bodies, `{% macro %}` definitions, and executes `set`/`import`/
    /// `from import` at the top level of `template` -- everything a block further down the
    /// `extends` chain might need -- without rendering any of its `Text`/`Print` output, which
    /// an extending template never produces directly.
    fn collect_blocks_and_prelude(&self, template: &Template, ctx: &Rc<RenderContext>, name: &str) -> Result<(), RenderError> {
        for stmt in &template.body {
            match stmt {
                Stmt::Block { name: block_name, body, .. } => {
                    ctx.define_block(block_name.clone(), Arc::from(body.clone()));
                }
                Stmt::Macro(def, _) => ctx.set_macro(def.name.clone(), def.clone()),
                Stmt::Set { name: var_name, value, .. } => {
                    let v = self.eval_expr(value, ctx, name)?;
                    ctx.set_var(var_name.clone(), v);
                }
                Stmt::Import { template: t, alias, pos } => self.render_import(t, alias, ctx, name, *pos)?,
                Stmt::FromImport { template: t, macros, pos } => self.render_from_import(t, macros, ctx, name, *pos)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn render_stmts(&self, stmts: &[Stmt], ctx: &Rc<RenderContext>, name: &str, w: &mut dyn Write) -> Result<(), RenderError> {
        for stmt in stmts {
            self.render_stmt(stmt, ctx, name, w)?;
        }
        Ok(())
    }

    fn render_stmt(&self, stmt: &Stmt, ctx: &Rc<RenderContext>, name: &str, w: &mut dyn Write) -> Result<(), RenderError> {
        match stmt {
            Stmt::Text(text, pos) | Stmt::Verbatim(text, pos) => {
                w.write_str(text.as_str()).map_err(|_| RenderError::new(RenderErrorKind::WriterFailed, *pos))
            }
            Stmt::Print(expr, pos) => {
                let v = self.eval_expr(expr, ctx, name)?;
                v.write_display(w).map_err(|_| RenderError::new(RenderErrorKind::WriterFailed, *pos))
            }
            Stmt::If { branches, else_branch, .. } => {
                for (cond, body) in branches {
                    if self.eval_expr(cond, ctx, name)?.is_truthy() {
                        return self.render_stmts(body, ctx, name, w);
                    }
                }
                if let Some(else_body) = else_branch {
                    return self.render_stmts(else_body, ctx, name, w);
                }
                Ok(())
            }
            Stmt::For { key_var, value_var, sequence, body, else_branch, .. } => {
                self.render_for(key_var.as_ref(), value_var, sequence, body, else_branch.as_deref(), ctx, name, w)
            }
            Stmt::Block { name: block_name, body, .. } => {
                let chain = ctx
                    .block_chain(block_name.as_str())
                    .unwrap_or_else(|| vec![Arc::from(body.clone())]);
                self.render_block_chain(&chain, 0, block_name, ctx, name, w)
            }
            Stmt::Extends { .. } => Ok(()),
            Stmt::Include { template, variables, ignore_missing, only, pos } => {
                self.render_include(template, variables.as_ref(), *ignore_missing, *only, ctx, name, w, *pos)
            }
            Stmt::Set { name: var_name, value, .. } => {
                let v = self.eval_expr(value, ctx, name)?;
                ctx.set_var(var_name.clone(), v);
                Ok(())
            }
            Stmt::Do { expr, .. } => {
                self.eval_expr(expr, ctx, name)?;
                Ok(())
            }
            Stmt::Macro(def, _) => {
                ctx.set_macro(def.name.clone(), def.clone());
                Ok(())
            }
            Stmt::Import { template, alias, pos } => self.render_import(template, alias, ctx, name, *pos),
            Stmt::FromImport { template, macros, pos } => self.render_from_import(template, macros, ctx, name, *pos),
            Stmt::Spaceless { body, pos } => {
                let mut buf = String::new();
                self.render_stmts(body, ctx, name, &mut buf)?;
                w.write_str(&collapse_spaceless(&buf)).map_err(|_| RenderError::new(RenderErrorKind::WriterFailed, *pos))
            }
            Stmt::Apply { body, filter, args, pos } => {
                let mut buf = String::new();
                self.render_stmts(body, ctx, name, &mut buf)?;
                let eval_args = self.eval_args(args, ctx, name)?;
                let result = self.apply_filter(filter, &Value::Str(buf.into()), &eval_args, *pos)?;
                result.write_display(w).map_err(|_| RenderError::new(RenderErrorKind::WriterFailed, *pos))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_for(
        &self,
        key_var: Option<&ImmutableString>,
        value_var: &ImmutableString,
        sequence: &Expr,
        body: &[Stmt],
        else_branch: Option<&[Stmt]>,
        ctx: &Rc<RenderContext>,
        name: &str,
        w: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let seq_val = self.eval_expr(sequence, ctx, name)?;
        let items = seq_val.iterate();
        if items.is_empty() {
            if let Some(else_body) = else_branch {
                return self.render_stmts(else_body, ctx, name, w);
            }
            return Ok(());
        }
        let len = items.len();
        let parent_loop = ctx.get_var("loop");
        let parent_loop = if parent_loop.is_nil() { None } else { Some(parent_loop) };
        for (index0, (k, v)) in items.into_iter().enumerate() {
            let loop_ctx = self.acquire_context();
            loop_ctx.set_parent(ctx.clone());
            if let Some(key_name) = key_var {
                loop_ctx.set_var(key_name.clone(), k);
            }
            loop_ctx.set_var(value_var.clone(), v);
            loop_ctx.set_var("loop".into(), build_loop_var(index0, len, parent_loop.clone()));
            let result = self.render_stmts(body, &loop_ctx, name, w);
            self.release_context(loop_ctx);
            result?;
        }
        Ok(())
    }

    fn render_block_chain(
        &self,
        chain: &[Arc<[Stmt]>],
        idx: usize,
        block_name: &ImmutableString,
        ctx: &Rc<RenderContext>,
        name: &str,
        w: &mut dyn Write,
    ) -> Result<(), RenderError> {
        ctx.push_block_frame(block_name.clone(), idx);
        let result = self.render_stmts(&chain[idx], ctx, name, w);
        ctx.pop_block_frame();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn render_include(
        &self,
        template_expr: &Expr,
        variables: Option<&Expr>,
        ignore_missing: bool,
        only: bool,
        ctx: &Rc<RenderContext>,
        name: &str,
        w: &mut dyn Write,
        pos: Position,
    ) -> Result<(), RenderError> {
        let requested = self.eval_expr(template_expr, ctx, name)?.to_display_string();
        let resolved = resolve_relative(name, &requested);
        self.check_depth(pos)?;
        let template = match self.engine.get_template(&resolved) {
            Ok(t) => t,
            Err(e) if ignore_missing && e.is_not_found() => return Ok(()),
            Err(_) => {
                return Err(RenderError::new(
                    RenderErrorKind::TemplateResolution { resolved, original: requested },
                    pos,
                ))
            }
        };

        let child = self.acquire_context();
        if !only {
            child.set_parent(ctx.clone());
        }
        if let Some(vars_expr) = variables {
            if let Value::Map(m) = self.eval_expr(vars_expr, ctx, name)? {
                for (k, v) in m.iter() {
                    child.set_var(k.clone(), v.clone());
                }
            }
        }
        let result = self.render_extends_chain(&template, &child, &resolved, w);
        self.release_context(child);
        result
    }

    fn render_import(&self, template_expr: &Expr, alias: &ImmutableString, ctx: &Rc<RenderContext>, name: &str, pos: Position) -> Result<(), RenderError> {
        let requested = self.eval_expr(template_expr, ctx, name)?.to_display_string();
        let resolved = resolve_relative(name, &requested);
        self.check_depth(pos)?;
        let template = self.engine.get_template(&resolved).map_err(|_| {
            RenderError::new(RenderErrorKind::TemplateResolution { resolved: resolved.clone(), original: requested }, pos)
        })?;
        let namespace: BTreeMap<ImmutableString, Value> =
            template_macros(&template).into_iter().map(|(k, v)| (k, Value::Macro(v))).collect();
        ctx.set_var(alias.clone(), Value::from(namespace));
        Ok(())
    }

    fn render_from_import(
        &self,
        template_expr: &Expr,
        macros: &[(ImmutableString, ImmutableString)],
        ctx: &Rc<RenderContext>,
        name: &str,
        pos: Position,
    ) -> Result<(), RenderError> {
        let requested = self.eval_expr(template_expr, ctx, name)?.to_display_string();
        let resolved = resolve_relative(name, &requested);
        self.check_depth(pos)?;
        let template = self.engine.get_template(&resolved).map_err(|_| {
            RenderError::new(RenderErrorKind::TemplateResolution { resolved: resolved.clone(), original: requested }, pos)
        })?;
        let available = template_macros(&template);
        for (src_name, alias) in macros {
            if let Some(def) = available.get(src_name.as_str()) {
                ctx.set_macro(alias.clone(), def.clone());
            }
        }
        Ok(())
    }

    fn eval_args(&self, args: &[Expr], ctx: &Rc<RenderContext>, name: &str) -> Result<Vec<Value>, RenderError> {
        args.iter().map(|a| self.eval_expr(a, ctx, name)).collect()
    }

    fn eval_expr(&self, expr: &Expr, ctx: &Rc<RenderContext>, name: &str) -> Result<Value, RenderError> {
        match expr {
            Expr::Literal(v, _) => Ok(v.clone()),
            Expr::Variable(n, _) => {
                if n.as_str() == "_self" {
                    return Ok(Value::from(ctx.own_macros_as_namespace()));
                }
                Ok(ctx.get_var(n.as_str()))
            }
            Expr::GetAttr { object, key, pos } => self.eval_get_attr(object, key, ctx, name, *pos),
            Expr::Binary { op, lhs, rhs, pos } => self.eval_binary(*op, lhs, rhs, ctx, name, *pos),
            Expr::Unary { op, operand, pos } => self.eval_unary(*op, operand, ctx, name, *pos),
            Expr::Conditional { cond, then_branch, else_branch, .. } => {
                if self.eval_expr(cond, ctx, name)?.is_truthy() {
                    self.eval_expr(then_branch, ctx, name)
                } else {
                    self.eval_expr(else_branch, ctx, name)
                }
            }
            Expr::Array(items, _) => Ok(Value::from(self.eval_args(items, ctx, name)?)),
            Expr::Object(entries, _) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(object_key_string(key), self.eval_expr(value, ctx, name)?);
                }
                Ok(Value::from(map))
            }
            Expr::Call { callee, args, pos } => self.eval_call(callee, args, ctx, name, *pos),
            Expr::Filter { node, name: fname, args, pos } => {
                let input = self.eval_expr(node, ctx, name)?;
                let eval_args = self.eval_args(args, ctx, name)?;
                self.apply_filter(fname, &input, &eval_args, *pos)
            }
            Expr::Test { node, name: tname, args, pos } => {
                let input = self.eval_expr(node, ctx, name)?;
                let eval_args = self.eval_args(args, ctx, name)?;
                Ok(Value::Bool(self.apply_test(tname, &input, &eval_args, *pos)?))
            }
        }
    }

    fn eval_binary(&self, op: BinOp, lhs: &Expr, rhs: &Expr, ctx: &Rc<RenderContext>, name: &str, pos: Position) -> Result<Value, RenderError> {
        match op {
            BinOp::And => {
                if !self.eval_expr(lhs, ctx, name)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_expr(rhs, ctx, name)?.is_truthy()))
            }
            BinOp::Or => {
                if self.eval_expr(lhs, ctx, name)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_expr(rhs, ctx, name)?.is_truthy()))
            }
            BinOp::NullCoalesce => {
                let l = self.eval_expr(lhs, ctx, name)?;
                if !l.is_nil() {
                    return Ok(l);
                }
                self.eval_expr(rhs, ctx, name)
            }
            _ => {
                let l = self.eval_expr(lhs, ctx, name)?;
                let r = self.eval_expr(rhs, ctx, name)?;
                self.apply_binary(op, l, r, pos)
            }
        }
    }

    fn apply_binary(&self, op: BinOp, l: Value, r: Value, pos: Position) -> Result<Value, RenderError> {
        use BinOp::{Add, Div, EndsWith, Eq, Ge, Gt, In, Le, Lt, Matches, Mod, Mul, Ne, NotIn, Pow, StartsWith, Sub};
        match op {
            Add | Sub | Mul | Div | Mod | Pow => self.apply_arith(op, &l, &r, pos),
            BinOp::Concat => Ok(Value::Str(format!("{}{}", l.to_display_string(), r.to_display_string()).into())),
            Eq => Ok(Value::Bool(l.loose_eq(&r))),
            Ne => Ok(Value::Bool(!l.loose_eq(&r))),
            Lt | Le | Gt | Ge => self.apply_compare(op, &l, &r, pos),
            In => Ok(Value::Bool(value_contains(&r, &l))),
            NotIn => Ok(Value::Bool(!value_contains(&r, &l))),
            Matches => self.apply_matches(&l, &r, pos),
            StartsWith => Ok(Value::Bool(l.to_display_string().starts_with(&r.to_display_string()))),
            EndsWith => Ok(Value::Bool(l.to_display_string().ends_with(&r.to_display_string()))),
            BinOp::And | BinOp::Or | BinOp::NullCoalesce => unreachable!("short-circuit ops handled in eval_binary"),
        }
    }

    fn apply_arith(&self, op: BinOp, l: &Value, r: &Value, pos: Position) -> Result<Value, RenderError> {
        let (lf, rf) = match (l.to_number(), r.to_number()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(RenderError::new(
                    RenderErrorKind::UnsupportedOperator { op: op.to_string(), lhs: l.type_name(), rhs: r.type_name() },
                    pos,
                ))
            }
        };
        let both_int = matches!((l, r), (Value::Int(_), Value::Int(_)));
        match op {
            BinOp::Add => Ok(if both_int { Value::Int(lf as i64 + rf as i64) } else { Value::Float(lf + rf) }),
            BinOp::Sub => Ok(if both_int { Value::Int(lf as i64 - rf as i64) } else { Value::Float(lf - rf) }),
            BinOp::Mul => Ok(if both_int { Value::Int(lf as i64 * rf as i64) } else { Value::Float(lf * rf) }),
            BinOp::Div => {
                if rf == 0.0 {
                    return Err(RenderError::new(RenderErrorKind::DivisionByZero, pos));
                }
                Ok(Value::Float(lf / rf))
            }
            BinOp::Mod => {
                if rf == 0.0 {
                    return Err(RenderError::new(RenderErrorKind::DivisionByZero, pos));
                }
                Ok(if both_int {
                    Value::Int((lf as i64).rem_euclid(rf as i64))
                } else {
                    Value::Float(lf % rf)
                })
            }
            BinOp::Pow => Ok(if both_int && rf >= 0.0 {
                Value::Int((lf as i64).pow(rf as u32))
            } else {
                Value::Float(lf.powf(rf))
            }),
            _ => unreachable!(),
        }
    }

    fn apply_compare(&self, op: BinOp, l: &Value, r: &Value, pos: Position) -> Result<Value, RenderError> {
        let ordering = if l.is_numeric() && r.is_numeric() {
            l.to_number().unwrap().partial_cmp(&r.to_number().unwrap())
        } else {
            Some(l.to_display_string().cmp(&r.to_display_string()))
        };
        let Some(ord) = ordering else {
            return Err(RenderError::new(
                RenderErrorKind::UnsupportedOperator { op: op.to_string(), lhs: l.type_name(), rhs: r.type_name() },
                pos,
            ));
        };
        use std::cmp::Ordering::{Greater, Less};
        let result = match op {
            BinOp::Lt => ord == Less,
            BinOp::Le => ord != Greater,
            BinOp::Gt => ord == Greater,
            BinOp::Ge => ord != Less,
            _ => unreachable!(),
        };
        Ok(Value::Bool(result))
    }

    fn apply_matches(&self, l: &Value, r: &Value, pos: Position) -> Result<Value, RenderError> {
        let pattern = r.to_display_string();
        let re = Regex::new(&pattern).map_err(|e| RenderError::new(RenderErrorKind::InvalidRegex(e.to_string()), pos))?;
        Ok(Value::Bool(re.is_match(&l.to_display_string())))
    }

    fn eval_unary(&self, op: UnOp, operand: &Expr, ctx: &Rc<RenderContext>, name: &str, pos: Position) -> Result<Value, RenderError> {
        let v = self.eval_expr(operand, ctx, name)?;
        match op {
            UnOp::Not => Ok(Value::Bool(!v.is_truthy())),
            UnOp::Neg => match v.to_number() {
                Some(n) => Ok(if matches!(v, Value::Int(_)) { Value::Int(-(n as i64)) } else { Value::Float(-n) }),
                None => Err(RenderError::new(
                    RenderErrorKind::UnsupportedOperator { op: "-".into(), lhs: v.type_name(), rhs: "" },
                    pos,
                )),
            },
            UnOp::Plus => match v.to_number() {
                Some(_) => Ok(v),
                None => Err(RenderError::new(
                    RenderErrorKind::UnsupportedOperator { op: "+".into(), lhs: v.type_name(), rhs: "" },
                    pos,
                )),
            },
        }
    }

    fn eval_get_attr(&self, object: &Expr, key: &AttrKey, ctx: &Rc<RenderContext>, name: &str, pos: Position) -> Result<Value, RenderError> {
        let obj = self.eval_expr(object, ctx, name)?;
        let key_val = match key {
            AttrKey::Name(n) => Value::Str(n.clone()),
            AttrKey::Computed(e) => self.eval_expr(e, ctx, name)?,
        };
        self.get_attr_value(&obj, &key_val, pos)
    }

    fn get_attr_value(&self, obj: &Value, key: &Value, pos: Position) -> Result<Value, RenderError> {
        match obj {
            Value::Nil => Ok(Value::Nil),
            Value::Map(m) => {
                let k = key.to_display_string();
                Ok(m.get(k.as_str()).cloned().unwrap_or(Value::Nil))
            }
            Value::Array(a) => {
                if let Some(idx) = key.to_number() {
                    let i = idx as i64;
                    let len = a.len() as i64;
                    let real_idx = if i < 0 { len + i } else { i };
                    if real_idx >= 0 && (real_idx as usize) < a.len() {
                        return Ok(a[real_idx as usize].clone());
                    }
                }
                Ok(Value::Nil)
            }
            Value::Host(h) => self.get_host_attr(h, &key.to_display_string(), pos),
            // Nil and mappings (Map/Array/Host) resolve missing attributes to Nil above; every
            // other value has no attributes at all, so accessing one is always an error.
            _ => Err(RenderError::new(
                RenderErrorKind::InvalidAttributeAccess { attribute: key.to_display_string(), on_type: obj.type_name() },
                pos,
            )),
        }
    }

    /// Resolve an attribute on a [`HostObject`], consulting the process-wide cache so repeated
    /// access to the same `(type, name)` pair skips straight to whichever of `get_field`/
    /// `call_method` resolved it the first time. A name that resolves to neither is Nil, not an
    /// error -- a host object stands in for a reflected struct, and Twig lets templates probe an
    /// optional field with `is defined` rather than erroring on every miss.
    fn get_host_attr(&self, host: &Arc<dyn HostObject>, name: &str, _pos: Position) -> Result<Value, RenderError> {
        let type_id = host.as_any().type_id();
        let cached = attr_cache::lookup(type_id, name);

        if !matches!(cached, Some(Resolution::Method)) {
            if let Some(v) = host.get_field(name) {
                if cached.is_none() {
                    attr_cache::record(type_id, name, Resolution::Field);
                }
                return Ok(v);
            }
        }
        if !matches!(cached, Some(Resolution::Field)) {
            if let Some(v) = host.call_method(name) {
                if cached.is_none() {
                    attr_cache::record(type_id, name, Resolution::Method);
                }
                return Ok(v);
            }
        }

        Ok(Value::Nil)
    }

    fn eval_call(&self, callee: &Expr, args: &[Expr], ctx: &Rc<RenderContext>, name: &str, pos: Position) -> Result<Value, RenderError> {
        if let Expr::Variable(n, _) = callee {
            if n.as_str() == "parent" && args.is_empty() {
                return self.call_parent(ctx, name, pos);
            }
            if let Some(def) = ctx.get_macro(n.as_str()) {
                return self.call_macro(&def, args, ctx, name, pos);
            }
            if let Value::Macro(def) = ctx.get_var(n.as_str()) {
                return self.call_macro(&def, args, ctx, name, pos);
            }
            if let Some(func) = self.engine.get_function(n.as_str()) {
                let eval_args = self.eval_args(args, ctx, name)?;
                return func(self.engine, ctx, &eval_args)
                    .map_err(|message| RenderError::new(RenderErrorKind::ExtensionFailed { name: n.to_string(), message }, pos));
            }
            return Err(RenderError::new(RenderErrorKind::UnknownFunction(n.to_string()), pos));
        }

        match self.eval_expr(callee, ctx, name)? {
            Value::Macro(def) => self.call_macro(&def, args, ctx, name, pos),
            other => Err(RenderError::new(RenderErrorKind::NotCallable(other.type_name()), pos)),
        }
    }

    fn call_parent(&self, ctx: &Rc<RenderContext>, name: &str, pos: Position) -> Result<Value, RenderError> {
        let Some((block_name, idx)) = ctx.current_block_frame() else {
            return Err(RenderError::new(RenderErrorKind::NoParentBlock(String::new()), pos));
        };
        let chain = ctx
            .block_chain(block_name.as_str())
            .ok_or_else(|| RenderError::new(RenderErrorKind::NoParentBlock(block_name.to_string()), pos))?;
        if idx + 1 >= chain.len() {
            return Err(RenderError::new(RenderErrorKind::NoParentBlock(block_name.to_string()), pos));
        }
        let mut buf = String::new();
        self.render_block_chain(&chain, idx + 1, &block_name, ctx, name, &mut buf)?;
        Ok(Value::Str(buf.into()))
    }

    /// Macros are lexically isolated: a call only sees its own parameters, not the caller's
    /// local variables, matching Twig's scoping for `{% macro %}`.
    fn call_macro(&self, def: &Arc<MacroDef>, args: &[Expr], ctx: &Rc<RenderContext>, name: &str, pos: Position) -> Result<Value, RenderError> {
        let macro_ctx = self.acquire_context();
        // Bind the macro's own name into its isolated scope so a recursive bare-name call
        // resolves without needing `_self.`; sibling macros defined in the same template are not
        // reachable this way and need `_self.other(...)` instead.
        macro_ctx.set_macro(def.name.clone(), def.clone());
        for (i, param) in def.params.iter().enumerate() {
            let value = if let Some(arg_expr) = args.get(i) {
                self.eval_expr(arg_expr, ctx, name)?
            } else if let Some(default_expr) = def.defaults.get(param.as_str()) {
                self.eval_expr(default_expr, ctx, name)?
            } else {
                Value::Nil
            };
            macro_ctx.set_var(param.clone(), value);
        }
        let mut buf = String::new();
        let result = self.render_stmts(&def.body, &macro_ctx, name, &mut buf).map_err(|e| {
            if matches!(e.kind, RenderErrorKind::WriterFailed) {
                e
            } else {
                RenderError::new(e.kind, pos)
            }
        });
        self.release_context(macro_ctx);
        result?;
        Ok(Value::Str(buf.into()))
    }

    fn apply_filter(&self, fname: &ImmutableString, input: &Value, args: &[Value], pos: Position) -> Result<Value, RenderError> {
        let f = self
            .engine
            .get_filter(fname.as_str())
            .ok_or_else(|| RenderError::new(RenderErrorKind::UnknownFilter(fname.to_string()), pos))?;
        f(input, args).map_err(|message| RenderError::new(RenderErrorKind::ExtensionFailed { name: fname.to_string(), message }, pos))
    }

    fn apply_test(&self, tname: &ImmutableString, input: &Value, args: &[Value], pos: Position) -> Result<bool, RenderError> {
        let f = self
            .engine
            .get_test(tname.as_str())
            .ok_or_else(|| RenderError::new(RenderErrorKind::UnknownTest(tname.to_string()), pos))?;
        f(input, args).map_err(|message| RenderError::new(RenderErrorKind::ExtensionFailed { name: tname.to_string(), message }, pos))
    }
}

fn template_macros(template: &Template) -> HashMap<ImmutableString, Arc<MacroDef>> {
    template
        .body
        .iter()
        .filter_map(|s| if let Stmt::Macro(def, _) = s { Some((def.name.clone(), def.clone())) } else { None })
        .collect()
}

fn object_key_string(key: &ObjectKey) -> ImmutableString {
    match key {
        ObjectKey::Name(n) | ObjectKey::Str(n) => n.clone(),
    }
}

/// Build the `loop` variable exposed inside a `{% for %}` body. `parent` is the enclosing
/// loop's own `loop` value, so a nested `for` can reach it via `loop.parent` -- `Nil` when this
/// loop isn't nested inside another one.
fn build_loop_var(index0: usize, len: usize, parent: Option<Value>) -> Value {
    let mut m = BTreeMap::new();
    m.insert(ImmutableString::from("index"), Value::Int((index0 + 1) as i64));
    m.insert(ImmutableString::from("index0"), Value::Int(index0 as i64));
    m.insert(ImmutableString::from("revindex"), Value::Int((len - index0) as i64));
    m.insert(ImmutableString::from("revindex0"), Value::Int((len - index0 - 1) as i64));
    m.insert(ImmutableString::from("first"), Value::Bool(index0 == 0));
    m.insert(ImmutableString::from("last"), Value::Bool(index0 + 1 == len));
    m.insert(ImmutableString::from("length"), Value::Int(len as i64));
    m.insert(ImmutableString::from("parent"), parent.unwrap_or(Value::Nil));
    Value::from(m)
}

fn value_contains(container: &Value, needle: &Value) -> bool {
    match container {
        Value::Array(a) => a.iter().any(|v| v.loose_eq(needle)),
        Value::Map(m) => m.contains_key(needle.to_display_string().as_str()),
        Value::Str(s) => s.as_str().contains(&needle.to_display_string()),
        _ => false,
    }
}

static SPACELESS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").unwrap());

/// Collapse whitespace between HTML tags, the way Twig's `{% spaceless %}` (and the `spaceless`
/// filter) does: only whitespace directly between `>` and `<` is removed.
pub(crate) fn collapse_spaceless(s: &str) -> String {
    SPACELESS_RE.replace_all(s, "><").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineOptions};
    use crate::loader::Loader;
    use std::collections::BTreeMap as Map;
    use std::sync::Mutex;

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
    fn renders_plain_text_and_print() {
        let engine = engine_with(&[("t", "hello {{ name }}")]);
        let mut vars = Map::new();
        vars.insert(ImmutableString::from("name"), Value::from("world"));
        let out = engine.render_to_string("t", vars).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn if_else_selects_branch() {
        let engine = engine_with(&[("t", "{% if flag %}yes{% else %}no{% endif %}")]);
        let mut vars = Map::new();
        vars.insert(ImmutableString::from("flag"), Value::Bool(false));
        assert_eq!(engine.render_to_string("t", vars).unwrap(), "no");
    }

    #[test]
    fn for_loop_exposes_loop_variable() {
        let engine = engine_with(&[("t", "{% for v in items %}{{ loop.index }}:{{ v }} {% endfor %}")]);
        let mut vars = Map::new();
        vars.insert(ImmutableString::from("items"), Value::from(vec![Value::from("a"), Value::from("b")]));
        assert_eq!(engine.render_to_string("t", vars).unwrap(), "1:a 2:b ");
    }

    #[test]
    fn for_else_renders_when_empty() {
        let engine = engine_with(&[("t", "{% for v in items %}{{ v }}{% else %}none{% endfor %}")]);
        let mut vars = Map::new();
        vars.insert(ImmutableString::from("items"), Value::from(Vec::<Value>::new()));
        assert_eq!(engine.render_to_string("t", vars).unwrap(), "none");
    }

    #[test]
    fn extends_renders_child_block_override() {
        let engine = engine_with(&[
            ("base.html.twig", "<h1>{% block title %}default{% endblock %}</h1>"),
            ("child.html.twig", "{% extends 'base.html.twig' %}{% block title %}Hi{% endblock %}"),
        ]);
        let out = engine.render_to_string("child.html.twig", Map::new()).unwrap();
        assert_eq!(out, "<h1>Hi</h1>");
    }

    #[test]
    fn parent_call_includes_base_block_content() {
        let engine = engine_with(&[
            ("base.html.twig", "{% block title %}Base{% endblock %}"),
            ("child.html.twig", "{% extends 'base.html.twig' %}{% block title %}{{ parent() }} + Child{% endblock %}"),
        ]);
        let out = engine.render_to_string("child.html.twig", Map::new()).unwrap();
        assert_eq!(out, "Base + Child");
    }

    #[test]
    fn include_isolates_with_only() {
        let engine = engine_with(&[
            ("partial.html.twig", "{{ name|default('anon') }}"),
            ("main.html.twig", "{% include 'partial.html.twig' only %}"),
        ]);
        let mut vars = Map::new();
        vars.insert(ImmutableString::from("name"), Value::from("leaked"));
        let out = engine.render_to_string("main.html.twig", vars).unwrap();
        assert_eq!(out, "anon");
    }

    #[test]
    fn include_ignore_missing_renders_nothing() {
        let engine = engine_with(&[("main.html.twig", "before[{% include 'missing.html.twig' ignore missing %}]after")]);
        let out = engine.render_to_string("main.html.twig", Map::new()).unwrap();
        assert_eq!(out, "before[]after");
    }

    #[test]
    fn macro_call_via_import() {
        let engine = engine_with(&[
            ("forms.html.twig", "{% macro input(name, value = '') %}<{{ name }}:{{ value }}>{% endmacro %}"),
            ("main.html.twig", "{% import 'forms.html.twig' as forms %}{{ forms.input('x', 'y') }}"),
        ]);
        let out = engine.render_to_string("main.html.twig", Map::new()).unwrap();
        assert_eq!(out, "<x:y>");
    }

    #[test]
    fn macro_default_param_applies_when_omitted() {
        let engine = engine_with(&[
            ("forms.html.twig", "{% macro input(name, value = 'def') %}{{ value }}{% endmacro %}"),
            ("main.html.twig", "{% from 'forms.html.twig' import input %}{{ input('x') }}"),
        ]);
        let out = engine.render_to_string("main.html.twig", Map::new()).unwrap();
        assert_eq!(out, "def");
    }

    #[test]
    fn division_by_zero_errors() {
        let engine = engine_with(&[("t", "{{ 1 / 0 }}")]);
        let err = engine.render_to_string("t", Map::new()).unwrap_err();
        assert!(matches!(err, crate::error::TemplateError::Render(e) if e.kind == RenderErrorKind::DivisionByZero));
    }

    #[test]
    fn spaceless_collapses_whitespace_between_tags() {
        let engine = engine_with(&[("t", "{% spaceless %}<div>\n  <span>x</span>\n</div>{% endspaceless %}")]);
        let out = engine.render_to_string("t", Map::new()).unwrap();
        assert_eq!(out, "<div><span>x</span></div>");
    }
}
