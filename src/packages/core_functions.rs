//! Functions preloaded by [`super::register_core`].

use super::core_filters::{merge_values, value_to_json};
use crate::context::RenderContext;
use crate::engine::Engine;
use crate::render::Renderer;
use crate::value::Value;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn register(engine: &Engine) {
    engine.register_function("range", Arc::new(range));
    engine.register_function("date", Arc::new(date));
    engine.register_function("random", Arc::new(random));
    engine.register_function("max", Arc::new(max));
    engine.register_function("min", Arc::new(min));
    engine.register_function("dump", Arc::new(dump));
    engine.register_function("constant", Arc::new(constant));
    engine.register_function("cycle", Arc::new(cycle));
    engine.register_function("include", Arc::new(include_fn));
    engine.register_function("json_encode", Arc::new(json_encode_fn));
    engine.register_function("length", Arc::new(length_fn));
    engine.register_function("merge", Arc::new(merge_fn));
}

fn range(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let start = args.first().and_then(Value::to_number).ok_or("range requires a start value")?;
    let end = args.get(1).and_then(Value::to_number).ok_or("range requires an end value")?;
    let step = args.get(2).and_then(Value::to_number).unwrap_or(1.0);
    if step == 0.0 {
        return Err("range step must not be zero".to_string());
    }
    let both_int = matches!(args.first(), Some(Value::Int(_))) && matches!(args.get(1), Some(Value::Int(_)));
    let mut out = Vec::new();
    let mut current = start;
    if step > 0.0 {
        while current <= end {
            out.push(if both_int { Value::Int(current as i64) } else { Value::Float(current) });
            current += step;
        }
    } else {
        while current >= end {
            out.push(if both_int { Value::Int(current as i64) } else { Value::Float(current) });
            current += step;
        }
    }
    Ok(Value::from(out))
}

fn date(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let secs = match args.first() {
        Some(v) => v.to_number().ok_or("date() requires a numeric timestamp")? as i64,
        None => SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0),
    };
    Ok(Value::Int(secs))
}

fn random(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let mut rng = rand::thread_rng();
    match args.first() {
        None => Ok(Value::Float(rng.gen_range(0.0..1.0))),
        Some(Value::Array(a)) => {
            if a.is_empty() {
                return Ok(Value::Nil);
            }
            let idx = rng.gen_range(0..a.len());
            Ok(a[idx].clone())
        }
        Some(Value::Str(s)) => {
            let chars: Vec<char> = s.as_str().chars().collect();
            if chars.is_empty() {
                return Ok(Value::from(""));
            }
            Ok(Value::from(chars[rng.gen_range(0..chars.len())].to_string()))
        }
        Some(v) => {
            let max = v.to_number().ok_or("random() expects an array, string, or number")? as i64;
            Ok(Value::Int(rng.gen_range(0..=max.max(0))))
        }
    }
}

fn numeric_args(args: &[Value]) -> Vec<&Value> {
    match args {
        [Value::Array(a)] => a.iter().collect(),
        other => other.iter().collect(),
    }
}

fn max(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    numeric_args(args)
        .into_iter()
        .max_by(|a, b| a.to_number().unwrap_or(f64::MIN).partial_cmp(&b.to_number().unwrap_or(f64::MIN)).unwrap_or(std::cmp::Ordering::Equal))
        .cloned()
        .ok_or_else(|| "max() requires at least one argument".to_string())
}

fn min(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    numeric_args(args)
        .into_iter()
        .min_by(|a, b| a.to_number().unwrap_or(f64::MAX).partial_cmp(&b.to_number().unwrap_or(f64::MAX)).unwrap_or(std::cmp::Ordering::Equal))
        .cloned()
        .ok_or_else(|| "min() requires at least one argument".to_string())
}

fn dump(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let rendered = args.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>().join(", ");
    Ok(Value::from(rendered))
}

fn constant(_engine: &Engine, ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let name = args.first().map(Value::to_display_string).ok_or("constant() requires a name")?;
    Ok(ctx.get_var(&name))
}

fn cycle(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let Some(Value::Array(values)) = args.first() else {
        return Err("cycle() requires an array as its first argument".to_string());
    };
    if values.is_empty() {
        return Ok(Value::Nil);
    }
    let position = args.get(1).and_then(Value::to_number).unwrap_or(0.0) as i64;
    let len = values.len() as i64;
    let idx = position.rem_euclid(len) as usize;
    Ok(values[idx].clone())
}

/// Renders a named template standalone (its own root `RenderContext`, seeded only from the
/// engine's globals plus any `vars` mapping given) and returns the output as a string. Unlike
/// the `{% include %}` tag, this does not inherit the calling scope's local variables -- a
/// function call has no access to the surrounding template's name needed for relative-path
/// resolution, so only root-relative names are supported here.
fn include_fn(engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let name = args.first().map(Value::to_display_string).ok_or("include() requires a template name")?;
    let vars: BTreeMap<_, _> = match args.get(1) {
        Some(Value::Map(m)) => (**m).clone(),
        _ => BTreeMap::new(),
    };
    let template = engine.get_template(&name).map_err(|e| e.to_string())?;
    let renderer = Renderer::new(engine);
    let mut out = String::new();
    renderer.render_root(&template, vars, &mut out).map_err(|e| e.to_string())?;
    Ok(Value::from(out))
}

fn json_encode_fn(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let input = args.first().ok_or("json_encode() requires a value")?;
    serde_json::to_string(&value_to_json(input)).map(Value::from).map_err(|e| e.to_string())
}

fn length_fn(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let input = args.first().ok_or("length() requires a value")?;
    Ok(Value::Int(input.len().unwrap_or(0) as i64))
}

fn merge_fn(_engine: &Engine, _ctx: &RenderContext, args: &[Value]) -> Result<Value, String> {
    let a = args.first().ok_or("merge() requires two arguments")?;
    let b = args.get(1).ok_or("merge() requires two arguments")?;
    Ok(merge_values(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;

    #[test]
    fn range_is_inclusive_both_ends() {
        let engine = Engine::new(EngineOptions::default());
        let ctx = RenderContext::new();
        let result = range(&engine, &ctx, &[Value::Int(1), Value::Int(5)]).unwrap();
        let Value::Array(a) = result else { panic!("expected array") };
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn range_zero_step_errors() {
        let engine = Engine::new(EngineOptions::default());
        let ctx = RenderContext::new();
        assert!(range(&engine, &ctx, &[Value::Int(1), Value::Int(5), Value::Int(0)]).is_err());
    }

    #[test]
    fn cycle_wraps_around() {
        let engine = Engine::new(EngineOptions::default());
        let ctx = RenderContext::new();
        let arr = Value::from(vec![Value::from("a"), Value::from("b")]);
        let result = cycle(&engine, &ctx, &[arr, Value::Int(2)]).unwrap();
        assert_eq!(result.to_display_string(), "a");
    }
}
