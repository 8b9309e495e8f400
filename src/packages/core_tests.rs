//! Tests (the `is`/`is not` operands) preloaded by [`super::register_core`].

use crate::engine::Engine;
use crate::value::Value;
use regex::Regex;
use std::sync::Arc;

pub fn register(engine: &Engine) {
    engine.register_test("defined", Arc::new(defined));
    engine.register_test("empty", Arc::new(empty));
    engine.register_test("null", Arc::new(is_null));
    engine.register_test("none", Arc::new(is_null));
    engine.register_test("even", Arc::new(even));
    engine.register_test("odd", Arc::new(odd));
    engine.register_test("iterable", Arc::new(iterable));
    engine.register_test("same_as", Arc::new(same_as));
    engine.register_test("divisible_by", Arc::new(divisible_by));
    engine.register_test("equalto", Arc::new(equalto));
    engine.register_test("starts_with", Arc::new(starts_with));
    engine.register_test("ends_with", Arc::new(ends_with));
    engine.register_test("matches", Arc::new(matches_test));
}

/// Undefined names and an explicit `null` literal both evaluate to [`Value::Nil`] (see
/// [`crate::context::RenderContext::get_var`]), so this test cannot distinguish "never bound"
/// from "bound to null" -- the same ambiguity the `is null`/`is none` test has to live with.
fn defined(input: &Value, _args: &[Value]) -> Result<bool, String> {
    Ok(!input.is_nil())
}

fn empty(input: &Value, _args: &[Value]) -> Result<bool, String> {
    Ok(!input.is_truthy())
}

fn is_null(input: &Value, _args: &[Value]) -> Result<bool, String> {
    Ok(input.is_nil())
}

fn even(input: &Value, _args: &[Value]) -> Result<bool, String> {
    let n = input.to_number().ok_or("even expects a number")? as i64;
    Ok(n % 2 == 0)
}

fn odd(input: &Value, _args: &[Value]) -> Result<bool, String> {
    let n = input.to_number().ok_or("odd expects a number")? as i64;
    Ok(n % 2 != 0)
}

fn iterable(input: &Value, _args: &[Value]) -> Result<bool, String> {
    Ok(matches!(input, Value::Array(_) | Value::Map(_) | Value::Str(_)))
}

/// Strict equality: unlike `equalto`, a `Value::Int` and an equal-valued `Value::Float` do not
/// match, matching Twig's `same as` operator semantics (`===` rather than `==`).
fn same_as(input: &Value, args: &[Value]) -> Result<bool, String> {
    let other = args.first().ok_or("same_as requires a comparison value")?;
    Ok(match (input, other) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        _ => false,
    })
}

fn divisible_by(input: &Value, args: &[Value]) -> Result<bool, String> {
    let n = input.to_number().ok_or("divisible_by expects a number")?;
    let by = args.first().and_then(Value::to_number).ok_or("divisible_by requires a divisor")?;
    if by == 0.0 {
        return Err("divisible_by divisor must not be zero".to_string());
    }
    Ok(n % by == 0.0)
}

fn equalto(input: &Value, args: &[Value]) -> Result<bool, String> {
    let other = args.first().ok_or("equalto requires a comparison value")?;
    Ok(input.loose_eq(other))
}

fn starts_with(input: &Value, args: &[Value]) -> Result<bool, String> {
    let prefix = args.first().map(Value::to_display_string).ok_or("starts_with requires a prefix")?;
    Ok(input.to_display_string().starts_with(&prefix))
}

fn ends_with(input: &Value, args: &[Value]) -> Result<bool, String> {
    let suffix = args.first().map(Value::to_display_string).ok_or("ends_with requires a suffix")?;
    Ok(input.to_display_string().ends_with(&suffix))
}

fn matches_test(input: &Value, args: &[Value]) -> Result<bool, String> {
    let pattern = args.first().map(Value::to_display_string).ok_or("matches requires a pattern")?;
    let re = Regex::new(&pattern).map_err(|e| e.to_string())?;
    Ok(re.is_match(&input.to_display_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_as_rejects_int_float_crossing() {
        assert!(!same_as(&Value::Int(2), &[Value::Float(2.0)]).unwrap());
        assert!(equalto(&Value::Int(2), &[Value::Float(2.0)]).unwrap());
    }

    #[test]
    fn even_and_odd_partition_integers() {
        assert!(even(&Value::Int(4), &[]).unwrap());
        assert!(odd(&Value::Int(3), &[]).unwrap());
    }

    #[test]
    fn divisible_by_zero_errors() {
        assert!(divisible_by(&Value::Int(4), &[Value::Int(0)]).is_err());
    }
}
