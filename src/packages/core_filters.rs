//! Filters preloaded by [`super::register_core`].

use crate::engine::Engine;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;

pub fn register(engine: &Engine) {
    engine.register_filter("default", std::sync::Arc::new(default));
    engine.register_filter("escape", std::sync::Arc::new(escape));
    engine.register_filter("e", std::sync::Arc::new(escape));
    engine.register_filter("upper", std::sync::Arc::new(upper));
    engine.register_filter("lower", std::sync::Arc::new(lower));
    engine.register_filter("trim", std::sync::Arc::new(trim));
    engine.register_filter("raw", std::sync::Arc::new(raw));
    engine.register_filter("length", std::sync::Arc::new(length));
    engine.register_filter("count", std::sync::Arc::new(length));
    engine.register_filter("join", std::sync::Arc::new(join));
    engine.register_filter("split", std::sync::Arc::new(split));
    engine.register_filter("date", std::sync::Arc::new(date));
    engine.register_filter("url_encode", std::sync::Arc::new(url_encode));
    engine.register_filter("capitalize", std::sync::Arc::new(capitalize));
    engine.register_filter("title", std::sync::Arc::new(title));
    engine.register_filter("first", std::sync::Arc::new(first));
    engine.register_filter("last", std::sync::Arc::new(last));
    engine.register_filter("slice", std::sync::Arc::new(slice));
    engine.register_filter("reverse", std::sync::Arc::new(reverse));
    engine.register_filter("sort", std::sync::Arc::new(sort));
    engine.register_filter("keys", std::sync::Arc::new(keys));
    engine.register_filter("merge", std::sync::Arc::new(merge));
    engine.register_filter("replace", std::sync::Arc::new(replace));
    engine.register_filter("striptags", std::sync::Arc::new(striptags));
    engine.register_filter("number_format", std::sync::Arc::new(number_format));
    engine.register_filter("abs", std::sync::Arc::new(abs));
    engine.register_filter("round", std::sync::Arc::new(round));
    engine.register_filter("nl2br", std::sync::Arc::new(nl2br));
    engine.register_filter("format", std::sync::Arc::new(format_filter));
    engine.register_filter("json_encode", std::sync::Arc::new(json_encode));
    engine.register_filter("spaceless", std::sync::Arc::new(spaceless));
}

fn arg_str(args: &[Value], idx: usize, fallback: &str) -> String {
    args.get(idx).map(Value::to_display_string).unwrap_or_else(|| fallback.to_string())
}

fn default(input: &Value, args: &[Value]) -> Result<Value, String> {
    let is_empty = input.is_nil() || matches!(input, Value::Str(s) if s.is_empty());
    if is_empty {
        Ok(args.first().cloned().unwrap_or(Value::Nil))
    } else {
        Ok(input.clone())
    }
}

fn escape(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let s = input.to_display_string();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    Ok(Value::from(out))
}

fn upper(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(input.to_display_string().to_uppercase()))
}

fn lower(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(input.to_display_string().to_lowercase()))
}

fn trim(input: &Value, args: &[Value]) -> Result<Value, String> {
    let s = input.to_display_string();
    let trimmed = match args.first() {
        Some(chars) => {
            let chars: Vec<char> = chars.to_display_string().chars().collect();
            s.trim_matches(|c| chars.contains(&c)).to_string()
        }
        None => s.trim().to_string(),
    };
    Ok(Value::from(trimmed))
}

fn raw(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(input.clone())
}

fn length(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::Int(input.len().unwrap_or(0) as i64))
}

fn join(input: &Value, args: &[Value]) -> Result<Value, String> {
    let sep = arg_str(args, 0, "");
    let Value::Array(items) = input else {
        return Ok(Value::from(input.to_display_string()));
    };
    let joined = items.iter().map(Value::to_display_string).collect::<Vec<_>>().join(&sep);
    Ok(Value::from(joined))
}

fn split(input: &Value, args: &[Value]) -> Result<Value, String> {
    let s = input.to_display_string();
    let delim = args.first().map(Value::to_display_string).ok_or("split requires a delimiter")?;
    let limit = args.get(1).and_then(Value::to_number).map(|n| n as usize);
    let parts: Vec<Value> = if delim.is_empty() {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    } else {
        match limit {
            Some(n) if n > 0 => s.splitn(n, &delim).map(Value::from).collect(),
            _ => s.split(&delim).map(Value::from).collect(),
        }
    };
    Ok(Value::from(parts))
}

/// Days-since-epoch civil-calendar conversion (Howard Hinnant's algorithm), used to render a Unix
/// timestamp without pulling in a date/time crate for one filter.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn format_timestamp(secs: i64, fmt: &str) -> String {
    let days = secs.div_euclid(86400);
    let time_of_day = secs.rem_euclid(86400);
    let (year, month, day) = civil_from_days(days);
    let (hour, minute, second) = (time_of_day / 3600, (time_of_day / 60) % 60, time_of_day % 60);
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            'Y' => out.push_str(&format!("{year:04}")),
            'm' => out.push_str(&format!("{month:02}")),
            'd' => out.push_str(&format!("{day:02}")),
            'H' => out.push_str(&format!("{hour:02}")),
            'i' => out.push_str(&format!("{minute:02}")),
            's' => out.push_str(&format!("{second:02}")),
            other => out.push(other),
        }
    }
    out
}

fn date(input: &Value, args: &[Value]) -> Result<Value, String> {
    let secs = input.to_number().ok_or("date filter requires a numeric (unix timestamp) input")? as i64;
    let fmt = arg_str(args, 0, "Y-m-d H:i:s");
    Ok(Value::from(format_timestamp(secs, &fmt)))
}

fn url_encode(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let s = input.to_display_string();
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    Ok(Value::from(out))
}

fn capitalize(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let s = input.to_display_string();
    let mut chars = s.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    Ok(Value::from(capitalized))
}

fn title(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let s = input.to_display_string();
    let titled = s
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    Ok(Value::from(titled))
}

fn first(input: &Value, _args: &[Value]) -> Result<Value, String> {
    match input {
        Value::Array(a) => Ok(a.first().cloned().unwrap_or(Value::Nil)),
        Value::Str(s) => Ok(s.as_str().chars().next().map(|c| Value::from(c.to_string())).unwrap_or(Value::Nil)),
        _ => Ok(Value::Nil),
    }
}

fn last(input: &Value, _args: &[Value]) -> Result<Value, String> {
    match input {
        Value::Array(a) => Ok(a.last().cloned().unwrap_or(Value::Nil)),
        Value::Str(s) => Ok(s.as_str().chars().last().map(|c| Value::from(c.to_string())).unwrap_or(Value::Nil)),
        _ => Ok(Value::Nil),
    }
}

fn normalize_index(idx: i64, len: usize) -> usize {
    if idx < 0 {
        (len as i64 + idx).max(0) as usize
    } else {
        (idx as usize).min(len)
    }
}

fn slice(input: &Value, args: &[Value]) -> Result<Value, String> {
    let start = args.first().and_then(Value::to_number).ok_or("slice requires a start offset")? as i64;
    let length_arg = args.get(1).and_then(Value::to_number);
    match input {
        Value::Array(a) => {
            let begin = normalize_index(start, a.len());
            let end = match length_arg {
                Some(len) => (begin + len as usize).min(a.len()),
                None => a.len(),
            };
            Ok(Value::from(if begin < end { a[begin..end].to_vec() } else { Vec::new() }))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.as_str().chars().collect();
            let begin = normalize_index(start, chars.len());
            let end = match length_arg {
                Some(len) => (begin + len as usize).min(chars.len()),
                None => chars.len(),
            };
            let sliced: String = if begin < end { chars[begin..end].iter().collect() } else { String::new() };
            Ok(Value::from(sliced))
        }
        _ => Ok(Value::Nil),
    }
}

fn reverse(input: &Value, _args: &[Value]) -> Result<Value, String> {
    match input {
        Value::Array(a) => {
            let mut v = (*a).clone();
            v.reverse();
            Ok(Value::from(v))
        }
        Value::Str(s) => Ok(Value::from(s.as_str().chars().rev().collect::<String>())),
        other => Ok(other.clone()),
    }
}

fn sort(input: &Value, _args: &[Value]) -> Result<Value, String> {
    let Value::Array(a) = input else {
        return Err(format!("sort expects an array, got {}", input.type_name()));
    };
    let mut v = (*a).clone();
    v.sort_by(|a, b| match (a.to_number(), b.to_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_display_string().cmp(&b.to_display_string()),
    });
    Ok(Value::from(v))
}

fn keys(input: &Value, _args: &[Value]) -> Result<Value, String> {
    match input {
        Value::Map(m) => Ok(Value::from(m.keys().map(|k| Value::Str(k.clone())).collect::<Vec<_>>())),
        Value::Array(a) => Ok(Value::from((0..a.len()).map(|i| Value::Int(i as i64)).collect::<Vec<_>>())),
        _ => Ok(Value::from(Vec::new())),
    }
}

pub(crate) fn merge_values(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            let mut v = (**x).clone();
            v.extend(y.iter().cloned());
            Value::from(v)
        }
        (Value::Map(x), Value::Map(y)) => {
            let mut m = (**x).clone();
            for (k, v) in y.iter() {
                m.insert(k.clone(), v.clone());
            }
            Value::from(m)
        }
        _ => b.clone(),
    }
}

fn merge(input: &Value, args: &[Value]) -> Result<Value, String> {
    let other = args.first().ok_or("merge requires another array or mapping")?;
    Ok(merge_values(input, other))
}

fn replace(input: &Value, args: &[Value]) -> Result<Value, String> {
    let Value::Map(pairs) = args.first().ok_or("replace requires a mapping of search => replacement")? else {
        return Err("replace's argument must be a mapping".to_string());
    };
    let mut s = input.to_display_string();
    for (search, replacement) in pairs.iter() {
        s = s.replace(search.as_str(), &replacement.to_display_string());
    }
    Ok(Value::from(s))
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

fn striptags(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(TAG_RE.replace_all(&input.to_display_string(), "").into_owned()))
}

fn number_format(input: &Value, args: &[Value]) -> Result<Value, String> {
    let n = input.to_number().ok_or("number_format requires a numeric input")?;
    let decimals = args.first().and_then(Value::to_number).unwrap_or(0.0) as usize;
    let dec_point = arg_str(args, 1, ".");
    let thousands_sep = arg_str(args, 2, ",");

    let formatted = format!("{n:.decimals$}");
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), ""));
    let negative = int_part.starts_with('-');
    let digits = int_part.trim_start_matches('-');

    let mut grouped = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push_str(&thousands_sep.chars().rev().collect::<String>());
        }
        grouped.push(c);
    }
    let mut out: String = grouped.chars().rev().collect();
    if negative {
        out = format!("-{out}");
    }
    if decimals > 0 {
        out.push_str(&dec_point);
        out.push_str(frac_part);
    }
    Ok(Value::from(out))
}

fn abs(input: &Value, _args: &[Value]) -> Result<Value, String> {
    match input {
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        _ => Err(format!("abs expects a number, got {}", input.type_name())),
    }
}

fn round(input: &Value, args: &[Value]) -> Result<Value, String> {
    let n = input.to_number().ok_or("round requires a numeric input")?;
    let precision = args.first().and_then(Value::to_number).unwrap_or(0.0);
    let mode = arg_str(args, 1, "common");
    let factor = 10f64.powf(precision);
    let scaled = n * factor;
    let rounded = match mode.as_str() {
        "floor" => scaled.floor(),
        "ceil" => scaled.ceil(),
        _ => scaled.round(),
    };
    Ok(Value::Float(rounded / factor))
}

fn nl2br(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(input.to_display_string().replace('\n', "<br />\n")))
}

fn format_filter(input: &Value, args: &[Value]) -> Result<Value, String> {
    let fmt = input.to_display_string();
    let mut out = String::with_capacity(fmt.len());
    let mut arg_iter = args.iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('%') => out.push('%'),
                Some('s') | Some('d') | Some('f') => {
                    if let Some(v) = arg_iter.next() {
                        out.push_str(&v.to_display_string());
                    }
                }
                Some(other) => {
                    out.push('%');
                    out.push(other);
                }
                None => out.push('%'),
            }
        } else {
            out.push(c);
        }
    }
    Ok(Value::from(out))
}

/// Convert a [`Value`] into a [`serde_json::Value`] for `json_encode`. Written by hand rather
/// than deriving `Serialize` on [`Value`] itself, since `Value::Host`/`Value::Macro` have no
/// sensible JSON form and this keeps that decision local to the one filter that needs it.
pub(crate) fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Nil => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.as_str().to_string()),
        Value::Array(a) => serde_json::Value::Array(a.iter().map(value_to_json).collect()),
        Value::Map(m) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in m.iter() {
                obj.insert(k.as_str().to_string(), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
        Value::Host(h) => serde_json::Value::String(format!("{h:?}")),
        Value::Macro(_) => serde_json::Value::Null,
    }
}

fn json_encode(input: &Value, _args: &[Value]) -> Result<Value, String> {
    serde_json::to_string(&value_to_json(input)).map(Value::from).map_err(|e| e.to_string())
}

fn spaceless(input: &Value, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(crate::render::collapse_spaceless(&input.to_display_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_substitutes_nil_and_empty_string() {
        assert_eq!(default(&Value::Nil, &[Value::from("x")]).unwrap().to_display_string(), "x");
        assert_eq!(default(&Value::from(""), &[Value::from("x")]).unwrap().to_display_string(), "x");
        assert_eq!(default(&Value::from("y"), &[Value::from("x")]).unwrap().to_display_string(), "y");
    }

    #[test]
    fn escape_replaces_html_entities() {
        assert_eq!(escape(&Value::from("<a>&\"'"), &[]).unwrap().to_display_string(), "&lt;a&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn slice_handles_negative_start() {
        let arr = Value::from(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
        let sliced = slice(&arr, &[Value::Int(-2)]).unwrap();
        let Value::Array(a) = sliced else { panic!("expected array") };
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn number_format_groups_thousands() {
        assert_eq!(number_format(&Value::Float(1234567.891), &[Value::Int(2)]).unwrap().to_display_string(), "1,234,567.89");
    }

    #[test]
    fn format_filter_substitutes_percent_s() {
        let out = format_filter(&Value::from("%s is %s"), &[Value::from("a"), Value::from("b")]).unwrap();
        assert_eq!(out.to_display_string(), "a is b");
    }

    #[test]
    fn json_encode_handles_nested_structures() {
        let arr = Value::from(vec![Value::Int(1), Value::from("x")]);
        assert_eq!(json_encode(&arr, &[]).unwrap().to_display_string(), r#"[1,"x"]"#);
    }
}
