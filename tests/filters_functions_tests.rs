mod support;

use std::collections::BTreeMap;
use support::engine_with;
use twigrs::Value;

fn render(tpl: &str, vars: BTreeMap<twigrs::ImmutableString, Value>) -> String {
    let engine = engine_with(&[("t", tpl)]);
    engine.render_to_string("t", vars).unwrap()
}

#[test]
fn default_filter_substitutes_missing_variable() {
    assert_eq!(render("{{ missing|default('none') }}", BTreeMap::new()), "none");
}

#[test]
fn escape_filter_neutralizes_html() {
    let mut vars = BTreeMap::new();
    vars.insert("x".into(), Value::from("<script>"));
    assert_eq!(render("{{ x|escape }}", vars), "&lt;script&gt;");
}

#[test]
fn join_filter_concatenates_with_separator() {
    let mut vars = BTreeMap::new();
    vars.insert("items".into(), Value::from(vec![Value::from("a"), Value::from("b"), Value::from("c")]));
    assert_eq!(render("{{ items|join(', ') }}", vars), "a, b, c");
}

#[test]
fn filter_chaining_applies_left_to_right() {
    let mut vars = BTreeMap::new();
    vars.insert("name".into(), Value::from("  ada  "));
    assert_eq!(render("{{ name|trim|upper }}", vars), "ADA");
}

#[test]
fn slice_filter_handles_arrays_and_strings() {
    let mut vars = BTreeMap::new();
    vars.insert("s".into(), Value::from("hello world"));
    assert_eq!(render("{{ s|slice(0, 5) }}", vars), "hello");
}

#[test]
fn range_function_is_inclusive() {
    assert_eq!(render("{% for i in range(1, 4) %}{{ i }}{% endfor %}", BTreeMap::new()), "1234");
}

#[test]
fn range_function_supports_negative_step() {
    assert_eq!(render("{% for i in range(3, 1, -1) %}{{ i }}{% endfor %}", BTreeMap::new()), "321");
}

#[test]
fn max_and_min_functions_over_varargs() {
    assert_eq!(render("{{ max(3, 7, 2) }}/{{ min(3, 7, 2) }}", BTreeMap::new()), "7/2");
}

#[test]
fn even_odd_tests_partition_numbers() {
    assert_eq!(render("{{ 4 is even }}/{{ 4 is odd }}", BTreeMap::new()), "true/false");
}

#[test]
fn ternary_and_elvis_operators() {
    let mut vars = BTreeMap::new();
    vars.insert("flag".into(), Value::Bool(true));
    assert_eq!(render("{{ flag ? 'yes' : 'no' }}", vars), "yes");
    assert_eq!(render("{{ missing ?: 'fallback' }}", BTreeMap::new()), "fallback");
}

#[test]
fn arithmetic_division_always_produces_float() {
    assert_eq!(render("{{ 7 / 2 }}", BTreeMap::new()), "3.5");
    assert_eq!(render("{{ 4 / 2 }}", BTreeMap::new()), "2.0");
}

#[test]
fn number_format_filter_groups_thousands() {
    let mut vars = BTreeMap::new();
    vars.insert("n".into(), Value::Float(1234567.891));
    assert_eq!(render("{{ n|number_format(2) }}", vars), "1,234,567.89");
}

#[test]
fn json_encode_filter_serializes_a_mapping() {
    let mut m = BTreeMap::new();
    m.insert("a".into(), Value::Int(1));
    let mut vars = BTreeMap::new();
    vars.insert("m".into(), Value::from(m));
    assert_eq!(render("{{ m|json_encode }}", vars), r#"{"a":1}"#);
}

#[test]
fn matches_operator_uses_regex() {
    let mut vars = BTreeMap::new();
    vars.insert("s".into(), Value::from("abc123"));
    assert_eq!(render("{{ s matches '^[a-z]+[0-9]+$' }}", vars), "true");
}

#[test]
fn in_operator_checks_array_membership() {
    let mut vars = BTreeMap::new();
    vars.insert("items".into(), Value::from(vec![Value::from("a"), Value::from("b")]));
    assert_eq!(render("{{ 'a' in items }}/{{ 'z' in items }}", vars), "true/false");
}
