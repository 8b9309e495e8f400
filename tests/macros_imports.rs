mod support;

use std::collections::BTreeMap;
use support::engine_with;
use twigrs::Value;

#[test]
fn imported_macro_is_callable_through_namespace() {
    let engine = engine_with(&[
        ("forms.html.twig", "{% macro label(text) %}<label>{{ text }}</label>{% endmacro %}"),
        ("page.html.twig", "{% import 'forms.html.twig' as forms %}{{ forms.label('Name') }}"),
    ]);
    let out = engine.render_to_string("page.html.twig", BTreeMap::new()).unwrap();
    assert_eq!(out, "<label>Name</label>");
}

#[test]
fn from_import_aliases_a_single_macro() {
    let engine = engine_with(&[
        ("forms.html.twig", "{% macro input(name) %}<{{ name }}>{% endmacro %}{% macro hidden(name) %}[{{ name }}]{% endmacro %}"),
        ("page.html.twig", "{% from 'forms.html.twig' import input as field %}{{ field('x') }}"),
    ]);
    let out = engine.render_to_string("page.html.twig", BTreeMap::new()).unwrap();
    assert_eq!(out, "<x>");
}

#[test]
fn macro_cannot_see_caller_locals() {
    let engine = engine_with(&[
        ("forms.html.twig", "{% macro show() %}{{ secret|default('hidden') }}{% endmacro %}"),
        ("page.html.twig", "{% set secret = 'leak' %}{% from 'forms.html.twig' import show %}{{ show() }}"),
    ]);
    let out = engine.render_to_string("page.html.twig", BTreeMap::new()).unwrap();
    assert_eq!(out, "hidden");
}

#[test]
fn self_variable_exposes_only_own_scope_macros() {
    let engine = engine_with(&[(
        "page.html.twig",
        "{% macro greet() %}hi{% endmacro %}{{ _self.greet is defined }}",
    )]);
    let out = engine.render_to_string("page.html.twig", BTreeMap::new()).unwrap();
    assert_eq!(out, "true");
}

#[test]
fn recursive_macro_call_terminates() {
    let engine = engine_with(&[(
        "page.html.twig",
        "{% macro countdown(n) %}{{ n }}{% if n > 0 %}{{ countdown(n - 1) }}{% endif %}{% endmacro %}{{ countdown(3) }}",
    )]);
    let out = engine.render_to_string("page.html.twig", BTreeMap::new()).unwrap();
    assert_eq!(out, "3210");
}

#[test]
fn loop_variable_reports_first_last_and_length() {
    let engine = engine_with(&[(
        "page.html.twig",
        "{% for v in items %}{{ loop.index }}/{{ loop.length }}{% if loop.first %}(first){% endif %}{% if loop.last %}(last){% endif %} {% endfor %}",
    )]);
    let mut vars = BTreeMap::new();
    vars.insert("items".into(), Value::from(vec![Value::from("a"), Value::from("b")]));
    let out = engine.render_to_string("page.html.twig", vars).unwrap();
    assert_eq!(out, "1/2(first) 2/2(last) ");
}
