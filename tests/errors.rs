mod support;

use std::collections::BTreeMap;
use support::engine_with;
use twigrs::{EngineOptions, TemplateError};

#[test]
fn unknown_filter_surfaces_in_message() {
    let engine = engine_with(&[("t", "{{ 1|nope }}")]);
    let err = engine.render_to_string("t", BTreeMap::new()).unwrap_err();
    assert!(matches!(err, TemplateError::Render(_)));
    assert!(err.to_string().contains("unknown filter 'nope'"));
}

#[test]
fn unknown_function_surfaces_in_message() {
    let engine = engine_with(&[("t", "{{ nope() }}")]);
    let err = engine.render_to_string("t", BTreeMap::new()).unwrap_err();
    assert!(err.to_string().contains("unknown function 'nope'"));
}

#[test]
fn unknown_test_surfaces_in_message() {
    let engine = engine_with(&[("t", "{{ 1 is nope }}")]);
    let err = engine.render_to_string("t", BTreeMap::new()).unwrap_err();
    assert!(err.to_string().contains("unknown test 'nope'"));
}

#[test]
fn division_by_zero_is_reported() {
    let engine = engine_with(&[("t", "{{ 1 / 0 }}")]);
    let err = engine.render_to_string("t", BTreeMap::new()).unwrap_err();
    assert!(err.to_string().contains("division or modulo by zero"));
}

#[test]
fn missing_template_is_distinguished_from_other_errors() {
    let engine = engine_with(&[]);
    let err = engine.render_to_string("nowhere.html.twig", BTreeMap::new()).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn mismatched_endblock_name_is_a_parse_error() {
    let engine = engine_with(&[("t", "{% block a %}x{% endblock b %}")]);
    let err = engine.render_to_string("t", BTreeMap::new()).unwrap_err();
    assert!(matches!(err, TemplateError::Parse(_)));
}

#[test]
fn missing_endfor_is_a_parse_error() {
    let engine = engine_with(&[("t", "{% for x in items %}{{ x }}")]);
    let err = engine.render_to_string("t", BTreeMap::new()).unwrap_err();
    assert!(matches!(err, TemplateError::Parse(_)));
}

#[test]
fn self_extending_template_hits_the_depth_limit() {
    use std::sync::Arc;
    let options = EngineOptions { max_template_depth: 4, ..EngineOptions::default() };
    let engine = twigrs::Engine::new(options);
    engine.add_loader(Arc::new(support::MapLoader::new(&[(
        "t",
        "{% extends 't' %}",
    )])));
    let err = engine.render_to_string("t", BTreeMap::new()).unwrap_err();
    assert!(err.to_string().contains("exceeded"));
}

#[test]
fn parent_call_outside_overriding_block_errors() {
    let engine = engine_with(&[("t", "{% block x %}{{ parent() }}{% endblock %}")]);
    let err = engine.render_to_string("t", BTreeMap::new()).unwrap_err();
    assert!(matches!(err, TemplateError::Render(_)));
}

#[test]
fn attribute_access_on_scalar_always_errors() {
    let engine = engine_with(&[("t", "{{ n.missing }}")]);
    let mut vars = BTreeMap::new();
    vars.insert("n".into(), twigrs::Value::Int(5));
    let err = engine.render_to_string("t", vars).unwrap_err();
    assert!(err.to_string().contains("cannot access attribute"));
}

#[test]
fn attribute_access_on_map_missing_key_resolves_to_nil() {
    let engine = engine_with(&[("t", "[{{ n.missing }}]")]);
    let mut vars = BTreeMap::new();
    let mut m = BTreeMap::new();
    m.insert("present".into(), twigrs::Value::Int(1));
    vars.insert("n".into(), twigrs::Value::from(m));
    let out = engine.render_to_string("t", vars).unwrap();
    assert_eq!(out, "[]");
}
