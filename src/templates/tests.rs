//! Tests for the template engine

use super::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a template directory with a base and a child page
fn create_test_templates(dir: &Path) {
    fs::create_dir_all(dir.join("partials")).unwrap();

    fs::write(
        dir.join("base.html"),
        r#"<html data-theme="{{ theme }}"><head><title>{{ site_name }}</title></head><body>{% block content %}{% endblock %}</body></html>"#,
    )
    .unwrap();
    fs::write(
        dir.join("page.html"),
        r#"{% extends "base.html" %}{% block content %}<h1>{{ title }}</h1>{% include "partials/footer.html" %}{% endblock %}"#,
    )
    .unwrap();
    fs::write(dir.join("partials/footer.html"), "<footer>{{ year }}</footer>").unwrap();
}

#[test]
fn test_loads_templates_from_directory() {
    let temp_dir = TempDir::new().unwrap();
    create_test_templates(temp_dir.path());

    let engine = TemplateEngine::new(temp_dir.path()).unwrap();

    assert_eq!(engine.source(), &TemplateSource::Directory(temp_dir.path().to_path_buf()));
    assert!(engine.has_template("base.html"));
    assert!(engine.has_template("partials/footer.html"));
}

#[test]
fn test_missing_directory_uses_embedded_templates() {
    let temp_dir = TempDir::new().unwrap();
    let engine = TemplateEngine::new(&temp_dir.path().join("missing")).unwrap();

    assert_eq!(engine.source(), &TemplateSource::Embedded);
    for name in ["base.html", "blog_list.html", "post.html", "error.html"] {
        assert!(engine.has_template(name), "missing embedded template {}", name);
    }
}

#[test]
fn test_empty_directory_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    assert!(TemplateEngine::new(temp_dir.path()).is_err());
}

#[test]
fn test_render_with_inheritance_and_escaping() {
    let temp_dir = TempDir::new().unwrap();
    create_test_templates(temp_dir.path());
    let engine = TemplateEngine::new(temp_dir.path()).unwrap();

    let mut context = TeraContext::new();
    context.insert("title", "<script>x</script>");
    context.insert("theme", "halloween");
    context.insert("site_name", "Site");
    context.insert("year", &2024);

    let html = engine.render("page.html", &context).unwrap();
    assert!(html.contains(r#"data-theme="halloween""#));
    assert!(html.contains("&lt;script&gt;"));
    assert!(html.contains("<footer>2024</footer>"));
}

#[test]
fn test_render_with_standard_vars() {
    let temp_dir = TempDir::new().unwrap();
    create_test_templates(temp_dir.path());
    let engine = TemplateEngine::new(temp_dir.path()).unwrap();

    let mut context = TeraContext::new();
    context.insert("title", "Hello");
    let vars = StandardTemplateVars::new("/blog", Theme::Halloween);

    let html = engine.render_with_standard_vars("page.html", &context, &vars).unwrap();
    assert!(html.contains(&format!("<title>{}</title>", SITE_NAME)));
    assert!(html.contains(r#"data-theme="halloween""#));
}

#[test]
fn test_render_unknown_template_fails() {
    let engine = TemplateEngine::embedded().unwrap();
    let err = engine.render("nope.html", &TeraContext::new()).unwrap_err();
    assert!(err.to_string().contains("nope.html"));
}

#[test]
fn test_render_with_fallback_uses_error_template() {
    let temp_dir = TempDir::new().unwrap();
    create_test_templates(temp_dir.path());
    fs::write(temp_dir.path().join("error.html"), "<p>oops {{ status }}</p>").unwrap();
    let engine = TemplateEngine::new(temp_dir.path()).unwrap();

    let html = engine.render_with_fallback("missing.html", &TeraContext::new());
    assert_eq!(html, "<p>oops 500</p>");
}

#[test]
fn test_render_page_keeps_standard_vars_in_error_fallback() {
    let engine = TemplateEngine::embedded().unwrap();
    let vars = StandardTemplateVars::new("/blog", Theme::Halloween);

    let html = engine.render_page("missing.html", &TeraContext::new(), &vars);
    assert!(html.contains(r#"data-theme="halloween""#));
    assert!(html.contains("Something went wrong"));
}

#[test]
fn test_render_with_fallback_plain_page_as_last_resort() {
    let temp_dir = TempDir::new().unwrap();
    create_test_templates(temp_dir.path());
    let engine = TemplateEngine::new(temp_dir.path()).unwrap();

    let html = engine.render_with_fallback("missing.html", &TeraContext::new());
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("Something went wrong"));
}

#[test]
fn test_reload_picks_up_changes() {
    let temp_dir = TempDir::new().unwrap();
    create_test_templates(temp_dir.path());
    let mut engine = TemplateEngine::new(temp_dir.path()).unwrap();
    assert!(!engine.has_template("new.html"));

    fs::write(temp_dir.path().join("new.html"), "new").unwrap();
    engine.reload_templates().unwrap();
    assert!(engine.has_template("new.html"));
}

#[test]
fn test_simple_error_page_escapes() {
    let html = simple_error_page("<b>", "a & b");
    assert!(html.contains("&lt;b&gt;"));
    assert!(html.contains("a &amp; b"));
}

#[test]
fn test_nav_links_mark_active() {
    let vars = StandardTemplateVars::new("/blog/hello", Theme::default());
    assert!(vars.nav_links[0].active);

    let vars = StandardTemplateVars::new("/auth/account", Theme::default());
    assert!(!vars.nav_links[0].active);
}

#[test]
fn test_embedded_pages_render_with_minimal_context() {
    let engine = TemplateEngine::embedded().unwrap();
    let mut context = TeraContext::new();
    context.insert("status", &404);
    context.insert("error_title", "Not found");
    context.insert("error_message", "Nothing here");
    let vars = StandardTemplateVars::new("/missing", Theme::default());

    let html = engine.render_with_standard_vars("error.html", &context, &vars).unwrap();
    assert!(html.contains("Nothing here"));
    assert!(html.contains(r#"data-theme="tageslicht""#));
}
