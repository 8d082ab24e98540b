//! Integration tests for import resolution and compilation over the
//! custom/theme fixture tree.
//!
//! - `custom` overrides `theme`, but has no `button.scss`
//! - `print.scss` imports a `colors` partial that `custom` overrides

use sheetpress::{
    DEV_BANNER, ImportLocator, ImportResolver, LayeredResolver, ResourceResolver,
    StylesheetCompiler,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test-fixtures")
}

fn resolver() -> Arc<dyn ResourceResolver> {
    Arc::new(
        LayeredResolver::new()
            .with_mount("custom", vec![fixtures().join("custom")])
            .with_mount("theme", vec![fixtures().join("theme")]),
    )
}

fn locator() -> ImportLocator {
    ImportLocator::new(vec!["custom".to_string(), "theme".to_string()], resolver())
}

#[test]
fn test_button_resolves_to_theme() {
    let hit = locator().resolve_import("button").unwrap();

    assert_eq!(hit.logical(), "theme/button.scss");
    assert_eq!(hit.path(), fixtures().join("theme/button.scss"));
}

#[test]
fn test_custom_partial_overrides_theme() {
    let hit = locator().resolve_import("colors").unwrap();

    assert_eq!(hit.logical(), "custom/_colors.scss");
}

#[test]
fn test_unknown_import_is_none() {
    assert!(locator().resolve_import("missing").is_none());
}

#[test]
fn test_production_is_minified_without_comments() {
    let compiled = StylesheetCompiler::new(true)
        .compile("button", &locator())
        .unwrap();

    assert!(compiled.entry_found);
    assert_eq!(compiled.css.trim(), ".button{width:10px}");
    assert!(!compiled.css.contains("/*"));
    assert_eq!(compiled.sources, vec![fixtures().join("theme/button.scss")]);
}

#[test]
fn test_development_is_expanded_with_line_comments() {
    let compiled = StylesheetCompiler::new(false)
        .compile("button", &locator())
        .unwrap();

    assert!(compiled.css.contains("/* line 1, theme/button.scss */"));
    assert!(compiled.css.contains(".button {\n  width: 10px;\n}"));
    // The banner is added when publishing, not compiling.
    assert!(!compiled.css.contains(DEV_BANNER));
}

#[test]
fn test_nested_import_uses_override() {
    let compiled = StylesheetCompiler::new(true)
        .compile("print", &locator())
        .unwrap();

    assert_eq!(compiled.css.trim(), ".print{color:#333}");
    assert_eq!(
        compiled.sources,
        vec![
            fixtures().join("theme/print.scss"),
            fixtures().join("custom/_colors.scss"),
        ]
    );
}

#[test]
fn test_injected_variable_wins_over_default() {
    let mut compiler = StylesheetCompiler::new(true);
    compiler
        .set_variables(BTreeMap::from([("ink".to_string(), "red".to_string())]))
        .unwrap();

    let compiled = compiler.compile("print", &locator()).unwrap();

    assert_eq!(compiled.css.trim(), ".print{color:red}");
}

#[test]
fn test_native_function_in_source() {
    let mut compiler = StylesheetCompiler::new(true);
    compiler
        .register_function("ink-for", |args: &[String]| match args {
            [theme] if theme == "dark" => Ok("tan".to_string()),
            [_] => Ok("black".to_string()),
            _ => Err("expected one argument".to_string()),
        })
        .unwrap();
    compiler
        .set_variables(BTreeMap::from([(
            "ink".to_string(),
            "ink-for(dark)".to_string(),
        )]))
        .unwrap();

    let compiled = compiler.compile("print", &locator()).unwrap();

    assert_eq!(compiled.css.trim(), ".print{color:tan}");
}

#[test]
fn test_missing_entry_echoes_import() {
    let compiled = StylesheetCompiler::new(true)
        .compile("missing", &locator())
        .unwrap();

    assert!(!compiled.entry_found);
    assert_eq!(compiled.css, "/* @import \"missing.scss\" */");
}
