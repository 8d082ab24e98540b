//! Native functions callable from stylesheet source.
//!
//! grass has no hook for host functions, so calls are expanded before the
//! source reaches the compiler: `asset-url(logo.png)` is replaced with whatever
//! the registered callback returns for the argument list `["logo.png"]`.
//! Arguments are passed as raw, trimmed source text; they are not evaluated.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use regex::Regex;

use crate::error::{Result, SheetError};

/// Callback invoked for each call of a registered function.
pub type NativeFunction =
    Arc<dyn Fn(&[String]) -> std::result::Result<String, String> + Send + Sync>;

/// Named native functions available to stylesheets.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, NativeFunction>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. Names must be unique.
    pub fn register<F>(&mut self, name: impl Into<String>, callback: F) -> Result<()>
    where
        F: Fn(&[String]) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(SheetError::DuplicateFunction(name));
        }
        self.functions.insert(name, Arc::new(callback));
        Ok(())
    }

    /// Remove a function. Returns false if it was not registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Replace every call of a registered function with its result.
    ///
    /// Calls with unbalanced parentheses are left untouched for the compiler
    /// to report.
    pub fn expand<'a>(&self, source: &'a str) -> Result<Cow<'a, str>> {
        if self.functions.is_empty() {
            return Ok(Cow::Borrowed(source));
        }

        let pattern = self.call_pattern()?;
        let literals = literal_regions(source);
        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;
        let mut changed = false;

        while let Some(caps) = pattern.captures_at(source, cursor) {
            let (Some(name), Some(whole)) = (caps.get(1), caps.get(0)) else {
                break;
            };
            if let Some(literal) = literals.iter().find(|r| r.contains(&name.start())) {
                out.push_str(&source[cursor..literal.end]);
                cursor = literal.end;
                continue;
            }

            let args_start = whole.end();
            let is_definition = source[..name.start()].trim_end().ends_with("@function");
            let Some(args_end) = closing_paren(source, args_start).filter(|_| !is_definition) else {
                out.push_str(&source[cursor..args_start]);
                cursor = args_start;
                continue;
            };

            let args = split_args(&source[args_start..args_end]);
            let callback = &self.functions[name.as_str()];
            let value = callback(&args).map_err(|message| SheetError::Function {
                name: name.as_str().to_string(),
                message,
            })?;

            out.push_str(&source[cursor..name.start()]);
            out.push_str(&value);
            cursor = args_end + 1;
            changed = true;
        }

        if !changed {
            return Ok(Cow::Borrowed(source));
        }
        out.push_str(&source[cursor..]);
        Ok(Cow::Owned(out))
    }

    /// `name(` not preceded by an identifier character, `$` or `.`.
    fn call_pattern(&self) -> Result<Regex> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        let alternation = names
            .iter()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?:^|[^\w$\-.])({alternation})\(")).map_err(|e| {
            SheetError::Compile {
                message: format!("function call pattern: {e}"),
            }
        })
    }
}

/// Byte ranges of quoted strings and comments, where calls are not expanded.
///
/// `//` right after `:` or `(` is part of a URL, not a comment.
fn literal_regions(source: &str) -> Vec<Range<usize>> {
    let bytes = source.as_bytes();
    let mut regions = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 2,
                        b if b == quote => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                i = i.min(bytes.len());
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = source[i + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |end| i + 2 + end + 2);
            }
            b'/' if bytes.get(i + 1) == Some(&b'/')
                && !matches!(i.checked_sub(1).map(|p| bytes[p]), Some(b':' | b'(')) =>
            {
                i = source[i..].find('\n').map_or(bytes.len(), |end| i + end);
            }
            _ => {
                i += 1;
                continue;
            }
        }
        regions.push(start..i);
    }
    regions
}

/// Byte index of the `)` closing a call whose arguments start at `start`.
fn closing_paren(source: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in source[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' if depth == 0 => return Some(start + offset),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Split an argument list at top-level commas.
fn split_args(args: &str) -> Vec<String> {
    if args.trim().is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for ch in args.chars() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            current.push(ch);
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current.trim().to_string());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry
            .register("asset-url", |args: &[String]| {
                Ok(format!("url(\"/assets/{}\")", args.join("/")))
            })
            .unwrap();
        registry
            .register("fail", |_: &[String]| Err("boom".to_string()))
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry();
        let result = registry.register("asset-url", |_: &[String]| Ok(String::new()));
        assert!(matches!(result, Err(SheetError::DuplicateFunction(name)) if name == "asset-url"));
    }

    #[test]
    fn test_unregister() {
        let mut registry = registry();
        assert!(registry.unregister("asset-url"));
        assert!(!registry.unregister("asset-url"));
        assert!(!registry.contains("asset-url"));
    }

    #[test]
    fn test_expand_call() {
        let source = ".logo { background: asset-url(img, logo.png); }";
        let expanded = registry().expand(source).unwrap();
        assert_eq!(
            expanded,
            ".logo { background: url(\"/assets/img/logo.png\"); }"
        );
    }

    #[test]
    fn test_expand_leaves_other_identifiers() {
        let source =
            ".a { b: my-asset-url(x); c: $asset-url; }\n@function asset-url($x) { @return $x; }";
        let expanded = registry().expand(source).unwrap();
        assert!(matches!(expanded, Cow::Borrowed(_)));
    }

    #[test]
    fn test_expand_nested_parens_and_quotes() {
        let source = "a { b: asset-url(\"a,b\", calc(1 + (2))); }";
        let expanded = registry().expand(source).unwrap();
        assert_eq!(
            expanded,
            "a { b: url(\"/assets/\"a,b\"/calc(1 + (2))\"); }"
        );
    }

    #[test]
    fn test_unbalanced_call_left_alone() {
        let source = "a { b: asset-url(x; }";
        let expanded = registry().expand(source).unwrap();
        assert_eq!(expanded, source);
    }

    #[test]
    fn test_callback_error_surfaces() {
        let result = registry().expand("a { b: fail(); }");
        assert!(matches!(
            result,
            Err(SheetError::Function { name, message }) if name == "fail" && message == "boom"
        ));
    }

    #[test]
    fn test_calls_inside_strings_untouched() {
        let source = ".a { content: \"asset-url(x)\"; b: 'fail()'; }";
        let expanded = registry().expand(source).unwrap();
        assert_eq!(expanded, source);
    }

    #[test]
    fn test_calls_inside_comments_untouched() {
        let source = "/* fail() */\n.a { b: c; } // asset-url(x)\n.d { e: asset-url(y); }";
        let expanded = registry().expand(source).unwrap();
        assert_eq!(
            expanded,
            "/* fail() */\n.a { b: c; } // asset-url(x)\n.d { e: url(\"/assets/y\"); }"
        );
    }

    #[test]
    fn test_url_slashes_are_not_comments() {
        let source = ".a { b: url(http://cdn.test/x.png) asset-url(y); }";
        let expanded = registry().expand(source).unwrap();
        assert_eq!(
            expanded,
            ".a { b: url(http://cdn.test/x.png) url(\"/assets/y\"); }"
        );
    }

    #[test]
    fn test_empty_registry_borrows() {
        let expanded = FunctionRegistry::new().expand("a { b: c(); }").unwrap();
        assert!(matches!(expanded, Cow::Borrowed(_)));
    }
}
