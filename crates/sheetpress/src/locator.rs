//! Import lookup across resource roots.
//!
//! The compiler asks for every `@import` it meets. Each token is tried as
//! written and as a partial (`_name.scss`) under every root, roots first:
//!
//! ```text
//! roots = [custom, theme], token = "forms/button"
//!
//! custom/forms/button.scss
//! custom/forms/_button.scss
//! theme/forms/button.scss
//! theme/forms/_button.scss
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::resolver::ResourceResolver;

/// Standard source extension appended to import candidates.
pub const SOURCE_EXTENSION: &str = ".scss";

/// Plain CSS files and remote stylesheets are left to the compiler.
static PASSTHROUGH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.css$|^https?://").unwrap());

/// Last path segment of an import token.
static LAST_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^/]+$").unwrap());

/// An import token resolved to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    logical: String,
    path: PathBuf,
}

impl ResolvedImport {
    pub fn new(logical: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            logical: logical.into(),
            path: path.into(),
        }
    }

    /// Logical location, `root/variant` (e.g. `theme/button.scss`).
    pub fn logical(&self) -> &str {
        &self.logical
    }

    /// Physical file backing the import.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Capability the compiler calls back into for each import it encounters.
pub trait ImportResolver: Send + Sync {
    /// Resolve an import token, or `None` to let the compiler handle it.
    fn resolve_import(&self, token: &str) -> Option<ResolvedImport>;
}

/// Returns true for tokens the locator never handles (`.css` files, URLs).
pub fn is_passthrough(token: &str) -> bool {
    PASSTHROUGH.is_match(token)
}

/// The two naming variants tried for a token: as written, then as a partial.
///
/// Both carry the source extension.
pub fn candidate_names(token: &str) -> [String; 2] {
    let partial = LAST_SEGMENT.replace(token, "_$0").into_owned();
    [with_extension(token), with_extension(&partial)]
}

fn with_extension(name: &str) -> String {
    if name.ends_with(SOURCE_EXTENSION) {
        name.to_string()
    } else {
        format!("{name}{SOURCE_EXTENSION}")
    }
}

/// Resolves imports against an ordered list of resource roots.
///
/// Earlier roots override later ones regardless of which naming variant
/// matched in the later root.
#[derive(Clone)]
pub struct ImportLocator {
    roots: Vec<String>,
    resolver: Arc<dyn ResourceResolver>,
}

impl ImportLocator {
    pub fn new(roots: Vec<String>, resolver: Arc<dyn ResourceResolver>) -> Self {
        let roots = roots
            .into_iter()
            .map(|r| r.trim_end_matches('/').to_string())
            .collect();
        Self { roots, resolver }
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }
}

impl std::fmt::Debug for ImportLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportLocator")
            .field("roots", &self.roots)
            .field("resolver", &"<ResourceResolver>")
            .finish()
    }
}

impl ImportResolver for ImportLocator {
    fn resolve_import(&self, token: &str) -> Option<ResolvedImport> {
        if is_passthrough(token) {
            return None;
        }

        let names = candidate_names(token);
        for root in &self.roots {
            let variants: Vec<String> = names
                .iter()
                .map(|name| {
                    if root.is_empty() {
                        name.clone()
                    } else {
                        format!("{root}/{name}")
                    }
                })
                .collect();

            if let Some((logical, path)) = self.resolver.find_first(&variants) {
                trace!(token, %logical, "Import resolved");
                return Some(ResolvedImport { logical, path });
            }
        }

        trace!(token, "Import not found in any root");
        None
    }
}
