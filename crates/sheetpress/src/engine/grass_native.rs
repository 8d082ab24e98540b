//! SASS compilation using the grass crate.
//!
//! grass asks its [`grass::Fs`] for every candidate path while resolving an
//! `@import`. [`ImportFs`] answers those questions from an
//! [`ImportResolver`], so the files grass sees are the ones the resource roots
//! select. Virtual paths handed to grass are import tokens (`button.scss`,
//! `forms/_input.scss`); reads are served from the resolved physical file.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use grass::{Options, OutputStyle};
use tracing::debug;

use super::line_comments::annotate;
use super::{CompileRequest, EngineOutput, OutputFormat, StylesheetEngine};
use crate::error::{Result, SheetError};
use crate::locator::{ResolvedImport, SOURCE_EXTENSION};

/// grass-backed [`StylesheetEngine`].
#[derive(Debug, Clone, Default)]
pub struct GrassEngine {
    quiet: bool,
}

impl GrassEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress `@warn` and `@debug` output.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

impl StylesheetEngine for GrassEngine {
    fn name(&self) -> &'static str {
        "grass"
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<EngineOutput> {
        let fs = ImportFs::new(request);
        let source = request.functions.expand(request.source)?;

        let style = match request.formatter.format {
            OutputFormat::Expanded => OutputStyle::Expanded,
            OutputFormat::Crunched => OutputStyle::Compressed,
        };

        let result = {
            let options = Options::default().fs(&fs).style(style).quiet(self.quiet);
            grass::from_string(source.into_owned(), &options)
        };

        // A failed read is reported to grass as an empty file; the stashed
        // error takes precedence over whatever grass made of that.
        if let Some(failure) = fs.failure.take() {
            return Err(failure);
        }
        let css = result.map_err(|e| SheetError::Compile {
            message: e.to_string(),
        })?;

        Ok(EngineOutput {
            css,
            sources: fs.into_sources(),
        })
    }
}

/// Virtual filesystem that routes grass lookups through an import resolver.
struct ImportFs<'a> {
    request: &'a CompileRequest<'a>,
    /// Virtual path -> resolved import, for every path grass was told exists
    resolved: RefCell<HashMap<PathBuf, ResolvedImport>>,
    sources: RefCell<Vec<PathBuf>>,
    /// First error hit while loading a file. grass cannot carry an
    /// `io::Error` out of `Fs::read`, so it is kept here instead.
    failure: RefCell<Option<SheetError>>,
}

impl<'a> ImportFs<'a> {
    fn new(request: &'a CompileRequest<'a>) -> Self {
        Self {
            request,
            resolved: RefCell::new(HashMap::new()),
            sources: RefCell::new(Vec::new()),
            failure: RefCell::new(None),
        }
    }

    fn into_sources(self) -> Vec<PathBuf> {
        self.sources.into_inner()
    }

    fn lookup(&self, path: &Path) -> Option<ResolvedImport> {
        if let Some(hit) = self.resolved.borrow().get(path) {
            return Some(hit.clone());
        }

        let virtual_path = path.to_str()?.replace('\\', "/");
        let token = virtual_path.strip_prefix("./").unwrap_or(&virtual_path);
        if !token.ends_with(SOURCE_EXTENSION) || token.ends_with(".import.scss") {
            return None;
        }

        let hit = self
            .request
            .importer
            .resolve_import(token)
            .or_else(|| self.resolve_from_root(token))?;
        debug!(token, logical = hit.logical(), "grass import");
        self.resolved
            .borrow_mut()
            .insert(path.to_path_buf(), hit.clone());
        Some(hit)
    }

    /// grass joins nested imports onto the importing file's directory. When
    /// that misses, retry with the importer's directory stripped so the token
    /// is looked up from the top of the roots.
    fn resolve_from_root(&self, token: &str) -> Option<ResolvedImport> {
        let dirs: BTreeSet<String> = self
            .resolved
            .borrow()
            .keys()
            .filter_map(|p| p.parent()?.to_str().map(|d| d.replace('\\', "/")))
            .filter(|d| !d.is_empty())
            .collect();
        let mut dirs: Vec<String> = dirs.into_iter().collect();
        dirs.sort_by_key(|d| Reverse(d.len()));

        dirs.iter()
            .filter_map(|dir| token.strip_prefix(dir.as_str())?.strip_prefix('/'))
            .find_map(|rest| self.request.importer.resolve_import(rest))
    }

    fn load(&self, import: &ResolvedImport) -> Result<Vec<u8>> {
        let bytes = fs::read(import.path())?;
        let raw = String::from_utf8(bytes).map_err(|_| SheetError::Compile {
            message: format!("{}: source is not valid UTF-8", import.logical()),
        })?;
        let expanded = self.request.functions.expand(&raw)?;

        let text = if self.request.formatter.line_comments {
            annotate(&expanded, import.logical())
        } else {
            expanded.into_owned()
        };

        let mut sources = self.sources.borrow_mut();
        if !sources.iter().any(|p| p == import.path()) {
            sources.push(import.path().to_path_buf());
        }
        Ok(text.into_bytes())
    }
}

impl Debug for ImportFs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportFs")
            .field("importer", &"<ImportResolver>")
            .field("resolved", &self.resolved.borrow().len())
            .finish()
    }
}

impl grass::Fs for ImportFs<'_> {
    fn is_dir(&self, _path: &Path) -> bool {
        false
    }

    fn is_file(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let loaded = match self.lookup(path) {
            Some(import) => self.load(&import),
            None => Err(SheetError::Compile {
                message: format!("Import not found: {}", path.display()),
            }),
        };
        // Never hand grass an `Err`: it cannot report one and panics.
        match loaded {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                let mut failure = self.failure.borrow_mut();
                if failure.is_none() {
                    *failure = Some(e);
                }
                Ok(Vec::new())
            }
        }
    }
}
