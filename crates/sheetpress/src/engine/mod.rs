//! The compile primitive behind [`crate::StylesheetCompiler`].
//!
//! An engine turns a SCSS program into CSS. Every import it meets is
//! resolved through the request's [`ImportResolver`], never by looking at the
//! filesystem directly.

pub mod grass_native;
pub mod line_comments;

use std::path::PathBuf;

use crate::error::Result;
use crate::functions::FunctionRegistry;
use crate::locator::ImportResolver;

pub use grass_native::GrassEngine;

/// Output formatting modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Readable output with source-location comments (development)
    Expanded,
    /// Minified output (production)
    Crunched,
}

impl OutputFormat {
    /// Production builds are crunched, everything else is expanded.
    pub fn for_production(production: bool) -> Self {
        if production {
            OutputFormat::Crunched
        } else {
            OutputFormat::Expanded
        }
    }

    /// Formatting strategy for this mode.
    pub fn formatter(self) -> Formatter {
        match self {
            OutputFormat::Expanded => Formatter {
                format: self,
                line_comments: true,
            },
            OutputFormat::Crunched => Formatter {
                format: self,
                line_comments: false,
            },
        }
    }
}

/// How an engine should shape its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formatter {
    pub format: OutputFormat,
    /// Annotate rules with the file and line they came from
    pub line_comments: bool,
}

/// One compilation handed to an engine.
pub struct CompileRequest<'a> {
    /// Complete SCSS program
    pub source: &'a str,
    pub formatter: Formatter,
    pub importer: &'a dyn ImportResolver,
    pub functions: &'a FunctionRegistry,
}

/// CSS produced by an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub css: String,
    /// Physical files read while compiling, in first-read order
    pub sources: Vec<PathBuf>,
}

/// A SCSS compiler.
pub trait StylesheetEngine: Send + Sync {
    /// Short name for logs (e.g. `"grass"`)
    fn name(&self) -> &'static str;

    /// Compile a program. Syntax and semantic errors are returned as
    /// [`crate::SheetError::Compile`] with the compiler's message.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<EngineOutput>;
}
