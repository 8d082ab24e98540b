//! Entry compilation.
//!
//! An entry is compiled by handing the engine a synthetic program that holds
//! the injected variables followed by a single import of the entry:
//!
//! ```text
//! $breakpoint: 48rem;
//! @import "button.scss";
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::engine::{CompileRequest, GrassEngine, OutputFormat, StylesheetEngine};
use crate::error::{Result, SheetError};
use crate::functions::FunctionRegistry;
use crate::locator::{ImportResolver, SOURCE_EXTENSION};

static VARIABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap());

/// The import statement compiled for an entry, e.g. `@import "button.scss"`.
pub fn entry_statement(entry: &str) -> String {
    format!("@import \"{entry}{SOURCE_EXTENSION}\"")
}

/// CSS compiled for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCss {
    pub css: String,
    /// Physical files read while compiling
    pub sources: Vec<PathBuf>,
    /// False when the entry itself could not be found
    pub entry_found: bool,
}

impl CompiledCss {
    /// Placeholder for an entry that does not resolve: a comment naming the
    /// import, never the bare import itself.
    fn unresolved(statement: &str) -> Self {
        Self {
            css: format!("/* {statement} */"),
            sources: Vec::new(),
            entry_found: false,
        }
    }
}

/// Compiles entries with injected variables and native functions.
///
/// The output format is fixed at construction: crunched for production,
/// expanded with line comments otherwise.
pub struct StylesheetCompiler {
    engine: Box<dyn StylesheetEngine>,
    format: OutputFormat,
    variables: BTreeMap<String, String>,
    functions: FunctionRegistry,
}

impl fmt::Debug for StylesheetCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StylesheetCompiler")
            .field("engine", &self.engine.name())
            .field("format", &self.format)
            .field("variables", &self.variables)
            .field("functions", &self.functions)
            .finish()
    }
}

impl StylesheetCompiler {
    /// Compiler backed by grass.
    pub fn new(production: bool) -> Self {
        Self::with_engine(production, Box::new(GrassEngine::new()))
    }

    pub fn with_engine(production: bool, engine: Box<dyn StylesheetEngine>) -> Self {
        Self {
            engine,
            format: OutputFormat::for_production(production),
            variables: BTreeMap::new(),
            functions: FunctionRegistry::new(),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Replace the injected variables. Names may carry a leading `$`.
    pub fn set_variables(&mut self, variables: BTreeMap<String, String>) -> Result<()> {
        let mut checked = BTreeMap::new();
        for (name, value) in variables {
            let bare = name.strip_prefix('$').unwrap_or(&name);
            if !VARIABLE_NAME.is_match(bare) {
                return Err(SheetError::InvalidVariable(name));
            }
            checked.insert(bare.to_string(), value);
        }
        self.variables = checked;
        Ok(())
    }

    pub fn register_function<F>(
        &mut self,
        name: impl Into<String>,
        callback: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&[String]) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        self.functions.register(name, callback)?;
        Ok(self)
    }

    /// Returns false if no function with this name was registered.
    pub fn unregister_function(&mut self, name: &str) -> bool {
        self.functions.unregister(name)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Compile an entry (name without extension).
    ///
    /// An entry that cannot be resolved compiles to a single comment echoing
    /// its import statement.
    pub fn compile(&self, entry: &str, importer: &dyn ImportResolver) -> Result<CompiledCss> {
        if entry.contains(['"', '\\']) {
            return Err(SheetError::InvalidResourcePath(entry.to_string()));
        }
        let statement = entry_statement(entry);

        if importer
            .resolve_import(&format!("{entry}{SOURCE_EXTENSION}"))
            .is_none()
        {
            warn!(entry, "Entry stylesheet not found");
            return Ok(CompiledCss::unresolved(&statement));
        }

        let program = self.program(&statement);
        let request = CompileRequest {
            source: &program,
            formatter: self.format.formatter(),
            importer,
            functions: &self.functions,
        };

        debug!(entry, engine = self.engine.name(), format = ?self.format, "Compiling entry");
        let output = self.engine.compile(&request)?;

        // Compilers that cannot find the entry echo the import back.
        if output.css.starts_with(&statement) {
            warn!(entry, "Compiler echoed the entry import");
            return Ok(CompiledCss::unresolved(&statement));
        }

        Ok(CompiledCss {
            css: output.css,
            sources: output.sources,
            entry_found: true,
        })
    }

    fn program(&self, statement: &str) -> String {
        let mut program = String::new();
        for (name, value) in &self.variables {
            let value = if value.trim().is_empty() { "null" } else { value.as_str() };
            program.push_str(&format!("${name}: {value};\n"));
        }
        program.push_str(statement);
        program.push_str(";\n");
        program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOutput;
    use crate::locator::ResolvedImport;
    use std::sync::{Arc, Mutex};

    /// Resolves every token to a fixed file.
    struct AnyImport;

    impl ImportResolver for AnyImport {
        fn resolve_import(&self, token: &str) -> Option<ResolvedImport> {
            Some(ResolvedImport::new(format!("theme/{token}"), "/dev/null"))
        }
    }

    struct NoImport;

    impl ImportResolver for NoImport {
        fn resolve_import(&self, _token: &str) -> Option<ResolvedImport> {
            None
        }
    }

    /// Engine that returns canned output and remembers the program it saw.
    struct CannedEngine {
        output: String,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl StylesheetEngine for CannedEngine {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn compile(&self, request: &CompileRequest<'_>) -> Result<EngineOutput> {
            self.seen.lock().unwrap().push(request.source.to_string());
            Ok(EngineOutput {
                css: self.output.clone(),
                sources: Vec::new(),
            })
        }
    }

    /// Engine that echoes unresolved imports the way some compilers do.
    struct EchoEngine;

    impl StylesheetEngine for EchoEngine {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn compile(&self, request: &CompileRequest<'_>) -> Result<EngineOutput> {
            let import = request
                .source
                .lines()
                .find(|l| l.starts_with("@import"))
                .unwrap_or_default();
            Ok(EngineOutput {
                css: import.to_string(),
                sources: Vec::new(),
            })
        }
    }

    struct FailingEngine;

    impl StylesheetEngine for FailingEngine {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn compile(&self, _request: &CompileRequest<'_>) -> Result<EngineOutput> {
            Err(SheetError::Compile {
                message: "expected \"}\"".to_string(),
            })
        }
    }

    fn canned(output: &str) -> (StylesheetCompiler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = CannedEngine {
            output: output.to_string(),
            seen: seen.clone(),
        };
        (StylesheetCompiler::with_engine(true, Box::new(engine)), seen)
    }

    #[test]
    fn test_format_chosen_at_construction() {
        assert_eq!(StylesheetCompiler::new(true).format(), OutputFormat::Crunched);
        assert_eq!(StylesheetCompiler::new(false).format(), OutputFormat::Expanded);
    }

    #[test]
    fn test_program_injects_variables_before_import() {
        let (mut compiler, seen) = canned(".a{b:c}");
        let mut vars = BTreeMap::new();
        vars.insert("$gutter".to_string(), "1rem".to_string());
        vars.insert("accent".to_string(), "".to_string());
        compiler.set_variables(vars).unwrap();

        let out = compiler.compile("button", &AnyImport).unwrap();

        assert_eq!(out.css, ".a{b:c}");
        assert!(out.entry_found);
        assert_eq!(
            seen.lock().unwrap()[0],
            "$accent: null;\n$gutter: 1rem;\n@import \"button.scss\";\n"
        );
    }

    #[test]
    fn test_invalid_variable_name_rejected() {
        let (mut compiler, _) = canned("");
        let mut vars = BTreeMap::new();
        vars.insert("bad name".to_string(), "1".to_string());
        assert!(matches!(
            compiler.set_variables(vars),
            Err(SheetError::InvalidVariable(_))
        ));
    }

    #[test]
    fn test_echoed_entry_becomes_comment() {
        let compiler = StylesheetCompiler::with_engine(true, Box::new(EchoEngine));

        let out = compiler.compile("button", &AnyImport).unwrap();

        assert_eq!(out.css, "/* @import \"button.scss\" */");
        assert!(!out.entry_found);
    }

    #[test]
    fn test_unresolved_entry_skips_engine() {
        let (compiler, seen) = canned(".never{}");

        let out = compiler.compile("missing", &NoImport).unwrap();

        assert_eq!(out.css, "/* @import \"missing.scss\" */");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_quote_in_entry_rejected() {
        let (compiler, seen) = canned(".a{}");

        let result = compiler.compile("a\";x", &AnyImport);

        assert!(matches!(result, Err(SheetError::InvalidResourcePath(_))));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_compile_error_propagates() {
        let compiler = StylesheetCompiler::with_engine(true, Box::new(FailingEngine));

        let result = compiler.compile("button", &AnyImport);

        assert!(matches!(
            result,
            Err(SheetError::Compile { message }) if message == "expected \"}\""
        ));
    }

    #[test]
    fn test_register_and_unregister_functions() {
        let mut compiler = StylesheetCompiler::new(true);
        compiler
            .register_function("one", |_: &[String]| Ok("1".to_string()))
            .unwrap()
            .register_function("two", |_: &[String]| Ok("2".to_string()))
            .unwrap();

        assert!(matches!(
            compiler.register_function("one", |_: &[String]| Ok(String::new())),
            Err(SheetError::DuplicateFunction(_))
        ));
        assert!(compiler.unregister_function("one"));
        assert!(!compiler.functions().contains("one"));
        assert!(compiler.functions().contains("two"));
    }
}
