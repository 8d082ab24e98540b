//! Compile-and-publish pipeline.
//!
//! Publishing an entry:
//! 1. Resolve the writable output path (`<target>/<entry>.css`)
//! 2. Compile the entry
//! 3. Prepend the development banner unless in production
//! 4. Try the output lock; if another writer holds it, stop without writing
//! 5. Replace the output atomically
//! 6. Record the fingerprint of the written bytes
//!
//! The lock is only taken around steps 5 and 6. Concurrent publishers may
//! compile the same entry redundantly, but only one writes at a time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::compiler::StylesheetCompiler;
use crate::config::{DEFAULT_TARGET, PublishConfig};
use crate::engine::OutputFormat;
use crate::error::{Result, SheetError};
use crate::fingerprint::Fingerprint;
use crate::locator::ImportLocator;
use crate::lock::{LockAttempt, OutputLock};
use crate::metadata::{
    CURRENT_RECORD_VERSION, CompileRecord, FileMetadataStore, MetadataStore, now_millis,
};
use crate::resolver::ResourceResolver;

/// Notice prepended to development builds.
pub const DEV_BANNER: &str = "/* SHEETPRESS DEVELOPMENT MODE ENABLED.

   WARNING: This file is automatically generated. Any modifications to this file will be lost!

   For more information on modifying CSS, please read:

   https://sass-lang.com/documentation/at-rules/import/
   https://sass-lang.com/documentation/variables/
 */";

/// Prefix compiled CSS with [`DEV_BANNER`].
pub fn with_banner(css: &str) -> String {
    format!("{DEV_BANNER}\n\n{css}")
}

/// What a publish did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The output was replaced and its record stored
    Written {
        output: PathBuf,
        fingerprint: Fingerprint,
    },
    /// Another writer holds the output lock; nothing was written.
    /// Serve whatever output currently exists.
    LockHeld { output: PathBuf },
}

impl PublishOutcome {
    pub fn written(&self) -> bool {
        matches!(self, PublishOutcome::Written { .. })
    }

    pub fn output(&self) -> &Path {
        match self {
            PublishOutcome::Written { output, .. } | PublishOutcome::LockHeld { output } => output,
        }
    }
}

/// Compiles entries and publishes them under a single-writer lock.
pub struct Publisher {
    resolver: Arc<dyn ResourceResolver>,
    locator: ImportLocator,
    compiler: StylesheetCompiler,
    metadata: Box<dyn MetadataStore>,
    production: bool,
    target: String,
    suffix: Option<String>,
    entries: Vec<String>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("locator", &self.locator)
            .field("compiler", &self.compiler)
            .field("production", &self.production)
            .field("target", &self.target)
            .field("suffix", &self.suffix)
            .field("entries", &self.entries)
            .finish()
    }
}

impl Publisher {
    /// Publisher with a grass-backed compiler.
    pub fn new(
        resolver: Arc<dyn ResourceResolver>,
        roots: Vec<String>,
        metadata: Box<dyn MetadataStore>,
        production: bool,
    ) -> Self {
        Self::with_compiler(resolver, roots, metadata, StylesheetCompiler::new(production))
    }

    /// Publisher around an existing compiler; production mode follows the
    /// compiler's output format.
    pub fn with_compiler(
        resolver: Arc<dyn ResourceResolver>,
        roots: Vec<String>,
        metadata: Box<dyn MetadataStore>,
        compiler: StylesheetCompiler,
    ) -> Self {
        let locator = ImportLocator::new(roots, resolver.clone());
        Self {
            resolver,
            locator,
            production: compiler.format() == OutputFormat::Crunched,
            compiler,
            metadata,
            target: DEFAULT_TARGET.to_string(),
            suffix: None,
            entries: Vec::new(),
        }
    }

    /// Build everything from a loaded config.
    pub fn from_config(config: &PublishConfig) -> Result<Self> {
        let resolver: Arc<dyn ResourceResolver> = Arc::new(config.resolver());
        let metadata = Box::new(FileMetadataStore::new(config.metadata_dir()));

        let mut compiler = StylesheetCompiler::new(config.production);
        compiler.set_variables(config.variables.clone())?;

        let mut publisher = Self::with_compiler(resolver, config.roots.clone(), metadata, compiler)
            .with_target(config.target.clone());
        publisher.suffix = config.suffix.clone();
        publisher.entries = config.entries.clone();
        Ok(publisher)
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_entries(mut self, entries: Vec<String>) -> Self {
        self.entries = entries;
        self
    }

    pub fn production(&self) -> bool {
        self.production
    }

    pub fn locator(&self) -> &ImportLocator {
        &self.locator
    }

    pub fn compiler(&self) -> &StylesheetCompiler {
        &self.compiler
    }

    /// For registering functions and variables.
    pub fn compiler_mut(&mut self) -> &mut StylesheetCompiler {
        &mut self.compiler
    }

    pub fn metadata(&self) -> &dyn MetadataStore {
        self.metadata.as_ref()
    }

    /// Logical output path for an entry, e.g. `css-compiled/main.css`.
    pub fn output_id(&self, entry: &str) -> Result<String> {
        let invalid = entry.is_empty()
            || entry.contains(['"', '\\'])
            || entry
                .split('/')
                .any(|segment| segment.is_empty() || segment == "." || segment == "..");
        if invalid {
            return Err(SheetError::InvalidResourcePath(entry.to_string()));
        }

        let name = match &self.suffix {
            Some(suffix) if !suffix.is_empty() => format!("{entry}_{suffix}"),
            _ => entry.to_string(),
        };
        Ok(if self.target.is_empty() {
            format!("{name}.css")
        } else {
            format!("{}/{name}.css", self.target)
        })
    }

    /// Compile an entry into the exact text that would be published.
    pub fn build_css(&self, entry: &str) -> Result<String> {
        Ok(self.build(entry)?.0)
    }

    fn build(&self, entry: &str) -> Result<(String, Vec<PathBuf>)> {
        let compiled = self.compiler.compile(entry, &self.locator)?;
        let css = if self.production {
            compiled.css
        } else {
            with_banner(&compiled.css)
        };
        Ok((css, compiled.sources))
    }

    /// Compile and publish one entry.
    ///
    /// Returns [`PublishOutcome::LockHeld`] (not an error) when another writer
    /// is publishing the same output. Compile errors leave the output and its
    /// record untouched.
    pub fn publish(&self, entry: &str) -> Result<PublishOutcome> {
        let output_id = self.output_id(entry)?;
        let output = self.resolver.writable_location(&output_id)?;

        let (css, sources) = self.build(entry)?;

        let lock = match OutputLock::try_acquire(&output)? {
            LockAttempt::Acquired(lock) => lock,
            LockAttempt::HeldByOther => {
                warn!(
                    entry,
                    output = %output.display(),
                    "Output is being written by another process"
                );
                return Ok(PublishOutcome::LockHeld { output });
            }
        };

        write_atomic(&output, css.as_bytes())?;

        let fingerprint = Fingerprint::of(css.as_bytes());
        let record = CompileRecord {
            version: CURRENT_RECORD_VERSION,
            file: output_id,
            fingerprint: fingerprint.clone(),
            compiled_at: now_millis(),
            production: self.production,
            variables: self.compiler.variables().clone(),
            imports: sources,
        };
        self.metadata.record(&record)?;
        drop(lock);

        info!(entry, output = %output.display(), %fingerprint, "Stylesheet published");
        Ok(PublishOutcome::Written {
            output,
            fingerprint,
        })
    }

    /// Publish every configured entry, in order. The first error aborts.
    pub fn compile_all(&self) -> Result<Vec<(String, PublishOutcome)>> {
        self.entries
            .iter()
            .map(|entry| Ok((entry.clone(), self.publish(entry)?)))
            .collect()
    }

    /// Whether an entry's published output is missing or out of date.
    ///
    /// Stale when there is no usable record, the output is missing or differs
    /// from the recorded fingerprint, the variables or production mode
    /// changed, or any recorded source was removed or modified since.
    pub fn needs_compile(&self, entry: &str) -> Result<bool> {
        let output_id = self.output_id(entry)?;

        let record = match self.metadata.get(&output_id) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(true),
            Err(e) => {
                warn!(entry, error = %e, "Unreadable compile record");
                return Ok(true);
            }
        };

        let Some(output) = self.resolver.find_resource(&output_id) else {
            return Ok(true);
        };
        if Fingerprint::of(&fs::read(&output)?) != record.fingerprint {
            debug!(entry, "Output changed since last publish");
            return Ok(true);
        }

        if record.production != self.production || &record.variables != self.compiler.variables() {
            return Ok(true);
        }

        for import in &record.imports {
            let modified = fs::metadata(import)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64);
            match modified {
                Some(at) if at <= record.compiled_at => {}
                _ => {
                    debug!(entry, import = %import.display(), "Source changed since last publish");
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}
