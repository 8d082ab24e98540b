//! Cached SCSS compilation for themed sites.
//!
//! This crate provides:
//! - Layered resource resolution (`mount/rest` logical paths over ordered directories)
//! - Import lookup across prioritized roots, with `_partial` fallback
//! - Compilation through grass, with injected variables and native functions
//! - Single-writer publishing: output lock, atomic replace, fingerprinted records
//! - Staleness checks against the last compile record

pub mod atomic;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod functions;
pub mod locator;
pub mod lock;
pub mod metadata;
pub mod publish;
pub mod resolver;

pub use compiler::{CompiledCss, StylesheetCompiler};
pub use config::PublishConfig;
pub use engine::{GrassEngine, OutputFormat, StylesheetEngine};
pub use error::{Result, SheetError};
pub use fingerprint::Fingerprint;
pub use functions::FunctionRegistry;
pub use locator::{ImportLocator, ImportResolver, ResolvedImport};
pub use lock::{LockAttempt, OutputLock};
pub use metadata::{CompileRecord, FileMetadataStore, MemoryMetadataStore, MetadataStore};
pub use publish::{DEV_BANNER, PublishOutcome, Publisher};
pub use resolver::{LayeredResolver, ResourceResolver};
