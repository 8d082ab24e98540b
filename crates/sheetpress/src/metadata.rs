//! Compile records.
//!
//! One record is kept per output. It is replaced, never edited, by every
//! successful publish and lets callers check whether an output is still
//! current without compiling it again.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::atomic::write_atomic;
use crate::error::{Result, SheetError};
use crate::fingerprint::Fingerprint;

/// Current compile record format version.
///
/// Increment this when making breaking changes to the record layout.
pub const CURRENT_RECORD_VERSION: u32 = 1;

/// What was produced for one output, and from what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRecord {
    /// Record format version
    pub version: u32,

    /// Output identity (logical output path, e.g. `css-compiled/main.css`)
    pub file: String,

    /// Digest of the bytes written
    pub fingerprint: Fingerprint,

    /// Milliseconds since the Unix epoch
    pub compiled_at: u64,

    pub production: bool,

    /// Variables injected for this build
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Physical source files read while compiling
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<PathBuf>,
}

impl CompileRecord {
    /// A record stamped with the current time.
    pub fn new(file: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            version: CURRENT_RECORD_VERSION,
            file: file.into(),
            fingerprint,
            compiled_at: now_millis(),
            production: false,
            variables: BTreeMap::new(),
            imports: Vec::new(),
        }
    }
}

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Persistence for compile records.
pub trait MetadataStore: Send + Sync {
    /// Store `record`, replacing any previous record for the same output.
    fn record(&self, record: &CompileRecord) -> Result<()>;

    /// Fetch the record for an output. A missing record is `Ok(None)`.
    fn get(&self, output_id: &str) -> Result<Option<CompileRecord>>;

    /// Fingerprint of the last successful publish, if any.
    fn fingerprint(&self, output_id: &str) -> Result<Option<Fingerprint>> {
        Ok(self.get(output_id)?.map(|r| r.fingerprint))
    }
}

/// Records stored as pretty JSON files, `<dir>/<output id>.meta.json`.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    dir: PathBuf,
}

impl FileMetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the record for `output_id`.
    pub fn record_path(&self, output_id: &str) -> Result<PathBuf> {
        let id = Path::new(output_id);
        let valid = !output_id.is_empty()
            && id.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(SheetError::Metadata(format!(
                "invalid output id `{output_id}`"
            )));
        }
        Ok(self.dir.join(format!("{output_id}.meta.json")))
    }
}

impl MetadataStore for FileMetadataStore {
    fn record(&self, record: &CompileRecord) -> Result<()> {
        let path = self.record_path(&record.file)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| SheetError::Metadata(e.to_string()))?;
        write_atomic(&path, content.as_bytes())?;
        debug!(?path, fingerprint = %record.fingerprint, "Compile record written");
        Ok(())
    }

    fn get(&self, output_id: &str) -> Result<Option<CompileRecord>> {
        let path = self.record_path(output_id)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let record: CompileRecord = serde_json::from_str(&content)
            .map_err(|e| SheetError::Metadata(format!("{}: {}", path.display(), e)))?;

        if record.version > CURRENT_RECORD_VERSION {
            warn!(
                ?path,
                found = record.version,
                supported = CURRENT_RECORD_VERSION,
                "Compile record written by a newer version; ignoring"
            );
            return Ok(None);
        }
        Ok(Some(record))
    }
}

/// Records kept in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: Mutex<HashMap<String, CompileRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn record(&self, record: &CompileRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| SheetError::Metadata("record store poisoned".to_string()))?;
        records.insert(record.file.clone(), record.clone());
        Ok(())
    }

    fn get(&self, output_id: &str) -> Result<Option<CompileRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| SheetError::Metadata("record store poisoned".to_string()))?;
        Ok(records.get(output_id).cloned())
    }
}
