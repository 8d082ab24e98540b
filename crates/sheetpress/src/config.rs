//! Publishing configuration.
//!
//! Loaded from YAML:
//!
//! ```yaml
//! production: false
//! target: css-compiled
//! roots: [custom, theme]
//! entries: [main, print]
//! variables:
//!   gutter: 1rem
//!   columns: 12
//! mounts:
//!   custom: [overrides/scss]
//!   theme: [themes/child/scss, themes/base/scss]
//!   css-compiled: [public/css]
//! ```
//!
//! Relative mount directories and `metadata-dir` are resolved against the
//! directory holding the config file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, SheetError};
use crate::resolver::LayeredResolver;

/// Default logical directory compiled CSS is written to.
pub const DEFAULT_TARGET: &str = "css-compiled";

/// Default metadata directory, relative to the config file.
pub const DEFAULT_METADATA_DIR: &str = ".sheetpress/meta";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PublishConfig {
    /// Crunched output without the development banner
    pub production: bool,

    /// Logical output directory
    pub target: String,

    /// Appended to output names: `main_<suffix>.css`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    /// Import roots, highest priority first
    pub roots: Vec<String>,

    /// Entries compiled by `compile_all`
    pub entries: Vec<String>,

    /// Variables injected into every compilation
    #[serde(deserialize_with = "scalar_map")]
    pub variables: BTreeMap<String, String>,

    /// Mount name -> directories, highest priority first
    pub mounts: BTreeMap<String, Vec<PathBuf>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_dir: Option<PathBuf>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            production: false,
            target: DEFAULT_TARGET.to_string(),
            suffix: None,
            roots: vec!["scss".to_string()],
            entries: Vec::new(),
            variables: BTreeMap::new(),
            mounts: BTreeMap::new(),
            metadata_dir: None,
        }
    }
}

impl PublishConfig {
    /// Parse YAML. Paths are kept as written.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| SheetError::Config(e.to_string()))
    }

    /// Load a config file and resolve its relative paths against the file's
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)
            .map_err(|e| SheetError::Config(format!("{}: {}", path.display(), e)))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.rebase(base))
    }

    /// Resolve relative directories against `base`.
    pub fn rebase(mut self, base: &Path) -> Self {
        for dirs in self.mounts.values_mut() {
            for dir in dirs.iter_mut() {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        let metadata_dir = self
            .metadata_dir
            .take()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_DIR));
        self.metadata_dir = Some(if metadata_dir.is_relative() {
            base.join(metadata_dir)
        } else {
            metadata_dir
        });
        self
    }

    /// Resolver over the configured mounts.
    pub fn resolver(&self) -> LayeredResolver {
        let mut resolver = LayeredResolver::new();
        for (name, dirs) in &self.mounts {
            resolver.add_mount(name.clone(), dirs.clone());
        }
        resolver
    }

    /// Where compile records are stored.
    pub fn metadata_dir(&self) -> PathBuf {
        self.metadata_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_DIR))
    }
}

/// Accept any YAML scalar as a variable value.
fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                _ => {
                    return Err(D::Error::custom(format!(
                        "variable `{name}` must be a scalar"
                    )));
                }
            };
            Ok((name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResourceResolver;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PublishConfig::from_yaml_str("").unwrap();
        assert_eq!(config, PublishConfig::default());
        assert_eq!(config.target, "css-compiled");
        assert_eq!(config.roots, vec!["scss"]);
        assert!(!config.production);
    }

    #[test]
    fn test_parse_full() {
        let yaml = r#"
production: true
target: compiled
suffix: outline-12
roots: [custom, theme]
entries: [main]
variables:
  gutter: 1rem
  columns: 12
  dark: false
  empty: ~
mounts:
  theme: [themes/base]
metadata-dir: /var/cache/meta
"#;
        let config = PublishConfig::from_yaml_str(yaml).unwrap();

        assert!(config.production);
        assert_eq!(config.target, "compiled");
        assert_eq!(config.suffix.as_deref(), Some("outline-12"));
        assert_eq!(config.roots, vec!["custom", "theme"]);
        assert_eq!(config.variables["gutter"], "1rem");
        assert_eq!(config.variables["columns"], "12");
        assert_eq!(config.variables["dark"], "false");
        assert_eq!(config.variables["empty"], "");
        assert_eq!(config.metadata_dir(), PathBuf::from("/var/cache/meta"));
    }

    #[test]
    fn test_non_scalar_variable_rejected() {
        let yaml = "variables:\n  colors: [red, blue]\n";
        assert!(matches!(
            PublishConfig::from_yaml_str(yaml),
            Err(SheetError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(PublishConfig::from_yaml_str("production: maybe").is_err());
    }

    #[test]
    fn test_load_rebases_relative_paths() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("themes/base")).unwrap();
        fs::write(temp.path().join("themes/base/a.scss"), "").unwrap();
        let config_path = temp.path().join("stylesheets.yml");
        fs::write(&config_path, "mounts:\n  theme: [themes/base]\n").unwrap();

        let config = PublishConfig::load(&config_path).unwrap();

        assert_eq!(config.mounts["theme"], vec![temp.path().join("themes/base")]);
        assert_eq!(config.metadata_dir(), temp.path().join(".sheetpress/meta"));
        assert_eq!(
            config.resolver().find_resource("theme/a.scss"),
            Some(temp.path().join("themes/base/a.scss"))
        );
    }
}
