//! Layered resource resolution.
//!
//! A logical path such as `theme/scss/button.scss` is split into a mount
//! name (`theme`) and a remainder (`scss/button.scss`). Each mount maps to an
//! ordered list of physical directories; the first directory holding the file
//! wins, so earlier directories override later ones.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SheetError};

/// Maps logical resource paths to physical files.
///
/// Implementations must be safe to share across threads: the same resolver is
/// used by every concurrent publish.
pub trait ResourceResolver: Send + Sync {
    /// Find an existing file for a logical path.
    fn find_resource(&self, logical: &str) -> Option<PathBuf>;

    /// Physical location an output for `logical` should be written to.
    ///
    /// Missing parent directories are created.
    fn writable_location(&self, logical: &str) -> Result<PathBuf>;

    /// Try several naming variants in order and return the first that exists.
    fn find_first(&self, variants: &[String]) -> Option<(String, PathBuf)> {
        variants.iter().find_map(|logical| {
            self.find_resource(logical)
                .map(|path| (logical.clone(), path))
        })
    }
}

/// A named mount point backed by ordered override directories.
#[derive(Debug, Clone)]
struct Mount {
    name: String,
    dirs: Vec<PathBuf>,
}

/// Resolver over named mounts, each with an override chain of directories.
#[derive(Debug, Clone, Default)]
pub struct LayeredResolver {
    mounts: Vec<Mount>,
}

impl LayeredResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a mount. `dirs` are in priority order.
    pub fn add_mount(&mut self, name: impl Into<String>, dirs: Vec<PathBuf>) -> &mut Self {
        let name = name.into().trim_matches('/').to_string();
        self.mounts.retain(|m| m.name != name);
        self.mounts.push(Mount { name, dirs });
        self
    }

    /// Builder-style variant of [`add_mount`](Self::add_mount).
    pub fn with_mount(mut self, name: impl Into<String>, dirs: Vec<PathBuf>) -> Self {
        self.add_mount(name, dirs);
        self
    }

    /// Directories registered for a mount, in priority order.
    pub fn mount_dirs(&self, name: &str) -> Option<&[PathBuf]> {
        self.mounts
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.dirs.as_slice())
    }

    /// Split a logical path into its mount and the validated remainder.
    ///
    /// The longest mount name that matches at a segment boundary wins.
    fn split<'a>(&'a self, logical: &'a str) -> Result<(&'a Mount, &'a Path)> {
        let rest_of = |mount: &Mount| -> Option<&'a str> {
            let rest = logical.strip_prefix(mount.name.as_str())?;
            if mount.name.is_empty() {
                return Some(rest);
            }
            match rest.strip_prefix('/') {
                Some(rest) => Some(rest),
                None if rest.is_empty() => Some(rest),
                None => None,
            }
        };

        let (mount, rest) = self
            .mounts
            .iter()
            .filter_map(|m| rest_of(m).map(|rest| (m, rest)))
            .max_by_key(|(m, _)| m.name.len())
            .ok_or_else(|| SheetError::UnknownMount(logical.to_string()))?;

        let rest = Path::new(rest);
        let escapes = rest
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SheetError::InvalidResourcePath(logical.to_string()));
        }
        Ok((mount, rest))
    }
}

impl ResourceResolver for LayeredResolver {
    fn find_resource(&self, logical: &str) -> Option<PathBuf> {
        let (mount, rest) = self.split(logical).ok()?;
        if rest.as_os_str().is_empty() {
            return None;
        }
        let found = mount
            .dirs
            .iter()
            .map(|dir| dir.join(rest))
            .find(|candidate| candidate.is_file());
        debug!(logical, found = ?found, "Resource lookup");
        found
    }

    fn writable_location(&self, logical: &str) -> Result<PathBuf> {
        let (mount, rest) = self.split(logical)?;
        if rest.as_os_str().is_empty() {
            return Err(SheetError::InvalidResourcePath(logical.to_string()));
        }
        let dir = mount
            .dirs
            .first()
            .ok_or_else(|| SheetError::UnknownMount(logical.to_string()))?;
        let path = dir.join(rest);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}
