//! Backup configuration: the YAML file layout and its validated form.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::ConfigError;
use crate::node::{GroupLevels, IgnoreSet};

/// One mebibyte.
pub const MB: u64 = 1024 * 1024;

/// Blobs at least this big are listed individually in the run summary.
pub const DEFAULT_DETAIL_THRESHOLD: u64 = MB;

/// How the build area is pushed to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorKind {
    /// Shell out to `rsync`.
    #[default]
    Rsync,
    /// Copy in-process.
    Local,
}

impl fmt::Display for MirrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsync => write!(f, "rsync"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// The configuration file as written by the user, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    /// Directory to back up.
    pub rootdir: Option<PathBuf>,
    /// Scratch directory where blobs are built.
    pub builddir: Option<PathBuf>,
    /// Destination the build area is mirrored to.
    pub syncdir: Option<PathBuf>,
    /// Paths relative to `rootdir` to leave out.
    #[serde(default)]
    pub ignore_list: Option<Vec<PathBuf>>,
    /// Top-level directories of `rootdir` to group, with their depth.
    #[serde(default)]
    pub group_levels: Option<BTreeMap<String, Value>>,
    /// Size from which changed blobs are listed in the summary.
    #[serde(default)]
    pub detail_threshold: Option<u64>,
    /// Mirror implementation.
    #[serde(default)]
    pub mirror: MirrorKind,
}

impl RawConfig {
    /// Parse a YAML document.
    pub fn from_yaml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Validated backup configuration with every path resolved.
#[derive(Debug, Clone, Builder, Serialize)]
#[builder(
    setter(into),
    build_fn(private, name = "build_unchecked", validate = "Self::check_paths")
)]
pub struct BackupConfig {
    /// Absolute source root.
    pub root: PathBuf,

    /// Absolute build (scratch) directory.
    pub build_dir: PathBuf,

    /// Absolute mirror destination.
    pub sync_dir: PathBuf,

    /// Absolute paths excluded from every archive.
    #[builder(default)]
    pub ignore: IgnoreSet,

    /// Grouping budgets keyed by root-relative top-level directory.
    #[builder(default)]
    pub group_levels: GroupLevels,

    /// Size threshold for the detail listing.
    #[builder(default = "DEFAULT_DETAIL_THRESHOLD")]
    pub detail_threshold: u64,

    /// How to push the build area to the destination.
    #[builder(default)]
    pub mirror: MirrorKind,
}

impl BackupConfigBuilder {
    /// Build the config and run the same checks as a loaded file.
    pub fn build(&self) -> Result<BackupConfig, ConfigError> {
        let config = self
            .build_unchecked()
            .map_err(|e| ConfigError::Invalid {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    fn check_paths(&self) -> Result<(), String> {
        for (name, value) in [
            ("root", &self.root),
            ("build_dir", &self.build_dir),
            ("sync_dir", &self.sync_dir),
        ] {
            match value {
                Some(path) if path.is_absolute() => {}
                Some(path) => return Err(format!("{name} must be absolute (got {})", path.display())),
                None => return Err(format!("{name} is required")),
            }
        }
        Ok(())
    }
}

impl BackupConfig {
    /// Create a new config builder.
    pub fn builder() -> BackupConfigBuilder {
        BackupConfigBuilder::default()
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
        let raw = RawConfig::from_yaml(path, &text)?;
        Self::from_raw(raw)
    }

    /// Resolve and validate a parsed configuration file.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let root = required_absolute(raw.rootdir, "rootdir")?;
        tracing::debug!("Root dir: {}", root.display());
        let build_dir = required_absolute(raw.builddir, "builddir")?;
        tracing::debug!("Build dir: {}", build_dir.display());
        let sync_dir = required_absolute(raw.syncdir, "syncdir")?;
        tracing::debug!("Sync dir: {}", sync_dir.display());

        let mut ignore = IgnoreSet::new();
        for relative in raw.ignore_list.unwrap_or_default() {
            if relative.has_root() {
                return Err(ConfigError::IgnoreNotRelative { path: relative });
            }
            ignore.insert(root.join(relative));
        }

        let mut group_levels = GroupLevels::new();
        for (key, value) in raw.group_levels.unwrap_or_default() {
            let relative = PathBuf::from(&key);
            let dir = top_level_dir(&relative)?;
            let budget = parse_budget(&relative, &value)?;
            group_levels.insert(dir, budget);
        }

        let config = Self {
            root,
            build_dir,
            sync_dir,
            ignore,
            group_levels,
            detail_threshold: raw.detail_threshold.unwrap_or(DEFAULT_DETAIL_THRESHOLD),
            mirror: raw.mirror,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every rule against the filesystem.
    ///
    /// Runs before anything is created or removed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, path) in [
            ("rootdir", &self.root),
            ("builddir", &self.build_dir),
            ("syncdir", &self.sync_dir),
        ] {
            if !path.is_absolute() {
                return Err(ConfigError::NotAbsolute {
                    name,
                    path: path.clone(),
                });
            }
        }
        if !self.root.is_dir() {
            return Err(ConfigError::RootNotADirectory {
                path: self.root.clone(),
            });
        }

        for node in self.ignore.iter() {
            if !node.is_absolute() {
                return Err(ConfigError::Invalid {
                    message: format!("ignored path must be resolved ({})", node.display()),
                });
            }
            if fs::symlink_metadata(node).is_err() {
                return Err(ConfigError::IgnoreMissing {
                    path: node.to_path_buf(),
                });
            }
        }

        for (relative, _) in self.group_levels.iter() {
            top_level_dir(relative)?;
            let dir = self.root.join(relative);
            if !dir.exists() {
                return Err(ConfigError::GroupMissing {
                    path: relative.to_path_buf(),
                });
            }
            if !dir.is_dir() {
                return Err(ConfigError::GroupNotADirectory {
                    path: relative.to_path_buf(),
                });
            }
        }

        // Neither scratch nor destination may end up inside their own blobs.
        for (dir, name) in [(&self.build_dir, "build"), (&self.sync_dir, "sync")] {
            if dir.starts_with(&self.root) && !self.ignore.covers(dir) {
                return Err(ConfigError::UnsafeNesting {
                    name,
                    path: dir.clone(),
                });
            }
        }

        tracing::info!("Config validated ok");
        Ok(())
    }
}

fn required_absolute(value: Option<PathBuf>, key: &'static str) -> Result<PathBuf, ConfigError> {
    let path = value.ok_or(ConfigError::Missing { key })?;
    if !path.is_absolute() {
        return Err(ConfigError::NotAbsolute { name: key, path });
    }
    Ok(path)
}

/// Normalize a group level key to its single path segment.
fn top_level_dir(relative: &Path) -> Result<PathBuf, ConfigError> {
    if relative.has_root() {
        return Err(ConfigError::GroupNotRelative {
            path: relative.to_path_buf(),
        });
    }
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(segment) => segments.push(segment),
            _ => {
                return Err(ConfigError::GroupNotTopLevel {
                    path: relative.to_path_buf(),
                });
            }
        }
    }
    match segments.as_slice() {
        [single] => Ok(PathBuf::from(single)),
        _ => Err(ConfigError::GroupNotTopLevel {
            path: relative.to_path_buf(),
        }),
    }
}

/// Accept integers, or strings holding one.
fn parse_budget(relative: &Path, value: &Value) -> Result<u32, ConfigError> {
    let not_a_number = || ConfigError::GroupNotANumber {
        path: relative.to_path_buf(),
        value: describe(value),
    };
    let number = match value {
        Value::Number(n) => n.as_i64().ok_or_else(not_a_number)?,
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| not_a_number())?,
        _ => return Err(not_a_number()),
    };
    if number <= 0 {
        return Err(ConfigError::GroupNotPositive {
            path: relative.to_path_buf(),
            value: number,
        });
    }
    u32::try_from(number).map_err(|_| not_a_number())
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}
