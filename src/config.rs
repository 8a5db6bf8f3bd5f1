//! Settings file and the resolved per-run scan configuration
//!
//! Values are layered: built-in defaults, then the optional TOML settings
//! file, then command-line flags. The result is frozen into a [`ScanConfig`]
//! once at startup and passed by reference to everything that needs it.

use crate::manifest::Timestamp;
use directories::ProjectDirs;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Manifest file name used when none is configured
pub const DEFAULT_MANIFEST: &str = ".sha1s";

/// Files modified more recently than this are not trusted yet.
///
/// Some filesystems report a modification time for a freshly written file
/// that can still change afterwards; such files are left for the next run.
pub const DEFAULT_FRESHNESS_SECS: u64 = 3;

pub const SECS_PER_DAY: u32 = 86_400;

/// Largest ignore threshold whose length in seconds fits in a u32
pub const MAX_IGNORE_DAYS: u32 = u32::MAX / SECS_PER_DAY;

/// Suffix of the file a manifest is written to before being renamed into place
pub const TEMP_SUFFIX: &str = ".tmp";

#[cfg(windows)]
pub const MAX_PATH_LEN: usize = 260;
#[cfg(not(windows))]
pub const MAX_PATH_LEN: usize = 4096;

/// Environment variable overriding the settings file location
pub const CONFIG_ENV: &str = "TREESUMS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("ignore threshold of {days} days is too large (at most {max})", max = MAX_IGNORE_DAYS)]
    IgnoreDaysTooLarge { days: u32 },

    #[error("manifest path is empty")]
    EmptyManifestPath,

    #[error("manifest path {} is too long (temporary file would exceed {max} bytes)", path.display())]
    PathTooLong { path: PathBuf, max: usize },
}

/// Contents of the optional settings file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Manifest location, relative to the scanned directory unless absolute
    pub manifest: PathBuf,
    pub freshness_secs: u64,
    pub remove_missing: bool,
    pub ignore_days: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            freshness_secs: DEFAULT_FRESHNESS_SECS,
            remove_missing: false,
            ignore_days: None,
        }
    }
}

impl Settings {
    /// Load settings from the default location
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load() -> Result<Self, ConfigError> {
        match settings_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Command-line flags win over the file
    ///
    /// Flags can only switch features on; an ignore threshold of zero
    /// switches expiry off.
    pub fn apply_cli_overrides(
        &mut self,
        remove_missing: bool,
        ignore_days: Option<u32>,
        manifest: Option<PathBuf>,
    ) {
        if remove_missing {
            self.remove_missing = true;
        }
        if let Some(days) = ignore_days {
            self.ignore_days = Some(days);
        }
        if let Some(manifest) = manifest {
            self.manifest = manifest;
        }
    }
}

/// Where the settings file lives
///
/// Location: $TREESUMS_CONFIG if set, otherwise
///           %APPDATA%\treesums\config\config.toml (Windows)
///           ~/.config/treesums/config.toml (Linux)
pub fn settings_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    ProjectDirs::from("", "", "treesums").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Immutable configuration of one update run
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory whose files are tracked
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub temp_path: PathBuf,
    /// "Now" for every age computation in this run
    pub reference_time: Timestamp,
    pub freshness: Duration,
    pub remove_missing: bool,
    /// Records older than this many seconds expire
    pub ignore_after_secs: Option<u64>,
}

impl ScanConfig {
    /// Defaults for scanning `root` with the manifest at `manifest_path`
    ///
    /// A relative `manifest_path` is taken relative to `root`.
    pub fn new(root: impl Into<PathBuf>, manifest_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = root.into();
        let manifest_path = manifest_path.as_ref();
        if manifest_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyManifestPath);
        }

        let manifest_path = root.join(manifest_path);
        let temp_path = temp_path_for(&manifest_path);
        if temp_path.as_os_str().len() > MAX_PATH_LEN {
            return Err(ConfigError::PathTooLong {
                path: manifest_path,
                max: MAX_PATH_LEN,
            });
        }

        Ok(Self {
            root,
            manifest_path,
            temp_path,
            reference_time: Timestamp::now(),
            freshness: Duration::from_secs(DEFAULT_FRESHNESS_SECS),
            remove_missing: false,
            ignore_after_secs: None,
        })
    }

    pub fn from_settings(root: impl Into<PathBuf>, settings: &Settings) -> Result<Self, ConfigError> {
        let config = Self::new(root, &settings.manifest)?
            .with_freshness(Duration::from_secs(settings.freshness_secs))
            .with_remove_missing(settings.remove_missing);
        match settings.ignore_days {
            Some(days) => config.with_ignore_days(days),
            None => Ok(config),
        }
    }

    pub fn with_reference_time(mut self, reference_time: Timestamp) -> Self {
        self.reference_time = reference_time;
        self
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_remove_missing(mut self, remove_missing: bool) -> Self {
        self.remove_missing = remove_missing;
        self
    }

    /// Expire records older than `days`; zero disables expiry
    pub fn with_ignore_days(mut self, days: u32) -> Result<Self, ConfigError> {
        if days > MAX_IGNORE_DAYS {
            return Err(ConfigError::IgnoreDaysTooLarge { days });
        }
        self.ignore_after_secs = (days > 0).then(|| u64::from(days * SECS_PER_DAY));
        Ok(self)
    }

    /// Files the walk must never record
    pub fn excluded_paths(&self) -> [&Path; 2] {
        [&self.manifest_path, &self.temp_path]
    }
}

/// `<path>.tmp`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}
