use std::path::{Path, PathBuf};

use crate::patch::Settings;

/// Environment variable overriding the working directory exports are placed under.
pub const WORKING_DIR_ENV: &str = "CLASSMEND_DIR";

/// Directory name of the default export location.
pub const EXPORT_DIR_NAME: &str = ".classmend.out";

/// Setting enabling the debug export.
pub const EXPORT_SETTING: &str = "debug.export";

/// Setting overriding the export directory, relative to the working directory.
pub const EXPORT_DIR_SETTING: &str = "debug.export-dir";

/// The working directory: [`WORKING_DIR_ENV`] if set, the process's current directory otherwise.
#[must_use]
pub fn working_dir() -> PathBuf {
    std::env::var_os(WORKING_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Pipeline options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    /// Write every rewritten class to [`TransformConfig::export_dir`]
    pub export: bool,
    /// Root of the debug export
    pub export_dir: PathBuf,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig {
            export: false,
            export_dir: working_dir().join(EXPORT_DIR_NAME),
        }
    }
}

impl TransformConfig {
    /// Reads [`EXPORT_SETTING`] and [`EXPORT_DIR_SETTING`].
    ///
    /// Missing keys keep their defaults; a relative directory is resolved against
    /// [`working_dir`].
    #[must_use]
    pub fn from_settings(settings: &dyn Settings) -> Self {
        let mut config = TransformConfig::default();
        if let Some(export) = settings.get_bool(EXPORT_SETTING) {
            config.export = export;
        }
        if let Some(dir) = settings
            .get_string(EXPORT_DIR_SETTING)
            .filter(|dir| !dir.trim().is_empty())
        {
            config.export_dir = working_dir().join(dir.trim());
        }
        config
    }

    /// Exports to `dir`.
    #[must_use]
    pub fn with_export(dir: impl AsRef<Path>) -> Self {
        TransformConfig {
            export: true,
            export_dir: dir.as_ref().to_path_buf(),
        }
    }
}
