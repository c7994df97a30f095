//! Configuration lookup for patch enablement and injected settings.

use std::{collections::BTreeMap, str::FromStr};

use crate::{Error, Result};

/// Namespace every patch setting lives under.
pub const SETTING_PREFIX: &str = "patch";

/// Key/value lookup by dotted path.
///
/// Backs per-action enablement flags, string settings bound into actions, and the pipeline's
/// export switch. Implementations must be safe to share between loading threads.
pub trait Settings: Send + Sync {
    /// Reads a boolean, `None` if the key is absent or not a boolean.
    fn get_bool(&self, path: &str) -> Option<bool>;

    /// Reads a string, `None` if the key is absent.
    fn get_string(&self, path: &str) -> Option<String>;
}

/// Builds the setting path of a definition member: `patch.<category>.<member>`.
///
/// Blank parts are left out. Returns `None` when both parts are blank, which leaves the member
/// without a setting.
///
/// ```rust
/// use classmend::patch::setting_path;
///
/// assert_eq!(setting_path("log4j", "jndi").as_deref(), Some("patch.log4j.jndi"));
/// assert_eq!(setting_path("", "jndi").as_deref(), Some("patch.jndi"));
/// assert_eq!(setting_path(" ", ""), None);
/// ```
#[must_use]
pub fn setting_path(category: &str, member: &str) -> Option<String> {
    let parts: Vec<&str> = [category, member]
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("{}.{}", SETTING_PREFIX, parts.join(".")))
}

/// In-memory [`Settings`], parseable from TOML.
///
/// Nested tables flatten to dotted paths, so `[patch.nexus]` followed by `anonymize = true`
/// sets `patch.nexus.anonymize`. Strings are kept as written; other scalars are stored in their
/// TOML form.
///
/// ```rust
/// use classmend::patch::{MapSettings, Settings};
///
/// let settings: MapSettings = r#"
///     ## patches
///     patch.log4j.jndi = true
///
///     [patch.nexus]
///     anonymize-name = "anonymous"
/// "#.parse()?;
/// assert_eq!(settings.get_bool("patch.log4j.jndi"), Some(true));
/// assert_eq!(settings.get_string("patch.nexus.anonymize-name").as_deref(), Some("anonymous"));
/// # Ok::<(), classmend::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapSettings {
    values: BTreeMap<String, String>,
}

impl MapSettings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        MapSettings::default()
    }

    /// Sets `path` to `value`, replacing any previous value.
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(path.into(), value.into());
        self
    }

    /// Builder form of [`MapSettings::set`].
    #[must_use]
    pub fn with(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(path, value);
        self
    }

    /// Flattens a parsed TOML table into dotted paths.
    #[must_use]
    pub fn from_table(table: &toml::Table) -> Self {
        let mut settings = MapSettings::new();
        settings.flatten("", table);
        settings
    }

    fn flatten(&mut self, prefix: &str, table: &toml::Table) {
        for (key, value) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match value {
                toml::Value::Table(nested) => self.flatten(&path, nested),
                toml::Value::String(text) => {
                    self.set(path, text.as_str());
                }
                other => {
                    self.set(path, other.to_string());
                }
            }
        }
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Settings for MapSettings {
    fn get_bool(&self, path: &str) -> Option<bool> {
        let value = self.values.get(path)?;
        if value.eq_ignore_ascii_case("true") {
            Some(true)
        } else if value.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    fn get_string(&self, path: &str) -> Option<String> {
        self.values.get(path).cloned()
    }
}

impl FromStr for MapSettings {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(text)?;
        Ok(MapSettings::from_table(&table))
    }
}
