//! Persisted user settings (`Output/preferences/winwing.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SETTINGS_FILE: &str = "winwing.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Show the SPD/HDG/ALT/V/S labels on the PAP3 LCD regardless of profile.
    pub show_labels: bool,
}

/// `<X-Plane root>/Output/preferences/winwing.json`
pub fn settings_path(xplane_root: &Path) -> PathBuf {
    xplane_root.join("Output").join("preferences").join(SETTINGS_FILE)
}

impl Settings {
    /// Load settings; a missing or malformed file yields the defaults.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(s) => s,
            Err(e) => {
                if path.exists() {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
                } else {
                    debug!(path = %path.display(), "no settings file, using defaults");
                }
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(&settings_path(dir.path()));
        assert_eq!(s, Settings::default());
        assert!(!s.show_labels);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = settings_path(dir.path());
        Settings { show_labels: true }.save(&path).unwrap();
        assert!(path.ends_with("Output/preferences/winwing.json"));
        assert!(Settings::load(&path).show_labels);
    }

    #[test]
    fn malformed_or_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());

        fs::write(&path, r#"{"unrelated": 1}"#).unwrap();
        assert_eq!(Settings::load(&path), Settings::default(), "unknown keys ignored");
    }
}
