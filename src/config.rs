use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, ViewerError};
use crate::templates;
use crate::util::expand_tilde;

/// The fixed design canvas every generated piece of content is authored against.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameGeometry {
    pub logical_width: f64,
    pub logical_height: f64,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            logical_width: 1080.0,
            logical_height: 1350.0,
        }
    }
}

/// Chrome margins, floors and breakpoints used by the scale engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub horizontal_margin: f64,
    pub vertical_margin: f64,
    pub min_width: f64,
    pub min_height: f64,
    pub min_scale: f64,
    pub tablet_breakpoint: f64,
    pub fullscreen_settle_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_margin: 100.0,
            vertical_margin: 120.0,
            min_width: 280.0,
            min_height: 320.0,
            min_scale: 0.25,
            tablet_breakpoint: 1024.0,
            fullscreen_settle_ms: 150,
        }
    }
}

impl LayoutConfig {
    pub fn fullscreen_settle(&self) -> Duration {
        Duration::from_millis(self.fullscreen_settle_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerConfig {
    pub frame: FrameGeometry,
    pub layout: LayoutConfig,
    pub share_fallback_text: String,
    pub sandbox_policy: String,
    pub max_content_bytes: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            frame: FrameGeometry::default(),
            layout: LayoutConfig::default(),
            share_fallback_text: templates::SHARE_FALLBACK_TEXT.to_string(),
            sandbox_policy: templates::SANDBOX_POLICY.to_string(),
            max_content_bytes: 5 * 1024 * 1024,
        }
    }
}

impl ViewerConfig {
    /// Rejects geometry that would make the scale computation degenerate.
    pub fn validate(&self) -> Result<()> {
        if !(self.frame.logical_width > 0.0 && self.frame.logical_height > 0.0) {
            return Err(ViewerError::Config(
                "frame dimensions must be positive".into(),
            ));
        }
        let min_scale = self.layout.min_scale;
        if !(min_scale > 0.0 && min_scale <= 1.0) {
            return Err(ViewerError::Config(format!(
                "minScale must be in (0, 1], got {min_scale}"
            )));
        }
        if self.layout.min_width <= 0.0 || self.layout.min_height <= 0.0 {
            return Err(ViewerError::Config("layout floors must be positive".into()));
        }
        // The frame must never be granted same-origin or top-level navigation.
        let forbidden = ["allow-same-origin", "allow-top-navigation"];
        if self
            .sandbox_policy
            .split_whitespace()
            .any(|token| forbidden.iter().any(|f| token.starts_with(f)))
        {
            return Err(ViewerError::Config(format!(
                "sandbox policy may not contain {}",
                forbidden.join(" or ")
            )));
        }
        Ok(())
    }

    /// `Content-Security-Policy` value that applies the same sandbox as the
    /// frame attribute to the served document.
    pub fn content_security_policy(&self) -> String {
        format!("sandbox {}", self.sandbox_policy.trim())
    }

    /// Load and validate a config file. `~` is expanded.
    pub fn load_from(path: &str) -> Result<Self> {
        let path = PathBuf::from(expand_tilde(path));
        let content = std::fs::read_to_string(&path)?;
        let config: ViewerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".isoview").join("config.json"))
}

/// Load `~/.isoview/config.json`, falling back to defaults when it's missing.
/// A file that exists but doesn't parse or validate is an error.
pub fn load_config() -> Result<ViewerConfig> {
    let Some(path) = config_path() else {
        return Ok(ViewerConfig::default());
    };
    if !path.exists() {
        return Ok(ViewerConfig::default());
    }
    ViewerConfig::load_from(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ViewerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame.logical_width, 1080.0);
        assert_eq!(config.frame.logical_height, 1350.0);
        assert_eq!(config.layout.min_scale, 0.25);
    }

    #[test]
    fn test_csp_follows_configured_policy() {
        let mut config = ViewerConfig::default();
        assert_eq!(
            config.content_security_policy(),
            format!("sandbox {}", templates::SANDBOX_POLICY)
        );

        config.sandbox_policy = "allow-scripts".into();
        assert_eq!(config.content_security_policy(), "sandbox allow-scripts");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "layout": { "minScale": 0.5 } }"#).unwrap();

        let config = ViewerConfig::load_from(&path.to_string_lossy()).unwrap();
        assert_eq!(config.layout.min_scale, 0.5);
        assert_eq!(config.layout.horizontal_margin, 100.0);
        assert_eq!(config.share_fallback_text, "Check this out!");
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = ViewerConfig::default();
        config.layout.min_scale = 0.0;
        assert!(matches!(config.validate(), Err(ViewerError::Config(_))));

        let mut config = ViewerConfig::default();
        config.frame.logical_height = -1.0;
        assert!(config.validate().is_err());

        let mut config = ViewerConfig::default();
        config.sandbox_policy = "allow-scripts allow-same-origin".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = ViewerConfig::default();
        config.max_content_bytes = 1024;
        config.save_to(&path).unwrap();

        let loaded = ViewerConfig::load_from(&path.to_string_lossy()).unwrap();
        assert_eq!(loaded, config);
    }
}
