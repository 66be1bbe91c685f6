//! Bridge configuration.
//!
//! Read once at process start from a JSON descriptor, then overridden by
//! environment variables. Never reloaded.

use std::path::Path;

use serde::Deserialize;

use crate::models::error::BridgeError;

/// Environment variable naming the JSON descriptor.
pub const CONFIG_PATH_VAR: &str = "BRIDGE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "bridge.json";
pub const BASE_PATH_VAR: &str = "API_GATEWAY_BASE_PATH";
pub const STRIP_STAGE_PATH_VAR: &str = "STRIP_STAGE_PATH";
pub const APP_VAR: &str = "BRIDGE_APP";

/// MIME types outside `text/*` that are sent as text rather than base64.
pub const DEFAULT_TEXT_MIME_TYPES: [&str; 5] = [
    "application/json",
    "application/javascript",
    "application/xml",
    "application/vnd.api+json",
    "image/svg+xml",
];

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Application path, `module.attribute` optionally prefixed by `subdir/`.
    pub app: Option<String>,
    /// Extra MIME types treated as text, on top of [`DEFAULT_TEXT_MIME_TYPES`].
    #[serde(alias = "text_mime_types")]
    pub text_mime_types: Vec<String>,
    /// Custom-domain base path, without slashes.
    #[serde(alias = "base_path")]
    pub base_path: Option<String>,
    /// Suppress the `/<stage>` script name on the gateway's own domain.
    #[serde(alias = "strip_stage_path")]
    pub strip_stage_path: bool,
    /// Answer commands with bare output text instead of `[status, output]`.
    #[serde(alias = "legacy_command_output")]
    pub legacy_command_output: bool,
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "t" | "1"
    )
}

impl BridgeConfig {
    /// Loads the descriptor named by `BRIDGE_CONFIG` (default `bridge.json`)
    /// and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if the descriptor exists but cannot be
    /// read or parsed.
    pub fn load() -> Result<Self, BridgeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with an injectable variable lookup.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BridgeError> {
        let path = lookup(CONFIG_PATH_VAR).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let config = Self::from_file(Path::new(&path))?;
        Ok(config.with_overrides(lookup))
    }

    /// Reads a descriptor; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] on I/O or parse failure.
    pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_json_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(BridgeError::Config(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if `content` is not a valid descriptor.
    pub fn from_json_str(content: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(content)
            .map_err(|e| BridgeError::Config(format!("invalid configuration descriptor: {e}")))
    }

    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base_path) = lookup(BASE_PATH_VAR) {
            self.base_path = Some(base_path);
        }
        if let Some(strip) = lookup(STRIP_STAGE_PATH_VAR) {
            self.strip_stage_path = is_truthy(&strip);
        }
        if let Some(app) = lookup(APP_VAR) {
            self.app = Some(app);
        }
        self
    }

    /// Base path with surrounding slashes removed; `None` when unset or empty.
    #[must_use]
    pub fn base_path(&self) -> Option<&str> {
        self.base_path
            .as_deref()
            .map(|path| path.trim_matches('/'))
            .filter(|path| !path.is_empty())
    }

    /// Whether a bare MIME type (no parameters, lowercase) is sent as text.
    #[must_use]
    pub fn is_text_mime_type(&self, mime_type: &str) -> bool {
        mime_type.starts_with("text/")
            || DEFAULT_TEXT_MIME_TYPES.contains(&mime_type)
            || self
                .text_mime_types
                .iter()
                .any(|extra| extra.eq_ignore_ascii_case(mime_type))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_descriptor_fields() {
        let config = BridgeConfig::from_json_str(
            r#"{"app": "subdir/app.app", "text_mime_types": ["application/custom+json"], "stripStagePath": true}"#,
        )
        .unwrap();

        assert_eq!(config.app.as_deref(), Some("subdir/app.app"));
        assert_eq!(config.text_mime_types, vec!["application/custom+json"]);
        assert!(config.strip_stage_path);
        assert!(!config.legacy_command_output);
    }

    #[test]
    fn test_invalid_descriptor() {
        let err = BridgeConfig::from_json_str("{not json").unwrap_err();
        assert_eq!(err.error_type(), "ConfigError");
    }

    #[test]
    fn test_missing_descriptor_yields_defaults() {
        let config = BridgeConfig::from_lookup(lookup(&[(
            CONFIG_PATH_VAR,
            "/nonexistent/apigw-bridge/bridge.json",
        )]))
        .unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = BridgeConfig::default().with_overrides(lookup(&[
            (BASE_PATH_VAR, "/prod/"),
            (STRIP_STAGE_PATH_VAR, " Yes "),
            (APP_VAR, "api.app"),
        ]));

        assert_eq!(config.base_path(), Some("prod"));
        assert!(config.strip_stage_path);
        assert_eq!(config.app.as_deref(), Some("api.app"));

        let config = config.with_overrides(lookup(&[(STRIP_STAGE_PATH_VAR, "off")]));
        assert!(!config.strip_stage_path);
    }

    #[test]
    fn test_empty_base_path_is_unset() {
        let config = BridgeConfig {
            base_path: Some("/".to_string()),
            ..BridgeConfig::default()
        };
        assert_eq!(config.base_path(), None);
    }

    #[test]
    fn test_text_mime_types() {
        let config = BridgeConfig {
            text_mime_types: vec!["application/custom+json".to_string()],
            ..BridgeConfig::default()
        };

        assert!(config.is_text_mime_type("text/html"));
        assert!(config.is_text_mime_type("application/json"));
        assert!(config.is_text_mime_type("image/svg+xml"));
        assert!(config.is_text_mime_type("application/custom+json"));
        assert!(!config.is_text_mime_type("image/jpeg"));
        assert!(!BridgeConfig::default().is_text_mime_type("application/custom+json"));
    }
}
