//! # Application Settings
//!
//! Created once per [`Application`](crate::application::Application) and
//! shared with every dispatch context through an `Arc`.

use crate::error::Result;
use serde::Deserialize;

/// Environment variable read by [`Settings::from_env`]
pub const ENV_VAR: &str = "NUCLEUS_ENV";

/// Application-level settings
///
/// Keys are kebab-case when loaded from JSON; every key is optional.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    /// Treat `/Foo` and `/foo` as different paths
    pub case_sensitive_routing: bool,
    /// Treat `/foo` and `/foo/` as different paths
    pub strict_routing: bool,
    /// Send `X-Powered-By: Nucleus`
    pub x_powered_by: bool,
    /// Deployment environment name
    pub env: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            case_sensitive_routing: false,
            strict_routing: false,
            x_powered_by: true,
            env: "development".to_string(),
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the document is malformed.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Default settings with `env` taken from `NUCLEUS_ENV` when set
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(env) = std::env::var(ENV_VAR) {
            if !env.is_empty() {
                settings.env = env;
            }
        }
        settings
    }

    /// Check if running in production
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.case_sensitive_routing);
        assert!(!settings.strict_routing);
        assert!(settings.x_powered_by);
        assert_eq!(settings.env, "development");
        assert!(!settings.is_production());
    }

    #[test]
    fn test_from_json_partial() {
        let settings =
            Settings::from_json(r#"{"strict-routing": true, "env": "production"}"#).unwrap();
        assert!(settings.strict_routing);
        assert!(!settings.case_sensitive_routing);
        assert!(settings.x_powered_by);
        assert!(settings.is_production());
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(Settings::from_json("{not json").is_err());
    }
}
