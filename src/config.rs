use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub approvals: ApprovalSection,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "procure/engine.db".to_string()
}

/// Connection details for the external extraction oracle. When `enabled`
/// is false the extractor runs on the deterministic path only.
#[derive(Debug, Deserialize)]
pub struct OracleSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Prefix of the document text sent to the oracle, in characters.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_prompt_chars() -> usize {
    2000
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApprovalSection {
    /// Every role listed here must record a positive decision before a
    /// request becomes approved.
    #[serde(default = "default_required_roles")]
    pub required_roles: Vec<String>,
}

fn default_required_roles() -> Vec<String> {
    vec![
        "approver_level_1".to_string(),
        "approver_level_2".to_string(),
    ]
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self {
            required_roles: default_required_roles(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg: EngineConfig = toml::from_str("").unwrap();
        assert!(!cfg.oracle.enabled);
        assert_eq!(cfg.oracle.max_prompt_chars, 2000);
        assert_eq!(
            cfg.approvals.required_roles,
            vec!["approver_level_1", "approver_level_2"]
        );
        assert_eq!(cfg.db_path, "procure/engine.db");
    }

    #[test]
    fn sections_override_defaults() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            db_path = "tmp/test.db"

            [oracle]
            enabled = true
            model = "gpt-4o-mini"
            timeout_secs = 5

            [approvals]
            required_roles = ["finance"]
            "#,
        )
        .unwrap();
        assert!(cfg.oracle.enabled);
        assert_eq!(cfg.oracle.model, "gpt-4o-mini");
        assert_eq!(cfg.oracle.timeout_secs, 5);
        assert_eq!(cfg.approvals.required_roles, vec!["finance"]);
        assert_eq!(cfg.db_path, "tmp/test.db");
    }
}
