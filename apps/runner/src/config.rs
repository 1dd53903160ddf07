use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use client_core::{state_refresh::DEPLOYMENTS_PATH, transport};

pub const DEFAULT_CONFIG_FILE: &str = "runner.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub generation_path: String,
    pub execution_path: String,
    pub state_path: String,
    pub log_filter: String,
    pub target_name: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3355".into(),
            generation_path: transport::GENERATION_PATH.into(),
            execution_path: transport::EXECUTION_PATH.into(),
            state_path: DEPLOYMENTS_PATH.into(),
            log_filter: "info".into(),
            target_name: None,
        }
    }
}

/// Defaults, then `runner.toml` (or the explicit `path`), then environment.
/// A missing default file is fine; a missing explicit file is an error.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(file) {
        Ok(raw) => {
            let file_cfg = toml::from_str::<HashMap<String, String>>(&raw)
                .with_context(|| format!("failed to parse config file '{}'", file.display()))?;
            apply_file(&mut settings, &file_cfg);
        }
        Err(err) if path.is_some() => {
            return Err(err).with_context(|| format!("failed to read config file '{}'", file.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("server_url") {
        settings.server_url = v.clone();
    }
    if let Some(v) = file_cfg.get("generation_path") {
        settings.generation_path = v.clone();
    }
    if let Some(v) = file_cfg.get("execution_path") {
        settings.execution_path = v.clone();
    }
    if let Some(v) = file_cfg.get("state_path") {
        settings.state_path = v.clone();
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }
    if let Some(v) = file_cfg.get("target_name") {
        settings.target_name = Some(v.clone());
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("RUNNER_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__GENERATION_PATH") {
        settings.generation_path = v;
    }
    if let Some(v) = var("APP__EXECUTION_PATH") {
        settings.execution_path = v;
    }
    if let Some(v) = var("APP__STATE_PATH") {
        settings.state_path = v;
    }
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = var("APP__TARGET_NAME") {
        settings.target_name = Some(v);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_config(contents: &str) -> std::path::PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("runner_config_test_{suffix}.toml"));
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn file_values_override_defaults() {
        let path = temp_config("server_url = \"https://testbed.example\"\ntarget_name = \"lab1\"\n");
        let settings = load_settings(Some(&path)).expect("settings");
        fs::remove_file(&path).expect("cleanup");

        assert_eq!(settings.server_url, "https://testbed.example");
        assert_eq!(settings.target_name.as_deref(), Some("lab1"));
        assert_eq!(settings.generation_path, "/api/orchestration/gui");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let missing = env::temp_dir().join("runner_config_test_does_not_exist.toml");
        assert!(load_settings(Some(&missing)).is_err());
    }

    #[test]
    fn app_prefixed_env_wins_over_legacy_name() {
        let mut settings = Settings::default();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("RUNNER_SERVER_URL", "http://legacy:1"),
            ("APP__SERVER_URL", "http://app:2"),
            ("APP__LOG_FILTER", "debug"),
        ]);
        apply_env(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.server_url, "http://app:2");
        assert_eq!(settings.log_filter, "debug");
        assert_eq!(settings.target_name, None);
    }
}
