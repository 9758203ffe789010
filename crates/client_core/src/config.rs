use std::{collections::HashMap, fs, time::Duration};

use shared::domain::Language;
use tracing::warn;

use crate::{
    controller::{SessionSettings, DEFAULT_TEST_DURATION_SECONDS},
    result::DEFAULT_PASS_THRESHOLD_PERCENT,
};

pub const SETTINGS_FILE: &str = "hse.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub database_url: String,
    pub test_duration_seconds: u32,
    pub pass_threshold_percent: u8,
    pub language: Language,
    pub request_timeout_seconds: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".into(),
            database_url: storage::DEFAULT_DATABASE_URL.into(),
            test_duration_seconds: DEFAULT_TEST_DURATION_SECONDS,
            pass_threshold_percent: DEFAULT_PASS_THRESHOLD_PERCENT,
            language: Language::default(),
            request_timeout_seconds: None,
        }
    }
}

/// Defaults, then `hse.toml` in the working directory, then environment.
pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    Settings::from_sources(file.as_deref(), |key| std::env::var(key).ok())
}

impl Settings {
    pub fn from_sources(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(raw) = file {
            match toml::from_str::<HashMap<String, toml::Value>>(raw) {
                Ok(file_cfg) => {
                    for (key, value) in file_cfg {
                        let value = match value {
                            toml::Value::String(text) => text,
                            other => other.to_string(),
                        };
                        settings.apply(&key, &value);
                    }
                }
                Err(err) => warn!(error = %err, file = SETTINGS_FILE, "config: ignoring unreadable settings file"),
            }
        }

        for (env_key, key) in [
            ("HSE_API_URL", "api_base_url"),
            ("APP__API_BASE_URL", "api_base_url"),
            ("DATABASE_URL", "database_url"),
            ("APP__DATABASE_URL", "database_url"),
            ("APP__TEST_DURATION_SECONDS", "test_duration_seconds"),
            ("APP__PASS_THRESHOLD_PERCENT", "pass_threshold_percent"),
            ("APP__LANGUAGE", "language"),
            ("APP__REQUEST_TIMEOUT_SECONDS", "request_timeout_seconds"),
        ] {
            if let Some(value) = env(env_key) {
                settings.apply(key, &value);
            }
        }

        settings
    }

    fn apply(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match key {
            "api_base_url" if !value.is_empty() => self.api_base_url = value.to_string(),
            "database_url" if !value.is_empty() => self.database_url = value.to_string(),
            "test_duration_seconds" => match value.parse::<u32>() {
                Ok(seconds) if seconds > 0 => self.test_duration_seconds = seconds,
                _ => warn!(key, value, "config: ignoring invalid duration"),
            },
            "pass_threshold_percent" => match value.parse::<u8>() {
                Ok(percent) if percent <= 100 => self.pass_threshold_percent = percent,
                _ => warn!(key, value, "config: ignoring invalid threshold"),
            },
            "language" => match value.parse::<Language>() {
                Ok(language) => self.language = language,
                Err(err) => warn!(error = %err, "config: ignoring language"),
            },
            "request_timeout_seconds" => match value.parse::<u64>() {
                Ok(0) => self.request_timeout_seconds = None,
                Ok(seconds) => self.request_timeout_seconds = Some(seconds),
                Err(_) => warn!(key, value, "config: ignoring invalid timeout"),
            },
            _ => {}
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_seconds.map(Duration::from_secs)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            duration_seconds: self.test_duration_seconds,
            pass_threshold_percent: self.pass_threshold_percent,
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
