//! Persistent CLI profile configuration.
//!
//! Profiles live in `<config dir>/stride/cli-config.json`. Environment
//! variables override any value a profile stores.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stride_core::util::normalize_text_option;
use stride_core::SyncSettings;

const CONFIG_FILE_NAME: &str = "cli-config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub sync_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("stride")
        .join(CONFIG_FILE_NAME)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {error}", path.display()))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {error}", path.display()))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {error}",
                    parent.display()
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {error}", path.display()))
    }

    /// Explicit flag, then `STRIDE_PROFILE`, then the active profile
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        let from_env = std::env::var("STRIDE_PROFILE").ok();
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(from_env.as_deref()))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    /// Value this profile supplies for a `STRIDE_*` setting
    pub fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "STRIDE_SYNC_URL" => self.sync_url.clone(),
            "STRIDE_USER_ID" => self.user_id.clone(),
            "STRIDE_API_TOKEN" => self.api_token.clone(),
            "STRIDE_POLL_INTERVAL_SECS" => self.poll_interval_secs.map(|secs| secs.to_string()),
            _ => None,
        }
    }

    fn normalize(&mut self) {
        self.sync_url = normalize_text_option(self.sync_url.take());
        self.user_id = normalize_text_option(self.user_id.take());
        self.api_token = normalize_text_option(self.api_token.take());
    }
}

/// Build sync settings from the environment layered over a profile
pub fn resolve_sync_settings(
    profile: Option<&CliProfile>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SyncSettings, String> {
    SyncSettings::from_lookup(|name| {
        normalize_text_option(env(name)).or_else(|| profile.and_then(|p| p.lookup(name)))
    })
    .map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_profile() -> CliProfile {
        CliProfile {
            sync_url: Some("https://sync.example.com/".to_string()),
            user_id: Some("alice".to_string()),
            api_token: Some("secret".to_string()),
            poll_interval_secs: Some(60),
        }
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliProfilesConfig::load_from_path(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config, CliProfilesConfig::default());
    }

    #[test]
    fn save_and_load_round_trip_normalizes_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some("  work ".to_string()),
            ..CliProfilesConfig::default()
        };
        let profile = config.profile_mut_or_default("work");
        *profile = sample_profile();
        profile.user_id = Some("   ".to_string());
        config.save_to_path(&path).unwrap();

        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("work"));
        let work = loaded.profile("work").unwrap();
        assert_eq!(work.user_id, None);
        assert_eq!(work.api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn explicit_profile_name_wins() {
        let config = CliProfilesConfig {
            active_profile: Some("work".to_string()),
            ..CliProfilesConfig::default()
        };
        assert_eq!(config.resolve_profile_name(Some(" home ")), "home");
    }

    #[test]
    fn profile_supplies_settings_when_env_is_silent() {
        let profile = sample_profile();
        let settings = resolve_sync_settings(Some(&profile), |_| None).unwrap();

        assert_eq!(settings.endpoint.as_deref(), Some("https://sync.example.com"));
        assert_eq!(settings.user_id, "alice");
        assert_eq!(settings.api_token.as_deref(), Some("secret"));
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn env_overrides_profile() {
        let profile = sample_profile();
        let settings = resolve_sync_settings(Some(&profile), |name| {
            (name == "STRIDE_USER_ID").then(|| "bob".to_string())
        })
        .unwrap();

        assert_eq!(settings.user_id, "bob");
        assert_eq!(settings.endpoint.as_deref(), Some("https://sync.example.com"));
    }

    #[test]
    fn no_profile_and_no_env_is_local_only() {
        let settings = resolve_sync_settings(None, |_| None).unwrap();
        assert!(!settings.is_configured());
    }

    #[test]
    fn invalid_profile_url_is_reported() {
        let profile = CliProfile {
            sync_url: Some("sync.example.com".to_string()),
            ..CliProfile::default()
        };
        assert!(resolve_sync_settings(Some(&profile), |_| None).is_err());
    }
}
