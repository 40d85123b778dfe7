use stride_core::config::normalize_endpoint;
use stride_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Values passed to `stride config init`
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub sync_url: Option<String>,
    pub user_id: Option<String>,
    pub api_token: Option<String>,
    pub poll_interval: Option<u64>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            sync_url,
            user_id,
            api_token,
            poll_interval,
            no_activate,
        } => {
            let update = ProfileUpdate {
                sync_url,
                user_id,
                api_token,
                poll_interval,
            };
            run_config_init(profile.as_deref().or(global_profile), update, no_activate)
        }
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    apply_profile_update(&mut config, &profile_name, update, no_activate)?;

    let path = config.save().map_err(CliError::Config)?;
    println!("Profile '{profile_name}' initialized at {}", path.display());

    let profile = config
        .profile(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    if profile.sync_url.is_some() {
        println!("Sync profile '{profile_name}' is ready. Run `stride sync` to sync now.");
    } else {
        println!("Profile '{profile_name}' has no sync_url; Stride stays local-only.");
    }
    Ok(())
}

/// Merge explicit values into a profile; unset values keep what is stored
pub fn apply_profile_update(
    config: &mut CliProfilesConfig,
    profile_name: &str,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let sync_url = normalize_text_option(update.sync_url)
        .map(|url| normalize_endpoint(&url))
        .transpose()
        .map_err(|error| CliError::Config(error.to_string()))?;
    if let Some(secs) = update.poll_interval {
        if !(5..=3_600).contains(&secs) {
            return Err(CliError::Config(
                "poll_interval must be between 5 and 3600 seconds".to_string(),
            ));
        }
    }

    let profile = config.profile_mut_or_default(profile_name);
    if let Some(value) = sync_url {
        profile.sync_url = Some(value);
    }
    if let Some(value) = normalize_text_option(update.user_id) {
        profile.user_id = Some(value);
    }
    if let Some(value) = normalize_text_option(update.api_token) {
        profile.api_token = Some(value);
    }
    if let Some(value) = update.poll_interval {
        profile.poll_interval_secs = Some(value);
    }

    if !no_activate {
        config.active_profile = Some(profile_name.to_string());
    }
    Ok(())
}

pub fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let Some(profile) = config.profile(&profile_name) else {
        println!("Profile '{profile_name}' is not configured.");
        return Ok(());
    };

    for line in format_profile_lines(&profile_name, profile) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_profile_lines(name: &str, profile: &CliProfile) -> Vec<String> {
    let unset = || "-".to_string();
    vec![
        format!("profile:       {name}"),
        format!(
            "sync_url:      {}",
            profile.sync_url.clone().unwrap_or_else(unset)
        ),
        format!(
            "user_id:       {}",
            profile.user_id.clone().unwrap_or_else(unset)
        ),
        format!(
            "api_token:     {}",
            if profile.api_token.is_some() {
                "[set]"
            } else {
                "-"
            }
        ),
        format!(
            "poll_interval: {}",
            profile
                .poll_interval_secs
                .map_or_else(unset, |secs| format!("{secs}s"))
        ),
    ]
}
