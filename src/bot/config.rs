use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,

    /// Members holding this role may use administrative commands.
    #[serde(default)]
    pub admin_role_id: Option<u64>,

    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,

    #[serde(default = "default_image")]
    pub default_image: String,

    #[serde(default = "default_allowed_images")]
    pub allowed_images: Vec<String>,

    #[serde(default = "default_network_name")]
    pub network_name: String,

    #[serde(default = "default_min_memory_gb")]
    pub min_memory_gb: u32,

    #[serde(default = "default_max_vps_per_user")]
    pub max_vps_per_user: usize,

    #[serde(default = "default_brand_name")]
    pub brand_name: String,

    #[serde(default)]
    pub install_init_system: bool,

    #[serde(default = "default_boot_delay_secs")]
    pub boot_delay_secs: u64,

    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,

    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_lock_max_attempts")]
    pub lock_max_attempts: u32,

    #[serde(default = "default_lock_retry_delay_secs")]
    pub lock_retry_delay_secs: u64,

    #[serde(default)]
    pub audit_webhook_url: Option<String>,

    /// Tera template for the audit webhook body. Defaults to a Discord
    /// webhook compatible `{"content": ...}` payload.
    #[serde(default)]
    pub audit_webhook_template: Option<String>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialBotConfig {
    discord_token: Option<String>,
    admin_role_id: Option<u64>,
    command_prefix: Option<String>,
    data_dir: Option<String>,
    log_dir: Option<String>,
    docker_bin: Option<String>,
    default_image: Option<String>,
    allowed_images: Option<Vec<String>>,
    network_name: Option<String>,
    min_memory_gb: Option<u32>,
    max_vps_per_user: Option<usize>,
    brand_name: Option<String>,
    install_init_system: Option<bool>,
    boot_delay_secs: Option<u64>,
    exec_timeout_secs: Option<u64>,
    session_timeout_secs: Option<u64>,
    lock_max_attempts: Option<u32>,
    lock_retry_delay_secs: Option<u64>,
    audit_webhook_url: Option<String>,
    audit_webhook_template: Option<String>,
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "ubuntu:22.04".to_string()
}

fn default_allowed_images() -> Vec<String> {
    vec![
        "ubuntu:22.04".to_string(),
        "ubuntu:20.04".to_string(),
        "debian:12".to_string(),
        "debian:11".to_string(),
    ]
}

fn default_network_name() -> String {
    "vps_network".to_string()
}

fn default_min_memory_gb() -> u32 {
    1
}

fn default_max_vps_per_user() -> usize {
    1
}

fn default_brand_name() -> String {
    "CatHosting Vps".to_string()
}

fn default_boot_delay_secs() -> u64 {
    5
}

fn default_exec_timeout_secs() -> u64 {
    120
}

fn default_session_timeout_secs() -> u64 {
    60
}

fn default_lock_max_attempts() -> u32 {
    5
}

fn default_lock_retry_delay_secs() -> u64 {
    5
}

impl BotConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialBotConfig = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let path = Path::new(path_str);
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
            }
            _ => PartialBotConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialBotConfig = envy::from_env::<PartialBotConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        Self::merge(env_config, file_config)
    }

    /// Environment values override file values; defaults fill the rest.
    fn merge(env: PartialBotConfig, file: PartialBotConfig) -> Result<Self, String> {
        let config = BotConfig {
            discord_token: env
                .discord_token
                .or(file.discord_token)
                .filter(|token| !token.trim().is_empty())
                .ok_or("DISCORD_TOKEN is required")?,
            admin_role_id: env.admin_role_id.or(file.admin_role_id),
            command_prefix: env
                .command_prefix
                .or(file.command_prefix)
                .unwrap_or_else(default_command_prefix),
            data_dir: env.data_dir.or(file.data_dir).unwrap_or_else(default_data_dir),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            docker_bin: env
                .docker_bin
                .or(file.docker_bin)
                .unwrap_or_else(default_docker_bin),
            default_image: env
                .default_image
                .or(file.default_image)
                .unwrap_or_else(default_image),
            allowed_images: env
                .allowed_images
                .or(file.allowed_images)
                .unwrap_or_else(default_allowed_images),
            network_name: env
                .network_name
                .or(file.network_name)
                .unwrap_or_else(default_network_name),
            min_memory_gb: env
                .min_memory_gb
                .or(file.min_memory_gb)
                .unwrap_or_else(default_min_memory_gb),
            max_vps_per_user: env
                .max_vps_per_user
                .or(file.max_vps_per_user)
                .unwrap_or_else(default_max_vps_per_user),
            brand_name: env
                .brand_name
                .or(file.brand_name)
                .unwrap_or_else(default_brand_name),
            install_init_system: env
                .install_init_system
                .or(file.install_init_system)
                .unwrap_or(false),
            boot_delay_secs: env
                .boot_delay_secs
                .or(file.boot_delay_secs)
                .unwrap_or_else(default_boot_delay_secs),
            exec_timeout_secs: env
                .exec_timeout_secs
                .or(file.exec_timeout_secs)
                .unwrap_or_else(default_exec_timeout_secs),
            session_timeout_secs: env
                .session_timeout_secs
                .or(file.session_timeout_secs)
                .unwrap_or_else(default_session_timeout_secs),
            lock_max_attempts: env
                .lock_max_attempts
                .or(file.lock_max_attempts)
                .unwrap_or_else(default_lock_max_attempts),
            lock_retry_delay_secs: env
                .lock_retry_delay_secs
                .or(file.lock_retry_delay_secs)
                .unwrap_or_else(default_lock_retry_delay_secs),
            audit_webhook_url: env
                .audit_webhook_url
                .or(file.audit_webhook_url)
                .filter(|url| !url.trim().is_empty()),
            audit_webhook_template: env.audit_webhook_template.or(file.audit_webhook_template),
        };

        if config.lock_max_attempts == 0 {
            return Err("LOCK_MAX_ATTEMPTS must be at least 1".to_string());
        }
        if !config.allowed_images.contains(&config.default_image) {
            return Err(format!(
                "DEFAULT_IMAGE '{}' is not in ALLOWED_IMAGES",
                config.default_image
            ));
        }

        Ok(config)
    }

    pub fn vps_store_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("vps_data.json")
    }

    pub fn journal_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("provisioning.json")
    }

    pub fn boot_delay(&self) -> Duration {
        Duration::from_secs(self.boot_delay_secs)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_secs(self.lock_retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial_with_token() -> PartialBotConfig {
        PartialBotConfig {
            discord_token: Some("file-token".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_fill_missing_values() {
        let config = BotConfig::merge(PartialBotConfig::default(), partial_with_token()).unwrap();
        assert_eq!(config.discord_token, "file-token");
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.network_name, "vps_network");
        assert_eq!(config.default_image, "ubuntu:22.04");
        assert_eq!(config.max_vps_per_user, 1);
        assert_eq!(config.lock_max_attempts, 5);
        assert!(config.admin_role_id.is_none());
        assert!(config.vps_store_path().ends_with("vps_data.json"));
    }

    #[test]
    fn test_env_overrides_file() {
        let env = PartialBotConfig {
            discord_token: Some("env-token".to_string()),
            admin_role_id: Some(42),
            min_memory_gb: Some(4),
            ..Default::default()
        };
        let file = PartialBotConfig {
            min_memory_gb: Some(2),
            command_prefix: Some("?".to_string()),
            ..partial_with_token()
        };
        let config = BotConfig::merge(env, file).unwrap();
        assert_eq!(config.discord_token, "env-token");
        assert_eq!(config.admin_role_id, Some(42));
        assert_eq!(config.min_memory_gb, 4);
        assert_eq!(config.command_prefix, "?");
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let result = BotConfig::merge(PartialBotConfig::default(), PartialBotConfig::default());
        assert_eq!(result.unwrap_err(), "DISCORD_TOKEN is required");

        let blank = PartialBotConfig {
            discord_token: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(BotConfig::merge(blank, PartialBotConfig::default()).is_err());
    }

    #[test]
    fn test_default_image_must_be_allowed() {
        let file = PartialBotConfig {
            default_image: Some("alpine:3".to_string()),
            ..partial_with_token()
        };
        let err = BotConfig::merge(PartialBotConfig::default(), file).unwrap_err();
        assert!(err.contains("alpine:3"));
    }

    #[test]
    fn test_file_config_parses_from_toml() {
        let parsed: PartialBotConfig = toml::from_str(
            r#"
            discord_token = "abc"
            admin_role_id = 1379417287093649488
            allowed_images = ["ubuntu:22.04"]
            install_init_system = true
            "#,
        )
        .unwrap();
        let config = BotConfig::merge(PartialBotConfig::default(), parsed).unwrap();
        assert_eq!(config.admin_role_id, Some(1379417287093649488));
        assert_eq!(config.allowed_images, vec!["ubuntu:22.04".to_string()]);
        assert!(config.install_init_system);
    }
}
