use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{de::IgnoredAny, Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// How long shutdown waits for an in-flight backup before exiting.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 300;
pub const DEFAULT_CRON: &str = "0 2 * * *";
pub const DEFAULT_TIMEZONE: &str = "UTC";
/// Zone used for the human-readable `*Local` fields in logs and status.
pub const DEFAULT_DISPLAY_TIMEZONE: &str = "Asia/Manila";
/// Number of most recent backups kept by the retention step.
pub const DEFAULT_KEEP_COUNT: usize = 30;

/// Top-level config (backupd.toml + env overrides).
///
/// Read once at startup; every component receives the frozen sections it
/// needs instead of looking at the environment itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupdConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

/// When and how the periodic backup runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Cron expression, 5-field (`min hour dom month dow`) or seconds-first.
    /// Override with env var: BACKUP_CRON
    #[serde(default = "default_cron")]
    pub cron: String,
    /// IANA zone the cron expression is evaluated in.
    /// Override with env var: BACKUP_TIMEZONE
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Master switch. Only the literal `false` turns backups off.
    /// Override with env var: BACKUP_ENABLED
    #[serde(default = "bool_true", deserialize_with = "deserialize_switch")]
    pub enabled: bool,
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
    #[serde(default = "default_display_timezone")]
    pub display_timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            timezone: default_timezone(),
            enabled: true,
            keep_count: DEFAULT_KEEP_COUNT,
            display_timezone: default_display_timezone(),
        }
    }
}

/// Shell commands backing the create/upload/prune collaborators.
///
/// Each command runs under `sh -c`. Values are handed over through env vars
/// (`DATABASE_URL`, `BACKUP_DIR`, `BACKUP_TIMESTAMP`, `BACKUP_PATH`,
/// `BACKUP_KEEP`) rather than interpolated into the command string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Connection string of the database to back up.
    /// Override with env var: DATABASE_URL
    pub database_url: Option<String>,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    /// Must print the artifact path as the last line of stdout.
    pub create_command: Option<String>,
    pub upload_command: Option<String>,
    pub prune_command: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            backup_dir: default_backup_dir(),
            create_command: None,
            upload_command: None,
            prune_command: None,
        }
    }
}

/// Accepts any value for the master switch: only a boolean `false` or the
/// string `"false"` turns it off, so `BACKUP_ENABLED=yes` or `1.5` keeps
/// backups on instead of failing extraction.
fn deserialize_switch<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Switch {
        Flag(bool),
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match Switch::deserialize(deserializer)? {
        Switch::Flag(flag) => flag,
        Switch::Text(text) => text != "false",
        Switch::Other(_) => true,
    })
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_shutdown_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}
fn default_cron() -> String {
    DEFAULT_CRON.to_string()
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_display_timezone() -> String {
    DEFAULT_DISPLAY_TIMEZONE.to_string()
}
fn default_keep_count() -> usize {
    DEFAULT_KEEP_COUNT
}
fn default_backup_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.backupd/backups", home)
}

impl BackupdConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Precedence, lowest first:
    ///   1. Field defaults
    ///   2. The TOML file (explicit path, else ~/.backupd/backupd.toml)
    ///   3. BACKUPD_<SECTION>__<KEY>
    ///   4. DATABASE_URL, BACKUP_CRON, BACKUP_TIMEZONE, BACKUP_ENABLED
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: BackupdConfig = Self::figment(&path)
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        tracing::debug!(path = %path, enabled = config.schedule.enabled, "config loaded");
        Ok(config)
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BACKUPD_").split("__"))
            .merge(
                Env::raw()
                    .only(&["DATABASE_URL"])
                    .map(|_| "pipeline.database_url".into()),
            )
            .merge(
                Env::prefixed("BACKUP_")
                    .only(&["CRON", "TIMEZONE", "ENABLED"])
                    .map(|key| format!("schedule.{}", key.as_str().to_ascii_lowercase()).into()),
            )
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.backupd/backupd.toml", home)
}
