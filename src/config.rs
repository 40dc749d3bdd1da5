use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_site_name")]
    pub site_name: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub session: SessionConfig,
    /// Account created (or promoted) at startup
    pub admin: Option<AdminConfig>,
}

fn default_site_name() -> String {
    "Newsroom".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_database_url() -> String {
    "sqlite:newsroom.db?mode=rwc".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Lifetime of a regular login, in hours
    #[serde(default = "default_lifetime_hours")]
    pub lifetime_hours: i64,
    /// Lifetime of a "remember me" login, in days
    #[serde(default = "default_remember_days")]
    pub remember_days: i64,
    #[serde(default)]
    pub secure_cookies: bool,
    /// Expired session purge interval in minutes
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_hours: default_lifetime_hours(),
            remember_days: default_remember_days(),
            secure_cookies: false,
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_lifetime_hours() -> i64 {
    24
}

fn default_remember_days() -> i64 {
    30
}

fn default_sweep_interval() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_name: default_site_name(),
            bind_address: default_bind_address(),
            database_url: default_database_url(),
            session: SessionConfig::default(),
            admin: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn session_lifetime(&self, remember: bool) -> chrono::Duration {
        if remember {
            chrono::Duration::days(self.session.remember_days)
        } else {
            chrono::Duration::hours(self.session.lifetime_hours)
        }
    }
}
