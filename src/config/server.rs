//! Server Configuration
//!
//! Defaults, optionally overlaid by a TOML file (`FXLINE_CONFIG`), then by
//! `FXLINE_*` environment variables.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address
    pub bind: String,

    /// HTTP listen port
    pub port: u16,

    /// sled database directory
    pub data_dir: PathBuf,

    /// Token required on /admin routes (admin routes reject everything when unset)
    pub admin_token: Option<String>,

    /// Run the built-in daily scheduler
    pub scheduler_enabled: bool,

    /// UTC hour at which FS accrual runs
    pub accrual_hour_utc: u32,

    /// UTC hour at which the daily FS display counter is zeroed (after accrual)
    pub reset_hour_utc: u32,

    /// Scheduler wake-up interval
    pub scheduler_tick_secs: u64,

    /// Mail relay endpoint; notifications are only logged when unset
    pub mail_webhook_url: Option<String>,

    /// Random draws allowed when allocating an own sponsor id
    pub sponsor_id_max_attempts: u32,

    /// Request body cap in bytes
    pub max_body_bytes: usize,

    /// Allowed CORS origins; `*` allows any, empty denies cross-origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7171,
            data_dir: PathBuf::from("fxline-data"),
            admin_token: None,
            scheduler_enabled: true,
            accrual_hour_utc: 0,
            reset_hour_utc: 23,
            scheduler_tick_secs: 60,
            mail_webhook_url: None,
            sponsor_id_max_attempts: 20,
            max_body_bytes: 64 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load from `FXLINE_CONFIG` (if set) and apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = match env::var("FXLINE_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow!("failed to read {}: {}", path.as_ref().display(), e))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let cfg: ServerConfig = toml::from_str(raw)?;
        Ok(cfg)
    }

    /// Overlay `FXLINE_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(bind) = env::var("FXLINE_BIND") {
            if !bind.trim().is_empty() {
                self.bind = bind.trim().to_string();
            }
        }

        if let Some(port) = env_parse::<u16>("FXLINE_PORT") {
            self.port = port;
        }

        if let Ok(dir) = env::var("FXLINE_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir.trim());
            }
        }

        if let Ok(token) = env::var("FXLINE_ADMIN_TOKEN") {
            if !token.is_empty() {
                self.admin_token = Some(token);
            }
        }

        if let Ok(val) = env::var("FXLINE_SCHEDULER") {
            self.scheduler_enabled = !val.trim().eq_ignore_ascii_case("off");
        }

        if let Some(h) = env_parse::<u32>("FXLINE_ACCRUAL_HOUR_UTC") {
            self.accrual_hour_utc = h;
        }

        if let Some(h) = env_parse::<u32>("FXLINE_RESET_HOUR_UTC") {
            self.reset_hour_utc = h;
        }

        if let Some(secs) = env_parse::<u64>("FXLINE_SCHEDULER_TICK_SECS") {
            self.scheduler_tick_secs = secs;
        }

        if let Ok(url) = env::var("FXLINE_MAIL_WEBHOOK") {
            if !url.trim().is_empty() {
                self.mail_webhook_url = Some(url.trim().to_string());
            }
        }

        if let Some(n) = env_parse::<u32>("FXLINE_SPONSOR_ID_MAX_ATTEMPTS") {
            self.sponsor_id_max_attempts = n;
        }

        if let Some(n) = env_parse::<usize>("FXLINE_MAX_BODY_BYTES") {
            self.max_body_bytes = n;
        }

        // comma-separated
        if let Ok(raw) = env::var("FXLINE_CORS_ORIGINS") {
            self.cors_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e| anyhow!("invalid listen address {}:{}: {}", self.bind, self.port, e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.accrual_hour_utc > 23 || self.reset_hour_utc > 23 {
            return Err(anyhow!("accrual/reset hours must be within 0..=23"));
        }
        if self.reset_hour_utc < self.accrual_hour_utc {
            return Err(anyhow!(
                "reset_hour_utc ({}) must not precede accrual_hour_utc ({})",
                self.reset_hour_utc,
                self.accrual_hour_utc
            ));
        }
        if self.scheduler_tick_secs == 0 {
            return Err(anyhow!("scheduler_tick_secs must be positive"));
        }
        self.listen_addr()?;
        if self.sponsor_id_max_attempts == 0 {
            return Err(anyhow!("sponsor_id_max_attempts must be positive"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = ServerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.sponsor_id_max_attempts, 20);
        assert!(cfg.admin_token.is_none());
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let cfg = ServerConfig::from_toml(
            r#"
            port = 9000
            admin_token = "s3cret"
            reset_hour_utc = 22
            "#,
        )
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(cfg.reset_hour_utc, 22);
        assert_eq!(cfg.scheduler_tick_secs, 60);
        assert_eq!(cfg.listen_addr().unwrap().to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn reset_before_accrual_is_rejected() {
        let cfg = ServerConfig {
            accrual_hour_utc: 5,
            reset_hour_utc: 4,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
