//! Server configuration from environment variables, overridable by CLI flags.

use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::identity::{ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS};

pub const ENV_HTTP_PORT: &str = "FIELDTRACK_HTTP_PORT";
pub const ENV_DATA_FOLDER: &str = "FIELDTRACK_DATA_FOLDER";
pub const ENV_ACCESS_SECRET: &str = "FIELDTRACK_ACCESS_TOKEN_SECRET";
pub const ENV_REFRESH_SECRET: &str = "FIELDTRACK_REFRESH_TOKEN_SECRET";
pub const ENV_ACCESS_TTL: &str = "FIELDTRACK_ACCESS_TTL_SECS";
pub const ENV_REFRESH_TTL: &str = "FIELDTRACK_REFRESH_TTL_SECS";
pub const ENV_SWEEP_INTERVAL: &str = "FIELDTRACK_SWEEP_INTERVAL_SECS";

const DEV_ACCESS_SECRET: &str = "dev-access-token-secret";
const DEV_REFRESH_SECRET: &str = "dev-refresh-token-secret";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    /// `None` keeps everything in memory.
    pub data_folder: Option<PathBuf>,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    /// Expired refresh-token sweep interval; 0 disables the sweeper.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8081,
            data_folder: None,
            access_token_secret: DEV_ACCESS_SECRET.to_string(),
            refresh_token_secret: DEV_REFRESH_SECRET.to_string(),
            access_ttl_secs: ACCESS_TOKEN_TTL_SECS,
            refresh_ttl_secs: REFRESH_TOKEN_TTL_SECS,
            sweep_interval_secs: 60,
        }
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; unparsable values fall back to defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let d = Self::default();
        Self {
            http_port: lookup(ENV_HTTP_PORT).and_then(|v| v.parse().ok()).unwrap_or(d.http_port),
            data_folder: lookup(ENV_DATA_FOLDER).filter(|v| !v.trim().is_empty()).map(PathBuf::from),
            access_token_secret: lookup(ENV_ACCESS_SECRET).unwrap_or(d.access_token_secret),
            refresh_token_secret: lookup(ENV_REFRESH_SECRET).unwrap_or(d.refresh_token_secret),
            access_ttl_secs: lookup(ENV_ACCESS_TTL).and_then(|v| v.parse().ok()).unwrap_or(d.access_ttl_secs),
            refresh_ttl_secs: lookup(ENV_REFRESH_TTL).and_then(|v| v.parse().ok()).unwrap_or(d.refresh_ttl_secs),
            sweep_interval_secs: lookup(ENV_SWEEP_INTERVAL).and_then(|v| v.parse().ok()).unwrap_or(d.sweep_interval_secs),
        }
    }

    /// CLI arguments override environment.
    pub fn apply_args(mut self, args: &[String]) -> Self {
        if let Some(p) = arg_value(args, "--http-port").and_then(|v| v.parse().ok()) {
            self.http_port = p;
        }
        if let Some(dir) = arg_value(args, "--data-folder") {
            self.data_folder = Some(PathBuf::from(dir));
        }
        if let Some(s) = arg_value(args, "--sweep-interval").and_then(|v| v.parse().ok()) {
            self.sweep_interval_secs = s;
        }
        self
    }

    pub fn uses_dev_secrets(&self) -> bool {
        self.access_token_secret == DEV_ACCESS_SECRET || self.refresh_token_secret == DEV_REFRESH_SECRET
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_token_secret.is_empty() || self.refresh_token_secret.is_empty() {
            bail!("token secrets must not be empty");
        }
        if self.access_token_secret == self.refresh_token_secret {
            bail!("access and refresh token secrets must differ");
        }
        if self.access_ttl_secs <= 0 || self.refresh_ttl_secs <= 0 {
            bail!("token lifetimes must be positive");
        }
        if self.access_ttl_secs >= self.refresh_ttl_secs {
            bail!("access token lifetime must be shorter than refresh token lifetime");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_token_lifetimes() {
        let c = ServerConfig::default();
        assert_eq!(c.access_ttl_secs, 15 * 60);
        assert_eq!(c.refresh_ttl_secs, 7 * 24 * 60 * 60);
        assert!(c.uses_dev_secrets());
        c.validate().unwrap();
    }

    #[test]
    fn env_then_args() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_HTTP_PORT, "9000"),
            (ENV_DATA_FOLDER, "/var/lib/fieldtrack"),
            (ENV_ACCESS_SECRET, "a"),
            (ENV_REFRESH_SECRET, "r"),
            (ENV_ACCESS_TTL, "not-a-number"),
        ]);
        let c = ServerConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.http_port, 9000);
        assert_eq!(c.access_ttl_secs, ACCESS_TOKEN_TTL_SECS);
        assert!(!c.uses_dev_secrets());

        let args: Vec<String> = ["bin", "--http-port", "9100", "--data-folder", "data"].iter().map(|s| s.to_string()).collect();
        let c = c.apply_args(&args);
        assert_eq!(c.http_port, 9100);
        assert_eq!(c.data_folder, Some(PathBuf::from("data")));
    }

    #[test]
    fn validate_rejects_bad_secrets_and_ttls() {
        let same = ServerConfig { refresh_token_secret: DEV_ACCESS_SECRET.into(), ..Default::default() };
        assert!(same.validate().is_err());
        let inverted = ServerConfig { access_ttl_secs: 10_000_000, ..Default::default() };
        assert!(inverted.validate().is_err());
    }
}
