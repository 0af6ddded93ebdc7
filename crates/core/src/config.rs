use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::BlobCompression;
use crate::error::{Result, StitchError};
use crate::headers::DEFAULT_STEP_PREFIX;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub enabled: bool,
    pub add_step: bool,
    pub step_prefix: String,
    pub compression: BlobCompression,
    pub listen_addr: String,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            add_step: true,
            step_prefix: DEFAULT_STEP_PREFIX.to_string(),
            compression: BlobCompression::Gzip,
            listen_addr: "127.0.0.1:4780".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    enabled: Option<bool>,
    add_step: Option<bool>,
    step_prefix: Option<String>,
    compression: Option<String>,
    listen_addr: Option<String>,
    request_timeout: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("TRACESTITCH_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("tracestitch/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| StitchError::Config(format!("failed reading {}: {e}", path.display())))?;
    parse_file_overrides(&raw)
        .map(Some)
        .map_err(|e| StitchError::Config(format!("failed parsing {}: {e}", path.display())))
}

fn parse_file_overrides(raw: &str) -> std::result::Result<ConfigOverrides, toml::de::Error> {
    toml::from_str(raw)
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        enabled: env_bool("TRACESTITCH_ENABLED")?,
        add_step: env_bool("TRACESTITCH_ADD_STEP")?,
        step_prefix: env::var("TRACESTITCH_STEP_PREFIX").ok(),
        compression: env::var("TRACESTITCH_COMPRESSION").ok(),
        listen_addr: env::var("TRACESTITCH_LISTEN_ADDR").ok(),
        request_timeout: env::var("TRACESTITCH_REQUEST_TIMEOUT").ok(),
    })
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match env::var(key) {
        Ok(v) => parse_bool(&v)
            .map(Some)
            .ok_or_else(|| StitchError::Config(format!("bad {key} in environment: {v}"))),
        Err(_) => Ok(None),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Blank prefixes collapse to the empty string.
pub fn normalize_step_prefix(prefix: &str) -> String {
    if prefix.trim().is_empty() {
        String::new()
    } else {
        prefix.to_string()
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.enabled {
        cfg.enabled = v;
    }
    if let Some(v) = overrides.add_step {
        cfg.add_step = v;
    }
    if let Some(v) = overrides.step_prefix {
        cfg.step_prefix = normalize_step_prefix(&v);
    }
    if let Some(v) = overrides.compression {
        cfg.compression = BlobCompression::parse(&v).map_err(|e| {
            StitchError::Config(format!("bad compression in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.listen_addr {
        cfg.listen_addr = v;
    }
    if let Some(v) = overrides.request_timeout {
        cfg.request_timeout = humantime::parse_duration(&v).map_err(|e| {
            StitchError::Config(format!("bad request_timeout in {source}: {e} (value={v})"))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_opens_steps_with_webapi_prefix() {
        let cfg = Config::default();
        assert!(cfg.enabled);
        assert!(cfg.add_step);
        assert_eq!(cfg.step_prefix, "WebAPI :");
        assert_eq!(cfg.compression, BlobCompression::Gzip);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn parses_bools_loosely() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn blank_prefix_normalizes_to_empty() {
        assert_eq!(normalize_step_prefix("   "), "");
        assert_eq!(normalize_step_prefix("svc:"), "svc:");
    }

    #[test]
    fn apply_file_overrides_updates_fields() {
        let mut cfg = Config::default();
        let file = parse_file_overrides(
            r#"
add_step = false
step_prefix = "orders ->"
compression = "zlib"
request_timeout = "3s"
"#,
        )
        .unwrap();

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert!(!cfg.add_step);
        assert_eq!(cfg.step_prefix, "orders ->");
        assert_eq!(cfg.compression, BlobCompression::Zlib);
        assert_eq!(cfg.request_timeout, Duration::from_secs(3));
        assert!(cfg.enabled);
    }

    #[test]
    fn apply_overrides_rejects_bad_values() {
        let mut cfg = Config::default();
        let bad = ConfigOverrides {
            compression: Some("lz4".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, bad, "environment").is_err());

        let bad = ConfigOverrides {
            request_timeout: Some("soon".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, bad, "environment").is_err());
    }
}
