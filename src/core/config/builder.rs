//! Provides the `ConfigBuilder` for fluent configuration construction.

use super::loading::{apply_file_config, load_config_file};
use super::validation::validate_config;
use super::{Config, ConfigFile};
use crate::core::error::{AppError, Result};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// Builder pattern for creating `Config` instances fluently.
///
/// This is the primary way users should create a `Config` object.
/// It handles loading from files, applying overrides, and validation.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    config_file_path: Option<String>,
    overrides: ConfigFile,
}

impl ConfigBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify an optional configuration file path to load.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    pub fn dns_timeout(mut self, duration: Duration) -> Self {
        self.overrides.dns.dns_timeout = Some(duration.as_secs());
        self
    }
    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.overrides.dns.dns_servers = Some(servers);
        self
    }
    pub fn smtp_timeout(mut self, duration: Duration) -> Self {
        self.overrides.smtp.smtp_timeout = Some(duration.as_secs());
        self
    }
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.overrides.smtp.connect_timeout = Some(duration.as_secs());
        self
    }
    pub fn smtp_port(mut self, port: u16) -> Self {
        self.overrides.smtp.smtp_port = Some(port);
        self
    }
    pub fn helo_hostname(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.helo_hostname = Some(value.into());
        self
    }
    pub fn smtp_sender_email(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.smtp_sender_email = Some(value.into());
        self
    }
    pub fn source_ips(mut self, addrs: Vec<IpAddr>) -> Self {
        self.overrides.pool.source_ips = Some(addrs.iter().map(|a| a.to_string()).collect());
        self
    }
    /// Accepts source IPs as strings (e.g. straight from CLI flags); parse
    /// errors surface from `build()`.
    pub fn source_ip_strings(mut self, addrs: Vec<String>) -> Self {
        self.overrides.pool.source_ips = Some(addrs);
        self
    }
    pub fn ip_cooldown(mut self, duration: Duration) -> Self {
        self.overrides.pool.ip_cooldown_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn early_exit(mut self, enable: bool) -> Self {
        self.overrides.pool.early_exit = Some(enable);
        self
    }
    pub fn catch_all_probes(mut self, count: usize) -> Self {
        self.overrides.verification.catch_all_probes = Some(count);
        self
    }
    pub fn candidate_tlds(mut self, tlds: Vec<String>) -> Self {
        self.overrides.verification.candidate_tlds = Some(tlds);
        self
    }
    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.overrides.verification.max_concurrency = Some(value);
        self
    }

    /// Builds the final `Config` object, applying defaults, file settings, overrides, and validation.
    pub fn build(mut self) -> Result<Config> {
        let mut loaded_path: Option<String> = None;

        if let Some(ref path) = self.config_file_path {
            match load_config_file(path) {
                Ok(file_config) => {
                    apply_file_config(&mut self.config, &file_config)
                        .map_err(|e| AppError::Config(e.to_string()))?;
                    loaded_path = Some(path.clone());
                    tracing::info!("Loaded base configuration from specified file: {}", path);
                }
                Err(e) => {
                    tracing::error!("Failed to load specified config file '{}': {}", path, e);
                    return Err(AppError::Config(format!(
                        "Failed to load specified configuration file '{}': {}",
                        path, e
                    )));
                }
            }
        } else {
            tracing::debug!("No config file specified, checking default locations.");
            for path_str in ["./email-prospector.toml", "./config.toml"] {
                if Path::new(path_str).exists() {
                    tracing::debug!("Found potential default config file: {}", path_str);
                    match load_config_file(path_str) {
                        Ok(file_config) => {
                            apply_file_config(&mut self.config, &file_config)
                                .map_err(|e| AppError::Config(e.to_string()))?;
                            loaded_path = Some(path_str.to_string());
                            tracing::info!(
                                "Loaded base configuration from default location: {}",
                                path_str
                            );
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Failed to load or parse default config '{}': {}",
                                path_str,
                                e
                            );
                        }
                    }
                }
            }
            if loaded_path.is_none() {
                tracing::info!("No configuration file found. Using default values and overrides.");
            }
        }

        apply_file_config(&mut self.config, &self.overrides)
            .map_err(|e| AppError::Config(e.to_string()))?;
        self.config.loaded_config_path = loaded_path;
        validate_config(&mut self.config)?;

        tracing::debug!("Final configuration built successfully.");
        Ok(self.config)
    }
}
