//! Handles loading configuration from files and applying it to the Config struct.

use super::{Config, ConfigFile};
use anyhow::Context;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// Loads configuration settings from a TOML file.
/// Returns the parsed `ConfigFile` content.
/// Internal to the builder logic.
pub(crate) fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!(
            "File not found or is not a file: {}",
            file_path
        ));
    }
    tracing::debug!("Attempting to read config file: {}", file_path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    tracing::debug!("Attempting to parse TOML from: {}", file_path);
    let config_file_content: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::debug!("Successfully parsed configuration file: {}", file_path);
    Ok(config_file_content)
}

/// Applies settings from a parsed `ConfigFile` onto a mutable `Config` instance.
/// Internal helper for the builder. This merges settings.
pub(crate) fn apply_file_config(
    config: &mut Config,
    file_config: &ConfigFile,
) -> anyhow::Result<()> {
    // DNS
    if let Some(timeout) = file_config.dns.dns_timeout {
        config.dns_timeout = Duration::from_secs(timeout);
    }
    if let Some(ref servers) = file_config.dns.dns_servers {
        if !servers.is_empty() {
            config.dns_servers = servers.clone();
        }
    }

    // SMTP
    if let Some(timeout) = file_config.smtp.smtp_timeout {
        config.smtp_timeout = Duration::from_secs(timeout);
    }
    if let Some(timeout) = file_config.smtp.connect_timeout {
        config.connect_timeout = Duration::from_secs(timeout);
    }
    if let Some(port) = file_config.smtp.smtp_port {
        config.smtp_port = port;
    }
    if let Some(ref hostname) = file_config.smtp.helo_hostname {
        config.helo_hostname = hostname.clone();
    }
    if let Some(ref sender) = file_config.smtp.smtp_sender_email {
        config.smtp_sender_email = sender.clone();
    }

    // Pool
    if let Some(ref addrs) = file_config.pool.source_ips {
        if !addrs.is_empty() {
            config.source_ips = addrs
                .iter()
                .map(|s| {
                    s.trim()
                        .parse::<IpAddr>()
                        .with_context(|| format!("Invalid source IP in configuration: '{}'", s))
                })
                .collect::<anyhow::Result<Vec<IpAddr>>>()?;
        }
    }
    if let Some(cooldown) = file_config.pool.ip_cooldown_ms {
        config.ip_cooldown = Duration::from_millis(cooldown);
    }
    if let Some(early_exit) = file_config.pool.early_exit {
        config.early_exit = early_exit;
    }

    // Verification
    if let Some(probes) = file_config.verification.catch_all_probes {
        config.catch_all_probes = probes;
    }
    if let Some(ref tlds) = file_config.verification.candidate_tlds {
        if !tlds.is_empty() {
            config.candidate_tlds = tlds.clone();
        }
    }
    if let Some(concurrency) = file_config.verification.max_concurrency {
        config.max_concurrency = concurrency;
    }

    Ok(())
}
