//! Contains validation logic for the final Config struct.

use super::Config;
use crate::core::error::{AppError, Result};

/// Validates the configuration settings after loading and potential overrides.
/// Mutates the config to clamp values or set defaults where applicable and logical.
/// Internal helper for the builder's `build` method.
pub(crate) fn validate_config(config: &mut Config) -> Result<()> {
    if config.source_ips.is_empty() {
        return Err(AppError::Config(
            "Source IP pool cannot be empty.".to_string(),
        ));
    }
    if config.dns_servers.is_empty() {
        tracing::warn!("DNS servers list is empty. Resolver might use system defaults or fail.");
    }
    if !config.smtp_sender_email.contains('@') || !config.smtp_sender_email.contains('.') {
        return Err(AppError::Config(format!(
            "Invalid SMTP sender email format: {}",
            config.smtp_sender_email
        )));
    }
    if config.helo_hostname.trim().is_empty() {
        return Err(AppError::Config(
            "HELO hostname cannot be empty.".to_string(),
        ));
    }
    if config.smtp_port == 0 {
        return Err(AppError::Config("SMTP port cannot be 0.".to_string()));
    }
    if config.smtp_timeout.is_zero() {
        tracing::warn!("SMTP idle timeout was 0. Setting to 10s.");
        config.smtp_timeout = std::time::Duration::from_secs(10);
    }
    if config.catch_all_probes == 0 {
        tracing::warn!("Catch-all probe count was set to 0. Setting to 1.");
        config.catch_all_probes = 1;
    }
    if config.catch_all_probes > 5 {
        tracing::warn!(
            "Catch-all probe count ({}) > 5. Clamping to 5.",
            config.catch_all_probes
        );
        config.catch_all_probes = 5;
    }
    if config.candidate_tlds.is_empty() {
        tracing::warn!("Candidate TLD list is empty. Domain guessing will always fail.");
    }
    for tld in &mut config.candidate_tlds {
        if !tld.starts_with('.') {
            tracing::warn!("Candidate TLD '{}' missing leading dot. Fixing.", tld);
            *tld = format!(".{}", tld);
        }
    }
    if config.max_concurrency == 0 {
        tracing::warn!("Max concurrency was set to 0. Setting to 1.");
        config.max_concurrency = 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let mut config = Config::default();
        assert!(validate_config(&mut config).is_ok());
    }

    #[test]
    fn test_empty_pool_rejected() {
        let mut config = Config::default();
        config.source_ips.clear();
        assert!(validate_config(&mut config).is_err());
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let mut config = Config::default();
        config.smtp_sender_email = "not-an-email".to_string();
        assert!(validate_config(&mut config).is_err());
    }

    #[test]
    fn test_clamps_catch_all_probes() {
        let mut config = Config::default();
        config.catch_all_probes = 9;
        validate_config(&mut config).unwrap();
        assert_eq!(config.catch_all_probes, 5);

        config.catch_all_probes = 0;
        validate_config(&mut config).unwrap();
        assert_eq!(config.catch_all_probes, 1);
    }

    #[test]
    fn test_fixes_tld_missing_dot() {
        let mut config = Config::default();
        config.candidate_tlds = vec!["com".to_string(), ".io".to_string()];
        validate_config(&mut config).unwrap();
        assert_eq!(config.candidate_tlds, vec![".com", ".io"]);
    }
}
