//! Defines the core runtime `Config` struct, its defaults, and related utilities.
//! Submodules handle loading, building, and validation.

pub(crate) mod builder;
pub(crate) mod file;
pub(crate) mod loading;
pub(crate) mod validation;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use regex::Regex;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Runtime configuration settings used by the email-prospector core logic.
#[derive(Clone)]
pub struct Config {
    pub dns_timeout: Duration,
    pub dns_servers: Vec<String>,

    /// Idle timeout while awaiting an SMTP reply; resets on every inbound read.
    pub smtp_timeout: Duration,
    pub connect_timeout: Duration,
    pub smtp_port: u16,
    pub helo_hostname: String,
    pub smtp_sender_email: String,

    /// Local source addresses the pool rotates over.
    pub source_ips: Vec<IpAddr>,
    /// Minimum wall time between consecutive hand-outs of the same source IP.
    pub ip_cooldown: Duration,
    /// Skip remaining probe batches once one batch contains a success.
    pub early_exit: bool,

    /// Number of randomized recipients used by catch-all detection.
    pub catch_all_probes: usize,
    /// TLD suffixes tried, in order, when guessing a domain from a company name.
    pub candidate_tlds: Vec<String>,
    pub max_concurrency: usize,

    pub email_regex: Regex,
    pub loaded_config_path: Option<String>,
}

impl Config {
    fn build_default() -> Self {
        let email_regex_pattern = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b";
        let email_regex = Regex::new(email_regex_pattern)
            .expect("Default email regex pattern failed to compile. This is a bug.");
        let dns_servers = vec![
            "8.8.8.8".to_string(),
            "8.8.4.4".to_string(),
            "1.1.1.1".to_string(),
            "1.0.0.1".to_string(),
        ];
        let candidate_tlds = vec![".com", ".io", ".co", ".net", ".org", ".ai"]
            .into_iter()
            .map(String::from)
            .collect();

        Config {
            dns_timeout: Duration::from_secs(5),
            dns_servers,
            smtp_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            smtp_port: 25,
            helo_hostname: "localhost".to_string(),
            smtp_sender_email: "verify-probe@example.com".to_string(),
            source_ips: vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)],
            ip_cooldown: Duration::from_millis(500),
            early_exit: true,
            catch_all_probes: 3,
            candidate_tlds,
            max_concurrency: std::thread::available_parallelism()
                .map_or(1, |n| n.get())
                .max(1),
            email_regex,
            loaded_config_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::build_default()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("dns_timeout", &self.dns_timeout)
            .field("dns_servers_count", &self.dns_servers.len())
            .field("smtp_timeout", &self.smtp_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("smtp_port", &self.smtp_port)
            .field("helo_hostname", &self.helo_hostname)
            .field("smtp_sender_email", &self.smtp_sender_email)
            .field("source_ips", &self.source_ips)
            .field("ip_cooldown", &self.ip_cooldown)
            .field("early_exit", &self.early_exit)
            .field("catch_all_probes", &self.catch_all_probes)
            .field("candidate_tlds", &self.candidate_tlds)
            .field("max_concurrency", &self.max_concurrency)
            .field("email_regex", &self.email_regex.as_str())
            .field("loaded_config_path", &self.loaded_config_path)
            .finish()
    }
}
