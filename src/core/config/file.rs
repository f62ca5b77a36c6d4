//! Defines the structure mirroring the TOML configuration file format.

use serde::Deserialize;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub(crate) dns: DnsConfig,
    #[serde(default)]
    pub(crate) smtp: SmtpConfig,
    #[serde(default)]
    pub(crate) pool: PoolConfig,
    #[serde(default)]
    pub(crate) verification: VerificationConfig,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct DnsConfig {
    pub(crate) dns_timeout: Option<u64>,
    pub(crate) dns_servers: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct SmtpConfig {
    pub(crate) smtp_timeout: Option<u64>,
    pub(crate) connect_timeout: Option<u64>,
    pub(crate) smtp_port: Option<u16>,
    pub(crate) helo_hostname: Option<String>,
    pub(crate) smtp_sender_email: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct PoolConfig {
    pub(crate) source_ips: Option<Vec<String>>,
    pub(crate) ip_cooldown_ms: Option<u64>,
    pub(crate) early_exit: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct VerificationConfig {
    pub(crate) catch_all_probes: Option<usize>,
    pub(crate) candidate_tlds: Option<Vec<String>>,
    pub(crate) max_concurrency: Option<usize>,
}
