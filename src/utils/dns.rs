//! DNS utilities: resolver construction, MX lookup, and company-name domain
//! guessing.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};

use std::net::SocketAddr;
use trust_dns_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;
use url::Url;

/// One mail exchanger for a domain. Lower priority is preferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailServer {
    pub exchange: String,
    pub priority: u16,
}

/// Builds the shared DNS resolver from the configured upstream servers.
pub(crate) async fn create_resolver(config: &Config) -> Result<TokioAsyncResolver> {
    let mut resolver_config = ResolverConfig::new();
    for server in &config.dns_servers {
        let addr: SocketAddr = format!("{}:53", server.trim())
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid DNS server '{}': {}", server, e)))?;
        resolver_config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
    }

    let mut opts = ResolverOpts::default();
    opts.timeout = config.dns_timeout;

    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}

/// Resolves the MX set for `domain`, sorted ascending by priority.
///
/// An empty record set fails with [`AppError::NoMxRecord`]; other DNS
/// failures surface as [`AppError::Verification`] carrying the cause.
pub(crate) async fn resolve_mx(
    resolver: &TokioAsyncResolver,
    domain: &str,
) -> Result<Vec<MailServer>> {
    tracing::debug!(target: "dns_task", "Resolving MX records for {}...", domain);
    match resolver.mx_lookup(domain).await {
        Ok(lookup) => {
            let mut servers: Vec<MailServer> = lookup
                .iter()
                .map(|mx| MailServer {
                    exchange: normalize_exchange(mx.exchange().to_utf8()),
                    priority: mx.preference(),
                })
                .collect();
            servers.sort_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| a.exchange.cmp(&b.exchange))
            });
            servers.dedup_by(|a, b| a.exchange == b.exchange);

            if servers.is_empty() {
                tracing::warn!(target: "dns_task", "MX lookup for {} returned no records", domain);
                return Err(AppError::NoMxRecord(domain.to_string()));
            }
            tracing::debug!(target: "dns_task",
                "Found {} MX record(s) for {}, primary: {}",
                servers.len(), domain, servers[0].exchange);
            Ok(servers)
        }
        Err(e) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => {
                tracing::warn!(target: "dns_task", "No MX records found for {} ({})", domain, e);
                Err(AppError::NoMxRecord(domain.to_string()))
            }
            _ => Err(AppError::Verification(format!(
                "DNS MX lookup failed for {}: {}",
                domain, e
            ))),
        },
    }
}

/// Guesses a company's domain by slugifying its name and sweeping the
/// configured TLD suffixes in order, stopping at the first candidate that
/// publishes MX records.
pub(crate) async fn guess_domain(
    resolver: &TokioAsyncResolver,
    company_name: &str,
    config: &Config,
) -> Result<String> {
    let slug = slugify_company(company_name);
    if slug.is_empty() {
        return Err(AppError::DomainUnknown(company_name.to_string()));
    }

    for tld in &config.candidate_tlds {
        let candidate = format!("{}{}", slug, tld);
        tracing::debug!(target: "dns_task",
            "Trying candidate domain {} for company '{}'", candidate, company_name);
        match resolve_mx(resolver, &candidate).await {
            Ok(_) => {
                tracing::info!(target: "dns_task",
                    "Guessed domain {} for company '{}'", candidate, company_name);
                return Ok(candidate);
            }
            Err(e) => {
                tracing::trace!(target: "dns_task",
                    "Candidate {} has no usable MX: {}", candidate, e);
            }
        }
    }

    tracing::warn!(target: "dns_task",
        "No candidate domain with MX records for company '{}'", company_name);
    Err(AppError::DomainUnknown(company_name.to_string()))
}

/// Normalizes a user-provided domain or URL into a bare lowercase domain.
///
/// Accepts `example.com`, `www.example.com`, and full URLs; strips scheme,
/// `www.` prefix, path and port.
pub(crate) fn normalize_domain(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::DomainExtraction(
            "Input string is empty".to_string(),
        ));
    }

    let host = if trimmed.contains("://") || trimmed.contains('/') || trimmed.contains(':') {
        let url_str = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };
        let url = Url::parse(&url_str)
            .map_err(|e| AppError::DomainExtraction(format!("Cannot parse '{}': {}", trimmed, e)))?;
        url.host_str()
            .ok_or_else(|| {
                AppError::DomainExtraction(format!("No host component in '{}'", trimmed))
            })?
            .to_string()
    } else {
        trimmed.to_string()
    };

    let host = host.to_ascii_lowercase();
    let domain = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(AppError::DomainExtraction(format!(
            "Extracted domain appears invalid: {}",
            domain
        )));
    }
    Ok(domain)
}

const LEGAL_SUFFIXES: [&str; 16] = [
    "inc",
    "llc",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "company",
    "gmbh",
    "plc",
    "sa",
    "srl",
    "pty",
    "ag",
    "group",
    "holdings",
];

/// Reduces a company name to a domain-label slug: ASCII-lowercased
/// alphanumerics with whitespace, punctuation and trailing legal suffixes
/// removed.
pub(crate) fn slugify_company(name: &str) -> String {
    let mut tokens: Vec<String> = name
        .split(|c: char| c.is_whitespace() || c == ',' || c == '.' || c == '&' || c == '-')
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect();

    while let Some(last) = tokens.last() {
        if tokens.len() > 1 && LEGAL_SUFFIXES.contains(&last.as_str()) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.concat()
}

pub(crate) fn normalize_exchange(exchange: String) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}
