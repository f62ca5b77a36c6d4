//! Catch-all domain detection: a persistent deny-list consulted first, and a
//! randomized recipient probe for fresh verdicts.

use crate::core::config::Config;
use crate::storage::{CatchAllRepository, CompanyRepository};
use crate::utils::pool::IpPool;
use crate::utils::smtp::SmtpProber;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

/// Detects domains whose mail servers accept any recipient.
#[derive(Clone)]
pub struct CatchAllDetector {
    config: Arc<Config>,
    catch_all_repo: Arc<dyn CatchAllRepository>,
    company_repo: Arc<dyn CompanyRepository>,
}

impl CatchAllDetector {
    pub fn new(
        config: Arc<Config>,
        catch_all_repo: Arc<dyn CatchAllRepository>,
        company_repo: Arc<dyn CompanyRepository>,
    ) -> Self {
        Self {
            config,
            catch_all_repo,
            company_repo,
        }
    }

    /// Repository lookup; presence means every probe to this domain is
    /// short-circuited.
    pub fn is_known(&self, domain: &str) -> bool {
        self.catch_all_repo.find(domain).is_some()
    }

    /// Probes randomized recipients that cannot plausibly exist and records a
    /// catch-all verdict when a majority of them is accepted.
    ///
    /// This is a weak signal (a greylisting server can accept-then-bounce),
    /// so the verdict keeps its `verification_attempts` count for later
    /// calibration. All random probes run, regardless of early-exit policy.
    pub async fn detect(
        &self,
        domain: &str,
        exchange: &str,
        pool: &IpPool,
        prober: &SmtpProber,
    ) -> bool {
        let recipients = random_probe_recipients(domain, self.config.catch_all_probes);
        tracing::debug!(target: "catchall",
            "Probing {} randomized recipient(s) against {} for {}",
            recipients.len(), exchange, domain);

        let probes = recipients.iter().map(|email| async {
            let source_ip = pool.acquire().await;
            prober.probe(email, exchange, source_ip).await
        });
        let results = futures::future::join_all(probes).await;

        let accepted = results.iter().filter(|r| r.valid).count();
        let majority = self.config.catch_all_probes / 2 + 1;
        let is_catch_all = accepted >= majority;

        if is_catch_all {
            tracing::warn!(target: "catchall",
                "Domain {} accepted {}/{} random recipients via {}, marking as catch-all",
                domain, accepted, results.len(), exchange);
            if let Err(e) = self.catch_all_repo.upsert(domain) {
                tracing::error!(target: "catchall",
                    "Failed to persist catch-all verdict for {}: {}", domain, e);
            }
            if let Err(e) = self.company_repo.set_catch_all(domain) {
                tracing::error!(target: "catchall",
                    "Failed to flag companies for catch-all domain {}: {}", domain, e);
            }
        } else {
            tracing::debug!(target: "catchall",
                "Domain {} rejected {}/{} random recipients, not a catch-all",
                domain, results.len() - accepted, results.len());
        }

        is_catch_all
    }
}

/// Builds local-parts that cannot plausibly exist: a random alphanumeric run
/// plus a millisecond-timestamp component.
pub(crate) fn random_probe_recipients(domain: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            let noise: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(12)
                .map(char::from)
                .collect::<String>()
                .to_lowercase();
            format!(
                "no-reply-does-not-exist-{}-{:x}@{}",
                noise,
                Utc::now().timestamp_millis(),
                domain
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_recipients_shape() {
        let recipients = random_probe_recipients("example.com", 3);
        assert_eq!(recipients.len(), 3);
        for recipient in &recipients {
            assert!(recipient.starts_with("no-reply-does-not-exist-"));
            assert!(recipient.ends_with("@example.com"));
        }
    }

    #[test]
    fn test_random_recipients_are_distinct() {
        let recipients: HashSet<String> = random_probe_recipients("example.com", 5)
            .into_iter()
            .collect();
        assert_eq!(recipients.len(), 5);
    }
}
