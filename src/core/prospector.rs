use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::{
    Company, Person, ProbeRecord, ReportMetadata, ValidatedRequest, VerificationReport,
    VerifiedEmail,
};
use crate::storage::Repositories;
use crate::utils::dns::{create_resolver, guess_domain, normalize_domain, resolve_mx};
use crate::utils::patterns::{derive, rank_candidates, Derived};
use crate::utils::pool::{BatchOutcome, IpPool};
use crate::utils::smtp::{ProbeReason, ProbeResult, SmtpProber};
use crate::verification::CatchAllDetector;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use trust_dns_resolver::TokioAsyncResolver;
use uuid::Uuid;

/// The main struct orchestrating the email guessing and verification process.
#[derive(Clone)]
pub struct EmailProspector {
    config: Arc<Config>,
    dns_resolver: Arc<TokioAsyncResolver>,
    prober: SmtpProber,
    pool: Arc<IpPool>,
    catch_all: CatchAllDetector,
    repos: Repositories,
}

impl EmailProspector {
    /// Creates a new EmailProspector instance.
    pub(crate) async fn new(config: &Config, repos: Repositories) -> Result<Self> {
        tracing::debug!("Initializing EmailProspector components...");
        let dns_resolver = Arc::new(create_resolver(config).await?);
        tracing::debug!("DNS resolver initialized.");

        let shared_config = Arc::new(config.clone());
        let prober = SmtpProber::new(shared_config.clone());
        let pool = Arc::new(IpPool::new(
            config.source_ips.clone(),
            config.ip_cooldown,
            config.early_exit,
        ));
        tracing::debug!("IP pool initialized with {} source(s).", pool.width());

        let catch_all = CatchAllDetector::new(
            shared_config.clone(),
            repos.catch_all.clone(),
            repos.company.clone(),
        );

        tracing::info!("EmailProspector initialized successfully.");
        Ok(Self {
            config: shared_config,
            dns_resolver,
            prober,
            pool,
            catch_all,
            repos,
        })
    }

    /// Runs the full verification flow for one validated request.
    pub(crate) async fn verify(&self, request: &ValidatedRequest) -> Result<VerificationReport> {
        let task_label = format!(
            "{} {} @ {}",
            request.first_name, request.last_name, request.company
        );
        tracing::info!(target: "verify_task", "[{}] Starting verification", task_label);
        let start_time = Instant::now();

        // 1. Domain.
        let domain = self.resolve_domain(request).await?;
        tracing::info!(target: "verify_task", "[{}] Using domain {}", task_label, domain);

        // 2. Catch-all pre-check: respond before any DNS or TCP work.
        if self.catch_all.is_known(&domain) {
            tracing::info!(target: "catchall",
                "[{}] Domain {} is a known catch-all (detection_method=database_lookup), skipping probes",
                task_label, domain);
            return Ok(self.build_report(request, &domain, &[], true, start_time));
        }

        // 3. Company upsert.
        let company = self.find_or_create_company(&request.company, &domain)?;

        // 4. MX lookup. Only the primary exchange is probed.
        let mail_servers = resolve_mx(&self.dns_resolver, &domain).await?;
        let exchange = mail_servers[0].exchange.clone();

        // 5. Rank candidates.
        let candidates = rank_candidates(
            &company.verified_patterns,
            &request.first_name,
            &request.last_name,
            &domain,
        );
        let emails: Vec<String> = candidates
            .iter()
            .map(|c| c.email.clone())
            .filter(|email| self.config.email_regex.is_match(email))
            .collect();
        if emails.is_empty() {
            return Err(AppError::InsufficientInput(format!(
                "No probe candidates could be generated for '{}'",
                task_label
            )));
        }
        tracing::info!(target: "verify_task",
            "[{}] {} candidate(s) ranked for probing via {}", task_label, emails.len(), exchange);

        // 6. Batch probe through the pool.
        let prober = self.prober.clone();
        let probe_exchange = exchange.clone();
        let BatchOutcome {
            mut results,
            found_valid,
        } = self
            .pool
            .verify_batch(&emails, move |email, source_ip| {
                let prober = prober.clone();
                let exchange = probe_exchange.clone();
                async move { prober.probe(&email, &exchange, source_ip).await }
            })
            .await;

        self.record_block_events(&task_label, &exchange, &results);

        // 7. Post-success catch-all probe, exactly once per request.
        let mut is_catch_all = false;
        if found_valid {
            is_catch_all = self
                .catch_all
                .detect(&domain, &exchange, &self.pool, &self.prober)
                .await;
            if is_catch_all {
                tracing::info!(target: "verify_task",
                    "[{}] Positive result demoted: {} is a catch-all domain", task_label, domain);
                for result in results.iter_mut().filter(|r| r.valid) {
                    result.valid = false;
                    result.reason = Some(ProbeReason::CatchAllDomain);
                }
            }
        }
        let success = found_valid && !is_catch_all;

        // 8. Learn patterns from every remaining positive.
        if success {
            self.learn_patterns(&task_label, &company, request, &results);
        }

        // 9. Persist the person with full probe history.
        let verified_email = results.iter().find(|r| r.valid).map(|r| r.email.clone());
        self.persist_person(request, &domain, verified_email, &results)?;

        // 10. Respond.
        let report = self.build_report(request, &domain, &results, is_catch_all, start_time);
        tracing::info!(target: "verify_task",
            "[{}] Verification finished in {:.2?}: success={}, probes={}",
            task_label, start_time.elapsed(), report.success, report.total_patterns_tested);
        if report.success {
            tracing::info!(target: "success",
                "[{}] Verified {} (probed {} candidate(s))",
                task_label,
                report.verified_emails.first().map(|v| v.email.as_str()).unwrap_or("?"),
                report.total_patterns_tested);
        }
        Ok(report)
    }

    /// Resolves the working domain: provided > known company > MX-bounded guess.
    async fn resolve_domain(&self, request: &ValidatedRequest) -> Result<String> {
        if let Some(ref provided) = request.domain {
            return normalize_domain(provided);
        }
        if let Some(company) = self.repos.company.find_by_name(&request.company) {
            tracing::debug!(target: "verify_task",
                "Known company '{}' maps to domain {}", request.company, company.domain);
            return Ok(company.domain);
        }
        guess_domain(&self.dns_resolver, &request.company, &self.config).await
    }

    fn find_or_create_company(&self, name: &str, domain: &str) -> Result<Company> {
        if let Some(company) = self.repos.company.find_by_name_or_domain(name, domain) {
            return Ok(company);
        }
        tracing::debug!(target: "verify_task", "Creating company '{}' ({})", name, domain);
        self.repos.company.upsert(Company::new(name, domain))
    }

    fn record_block_events(&self, task_label: &str, exchange: &str, results: &[ProbeResult]) {
        for result in results.iter().filter(|r| r.block_signal) {
            let source = result
                .source_ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            tracing::warn!(target: "blocked_ips",
                "[{}] Block signal from {} while probing <{}> via source {}: {}",
                task_label, exchange, result.email, source,
                result.details.as_deref().unwrap_or("no details"));
        }
    }

    /// Maps every positive back to its template and bumps the per-company and
    /// global counters. Writes happen after probing, order among positives
    /// unspecified.
    fn learn_patterns(
        &self,
        task_label: &str,
        company: &Company,
        request: &ValidatedRequest,
        results: &[ProbeResult],
    ) {
        for result in results.iter().filter(|r| r.valid) {
            match derive(&result.email, &request.first_name, &request.last_name) {
                Derived::Template(template) => {
                    if let Err(e) = self.repos.company.bump_pattern(company.id, template) {
                        tracing::error!(target: "verify_task",
                            "[{}] Failed to bump company pattern {}: {}", task_label, template, e);
                    }
                    if let Err(e) = self.repos.pattern.bump_global(template) {
                        tracing::error!(target: "verify_task",
                            "[{}] Failed to bump global pattern {}: {}", task_label, template, e);
                    }
                    tracing::debug!(target: "verify_task",
                        "[{}] Learned pattern {} from {}", task_label, template, result.email);
                }
                Derived::Raw(local) => {
                    tracing::debug!(target: "verify_task",
                        "[{}] Local part '{}' matches no template, not learnable", task_label, local);
                }
            }
        }
    }

    fn persist_person(
        &self,
        request: &ValidatedRequest,
        domain: &str,
        verified_email: Option<String>,
        results: &[ProbeResult],
    ) -> Result<()> {
        let email_verified_at = verified_email.as_ref().map(|_| Utc::now());
        let draft = Person {
            id: Uuid::new_v4(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            company: request.company.clone(),
            domain: domain.to_string(),
            verified_email,
            email_verified_at,
            all_tested_emails: results.iter().map(ProbeRecord::from).collect(),
            extra: biographical_extra(request),
        };
        self.repos.person.upsert_with_history(draft)?;
        Ok(())
    }

    fn build_report(
        &self,
        request: &ValidatedRequest,
        domain: &str,
        results: &[ProbeResult],
        is_catch_all: bool,
        start_time: Instant,
    ) -> VerificationReport {
        let verified_emails: Vec<VerifiedEmail> = results
            .iter()
            .filter(|r| r.valid)
            .map(|r| VerifiedEmail {
                email: r.email.clone(),
                source_ip: r
                    .source_ip
                    .map(|ip| ip.to_string())
                    .unwrap_or_default(),
            })
            .collect();
        let patterns_tested_before_valid = results.iter().position(|r| r.valid);

        VerificationReport {
            success: !verified_emails.is_empty(),
            verified_emails,
            total_patterns_tested: results.len(),
            patterns_tested_before_valid,
            metadata: ReportMetadata {
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                company: request.company.clone(),
                domain: domain.to_string(),
                is_catch_all: if is_catch_all { Some(true) } else { None },
            },
            time_taken: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Collects the biographical pass-through fields into the person's extra map.
fn biographical_extra(request: &ValidatedRequest) -> HashMap<String, serde_json::Value> {
    let original = &request.original_request;
    let mut extra = original.other_fields.clone();
    if let Some(ref v) = original.current_position {
        extra.insert("currentPosition".to_string(), serde_json::json!(v));
    }
    if let Some(ref v) = original.phone {
        extra.insert("phone".to_string(), serde_json::json!(v));
    }
    if let Some(ref v) = original.educational_institute {
        extra.insert("educationalInstitute".to_string(), serde_json::json!(v));
    }
    if let Some(ref v) = original.previous_companies {
        extra.insert("previousCompanies".to_string(), serde_json::json!(v));
    }
    if let Some(ref v) = original.qualifications {
        extra.insert("qualifications".to_string(), serde_json::json!(v));
    }
    extra
}
