//! # Email Prospector Core Library
//!
//! This crate guesses a person's work email address from their name and
//! employer, then confirms the guess by probing the destination mail server
//! via SMTP before any message data is sent.
//!
//! It is designed to be used either directly as a library or via the
//! `email-prospector` command-line tool (which uses this library).

mod core;
mod storage;
mod utils;
mod verification;

pub use crate::core::config::{Config, ConfigBuilder, ConfigFile};
pub use crate::core::error::{AppError, Result};
pub use crate::core::models::{
    CatchAllDomain, Company, PatternGlobal, Person, ProbeRecord, ProcessingResult,
    ReportMetadata, ValidatedRequest, VerificationReport, VerificationRequest, VerifiedEmail,
    VerifiedPattern,
};
pub use crate::core::prospector::EmailProspector;
pub use crate::storage::{
    CatchAllRepository, CompanyRepository, InMemoryStore, PatternRepository, PersonRepository,
    Repositories,
};
pub use crate::utils::patterns::{
    derive, expand, rank_candidates, Candidate, Derived, PATTERN_TEMPLATES,
};
pub use crate::utils::pool::{BatchOutcome, IpPool};
pub use crate::utils::smtp::{ProbeReason, ProbeResult, SmtpProber};
pub use crate::verification::CatchAllDetector;

use crate::utils::smtp::test_smtp_connectivity;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;

/// Initializes shared resources like the DNS resolver and source-IP pool.
/// Essential for creating an `EmailProspector` instance.
pub async fn initialize_prospector(config: &Config, repos: Repositories) -> Result<EmailProspector> {
    EmailProspector::new(config, repos).await
}

/// Performs an early check for outbound SMTP connectivity.
pub async fn check_smtp_connectivity() -> Result<()> {
    test_smtp_connectivity().await
}

/// Processes a single request to find and verify an email address.
///
/// This function encapsulates the validation, verification, and result
/// packaging for one input `VerificationRequest`.
pub async fn verify_single_request(
    prospector: &EmailProspector,
    request: VerificationRequest,
) -> ProcessingResult {
    let task_id = format!(
        "Request: {} {} / {}",
        request.first_name.as_deref().unwrap_or("N/A"),
        request.last_name.as_deref().unwrap_or("N/A"),
        request.company.as_deref().unwrap_or("N/A")
    );
    tracing::info!(target: "verify_single_request", "[{}] Starting processing.", task_id);

    let validated = match validate_request_input(&request) {
        Ok(validated) => validated,
        Err(reason) => {
            tracing::warn!(target: "verify_single_request", "[{}] Skipping record. Reason: {}", task_id, reason);
            return ProcessingResult::skipped(request, reason);
        }
    };

    tracing::debug!(target: "verify_single_request", "[{}] Request validated, proceeding to verify.", task_id);

    match prospector.verify(&validated).await {
        Ok(report) => {
            if report.success {
                tracing::info!(target: "verify_single_request",
                    "[{}] Verified email: {} ({} pattern(s) tested)",
                    task_id,
                    report.verified_emails.first().map(|v| v.email.as_str()).unwrap_or("?"),
                    report.total_patterns_tested
                );
            } else {
                tracing::info!(target: "verify_single_request",
                    "[{}] No email could be verified ({} pattern(s) tested).",
                    task_id, report.total_patterns_tested);
            }
            tracing::info!(target: "verify_single_request", "[{}] Finished processing.", task_id);
            ProcessingResult::success(request, report)
        }
        Err(e) => {
            tracing::error!(target: "verify_single_request",
                "[{}] !!! Error during verification: {}", task_id, e);
            ProcessingResult::error(request, format!("Verification error: {}", e))
        }
    }
}

/// Processes a batch of requests with bounded concurrency.
///
/// # Arguments
/// * `config` - The application configuration.
/// * `prospector` - An Arc-wrapped, initialized `EmailProspector` for sharing.
/// * `requests` - A vector of input `VerificationRequest` records.
///
/// # Returns
/// * `Vec<ProcessingResult>` containing outcomes for all input requests.
pub async fn process_requests(
    config: Arc<Config>,
    prospector: Arc<EmailProspector>,
    requests: Vec<VerificationRequest>,
) -> Vec<ProcessingResult> {
    let total_records = requests.len();
    if total_records == 0 {
        return Vec::new();
    }

    let mut tasks = FuturesUnordered::new();
    let mut results = Vec::with_capacity(total_records);

    for request in requests {
        if let Err(reason) = validate_request_input(&request) {
            results.push(ProcessingResult::skipped(request, reason));
            continue;
        }

        while tasks.len() >= config.max_concurrency {
            if let Some(join_handle_result) = tasks.next().await {
                match join_handle_result {
                    Ok(processing_result) => {
                        results.push(processing_result);
                    }
                    Err(e) => {
                        tracing::error!("A processing task failed to join: {}", e);
                    }
                }
            } else {
                tracing::warn!("Task queue unexpectedly empty while limiting concurrency.");
                break;
            }
        }

        let prospector_clone = Arc::clone(&prospector);
        tasks.push(tokio::spawn(async move {
            verify_single_request(&prospector_clone, request).await
        }));
    }

    while let Some(join_handle_result) = tasks.next().await {
        match join_handle_result {
            Ok(processing_result) => {
                results.push(processing_result);
            }
            Err(e) => {
                tracing::error!("A processing task failed to join during final drain: {}", e);
            }
        }
    }

    results
}

/// Checks the mandatory request fields: first name, last name and company
/// must be present with at least 2 characters each after trimming.
pub fn validate_request_input(
    request: &VerificationRequest,
) -> std::result::Result<ValidatedRequest, String> {
    let first_name = request.first_name.as_deref().unwrap_or("").trim().to_string();
    let last_name = request.last_name.as_deref().unwrap_or("").trim().to_string();
    let company = request.company.as_deref().unwrap_or("").trim().to_string();

    let mut invalid_parts = Vec::new();
    if first_name.chars().count() < 2 {
        invalid_parts.push("first name");
    }
    if last_name.chars().count() < 2 {
        invalid_parts.push("last name");
    }
    if company.chars().count() < 2 {
        invalid_parts.push("company");
    }
    if !invalid_parts.is_empty() {
        return Err(format!(
            "Missing or too short (min 2 chars): {}",
            invalid_parts.join(", ")
        ));
    }

    let domain = request
        .domain
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from);

    Ok(ValidatedRequest {
        first_name,
        last_name,
        company,
        domain,
        original_request: request.clone(),
    })
}

impl ProcessingResult {
    fn skipped(request: VerificationRequest, reason: String) -> Self {
        Self {
            request_input: request,
            report: None,
            skipped: true,
            skip_reason: Some(reason),
            error: None,
        }
    }

    fn error(request: VerificationRequest, error_msg: String) -> Self {
        Self {
            request_input: request,
            report: None,
            skipped: false,
            skip_reason: None,
            error: Some(error_msg),
        }
    }

    fn success(request: VerificationRequest, report: VerificationReport) -> Self {
        Self {
            request_input: request,
            report: Some(report),
            skipped: false,
            skip_reason: None,
            error: None,
        }
    }
}
