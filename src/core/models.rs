//! Core data structures: persisted entities, request/report types, and the
//! per-probe history record.

use crate::utils::smtp::{ProbeReason, ProbeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A single incoming verification request.
///
/// `first_name`, `last_name` and `company` are required (validated in
/// [`crate::validate_request_input`]); everything else is optional and the
/// biographical fields are passed through to the stored [`Person`] untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub educational_institute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_companies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifications: Option<Vec<String>>,
    /// Any fields not explicitly modelled are preserved for round-tripping.
    #[serde(flatten)]
    pub other_fields: HashMap<String, serde_json::Value>,
}

/// A request whose mandatory fields have been checked and trimmed.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub domain: Option<String>,
    pub original_request: VerificationRequest,
}

/// One verified address together with the source IP that confirmed it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedEmail {
    pub email: String,
    pub source_ip: String,
}

/// Request-level metadata echoed back in every report.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_catch_all: Option<bool>,
}

/// The outcome of one verification request.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub success: bool,
    pub verified_emails: Vec<VerifiedEmail>,
    pub total_patterns_tested: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns_tested_before_valid: Option<usize>,
    pub metadata: ReportMetadata,
    /// Elapsed wall time for the whole request, in milliseconds.
    pub time_taken: u64,
}

/// A learned pattern template with its usage bookkeeping.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPattern {
    pub template: String,
    pub usage_count: u32,
    pub last_verified: DateTime<Utc>,
}

/// A company and its learned address patterns.
///
/// `name` carries a case-insensitive uniqueness constraint in the store;
/// `verified_patterns` holds exactly one entry per template.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub domain: String,
    pub is_catch_all: bool,
    pub verified_patterns: Vec<VerifiedPattern>,
}

impl Company {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            domain: domain.into(),
            is_catch_all: false,
            verified_patterns: Vec::new(),
        }
    }
}

/// Global (cross-company) usage counter for a pattern template.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PatternGlobal {
    pub template: String,
    pub usage_count: u32,
}

/// One entry in a person's append-only probe history.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProbeRecord {
    pub email: String,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ProbeReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub tested_at: DateTime<Utc>,
}

impl From<&ProbeResult> for ProbeRecord {
    fn from(result: &ProbeResult) -> Self {
        Self {
            email: result.email.clone(),
            valid: result.valid,
            reason: result.reason,
            details: result.details.clone(),
            tested_at: Utc::now(),
        }
    }
}

/// A person keyed by (first name, last name, company), case-insensitively.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Person {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub domain: String,
    pub verified_email: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub all_tested_emails: Vec<ProbeRecord>,
    /// Biographical pass-through from the original request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A domain whose mail server accepts any local-part.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CatchAllDomain {
    pub domain: String,
    pub verification_attempts: u32,
    pub last_verified: DateTime<Utc>,
}

/// The packaged outcome of processing one request: the report on success, a
/// skip reason when validation failed, or an error message.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub request_input: VerificationRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<VerificationReport>,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
