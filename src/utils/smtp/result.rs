//! Defines the verdict types for SMTP recipient probes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Terminal classification for one probe. Never retried inside a probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeReason {
    NoMxRecord,
    Timeout,
    ConnectionError,
    InvalidRecipient,
    FullMailbox,
    UnknownError,
    CatchAllDomain,
    VerificationError,
    DomainUnknown,
}

impl fmt::Display for ProbeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoMxRecord => "NO_MX_RECORD",
            Self::Timeout => "TIMEOUT",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::InvalidRecipient => "INVALID_RECIPIENT",
            Self::FullMailbox => "FULL_MAILBOX",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::CatchAllDomain => "CATCH_ALL_DOMAIN",
            Self::VerificationError => "VERIFICATION_ERROR",
            Self::DomainUnknown => "DOMAIN_UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Substrings whose presence in server text (or transport-error text) marks
/// the source IP as possibly blocked by the destination. Matching is done on
/// the lowercased form.
const BLOCK_SIGNALS: [&str; 8] = [
    "blocked",
    "blacklisted",
    "banned",
    "denied",
    "rejected",
    "spam",
    "authentication required",
    "connection refused",
];

/// Scans inbound text for provider block signals.
pub(crate) fn contains_block_signal(text: &str) -> bool {
    let lower = text.to_lowercase();
    BLOCK_SIGNALS.iter().any(|sig| lower.contains(sig))
}

/// The outcome of a single SMTP recipient probe.
///
/// `reason` is always present when `valid` is false. `block_signal` is a
/// side-band flag: it never changes `valid`, it only tells the orchestrator
/// to record a per-IP block event.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub email: String,
    pub valid: bool,
    pub reason: Option<ProbeReason>,
    pub details: Option<String>,
    pub source_ip: Option<IpAddr>,
    pub block_signal: bool,
    pub duration: Duration,
}

impl ProbeResult {
    /// The server accepted RCPT TO for this address.
    pub fn accepted(email: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            valid: true,
            reason: None,
            details: Some(details.into()),
            source_ip: None,
            block_signal: false,
            duration: Duration::ZERO,
        }
    }

    /// The probe terminated without acceptance, for the given reason.
    pub fn rejected(
        email: impl Into<String>,
        reason: ProbeReason,
        details: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            valid: false,
            reason: Some(reason),
            details: Some(details.into()),
            source_ip: None,
            block_signal: false,
            duration: Duration::ZERO,
        }
    }
}
