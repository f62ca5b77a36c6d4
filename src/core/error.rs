//! Defines the custom error types for the email-prospector application.

use std::{io, net::AddrParseError};
use thiserror::Error;

/// The primary error type for the verification process.
///
/// Per-probe outcomes are NOT errors: a rejected or timed-out probe is data
/// (see [`crate::core::models::ProbeResult`]) and is collected, never thrown.
/// `AppError` covers the failures that abort a whole request.
#[derive(Error, Debug)]
pub enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error initializing necessary components (e.g., resolver, pool).
    #[error("Initialization Error: {0}")]
    Initialization(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error during DNS resolution.
    #[error("DNS Resolution Error: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    /// The domain resolved but publishes no MX records.
    #[error("No MX records for domain: {0}")]
    NoMxRecord(String),

    /// No candidate domain for the company name produced an MX record.
    #[error("Could not determine a domain for company: {0}")]
    DomainUnknown(String),

    /// Error parsing an IP address or socket address.
    #[error("Address Parsing Error: {0}")]
    AddrParse(#[from] AddrParseError),

    /// Indicates insufficient input data to proceed (e.g., missing name).
    #[error("Insufficient Input Data: {0}")]
    InsufficientInput(String),

    /// Failed to extract a usable domain from the provided input.
    #[error("Failed to extract domain from input: {0}")]
    DomainExtraction(String),

    /// A repository operation failed.
    #[error("Storage Error: {0}")]
    Storage(String),

    /// An unexpected failure inside the verification pipeline, carrying the
    /// underlying cause.
    #[error("Verification Error: {0}")]
    Verification(String),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
