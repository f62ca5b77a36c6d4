//! # Email Prospector CLI
//!
//! Command-line interface for the Email Prospector library (`email_prospector`).
//! This binary parses arguments, sets up configuration, initializes the core
//! verification logic, processes requests (either single or from a file), and
//! handles output.

use email_prospector::{
    check_smtp_connectivity, initialize_prospector, process_requests, verify_single_request,
    Config, ConfigBuilder, EmailProspector, Repositories, VerificationRequest,
};

// Dependencies specific to the CLI binary
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Guesses and verifies professional email addresses.",
    long_about = "Email Prospector combines learned per-company patterns with a static generator, \
                  then confirms candidates against the destination mail server with SMTP RCPT \
                  probes dispatched across a rotating pool of local source IPs."
)]
struct AppArgs {
    /// Path to the input JSON file containing requests (required in file mode).
    #[arg(short, long, default_value = "input.json", env = "EMAIL_PROSPECTOR_INPUT")]
    input: String,

    /// Path to the output JSON file where results will be saved.
    #[arg(
        short,
        long,
        default_value = "results.json",
        env = "EMAIL_PROSPECTOR_OUTPUT"
    )]
    output: String,

    /// First name of the person (enables single request CLI mode).
    #[arg(
        long,
        env = "EMAIL_PROSPECTOR_FIRST_NAME",
        requires = "last_name",
        requires = "company"
    )]
    first_name: Option<String>,

    /// Last name of the person (single request CLI mode).
    #[arg(long, env = "EMAIL_PROSPECTOR_LAST_NAME", requires = "first_name")]
    last_name: Option<String>,

    /// Employer name (single request CLI mode).
    #[arg(long, env = "EMAIL_PROSPECTOR_COMPANY", requires = "first_name")]
    company: Option<String>,

    /// Known domain for the employer; skips domain guessing when provided.
    #[arg(long, env = "EMAIL_PROSPECTOR_DOMAIN", requires = "company")]
    domain: Option<String>,

    /// Output results to standard output instead of a file (only in single request CLI mode).
    #[arg(long, default_value = "false", env = "EMAIL_PROSPECTOR_STDOUT")]
    stdout: bool,

    /// Path to a configuration file (TOML format) to load settings from. CLI args override file settings.
    #[arg(long, env = "EMAIL_PROSPECTOR_CONFIG")]
    config_file: Option<String>,

    /// Maximum number of concurrent request-processing tasks.
    #[arg(short, long, env = "EMAIL_PROSPECTOR_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Sender email address used in MAIL FROM during probes.
    #[arg(long, env = "EMAIL_PROSPECTOR_SMTP_SENDER")]
    smtp_sender: Option<String>,

    /// Hostname announced in HELO.
    #[arg(long, env = "EMAIL_PROSPECTOR_HELO_HOSTNAME")]
    helo_hostname: Option<String>,

    /// SMTP idle reply timeout in seconds.
    #[arg(long, env = "EMAIL_PROSPECTOR_SMTP_TIMEOUT")]
    smtp_timeout: Option<u64>,

    /// TCP connect timeout in seconds.
    #[arg(long, env = "EMAIL_PROSPECTOR_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Destination SMTP port.
    #[arg(long, env = "EMAIL_PROSPECTOR_SMTP_PORT")]
    smtp_port: Option<u16>,

    /// DNS resolution timeout in seconds.
    #[arg(long, env = "EMAIL_PROSPECTOR_DNS_TIMEOUT")]
    dns_timeout: Option<u64>,

    /// Comma-separated list of DNS servers to use for lookups.
    #[arg(long, value_delimiter = ',', env = "EMAIL_PROSPECTOR_DNS_SERVERS")]
    dns_servers: Option<Vec<String>>,

    /// Comma-separated list of local source IPs to rotate outbound probes over.
    #[arg(long, value_delimiter = ',', env = "EMAIL_PROSPECTOR_SOURCE_IPS")]
    source_ips: Option<Vec<String>>,

    /// Per-IP cooldown between probe dispatches, in milliseconds.
    #[arg(long, env = "EMAIL_PROSPECTOR_IP_COOLDOWN_MS")]
    ip_cooldown_ms: Option<u64>,

    /// Keep probing remaining candidates even after a verified hit.
    #[arg(long, action = clap::ArgAction::SetTrue, env = "EMAIL_PROSPECTOR_NO_EARLY_EXIT")]
    no_early_exit: bool,

    /// Number of randomized recipients used for catch-all detection.
    #[arg(long, env = "EMAIL_PROSPECTOR_CATCH_ALL_PROBES")]
    catch_all_probes: Option<usize>,

    /// Skip the startup outbound port 25 connectivity test.
    #[arg(long, action = clap::ArgAction::SetTrue, env = "EMAIL_PROSPECTOR_SKIP_CONNECTIVITY_CHECK")]
    skip_connectivity_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Setting up tracing subscriber failed")?;

    tracing::info!(
        "Email Prospector CLI v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let args = AppArgs::parse();
    tracing::debug!("Parsed CLI arguments: {:?}", args);

    let mut config_builder = ConfigBuilder::new();

    if let Some(ref path) = args.config_file {
        config_builder = config_builder.config_file(path);
    }
    if let Some(c) = args.concurrency {
        config_builder = config_builder.max_concurrency(c);
    }
    if let Some(ref s) = args.smtp_sender {
        config_builder = config_builder.smtp_sender_email(s);
    }
    if let Some(ref h) = args.helo_hostname {
        config_builder = config_builder.helo_hostname(h);
    }
    if let Some(t) = args.smtp_timeout {
        config_builder = config_builder.smtp_timeout(Duration::from_secs(t));
    }
    if let Some(t) = args.connect_timeout {
        config_builder = config_builder.connect_timeout(Duration::from_secs(t));
    }
    if let Some(p) = args.smtp_port {
        config_builder = config_builder.smtp_port(p);
    }
    if let Some(t) = args.dns_timeout {
        config_builder = config_builder.dns_timeout(Duration::from_secs(t));
    }
    if let Some(ref servers) = args.dns_servers {
        if !servers.is_empty() {
            config_builder = config_builder.dns_servers(servers.clone());
        }
    }
    if let Some(ref ips) = args.source_ips {
        if !ips.is_empty() {
            config_builder = config_builder.source_ip_strings(ips.clone());
        }
    }
    if let Some(ms) = args.ip_cooldown_ms {
        config_builder = config_builder.ip_cooldown(Duration::from_millis(ms));
    }
    if args.no_early_exit {
        config_builder = config_builder.early_exit(false);
    }
    if let Some(probes) = args.catch_all_probes {
        config_builder = config_builder.catch_all_probes(probes);
    }

    let config = match config_builder.build() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return Err(anyhow::anyhow!("Failed to build configuration: {}", e));
        }
    };
    tracing::debug!("Effective configuration loaded: {:?}", *config);

    let repos = Repositories::in_memory();
    let prospector = match initialize_prospector(&config, repos).await {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::error!("Initialization error: {}", e);
            return Err(anyhow::anyhow!(
                "Failed to initialize EmailProspector core: {}",
                e
            ));
        }
    };

    if !args.skip_connectivity_check {
        match check_smtp_connectivity().await {
            Ok(_) => tracing::info!(
                "SMTP connectivity test to Google passed (outbound port 25 likely open)."
            ),
            Err(e) => {
                tracing::error!("SMTP connectivity test failed: {}", e);
                tracing::warn!("SMTP verification (port 25) may fail or be unreliable.");
                tracing::warn!("Check firewall rules or ISP restrictions if probes are needed.");
            }
        }
    }

    let is_cli_mode = args.first_name.is_some();
    let start_time = Instant::now();

    let execution_result = if is_cli_mode {
        process_cli_mode(&prospector, &args).await
    } else {
        process_file_mode(config.clone(), prospector, &args).await
    };

    if let Err(e) = execution_result {
        tracing::error!("Execution failed: {}", e);
        return Err(e);
    }

    if !is_cli_mode {
        tracing::info!(
            "Processing finished successfully. Total duration: {:.2?}",
            start_time.elapsed()
        );
    }

    Ok(())
}

async fn process_cli_mode(prospector: &EmailProspector, args: &AppArgs) -> Result<()> {
    tracing::info!("Running in Single Request CLI mode.");

    let request = VerificationRequest {
        first_name: args.first_name.clone(),
        last_name: args.last_name.clone(),
        company: args.company.clone(),
        domain: args.domain.clone(),
        ..Default::default()
    };

    let result = verify_single_request(prospector, request).await;

    if let Some(ref reason) = result.skip_reason {
        return Err(anyhow::anyhow!("Request rejected: {}", reason));
    }
    if let Some(ref error) = result.error {
        return Err(anyhow::anyhow!("Verification failed: {}", error));
    }

    let rendered = serde_json::to_string_pretty(&result)
        .context("Failed to serialize result to JSON")?;

    if args.stdout {
        println!("{}", rendered);
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("Failed to create output file: {}", args.output))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &result)
            .context("Failed to write result JSON")?;
        tracing::info!("Result written to {}", args.output);
    }

    if let Some(report) = result.report {
        if report.success {
            tracing::info!(
                "Verified: {} (source {})",
                report.verified_emails[0].email,
                report.verified_emails[0].source_ip
            );
        } else if report.metadata.is_catch_all == Some(true) {
            tracing::warn!(
                "Domain {} is a catch-all; recipient could not be confirmed.",
                report.metadata.domain
            );
        } else {
            tracing::warn!(
                "No address verified after {} probe(s).",
                report.total_patterns_tested
            );
        }
    }

    Ok(())
}

async fn process_file_mode(
    config: Arc<Config>,
    prospector: Arc<EmailProspector>,
    args: &AppArgs,
) -> Result<()> {
    tracing::info!("Running in File mode. Input: {}", args.input);

    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open input file: {}", args.input))?;
    let requests: Vec<VerificationRequest> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON requests from {}", args.input))?;

    let total = requests.len();
    tracing::info!("Loaded {} request(s) from {}", total, args.input);

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Invalid progress bar template")?,
    );
    progress.set_message(format!(
        "Verifying {} request(s) with up to {} in flight...",
        total, config.max_concurrency
    ));
    progress.enable_steady_tick(Duration::from_millis(120));

    let results = process_requests(config.clone(), prospector, requests).await;
    progress.finish_with_message(format!("Processed {} request(s)", results.len()));

    let verified = results
        .iter()
        .filter(|r| r.report.as_ref().is_some_and(|rep| rep.success))
        .count();
    let skipped = results.iter().filter(|r| r.skipped).count();
    let errored = results.iter().filter(|r| r.error.is_some()).count();
    tracing::info!(
        "Processed {} request(s): {} verified, {} skipped, {} errored.",
        results.len(),
        verified,
        skipped,
        errored
    );

    let out_file = File::create(&args.output)
        .with_context(|| format!("Failed to create output file: {}", args.output))?;
    serde_json::to_writer_pretty(BufWriter::new(out_file), &results)
        .context("Failed to write results JSON")?;
    tracing::info!("Results written to {}", args.output);

    Ok(())
}
