//! End-to-end probe scenarios against a scripted local SMTP listener.

use email_prospector::{
    rank_candidates, CatchAllDetector, Config, ConfigBuilder, IpPool, ProbeReason, Repositories,
    SmtpProber,
};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Spawns a minimal SMTP server that accepts RCPT TO only for the listed
/// recipients (or for everyone when `accept_all` is set).
async fn spawn_stub_server(accept: Vec<String>, accept_all: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind stub SMTP listener");
    let addr = listener.local_addr().expect("stub listener has no address");

    tokio::spawn(async move {
        loop {
            let Ok((stream, _peer)) = listener.accept().await else {
                break;
            };
            let accept = accept.clone();
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();

                if write_half
                    .write_all(b"220 stub.example.com ESMTP ready\r\n")
                    .await
                    .is_err()
                {
                    return;
                }

                while let Ok(Some(line)) = lines.next_line().await {
                    let upper = line.to_ascii_uppercase();
                    let reply: &[u8] = if upper.starts_with("HELO") || upper.starts_with("EHLO") {
                        b"250 stub greets you\r\n"
                    } else if upper.starts_with("MAIL FROM") {
                        b"250 sender ok\r\n"
                    } else if upper.starts_with("RCPT TO") {
                        let recipient = line
                            .split(['<', '>'])
                            .nth(1)
                            .unwrap_or("")
                            .to_ascii_lowercase();
                        if accept_all || accept.iter().any(|a| a.eq_ignore_ascii_case(&recipient))
                        {
                            b"250 recipient ok\r\n"
                        } else {
                            b"550 no such user here\r\n"
                        }
                    } else if upper.starts_with("QUIT") {
                        let _ = write_half.write_all(b"221 bye\r\n").await;
                        break;
                    } else {
                        b"502 command not implemented\r\n"
                    };
                    if write_half.write_all(reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

fn test_config(port: u16) -> Arc<Config> {
    let config = ConfigBuilder::new()
        .smtp_port(port)
        .source_ips(vec![LOOPBACK])
        .ip_cooldown(Duration::from_millis(10))
        .smtp_timeout(Duration::from_secs(5))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build test config");
    Arc::new(config)
}

#[tokio::test]
async fn probe_confirms_existing_recipient() {
    let addr = spawn_stub_server(vec!["ada.lovelace@analyticalengines.com".to_string()], false)
        .await;
    let config = test_config(addr.port());
    let prober = SmtpProber::new(config);

    let result = prober
        .probe("ada.lovelace@analyticalengines.com", "127.0.0.1", LOOPBACK)
        .await;

    assert!(result.valid, "details: {:?}", result.details);
    assert!(result.reason.is_none());
    assert_eq!(result.source_ip, Some(LOOPBACK));
    assert!(!result.block_signal);
}

#[tokio::test]
async fn probe_classifies_unknown_recipient() {
    let addr = spawn_stub_server(Vec::new(), false).await;
    let config = test_config(addr.port());
    let prober = SmtpProber::new(config);

    let result = prober
        .probe("nobody@analyticalengines.com", "127.0.0.1", LOOPBACK)
        .await;

    assert!(!result.valid);
    assert_eq!(result.reason, Some(ProbeReason::InvalidRecipient));
    assert!(result.details.as_deref().unwrap_or("").contains("550"));
}

#[tokio::test]
async fn probe_reports_connection_error_when_nothing_listens() {
    // Bind-then-drop to find a port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = test_config(port);
    let prober = SmtpProber::new(config);

    let result = prober.probe("ada@example.com", "127.0.0.1", LOOPBACK).await;
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ProbeReason::ConnectionError));
}

#[tokio::test]
async fn ranked_batch_finds_dotted_pattern_and_rejects_catch_all_suspicion() {
    // Scenario: the dotted first.last candidate exists, random recipients are
    // rejected, so the hit stands and the domain is not marked catch-all.
    let domain = "analyticalengines.com";
    let target = format!("ada.lovelace@{}", domain);
    let addr = spawn_stub_server(vec![target.clone()], false).await;
    let config = test_config(addr.port());

    let prober = SmtpProber::new(config.clone());
    let pool = IpPool::new(vec![LOOPBACK], Duration::from_millis(10), true);

    let candidates = rank_candidates(&[], "Ada", "Lovelace", domain);
    let emails: Vec<String> = candidates.iter().map(|c| c.email.clone()).collect();
    assert_eq!(emails[0], target, "dotted pattern must rank first");

    let batch_prober = prober.clone();
    let outcome = pool
        .verify_batch(&emails, move |email, source_ip| {
            let prober = batch_prober.clone();
            async move { prober.probe(&email, "127.0.0.1", source_ip).await }
        })
        .await;

    assert!(outcome.found_valid);
    // Pool width 1 and the top-ranked candidate hits: early exit after one probe.
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].valid);
    assert_eq!(outcome.results[0].email, target);

    let repos = Repositories::in_memory();
    let detector = CatchAllDetector::new(
        config,
        repos.catch_all.clone(),
        repos.company.clone(),
    );
    let verdict = detector.detect(domain, "127.0.0.1", &pool, &prober).await;
    assert!(!verdict, "random recipients were rejected");
    assert!(repos.catch_all.find(domain).is_none());
}

#[tokio::test]
async fn ranked_batch_exhausts_candidates_when_all_rejected() {
    let domain = "analyticalengines.com";
    let addr = spawn_stub_server(Vec::new(), false).await;
    let config = test_config(addr.port());

    let prober = SmtpProber::new(config);
    let pool = IpPool::new(vec![LOOPBACK], Duration::from_millis(10), true);

    let candidates = rank_candidates(&[], "Ada", "Lovelace", domain);
    let emails: Vec<String> = candidates.iter().map(|c| c.email.clone()).collect();

    let batch_prober = prober.clone();
    let outcome = pool
        .verify_batch(&emails, move |email, source_ip| {
            let prober = batch_prober.clone();
            async move { prober.probe(&email, "127.0.0.1", source_ip).await }
        })
        .await;

    assert!(!outcome.found_valid);
    assert_eq!(outcome.results.len(), emails.len());
    assert!(outcome
        .results
        .iter()
        .all(|r| r.reason == Some(ProbeReason::InvalidRecipient)));
}

#[tokio::test]
async fn accept_all_server_is_detected_and_persisted_as_catch_all() {
    let domain = "acceptsanything.com";
    let addr = spawn_stub_server(Vec::new(), true).await;
    let config = test_config(addr.port());

    let repos = Repositories::in_memory();
    repos
        .company
        .upsert(email_prospector::Company::new("Accepts Anything", domain))
        .unwrap();

    let prober = SmtpProber::new(config.clone());
    let pool = IpPool::new(vec![LOOPBACK], Duration::from_millis(10), true);
    let detector = CatchAllDetector::new(
        config,
        repos.catch_all.clone(),
        repos.company.clone(),
    );

    let verdict = detector.detect(domain, "127.0.0.1", &pool, &prober).await;
    assert!(verdict);

    let recorded = repos.catch_all.find(domain).expect("verdict not persisted");
    assert!(recorded.verification_attempts >= 1);
    assert!(detector.is_known(domain));

    let company = repos
        .company
        .find_by_name("Accepts Anything")
        .expect("company vanished");
    assert!(company.is_catch_all, "company must inherit the catch-all flag");
}
