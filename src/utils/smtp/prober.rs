//! The SMTP recipient prober: one TCP connection per probed address, driven
//! as an explicit state machine over parsed reply chunks.

use crate::core::config::Config;
use crate::utils::smtp::result::{contains_block_signal, ProbeReason, ProbeResult};

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::time::timeout;

/// Probe lifecycle. Advanced only by complete server replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Connected,
    HeloSent,
    MailSent,
    RcptSent,
    QuitSent,
}

/// A complete (possibly multiline) SMTP reply.
#[derive(Debug, Clone)]
pub(crate) struct SmtpReply {
    pub(crate) code: u16,
    pub(crate) text: String,
}

impl SmtpReply {
    pub(crate) fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Transport-level failure of a probe, before a verdict could be classified.
#[derive(Debug)]
enum ProbeFailure {
    /// No inbound bytes for the configured idle window.
    Timeout,
    Io(io::Error),
}

impl ProbeFailure {
    fn into_result(self, email: &str, blocked: &mut bool) -> ProbeResult {
        match self {
            ProbeFailure::Timeout => ProbeResult::rejected(
                email,
                ProbeReason::Timeout,
                "No SMTP reply within idle timeout",
            ),
            ProbeFailure::Io(e) => {
                let text = e.to_string();
                if contains_block_signal(&text) {
                    *blocked = true;
                }
                ProbeResult::rejected(email, ProbeReason::ConnectionError, text)
            }
        }
    }
}

/// Buffered SMTP framing over any byte stream.
///
/// Replies accumulate line by line; continuation lines (`NNN-`) are consumed
/// and the reply terminates on the `NNN<space>` form. The idle timer applies
/// per read and therefore resets on every inbound chunk.
struct SmtpConnection<S> {
    stream: S,
    buffer: Vec<u8>,
    idle: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpConnection<S> {
    fn new(stream: S, idle: Duration) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            idle,
        }
    }

    async fn send_command(&mut self, command: &str) -> Result<(), ProbeFailure> {
        self.stream
            .write_all(command.as_bytes())
            .await
            .map_err(ProbeFailure::Io)?;
        self.stream
            .write_all(b"\r\n")
            .await
            .map_err(ProbeFailure::Io)?;
        self.stream.flush().await.map_err(ProbeFailure::Io)
    }

    async fn read_reply(&mut self) -> Result<SmtpReply, ProbeFailure> {
        let mut parts: Vec<String> = Vec::new();
        loop {
            while let Some(raw) = self.take_line() {
                let line = String::from_utf8_lossy(&raw).into_owned();
                let (code, is_last, rest) = parse_reply_line(&line).map_err(ProbeFailure::Io)?;
                if !rest.is_empty() {
                    parts.push(rest.to_string());
                }
                if is_last {
                    return Ok(SmtpReply {
                        code,
                        text: parts.join(" "),
                    });
                }
            }

            let mut chunk = [0u8; 512];
            let read = timeout(self.idle, self.stream.read(&mut chunk))
                .await
                .map_err(|_| ProbeFailure::Timeout)?
                .map_err(ProbeFailure::Io)?;
            if read == 0 {
                return Err(ProbeFailure::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Pops one CRLF-terminated line off the buffer, if a complete one exists.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        if line.ends_with(b"\n") {
            line.pop();
        }
        if line.ends_with(b"\r") {
            line.pop();
        }
        Some(line)
    }
}

fn parse_reply_line(line: &str) -> io::Result<(u16, bool, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(|b| b.is_ascii_digit()) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed SMTP reply line: '{}'", line),
        ));
    }
    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "unparsable SMTP reply code"))?;
    let is_last = bytes.get(3) != Some(&b'-');
    let rest = if line.len() > 4 { &line[4..] } else { "" };
    Ok((code, is_last, rest))
}

/// Classifies the RCPT TO reply by its three-digit code.
fn classify_rcpt(reply: &SmtpReply) -> (bool, Option<ProbeReason>) {
    match reply.code {
        250 => (true, None),
        550 | 551 | 553 => (false, Some(ProbeReason::InvalidRecipient)),
        452 => (false, Some(ProbeReason::FullMailbox)),
        _ => (false, Some(ProbeReason::UnknownError)),
    }
}

/// Represents a client for probing recipient addresses via SMTP.
#[derive(Clone)]
pub struct SmtpProber {
    config: Arc<Config>,
}

impl SmtpProber {
    /// Creates a new SmtpProber with the given configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Probes a single recipient address against `mail_server`, originating
    /// from `source_ip`.
    ///
    /// Never fails: every outcome, including transport errors and timeouts,
    /// is folded into the returned [`ProbeResult`].
    pub async fn probe(&self, email: &str, mail_server: &str, source_ip: IpAddr) -> ProbeResult {
        let started = Instant::now();
        let mut blocked = false;

        tracing::debug!(target: "smtp_task",
            "Starting probe of <{}> via {}:{} from source {}",
            email, mail_server, self.config.smtp_port, source_ip
        );

        let mut result = match self.open_stream(mail_server, source_ip).await {
            Ok(stream) => {
                let mut conn = SmtpConnection::new(stream, self.config.smtp_timeout);
                match self.drive(email, &mut conn, &mut blocked).await {
                    Ok(result) => result,
                    Err(failure) => failure.into_result(email, &mut blocked),
                }
            }
            Err(failure) => failure.into_result(email, &mut blocked),
        };

        result.source_ip = Some(source_ip);
        result.block_signal = blocked;
        result.duration = started.elapsed();

        tracing::info!(target: "smtp_task",
            "Probe of <{}> via {} finished in {:.2?}: valid={}, reason={:?}, blocked={}",
            email, mail_server, result.duration, result.valid, result.reason, result.block_signal
        );
        result
    }

    /// Opens a TCP connection to the mail server with the local source
    /// address bound before `connect`.
    async fn open_stream(
        &self,
        mail_server: &str,
        source_ip: IpAddr,
    ) -> Result<TcpStream, ProbeFailure> {
        let mut addrs = lookup_host((mail_server, self.config.smtp_port))
            .await
            .map_err(ProbeFailure::Io)?;
        let target = addrs
            .find(|addr| addr.is_ipv4() == source_ip.is_ipv4())
            .ok_or_else(|| {
                ProbeFailure::Io(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!(
                        "no address of matching family for {} (source {})",
                        mail_server, source_ip
                    ),
                ))
            })?;

        let socket = if source_ip.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(ProbeFailure::Io)?;
        socket
            .bind(SocketAddr::new(source_ip, 0))
            .map_err(ProbeFailure::Io)?;

        let stream = timeout(self.config.connect_timeout, socket.connect(target))
            .await
            .map_err(|_| {
                ProbeFailure::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", target),
                ))
            })?
            .map_err(ProbeFailure::Io)?;
        Ok(stream)
    }

    /// Runs the S0-S4 state machine to a verdict over an established stream.
    async fn drive<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        email: &str,
        conn: &mut SmtpConnection<S>,
        blocked: &mut bool,
    ) -> Result<ProbeResult, ProbeFailure> {
        let mut state = ProbeState::Connected;
        let mut verdict: Option<ProbeResult> = None;

        loop {
            match state {
                ProbeState::Connected => {
                    let banner = self.read_scanned(conn, blocked).await?;
                    if !banner.is_positive() {
                        verdict = Some(ProbeResult::rejected(
                            email,
                            ProbeReason::UnknownError,
                            format!("Greeting rejected: {} {}", banner.code, banner.text),
                        ));
                        state = self.quit(email, conn, state).await;
                    } else {
                        conn.send_command(&format!("HELO {}", self.config.helo_hostname))
                            .await?;
                        state = self.advance(email, state, ProbeState::HeloSent);
                    }
                }
                ProbeState::HeloSent => {
                    let reply = self.read_scanned(conn, blocked).await?;
                    if !reply.is_positive() {
                        verdict = Some(ProbeResult::rejected(
                            email,
                            ProbeReason::UnknownError,
                            format!("HELO rejected: {} {}", reply.code, reply.text),
                        ));
                        state = self.quit(email, conn, state).await;
                    } else {
                        conn.send_command(&format!(
                            "MAIL FROM:<{}>",
                            self.config.smtp_sender_email
                        ))
                        .await?;
                        state = self.advance(email, state, ProbeState::MailSent);
                    }
                }
                ProbeState::MailSent => {
                    let reply = self.read_scanned(conn, blocked).await?;
                    if !reply.is_positive() {
                        verdict = Some(ProbeResult::rejected(
                            email,
                            ProbeReason::UnknownError,
                            format!("MAIL FROM rejected: {} {}", reply.code, reply.text),
                        ));
                        state = self.quit(email, conn, state).await;
                    } else {
                        conn.send_command(&format!("RCPT TO:<{}>", email)).await?;
                        state = self.advance(email, state, ProbeState::RcptSent);
                    }
                }
                ProbeState::RcptSent => {
                    let reply = self.read_scanned(conn, blocked).await?;
                    let (valid, reason) = classify_rcpt(&reply);
                    let details = format!("{} {}", reply.code, reply.text);
                    verdict = Some(if valid {
                        ProbeResult::accepted(email, details)
                    } else {
                        // reason is always Some on the !valid arm of classify_rcpt
                        ProbeResult::rejected(
                            email,
                            reason.unwrap_or(ProbeReason::UnknownError),
                            details,
                        )
                    });
                    state = self.quit(email, conn, state).await;
                }
                ProbeState::QuitSent => {
                    // Terminal: best-effort read of the 221, then drop the socket.
                    let _ = conn.read_reply().await;
                    return Ok(verdict.take().ok_or_else(|| {
                        ProbeFailure::Io(io::Error::new(
                            io::ErrorKind::Other,
                            "probe reached terminal state without a verdict",
                        ))
                    })?);
                }
            }
        }
    }

    /// Reads one reply and scans its text for block signals.
    async fn read_scanned<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        conn: &mut SmtpConnection<S>,
        blocked: &mut bool,
    ) -> Result<SmtpReply, ProbeFailure> {
        let reply = conn.read_reply().await?;
        if contains_block_signal(&reply.text) {
            *blocked = true;
        }
        Ok(reply)
    }

    /// Sends QUIT (best effort) and moves to the terminal state.
    async fn quit<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        email: &str,
        conn: &mut SmtpConnection<S>,
        from: ProbeState,
    ) -> ProbeState {
        if conn.send_command("QUIT").await.is_err() {
            tracing::trace!(target: "smtp_task", "<{}> QUIT could not be sent (ignored)", email);
        }
        self.advance(email, from, ProbeState::QuitSent)
    }

    fn advance(&self, email: &str, from: ProbeState, to: ProbeState) -> ProbeState {
        tracing::trace!(target: "smtp_task", "<{}> state {:?} -> {:?}", email, from, to);
        to
    }
}

/// Tests basic SMTP connectivity to a known reliable server (Google).
/// This helps diagnose if outbound port 25 is generally blocked.
pub async fn test_smtp_connectivity() -> crate::core::error::Result<()> {
    use crate::core::error::AppError;

    let test_server = "gmail-smtp-in.l.google.com";
    let test_port = 25u16;
    let probe_timeout = Duration::from_secs(5);

    tracing::info!(
        "Testing outbound SMTP (port 25) connectivity to {}...",
        test_server
    );

    let connect = async {
        let stream = TcpStream::connect((test_server, test_port)).await?;
        let mut conn = SmtpConnection::new(stream, probe_timeout);
        conn.read_reply().await.map_err(|f| match f {
            ProbeFailure::Timeout => io::Error::new(io::ErrorKind::TimedOut, "banner timed out"),
            ProbeFailure::Io(e) => e,
        })?;
        let _ = conn.send_command("QUIT").await;
        Ok::<(), io::Error>(())
    };

    match timeout(probe_timeout, connect).await {
        Ok(Ok(())) => {
            tracing::info!(
                "SMTP connectivity test successful (connected to {}).",
                test_server
            );
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!(
                "SMTP connectivity test failed: Error connecting to {}: {}",
                test_server,
                e
            );
            Err(AppError::Verification(format!(
                "Connection to {} failed: {}. Check firewall or network settings.",
                test_server, e
            )))
        }
        Err(_) => {
            tracing::error!(
                "SMTP connectivity test timed out connecting to {}. Outbound port 25 is likely blocked by ISP, firewall, or network provider.",
                test_server
            );
            Err(AppError::Verification(
                "SMTP connection timed out - port 25 is likely blocked.".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigBuilder;

    fn test_prober() -> SmtpProber {
        let config = ConfigBuilder::new()
            .build()
            .expect("Failed to build default config for test");
        SmtpProber::new(Arc::new(config))
    }

    fn scripted_connection(
        script: &str,
    ) -> SmtpConnection<tokio::io::DuplexStream> {
        let (client, mut server) = tokio::io::duplex(8192);
        let script = script.to_string();
        tokio::spawn(async move {
            let _ = server.write_all(script.as_bytes()).await;
            // Keep the server half open so reads block instead of hitting EOF.
            let mut sink = [0u8; 1024];
            while let Ok(n) = server.read(&mut sink).await {
                if n == 0 {
                    break;
                }
            }
        });
        SmtpConnection::new(client, Duration::from_secs(5))
    }

    #[test]
    fn test_parse_reply_line_forms() {
        assert_eq!(parse_reply_line("250 OK").unwrap(), (250, true, "OK"));
        assert_eq!(
            parse_reply_line("250-PIPELINING").unwrap(),
            (250, false, "PIPELINING")
        );
        assert_eq!(parse_reply_line("250").unwrap(), (250, true, ""));
        assert_eq!(parse_reply_line("250-").unwrap(), (250, false, ""));
        assert!(parse_reply_line("xx garbage").is_err());
        assert!(parse_reply_line("25").is_err());
    }

    #[test]
    fn test_classify_rcpt_table() {
        let reply = |code| SmtpReply {
            code,
            text: String::new(),
        };
        assert_eq!(classify_rcpt(&reply(250)), (true, None));
        for code in [550, 551, 553] {
            assert_eq!(
                classify_rcpt(&reply(code)),
                (false, Some(ProbeReason::InvalidRecipient))
            );
        }
        assert_eq!(
            classify_rcpt(&reply(452)),
            (false, Some(ProbeReason::FullMailbox))
        );
        assert_eq!(
            classify_rcpt(&reply(251)),
            (false, Some(ProbeReason::UnknownError))
        );
        assert_eq!(
            classify_rcpt(&reply(421)),
            (false, Some(ProbeReason::UnknownError))
        );
    }

    #[tokio::test]
    async fn test_read_reply_multiline_continuation() {
        let mut conn =
            scripted_connection("250-mx.example.com greets you\r\n250-SIZE 35882577\r\n250 OK\r\n");
        let reply = conn.read_reply().await.unwrap();
        assert_eq!(reply.code, 250);
        assert!(reply.text.contains("greets you"));
        assert!(reply.text.contains("SIZE 35882577"));
        assert!(reply.text.ends_with("OK"));
    }

    #[tokio::test]
    async fn test_read_reply_sequential_replies_buffered() {
        let mut conn = scripted_connection("220 banner\r\n250 hello\r\n");
        let first = conn.read_reply().await.unwrap();
        assert_eq!(first.code, 220);
        assert_eq!(first.text, "banner");
        let second = conn.read_reply().await.unwrap();
        assert_eq!(second.code, 250);
        assert_eq!(second.text, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_reply_idle_timeout() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = SmtpConnection::new(client, Duration::from_secs(10));
        match conn.read_reply().await {
            Err(ProbeFailure::Timeout) => {}
            other => panic!("Expected idle timeout, got {:?}", other.map(|r| r.code)),
        }
    }

    #[tokio::test]
    async fn test_drive_happy_path_accepts_recipient() {
        let prober = test_prober();
        let mut conn = scripted_connection(
            "220 mx.example.com ESMTP\r\n250 Hello\r\n250 Sender OK\r\n250 Recipient OK\r\n221 Bye\r\n",
        );
        let mut blocked = false;
        let result = prober
            .drive("ada.lovelace@example.com", &mut conn, &mut blocked)
            .await
            .unwrap();
        assert!(result.valid);
        assert!(result.reason.is_none());
        assert!(!blocked);
    }

    #[tokio::test]
    async fn test_drive_classifies_550_as_invalid_recipient() {
        let prober = test_prober();
        let mut conn = scripted_connection(
            "220 mx\r\n250 Hello\r\n250 Sender OK\r\n550 No such user here\r\n221 Bye\r\n",
        );
        let mut blocked = false;
        let result = prober
            .drive("nobody@example.com", &mut conn, &mut blocked)
            .await
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.reason, Some(ProbeReason::InvalidRecipient));
        assert!(result.details.as_deref().unwrap_or("").contains("550"));
    }

    #[tokio::test]
    async fn test_drive_classifies_452_as_full_mailbox() {
        let prober = test_prober();
        let mut conn = scripted_connection(
            "220 mx\r\n250 Hello\r\n250 Sender OK\r\n452 Mailbox full\r\n221 Bye\r\n",
        );
        let mut blocked = false;
        let result = prober
            .drive("full@example.com", &mut conn, &mut blocked)
            .await
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.reason, Some(ProbeReason::FullMailbox));
    }

    #[tokio::test]
    async fn test_drive_flags_block_signal_without_changing_reason() {
        let prober = test_prober();
        let mut conn = scripted_connection(
            "554 Your IP is blacklisted by zen.spamhaus.org\r\n221 Bye\r\n",
        );
        let mut blocked = false;
        let result = prober
            .drive("ada@example.com", &mut conn, &mut blocked)
            .await
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.reason, Some(ProbeReason::UnknownError));
        assert!(blocked);
    }

    #[tokio::test]
    async fn test_drive_greylisting_4xx_is_unknown_error() {
        let prober = test_prober();
        let mut conn = scripted_connection(
            "220 mx\r\n250 Hello\r\n250 Sender OK\r\n451 Greylisted, try again later\r\n221 Bye\r\n",
        );
        let mut blocked = false;
        let result = prober
            .drive("grey@example.com", &mut conn, &mut blocked)
            .await
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.reason, Some(ProbeReason::UnknownError));
    }
}
