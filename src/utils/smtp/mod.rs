//! SMTP recipient probing: the state-machine prober and its verdict types.

pub(crate) mod prober;
pub(crate) mod result;

pub use prober::{test_smtp_connectivity, SmtpProber};
pub use result::{ProbeReason, ProbeResult};
