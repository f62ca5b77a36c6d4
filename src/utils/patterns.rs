//! The pattern engine: expands name templates into candidate addresses, maps
//! verified addresses back to their template, and ranks candidates for a
//! company.

use crate::core::models::VerifiedPattern;
use std::collections::HashSet;

/// The recognised template set, in declared ranking order.
pub const PATTERN_TEMPLATES: [&str; 10] = [
    "{firstName}.{lastName}",
    "{firstName}{lastName}",
    "{firstInitial}.{lastName}",
    "{firstInitial}{lastName}",
    "{firstName}_{lastName}",
    "{firstName}",
    "{lastName}.{firstName}",
    "{lastName}{firstName}",
    "{lastName}{firstInitial}",
    "{firstInitial}{lastInitial}",
];

/// The outcome of mapping a local part back to a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Derived {
    /// A recognised template from [`PATTERN_TEMPLATES`].
    Template(&'static str),
    /// The raw local part; not learnable, logged only.
    Raw(String),
}

/// One ranked candidate address together with the template it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub email: String,
    pub template: String,
}

/// ASCII-lowercase fold applied to name parts before substitution.
/// Non-ASCII code points pass through unchanged.
fn fold_name(part: &str) -> String {
    part.trim().to_ascii_lowercase()
}

fn expand_local(template: &str, first: &str, last: &str) -> String {
    let first = fold_name(first);
    let last = fold_name(last);
    let first_initial: String = first.chars().take(1).collect();
    let last_initial: String = last.chars().take(1).collect();

    template
        .replace("{firstName}", &first)
        .replace("{lastName}", &last)
        .replace("{firstInitial}", &first_initial)
        .replace("{lastInitial}", &last_initial)
}

/// Expands `template` into a full address for `domain`.
pub fn expand(template: &str, first: &str, last: &str, domain: &str) -> String {
    format!("{}@{}", expand_local(template, first, last), domain)
}

/// Maps a verified address back to the template that produced it.
///
/// The local part is compared against every template expansion in declared
/// order; the first exact match wins. Unrecognised local parts come back as
/// [`Derived::Raw`].
pub fn derive(email: &str, first: &str, last: &str) -> Derived {
    let local = email.split('@').next().unwrap_or(email);
    for template in PATTERN_TEMPLATES {
        if expand_local(template, first, last) == local {
            return Derived::Template(template);
        }
    }
    Derived::Raw(local.to_string())
}

/// Builds the ordered candidate list for one person at one company.
///
/// Learned patterns lead, sorted by usage count descending with ties broken
/// by most-recent verification. When fewer than 5 candidates result, every
/// template expansion is appended in declared order. Duplicate addresses are
/// skipped; the output is deterministic for equal inputs.
pub fn rank_candidates(
    verified: &[VerifiedPattern],
    first: &str,
    last: &str,
    domain: &str,
) -> Vec<Candidate> {
    let mut learned: Vec<&VerifiedPattern> = verified.iter().collect();
    learned.sort_by(|a, b| {
        b.usage_count
            .cmp(&a.usage_count)
            .then_with(|| b.last_verified.cmp(&a.last_verified))
    });

    let mut candidates = Vec::new();
    let mut seen = HashSet::new();

    for pattern in learned {
        let email = expand(&pattern.template, first, last, domain);
        if seen.insert(email.clone()) {
            candidates.push(Candidate {
                email,
                template: pattern.template.clone(),
            });
        }
    }

    if candidates.len() < 5 {
        for template in PATTERN_TEMPLATES {
            let email = expand(template, first, last, domain);
            if seen.insert(email.clone()) {
                candidates.push(Candidate {
                    email,
                    template: template.to_string(),
                });
            }
        }
    }

    tracing::debug!(
        "Ranked {} candidate(s) for '{} {}' @ '{}' ({} learned pattern(s))",
        candidates.len(),
        first,
        last,
        domain,
        verified.len()
    );
    candidates
}
