//! In-memory repository implementation used by tests and the CLI.

use super::{CatchAllRepository, CompanyRepository, PatternRepository, PersonRepository};
use crate::core::error::{AppError, Result};
use crate::core::models::{CatchAllDomain, Company, PatternGlobal, Person};

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

type NaturalKey = (String, String, String);

fn natural_key(first_name: &str, last_name: &str, company: &str) -> NaturalKey {
    (
        first_name.trim().to_lowercase(),
        last_name.trim().to_lowercase(),
        company.trim().to_lowercase(),
    )
}

/// Lock-per-entity in-memory store. Companies are keyed by lowercased name to
/// honour the case-insensitive uniqueness constraint.
#[derive(Default)]
pub struct InMemoryStore {
    companies: RwLock<HashMap<String, Company>>,
    patterns: RwLock<HashMap<String, u32>>,
    people: RwLock<HashMap<NaturalKey, Person>>,
    catch_all: RwLock<HashMap<String, CatchAllDomain>>,
}

impl CompanyRepository for InMemoryStore {
    fn find_by_name_or_domain(&self, name: &str, domain: &str) -> Option<Company> {
        let companies = self.companies.read();
        if let Some(company) = companies.get(&name.trim().to_lowercase()) {
            return Some(company.clone());
        }
        companies.values().find(|c| c.domain == domain).cloned()
    }

    fn find_by_name(&self, name: &str) -> Option<Company> {
        self.companies
            .read()
            .get(&name.trim().to_lowercase())
            .cloned()
    }

    fn upsert(&self, company: Company) -> Result<Company> {
        let mut companies = self.companies.write();
        let key = company.name.trim().to_lowercase();
        let stored = companies
            .entry(key)
            .and_modify(|existing| {
                existing.domain = company.domain.clone();
                existing.is_catch_all |= company.is_catch_all;
            })
            .or_insert_with(|| company.clone());
        Ok(stored.clone())
    }

    fn bump_pattern(&self, company_id: Uuid, template: &str) -> Result<()> {
        let mut companies = self.companies.write();
        let company = companies
            .values_mut()
            .find(|c| c.id == company_id)
            .ok_or_else(|| AppError::Storage(format!("No company with id {}", company_id)))?;

        match company
            .verified_patterns
            .iter_mut()
            .find(|p| p.template == template)
        {
            Some(pattern) => {
                pattern.usage_count += 1;
                pattern.last_verified = Utc::now();
            }
            None => {
                company
                    .verified_patterns
                    .push(crate::core::models::VerifiedPattern {
                        template: template.to_string(),
                        usage_count: 1,
                        last_verified: Utc::now(),
                    });
            }
        }
        Ok(())
    }

    fn set_catch_all(&self, domain: &str) -> Result<()> {
        let mut companies = self.companies.write();
        for company in companies.values_mut().filter(|c| c.domain == domain) {
            company.is_catch_all = true;
        }
        Ok(())
    }
}

impl PatternRepository for InMemoryStore {
    fn bump_global(&self, template: &str) -> Result<()> {
        let mut patterns = self.patterns.write();
        *patterns.entry(template.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn top_templates(&self, limit: usize) -> Vec<PatternGlobal> {
        let patterns = self.patterns.read();
        let mut all: Vec<PatternGlobal> = patterns
            .iter()
            .map(|(template, count)| PatternGlobal {
                template: template.clone(),
                usage_count: *count,
            })
            .collect();
        all.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| a.template.cmp(&b.template))
        });
        all.truncate(limit);
        all
    }
}

impl PersonRepository for InMemoryStore {
    fn find_natural(&self, first_name: &str, last_name: &str, company: &str) -> Option<Person> {
        self.people
            .read()
            .get(&natural_key(first_name, last_name, company))
            .cloned()
    }

    fn upsert_with_history(&self, draft: Person) -> Result<Person> {
        let key = natural_key(&draft.first_name, &draft.last_name, &draft.company);
        let mut people = self.people.write();
        let stored = match people.get_mut(&key) {
            Some(existing) => {
                existing.domain = draft.domain;
                existing.verified_email = draft.verified_email;
                existing.email_verified_at = draft.email_verified_at;
                existing.all_tested_emails.extend(draft.all_tested_emails);
                existing.extra.extend(draft.extra);
                existing.clone()
            }
            None => {
                people.insert(key, draft.clone());
                draft
            }
        };
        Ok(stored)
    }
}

impl CatchAllRepository for InMemoryStore {
    fn find(&self, domain: &str) -> Option<CatchAllDomain> {
        self.catch_all.read().get(domain).cloned()
    }

    fn upsert(&self, domain: &str) -> Result<CatchAllDomain> {
        let mut catch_all = self.catch_all.write();
        let entry = catch_all
            .entry(domain.to_string())
            .and_modify(|existing| {
                existing.verification_attempts += 1;
                existing.last_verified = Utc::now();
            })
            .or_insert_with(|| CatchAllDomain {
                domain: domain.to_string(),
                verification_attempts: 1,
                last_verified: Utc::now(),
            });
        Ok(entry.clone())
    }

    fn recent(&self, limit: usize) -> Vec<CatchAllDomain> {
        let catch_all = self.catch_all.read();
        let mut all: Vec<CatchAllDomain> = catch_all.values().cloned().collect();
        all.sort_by(|a, b| b.last_verified.cmp(&a.last_verified));
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ProbeRecord;
    use crate::utils::smtp::ProbeReason;

    fn store() -> InMemoryStore {
        InMemoryStore::default()
    }

    fn record(email: &str, valid: bool) -> ProbeRecord {
        ProbeRecord {
            email: email.to_string(),
            valid,
            reason: if valid {
                None
            } else {
                Some(ProbeReason::InvalidRecipient)
            },
            details: None,
            tested_at: Utc::now(),
        }
    }

    fn draft_person(first: &str, last: &str, company: &str) -> Person {
        Person {
            id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            company: company.to_string(),
            domain: "example.com".to_string(),
            verified_email: None,
            email_verified_at: None,
            all_tested_emails: Vec::new(),
            extra: HashMap::new(),
        }
    }

    // `upsert` exists on both CompanyRepository and CatchAllRepository, so
    // the tests go through UFCS helpers.
    fn add_company(store: &InMemoryStore, name: &str, domain: &str) -> Company {
        CompanyRepository::upsert(store, Company::new(name, domain)).unwrap()
    }

    fn mark_catch_all(store: &InMemoryStore, domain: &str) -> CatchAllDomain {
        CatchAllRepository::upsert(store, domain).unwrap()
    }

    #[test]
    fn test_company_name_is_case_insensitive_unique() {
        let store = store();
        add_company(&store, "Acme", "acme.com");
        let again = add_company(&store, "ACME", "acme.com");

        assert!(store.find_by_name("aCmE").is_some());
        assert_eq!(store.companies.read().len(), 1);
        assert_eq!(again.domain, "acme.com");
    }

    #[test]
    fn test_find_by_name_or_domain() {
        let store = store();
        add_company(&store, "Acme", "acme.com");

        assert!(store.find_by_name_or_domain("acme", "other.com").is_some());
        assert!(store.find_by_name_or_domain("unknown", "acme.com").is_some());
        assert!(store.find_by_name_or_domain("unknown", "other.com").is_none());
    }

    #[test]
    fn test_bump_pattern_creates_then_increments() {
        let store = store();
        let company = add_company(&store, "Acme", "acme.com");

        store
            .bump_pattern(company.id, "{firstName}.{lastName}")
            .unwrap();
        store
            .bump_pattern(company.id, "{firstName}.{lastName}")
            .unwrap();
        store.bump_pattern(company.id, "{firstName}").unwrap();

        let stored = store.find_by_name("Acme").unwrap();
        assert_eq!(stored.verified_patterns.len(), 2);
        let dotted = stored
            .verified_patterns
            .iter()
            .find(|p| p.template == "{firstName}.{lastName}")
            .unwrap();
        assert_eq!(dotted.usage_count, 2);
        assert!(stored
            .verified_patterns
            .iter()
            .all(|p| p.usage_count >= 1));
    }

    #[test]
    fn test_bump_pattern_unknown_company_errors() {
        let store = store();
        assert!(store.bump_pattern(Uuid::new_v4(), "{firstName}").is_err());
    }

    #[test]
    fn test_set_catch_all_flags_every_company_with_domain() {
        let store = store();
        add_company(&store, "Acme", "shared.com");
        add_company(&store, "Umbrella", "shared.com");
        add_company(&store, "Wayne", "wayne.com");

        store.set_catch_all("shared.com").unwrap();

        assert!(store.find_by_name("Acme").unwrap().is_catch_all);
        assert!(store.find_by_name("Umbrella").unwrap().is_catch_all);
        assert!(!store.find_by_name("Wayne").unwrap().is_catch_all);
    }

    #[test]
    fn test_global_pattern_top_templates_sorted() {
        let store = store();
        for _ in 0..3 {
            store.bump_global("{firstName}.{lastName}").unwrap();
        }
        store.bump_global("{firstInitial}{lastName}").unwrap();

        let top = store.top_templates(20);
        assert_eq!(top[0].template, "{firstName}.{lastName}");
        assert_eq!(top[0].usage_count, 3);
        assert_eq!(top.len(), 2);
        assert_eq!(store.top_templates(1).len(), 1);
    }

    #[test]
    fn test_person_natural_key_case_insensitive() {
        let store = store();
        store.upsert_with_history(draft_person("Ada", "Lovelace", "Analytical Engines")).unwrap();

        assert!(store
            .find_natural("ada", "LOVELACE", "analytical engines")
            .is_some());
        assert!(store.find_natural("Ada", "Byron", "Analytical Engines").is_none());
    }

    #[test]
    fn test_person_history_appends_across_upserts() {
        let store = store();
        let mut first = draft_person("Ada", "Lovelace", "Analytical Engines");
        first.all_tested_emails = vec![
            record("ada@analyticalengines.com", false),
            record("a.lovelace@analyticalengines.com", false),
        ];
        store.upsert_with_history(first).unwrap();

        let mut second = draft_person("ada", "lovelace", "ANALYTICAL ENGINES");
        second.verified_email = Some("ada.lovelace@analyticalengines.com".to_string());
        second.email_verified_at = Some(Utc::now());
        second.all_tested_emails = vec![record("ada.lovelace@analyticalengines.com", true)];
        let stored = store.upsert_with_history(second).unwrap();

        assert_eq!(stored.all_tested_emails.len(), 3);
        // verified_email matches the last success in history
        let last_success = stored
            .all_tested_emails
            .iter()
            .rev()
            .find(|r| r.valid)
            .unwrap();
        assert_eq!(
            stored.verified_email.as_deref(),
            Some(last_success.email.as_str())
        );
        assert_eq!(store.people.read().len(), 1);
    }

    #[test]
    fn test_catch_all_upsert_increments_attempts() {
        let store = store();
        let first = mark_catch_all(&store, "catchall.com");
        assert_eq!(first.verification_attempts, 1);
        let second = mark_catch_all(&store, "catchall.com");
        assert_eq!(second.verification_attempts, 2);
        assert!(CatchAllRepository::find(&store, "catchall.com").is_some());
        assert!(CatchAllRepository::find(&store, "other.com").is_none());
    }

    #[test]
    fn test_catch_all_recent_ordering() {
        let store = store();
        mark_catch_all(&store, "old.com");
        std::thread::sleep(std::time::Duration::from_millis(5));
        mark_catch_all(&store, "new.com");

        let recent = store.recent(10);
        assert_eq!(recent[0].domain, "new.com");
        assert_eq!(store.recent(1).len(), 1);
    }
}
