//! Repository contracts abstracting the persistence layer.
//!
//! Implementations are externally synchronised; the core assumes each
//! operation is individually atomic and never requires cross-entity
//! transactions. The bundled [`memory::InMemoryStore`] backs tests and the
//! CLI; a networked store implements the same traits.

pub(crate) mod memory;

pub use memory::InMemoryStore;

use crate::core::error::Result;
use crate::core::models::{CatchAllDomain, Company, PatternGlobal, Person};
use std::sync::Arc;
use uuid::Uuid;

pub trait CompanyRepository: Send + Sync {
    /// Case-insensitive match on name OR exact match on domain.
    fn find_by_name_or_domain(&self, name: &str, domain: &str) -> Option<Company>;
    /// Case-insensitive exact match on name.
    fn find_by_name(&self, name: &str) -> Option<Company>;
    fn upsert(&self, company: Company) -> Result<Company>;
    /// Increments the usage count for `template`, creating the entry with
    /// count 1 when absent. Atomic per call.
    fn bump_pattern(&self, company_id: Uuid, template: &str) -> Result<()>;
    /// Flags every company with this domain as catch-all.
    fn set_catch_all(&self, domain: &str) -> Result<()>;
}

pub trait PatternRepository: Send + Sync {
    /// Increments the global usage count for `template`, creating it at 1.
    fn bump_global(&self, template: &str) -> Result<()>;
    /// The most-used templates, usage count descending.
    fn top_templates(&self, limit: usize) -> Vec<PatternGlobal>;
}

pub trait PersonRepository: Send + Sync {
    /// Case-insensitive exact match on the (first, last, company) natural key.
    fn find_natural(&self, first_name: &str, last_name: &str, company: &str) -> Option<Person>;
    /// Upserts by natural key, appending the draft's probe history to any
    /// existing record and replacing the verification outcome.
    fn upsert_with_history(&self, draft: Person) -> Result<Person>;
}

pub trait CatchAllRepository: Send + Sync {
    fn find(&self, domain: &str) -> Option<CatchAllDomain>;
    /// Records a positive catch-all verdict, incrementing
    /// `verification_attempts` and refreshing `last_verified`.
    fn upsert(&self, domain: &str) -> Result<CatchAllDomain>;
    /// The most recently verified catch-all domains.
    fn recent(&self, limit: usize) -> Vec<CatchAllDomain>;
}

/// The bundle of repository handles the orchestrator works against.
#[derive(Clone)]
pub struct Repositories {
    pub company: Arc<dyn CompanyRepository>,
    pub pattern: Arc<dyn PatternRepository>,
    pub person: Arc<dyn PersonRepository>,
    pub catch_all: Arc<dyn CatchAllRepository>,
}

impl Repositories {
    /// A fresh in-memory store backing all four repositories.
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::default());
        Self {
            company: store.clone(),
            pattern: store.clone(),
            person: store.clone(),
            catch_all: store,
        }
    }
}
