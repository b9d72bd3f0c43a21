use std::collections::HashMap;

use super::domain::Domain;
use crate::error::RequestError;

/// Registry of the domains declared by one request, plus the synthetic
/// domains produced by intersection.
#[derive(Debug, Default)]
pub struct DomainManager {
    domains: HashMap<String, Domain>,
}

impl DomainManager {
    pub fn new() -> Self {
        DomainManager {
            domains: HashMap::new(),
        }
    }

    pub fn register(&mut self, domain: Domain) {
        self.domains.insert(domain.name.clone(), domain);
    }

    pub fn get(&self, id: &str) -> Result<&Domain, RequestError> {
        self.domains
            .get(id)
            .ok_or_else(|| RequestError::DomainNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.domains.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    /// Fold-intersect a set of domain ids into one domain.
    ///
    /// Zero ids yield `None`; a single id is returned as-is; two or more are
    /// intersected pairwise into a synthetic domain registered under a fresh
    /// generated id. The id is fresh on every call even for an identical id
    /// set; callers may rely on distinct generated ids.
    pub fn intersect_domains(
        &mut self,
        ids: &[String],
        allow_broadcast: bool,
    ) -> Result<Option<String>, RequestError> {
        match ids.len() {
            0 => Ok(None),
            1 => {
                self.get(&ids[0])?;
                Ok(Some(ids[0].clone()))
            }
            _ => {
                let mut folded = self.get(&ids[0])?.clone();
                for id in &ids[1..] {
                    let other = self.get(id)?;
                    folded = folded.intersect(folded.name.clone(), other, allow_broadcast)?;
                }
                let synthetic_id = format!("domain-{}", uuid::Uuid::new_v4());
                folded.name = synthetic_id.clone();
                self.register(folded);
                Ok(Some(synthetic_id))
            }
        }
    }
}
