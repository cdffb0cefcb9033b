use thiserror::Error;

/// Lookups of blog entities that came back empty.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("no {entity} matches the given key")]
    NotFound { entity: &'static str },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }
}
