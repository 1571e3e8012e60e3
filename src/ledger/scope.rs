//! Chain Scope Resolution
//!
//! Maps a business key onto the independent chain it belongs to. Every chain
//! domain declares whether it keeps one organisation-wide chain or one chain
//! per business entity, and scopes that contradict that policy are rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Key used by module-wide chains
pub const GLOBAL_KEY: &str = "global";

/// How a domain partitions its history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopePolicy {
    /// One chain for the whole module, asserting organisation-wide ordering
    Global,
    /// One chain per business entity, asserting only local history
    PerEntity,
}

/// Compliance modules that emit into the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainDomain {
    Correction,
    Consent,
    AdverseEvent,
    AeFollowup,
    Deviation,
    Objection,
    Portability,
    Retention,
}

impl ChainDomain {
    pub const ALL: [ChainDomain; 8] = [
        ChainDomain::Correction,
        ChainDomain::Consent,
        ChainDomain::AdverseEvent,
        ChainDomain::AeFollowup,
        ChainDomain::Deviation,
        ChainDomain::Objection,
        ChainDomain::Portability,
        ChainDomain::Retention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainDomain::Correction => "correction",
            ChainDomain::Consent => "consent",
            ChainDomain::AdverseEvent => "adverse_event",
            ChainDomain::AeFollowup => "ae_followup",
            ChainDomain::Deviation => "deviation",
            ChainDomain::Objection => "objection",
            ChainDomain::Portability => "portability",
            ChainDomain::Retention => "retention",
        }
    }

    pub fn scope_policy(&self) -> ScopePolicy {
        match self {
            ChainDomain::Correction
            | ChainDomain::AdverseEvent
            | ChainDomain::Deviation
            | ChainDomain::Objection
            | ChainDomain::Portability => ScopePolicy::Global,
            ChainDomain::Consent | ChainDomain::AeFollowup | ChainDomain::Retention => {
                ScopePolicy::PerEntity
            }
        }
    }
}

impl fmt::Display for ChainDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainDomain {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChainDomain::ALL
            .iter()
            .copied()
            .find(|domain| domain.as_str() == s)
            .ok_or_else(|| LedgerError::InvalidScope(format!("Unknown chain domain: {}", s)))
    }
}

/// Identity of one independent chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainScope {
    domain: ChainDomain,
    entity: Option<String>,
}

impl ChainScope {
    /// The module-wide chain of a global domain
    pub fn global(domain: ChainDomain) -> Result<Self, LedgerError> {
        Self::resolve(domain, None)
    }

    /// The chain private to one business entity
    pub fn entity(domain: ChainDomain, key: impl Into<String>) -> Result<Self, LedgerError> {
        Self::resolve(domain, Some(key.into()))
    }

    /// Resolve a business key against the domain's scoping policy
    pub fn resolve(domain: ChainDomain, key: Option<String>) -> Result<Self, LedgerError> {
        match (domain.scope_policy(), key) {
            (ScopePolicy::Global, None) => Ok(Self { domain, entity: None }),
            (ScopePolicy::Global, Some(key)) => Err(LedgerError::InvalidScope(format!(
                "{} keeps a single global chain; entity key '{}' not allowed",
                domain, key
            ))),
            (ScopePolicy::PerEntity, None) => Err(LedgerError::InvalidScope(format!(
                "{} chains are scoped per entity; an entity key is required",
                domain
            ))),
            (ScopePolicy::PerEntity, Some(key)) => {
                validate_entity_key(&key)?;
                Ok(Self {
                    domain,
                    entity: Some(key),
                })
            }
        }
    }

    /// Parse a scope key such as `correction:global` or `ae_followup:17`
    pub fn parse(scope_key: &str) -> Result<Self, LedgerError> {
        let (domain, key) = scope_key.split_once(':').ok_or_else(|| {
            LedgerError::InvalidScope(format!(
                "Scope key '{}' must have the form <domain>:<key>",
                scope_key
            ))
        })?;
        let domain: ChainDomain = domain.parse()?;

        if key == GLOBAL_KEY {
            Self::global(domain)
        } else {
            Self::entity(domain, key)
        }
    }

    pub fn domain(&self) -> ChainDomain {
        self.domain
    }

    pub fn entity_key(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    pub fn is_global(&self) -> bool {
        self.entity.is_none()
    }

    /// Partition key stored alongside every entry of this chain
    pub fn key(&self) -> String {
        format!(
            "{}:{}",
            self.domain.as_str(),
            self.entity.as_deref().unwrap_or(GLOBAL_KEY)
        )
    }
}

impl fmt::Display for ChainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for ChainScope {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn validate_entity_key(key: &str) -> Result<(), LedgerError> {
    if key.trim().is_empty() {
        return Err(LedgerError::InvalidScope("Entity key must not be empty".to_string()));
    }
    if key == GLOBAL_KEY {
        return Err(LedgerError::InvalidScope(format!(
            "'{}' is reserved for module-wide chains",
            GLOBAL_KEY
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(LedgerError::InvalidScope(
            "Entity key must not contain control characters".to_string(),
        ));
    }
    Ok(())
}
