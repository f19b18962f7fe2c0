//! Configuration loading and representation.
//!
//! Everything comes from environment variables; anything unset or unparseable
//! falls back to its default (with a warning for the unparseable case).

use wareflow_auth::Role;
use wareflow_requisitions::QuorumPolicy;

pub const DEFAULT_NUMBER_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub quorum_policy: QuorumPolicy,
    /// How many requisition numbers to try before giving up on a collision.
    pub number_attempts: u32,
    /// Role (besides owner and admin) allowed to issue approved stock.
    pub issuer_role: Option<Role>,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            database_url: None,
            quorum_policy: QuorumPolicy::default(),
            number_attempts: DEFAULT_NUMBER_ATTEMPTS,
            issuer_role: None,
        }
    }
}

impl InfraConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("WAREFLOW_STORE") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "memory" | "in_memory" => config.store = StoreBackend::Memory,
                "postgres" => config.store = StoreBackend::Postgres,
                other => tracing::warn!(value = other, "unknown WAREFLOW_STORE, using in-memory store"),
            }
        }

        config.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        if let Some(raw) = lookup("WAREFLOW_QUORUM_POLICY") {
            match raw.parse::<QuorumPolicy>() {
                Ok(policy) => config.quorum_policy = policy,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "unknown WAREFLOW_QUORUM_POLICY, using '{}'",
                    config.quorum_policy.as_str()
                ),
            }
        }

        if let Some(raw) = lookup("WAREFLOW_NUMBER_ATTEMPTS") {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.number_attempts = n,
                _ => tracing::warn!(
                    value = %raw,
                    "invalid WAREFLOW_NUMBER_ATTEMPTS, using {}",
                    DEFAULT_NUMBER_ATTEMPTS
                ),
            }
        }

        config.issuer_role = lookup("WAREFLOW_ISSUER_ROLE")
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .map(Role::from);

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> InfraConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        InfraConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), InfraConfig::default());
    }

    #[test]
    fn reads_every_setting() {
        let c = config(&[
            ("WAREFLOW_STORE", "postgres"),
            ("DATABASE_URL", "postgres://localhost/wareflow"),
            ("WAREFLOW_QUORUM_POLICY", "first_approval"),
            ("WAREFLOW_NUMBER_ATTEMPTS", "9"),
            ("WAREFLOW_ISSUER_ROLE", "storekeeper"),
        ]);
        assert_eq!(c.store, StoreBackend::Postgres);
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/wareflow"));
        assert_eq!(c.quorum_policy, QuorumPolicy::FirstApproval);
        assert_eq!(c.number_attempts, 9);
        assert_eq!(c.issuer_role, Some(Role::new("storekeeper")));
    }

    #[test]
    fn bad_values_fall_back() {
        let c = config(&[
            ("WAREFLOW_STORE", "mongo"),
            ("WAREFLOW_QUORUM_POLICY", "majority"),
            ("WAREFLOW_NUMBER_ATTEMPTS", "0"),
            ("WAREFLOW_ISSUER_ROLE", "  "),
        ]);
        assert_eq!(c, InfraConfig::default());
    }
}
