//! Config/Secrets façade: a small layer over three sources of truth for
//! secret material and environment-bound knobs, in precedence order:
//! (1) in-memory override (tests), (2) secret-store lookup by logical
//! name, (3) environment variable. Never logs a resolved value; caches
//! positive lookups for the process lifetime and negative lookups briefly
//! so a missing secret doesn't mean one lookup per call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// The actual secret-store backend is an external collaborator — this
/// trait is the named interface the façade consumes. Production wiring
/// supplies a real implementation (Vault, Secret Manager, etc.); dev/test
/// wiring uses [`NullBackend`].
pub trait SecretBackend: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Backend that never finds anything — every lookup falls through to the
/// environment-variable tier. Used in local dev and in tests that only
/// exercise the override tier.
pub struct NullBackend;

impl SecretBackend for NullBackend {
    fn lookup(&self, _name: &str) -> Option<String> {
        None
    }
}

const NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(30);

pub struct Secrets {
    overrides: DashMap<String, String>,
    backend: Arc<dyn SecretBackend>,
    positive_cache: DashMap<String, String>,
    negative_cache: DashMap<String, Instant>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("overrides", &self.overrides.len())
            .field("positive_cache", &self.positive_cache.len())
            .finish()
    }
}

impl Secrets {
    pub fn new(backend: Arc<dyn SecretBackend>) -> Self {
        Self {
            overrides: DashMap::new(),
            backend,
            positive_cache: DashMap::new(),
            negative_cache: DashMap::new(),
        }
    }

    pub fn with_null_backend() -> Self {
        Self::new(Arc::new(NullBackend))
    }

    /// Test-only: force a logical name to resolve to a fixed value,
    /// bypassing the secret store and environment entirely.
    pub fn set_override(&self, name: &str, value: impl Into<String>) {
        self.overrides.insert(name.to_string(), value.into());
        self.positive_cache.remove(name);
        self.negative_cache.remove(name);
    }

    /// Resolve a logical secret name through override → store → env, with
    /// caching. Returns `None` if no tier has a value.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(v) = self.overrides.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.positive_cache.get(name) {
            return Some(v.clone());
        }
        if let Some(seen_at) = self.negative_cache.get(name) {
            if seen_at.elapsed() < NEGATIVE_CACHE_TTL {
                return None;
            }
        }

        let resolved = self
            .backend
            .lookup(name)
            .or_else(|| std::env::var(env_key(name)).ok());

        match resolved {
            Some(v) => {
                self.positive_cache.insert(name.to_string(), v.clone());
                self.negative_cache.remove(name);
                Some(v)
            }
            None => {
                self.negative_cache.insert(name.to_string(), Instant::now());
                None
            }
        }
    }

    pub fn get_or(&self, name: &str, default: impl Into<String>) -> String {
        self.get(name).unwrap_or_else(|| default.into())
    }

    pub fn get_required(&self, name: &str) -> crate::error::Result<String> {
        self.get(name)
            .ok_or_else(|| crate::error::NjvoxError::Config(format!("missing secret: {}", name)))
    }
}

/// Logical secret names are uppercased and stored under `NJVOX_SECRET_*`
/// so they're visually distinct from ordinary config overrides.
fn env_key(name: &str) -> String {
    format!("NJVOX_SECRET_{}", name.to_uppercase().replace('-', "_"))
}
