//! Scope tree configuration

use crate::error::DigError;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// Behaviour shared by every scope of one tree.
///
/// Loaded from TOML or built in code:
///
/// ```toml
/// defer_acyclic_verification = true
/// shuffle_seed = 42
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Skip the cycle check on each registration and run it once before the
    /// first invocation instead
    pub defer_acyclic_verification: bool,
    /// Seed for group ordering. Entropy when unset.
    pub shuffle_seed: Option<u64>,
}

impl ScopeConfig {
    /// Eager verification, entropy-seeded groups
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With verification deferred to the first invocation
    #[inline]
    #[must_use]
    pub fn with_deferred_verification(mut self) -> Self {
        self.defer_acyclic_verification = true;
        self
    }

    /// With a fixed group shuffle seed
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Parse a configuration document
    ///
    /// # Errors
    /// `DigError::Config` if the document is not valid TOML or has fields of
    /// the wrong type.
    pub fn from_toml_str(input: &str) -> Result<Self, DigError> {
        Ok(toml::from_str(input)?)
    }

    pub(crate) fn make_rng(&self) -> Box<dyn RngCore + Send> {
        match self.shuffle_seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(StdRng::from_entropy()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn config_defaults() {
        let config = ScopeConfig::new();
        assert!(!config.defer_acyclic_verification);
        assert_eq!(config.shuffle_seed, None);
    }

    #[test]
    fn config_builder() {
        let config = ScopeConfig::new().with_deferred_verification().with_seed(7);
        assert!(config.defer_acyclic_verification);
        assert_eq!(config.shuffle_seed, Some(7));
    }

    #[test]
    fn config_from_toml_partial() {
        let config = ScopeConfig::from_toml_str("shuffle_seed = 9").unwrap();
        assert_eq!(config, ScopeConfig::new().with_seed(9));
    }

    #[test]
    fn config_from_toml_rejects_bad_types() {
        let err = ScopeConfig::from_toml_str("defer_acyclic_verification = \"yes\"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn seeded_rngs_repeat() {
        let config = ScopeConfig::new().with_seed(3);
        assert_eq!(config.make_rng().next_u64(), config.make_rng().next_u64());
    }
}
