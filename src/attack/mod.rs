//! Attack strategies: lazy candidate generators over a wordlist, a mask, or
//! a composition of both.
//!
//! An [`AttackStrategy`] pairs one generator variant with the hash algorithm,
//! the normalized target digest and an attempt counter. Candidate streams are
//! boxed iterators so the engine can move them onto a dispatcher thread; items
//! are `Result`s because wordlist reads can fail mid-stream.
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::hash::{HashAlgorithm, HashError};
use crate::mask::MaskError;

pub mod brute_force;
pub mod dictionary;
pub mod hybrid;
pub mod rules;

pub use brute_force::BruteForce;
pub use dictionary::{Dictionary, WordlistStats};
pub use hybrid::{Hybrid, HybridMode};

/// A lazy, possibly unbounded, stream of candidate passwords.
pub type Candidates = Box<dyn Iterator<Item = Result<String, AttackError>> + Send + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum AttackError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Mask(#[from] MaskError),
    #[error("wordlist not found: {}", .0.display())]
    WordlistNotFound(PathBuf),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
    #[error("target digest has not been set")]
    TargetNotSet,
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The three generator variants.
#[derive(Debug, Clone)]
pub enum Strategy {
    Dictionary(Dictionary),
    BruteForce(BruteForce),
    Hybrid(Hybrid),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Dictionary(_) => "Dictionary Attack",
            Strategy::BruteForce(_) => "Brute-Force Attack",
            Strategy::Hybrid(_) => "Hybrid Attack",
        }
    }

    pub fn candidates(&self) -> Result<Candidates, AttackError> {
        match self {
            Strategy::Dictionary(d) => d.candidates(),
            Strategy::BruteForce(b) => Ok(b.candidates()),
            Strategy::Hybrid(h) => h.candidates(),
        }
    }

    pub fn info(&self) -> StrategyInfo {
        let mut info = StrategyInfo::new(self.name());
        match self {
            Strategy::Dictionary(d) => d.describe(&mut info),
            Strategy::BruteForce(b) => b.describe(&mut info),
            Strategy::Hybrid(h) => h.describe(&mut info),
        }
        info
    }
}

/// Ordered key/value description of a strategy, for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyInfo {
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl StrategyInfo {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, key: &str, value: impl fmt::Display) {
        self.fields.push((key.to_string(), value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyStats {
    pub attempts: u64,
    pub strategy: String,
    pub algorithm: String,
    pub target: Option<String>,
}

/// A generator variant bound to a hash algorithm and a target digest.
#[derive(Debug)]
pub struct AttackStrategy {
    strategy: Strategy,
    algorithm: Arc<dyn HashAlgorithm>,
    target: Option<String>,
    attempts: AtomicU64,
}

impl AttackStrategy {
    pub fn new(strategy: Strategy, algorithm: Arc<dyn HashAlgorithm>) -> Self {
        Self {
            strategy,
            algorithm,
            target: None,
            attempts: AtomicU64::new(0),
        }
    }

    /// Wordlist attack, optionally expanding each word with mutation rules.
    pub fn dictionary(
        algorithm: Arc<dyn HashAlgorithm>,
        wordlist: impl Into<PathBuf>,
        apply_rules: bool,
    ) -> Self {
        Self::new(
            Strategy::Dictionary(Dictionary::new(wordlist, apply_rules)),
            algorithm,
        )
    }

    /// Mask attack. Length bounds default to the mask's placeholder count.
    pub fn brute_force(
        algorithm: Arc<dyn HashAlgorithm>,
        mask: &str,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Result<Self, AttackError> {
        let brute = BruteForce::new(mask, min_length, max_length)?;
        Ok(Self::new(Strategy::BruteForce(brute), algorithm))
    }

    pub fn hybrid(
        algorithm: Arc<dyn HashAlgorithm>,
        wordlist: impl Into<PathBuf>,
        mask: Option<&str>,
        mode: HybridMode,
    ) -> Result<Self, AttackError> {
        let hybrid = Hybrid::new(wordlist, mask, mode)?;
        Ok(Self::new(Strategy::Hybrid(hybrid), algorithm))
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn algorithm(&self) -> &Arc<dyn HashAlgorithm> {
        &self.algorithm
    }

    /// Normalize and store the digest to attack.
    pub fn set_target(&mut self, digest: &str) {
        self.target = Some(self.algorithm.normalize_hash(digest));
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Start a fresh candidate stream.
    pub fn generate(&self) -> Result<Candidates, AttackError> {
        self.strategy.candidates()
    }

    /// Count one attempt and test `candidate` against the stored target.
    pub fn verify(&self, candidate: &str) -> Result<bool, AttackError> {
        let target = self.target.as_deref().ok_or(AttackError::TargetNotSet)?;
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Ok(self.algorithm.verify(candidate, target)?)
    }

    /// Fold attempts made elsewhere (for example by engine workers) into
    /// this strategy's counter.
    pub fn record_attempts(&self, attempts: u64) {
        self.attempts.fetch_add(attempts, Ordering::Relaxed);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn reset_stats(&mut self) {
        *self.attempts.get_mut() = 0;
    }

    pub fn stats(&self) -> StrategyStats {
        StrategyStats {
            attempts: self.attempts(),
            strategy: self.name().to_string(),
            algorithm: self.algorithm.name().to_string(),
            target: self.target.clone(),
        }
    }

    pub fn info(&self) -> StrategyInfo {
        self.strategy.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::md5;

    #[test]
    fn verify_counts_attempts_and_reset_clears() {
        let mut s = AttackStrategy::brute_force(Arc::new(md5()), "?d", None, None).unwrap();
        assert!(matches!(s.verify("1"), Err(AttackError::TargetNotSet)));
        s.set_target("  C4CA4238A0B923820DCC509A6F75849B ");
        assert_eq!(s.target(), Some("c4ca4238a0b923820dcc509a6f75849b"));
        assert!(!s.verify("0").unwrap());
        assert!(s.verify("1").unwrap());
        assert_eq!(s.attempts(), 2);
        s.record_attempts(5);
        assert_eq!(s.stats().attempts, 7);
        s.reset_stats();
        assert_eq!(s.attempts(), 0);
        assert_eq!(s.stats().algorithm, "MD5");
        assert_eq!(s.stats().strategy, "Brute-Force Attack");
    }
}
