//! Reproducibility tracking: seed derivation, fold-plan fingerprints, environment snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Snapshot of the environment a run was executed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub crate_version: String,
    pub platform: String,
    pub arch: String,
    pub timestamp: DateTime<Utc>,
}

impl EnvironmentSnapshot {
    pub fn capture() -> Self {
        Self {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Derives per-repetition seeds from one global seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedManager {
    pub global_seed: u64,
}

impl SeedManager {
    pub fn new(global_seed: u64) -> Self {
        Self { global_seed }
    }

    /// Repetition 0 uses the global seed itself, so a single run and the
    /// first repetition of a repeated run partition identically.
    pub fn repetition_seed(&self, repetition: usize) -> u64 {
        self.global_seed.wrapping_add(repetition as u64)
    }
}

/// SHA-256 over a fold count and canonical labels, hex encoded.
pub fn fingerprint_labels(k: usize, labels: &[usize]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((k as u64).to_le_bytes());
    for &l in labels {
        hasher.update((l as u64).to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}
