//! Serialized scrypt execution.
//!
//! Scrypt is memory-hard; two concurrent derivations can pin a low-end
//! device. Every call in the engine funnels through this worker, which
//! runs one derivation at a time on the blocking pool. A new call waits
//! for the running one to settle, success or failure, before starting.
//! A derivation already running cannot be cancelled.

use std::time::Instant;

use tokio::sync::{Mutex, OnceCell};

use coffer_crypto::{scrypt_derive, username_id_snrp, Snrp};

use crate::error::{LoginError, Result};
use crate::username::fix_username;

/// Default target latency for password stretching, in milliseconds.
const SNRP_TARGET_MS: u64 = 2000;

/// One-at-a-time scrypt queue with a cached device benchmark.
pub struct ScryptWorker {
    gate: Mutex<()>,
    bench_ms: OnceCell<u64>,
    target_ms: u64,
}

impl Default for ScryptWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScryptWorker {
    pub fn new() -> Self {
        ScryptWorker {
            gate: Mutex::new(()),
            bench_ms: OnceCell::new(),
            target_ms: SNRP_TARGET_MS,
        }
    }

    /// Run scrypt over `data` with the given parameters.
    pub async fn derive(&self, data: Vec<u8>, snrp: &Snrp) -> Result<[u8; 32]> {
        let _slot = self.gate.lock().await;
        let snrp = snrp.clone();
        tokio::task::spawn_blocking(move || scrypt_derive(&data, &snrp))
            .await
            .map_err(|err| LoginError::Internal(format!("scrypt task failed: {err}")))?
            .map_err(LoginError::from)
    }

    /// Hash a username into its stable 32-byte identifier.
    pub async fn hash_username(&self, username: &str) -> Result<[u8; 32]> {
        let fixed = fix_username(username)?;
        self.derive(fixed.into_bytes(), &username_id_snrp()).await
    }

    /// Choose fresh password-stretching parameters for this device,
    /// benchmarking the baseline cost once and caching the result.
    pub async fn make_snrp(&self) -> Result<Snrp> {
        let bench_ms = *self
            .bench_ms
            .get_or_try_init(|| self.run_benchmark())
            .await?;
        Ok(coffer_crypto::make_snrp(bench_ms, self.target_ms))
    }

    async fn run_benchmark(&self) -> Result<u64> {
        let started = Instant::now();
        self.derive(b"benchmark".to_vec(), &Snrp::base(vec![0; 32]))
            .await?;
        Ok(started.elapsed().as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_username_is_stable_and_normalized() {
        let worker = ScryptWorker::new();
        let a = worker.hash_username("Edge").await.unwrap();
        let b = worker.hash_username("  edge ").await.unwrap();
        let c = worker.hash_username("other").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_concurrent_derives_serialize() {
        let worker = std::sync::Arc::new(ScryptWorker::new());
        let snrp = Snrp {
            salt: vec![1; 32],
            n: 1024,
            r: 1,
            p: 1,
        };

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let worker = worker.clone();
                let snrp = snrp.clone();
                tokio::spawn(async move { worker.derive(vec![i], &snrp).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_make_snrp_caches_benchmark() {
        let worker = ScryptWorker::new();
        let first = worker.make_snrp().await.unwrap();
        let second = worker.make_snrp().await.unwrap();
        // Same cached benchmark, so the same cost parameters; salts differ.
        assert_eq!((first.n, first.r, first.p), (second.n, second.r, second.p));
        assert_ne!(first.salt, second.salt);
    }
}
