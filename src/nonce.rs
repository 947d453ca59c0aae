//! Anti-replay nonces.
//!
//! Every response the dispatcher sends carries a fresh `Replay-Nonce`; every
//! signed POST must echo one back in its protected header. A nonce is good for
//! exactly one request.
//!
//! # Bounds
//!
//! - `capacity`: outstanding nonces kept; issuing past it evicts the oldest
//! - `ttl`: nonces older than this are rejected and pruned

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ring::rand::{SecureRandom, SystemRandom};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::NonceConfig;
use crate::errors::AcmeError;
use crate::jose::encode_b64;

const NONCE_BYTES: usize = 16;

#[derive(Debug, Default)]
struct Outstanding {
    /// nonce -> (issue sequence, issued at)
    by_value: HashMap<String, (u64, Instant)>,
    /// issue sequence -> nonce, oldest first
    by_age: BTreeMap<u64, String>,
    next_sequence: u64,
}

impl Outstanding {
    fn remove_oldest(&mut self) {
        if let Some((_, nonce)) = self.by_age.pop_first() {
            self.by_value.remove(&nonce);
        }
    }

    fn prune_expired(&mut self, ttl: Duration, now: Instant) {
        while let Some((_, nonce)) = self.by_age.first_key_value() {
            match self.by_value.get(nonce) {
                Some((_, issued)) if now.duration_since(*issued) <= ttl => break,
                _ => self.remove_oldest(),
            }
        }
    }
}

/// Issues and consumes single-use nonces.
#[derive(Debug, Clone)]
pub struct NonceService {
    outstanding: Arc<Mutex<Outstanding>>,
    rng: SystemRandom,
    capacity: usize,
    ttl: Duration,
}

impl NonceService {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            outstanding: Arc::new(Mutex::new(Outstanding::default())),
            rng: SystemRandom::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &NonceConfig) -> Self {
        Self::new(config.capacity, Duration::from_secs(config.ttl_seconds))
    }

    /// Mint a fresh nonce and remember it as outstanding.
    pub async fn issue(&self) -> Result<String, AcmeError> {
        let mut bytes = [0u8; NONCE_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AcmeError::internal("Unable to generate nonce"))?;
        let nonce = encode_b64(&bytes);

        let now = Instant::now();
        let mut outstanding = self.outstanding.lock().await;
        outstanding.prune_expired(self.ttl, now);
        while outstanding.by_value.len() >= self.capacity {
            outstanding.remove_oldest();
        }

        let sequence = outstanding.next_sequence;
        outstanding.next_sequence += 1;
        outstanding.by_value.insert(nonce.clone(), (sequence, now));
        outstanding.by_age.insert(sequence, nonce.clone());

        Ok(nonce)
    }

    /// Consume `nonce`. Returns `true` only for the first caller presenting an
    /// outstanding, unexpired nonce.
    pub async fn consume(&self, nonce: &str) -> bool {
        let mut outstanding = self.outstanding.lock().await;
        match outstanding.by_value.remove(nonce) {
            Some((sequence, issued)) => {
                outstanding.by_age.remove(&sequence);
                if issued.elapsed() > self.ttl {
                    debug!("Rejected expired nonce");
                    return false;
                }
                true
            }
            None => {
                warn!(outstanding = outstanding.by_value.len(), "Rejected unknown or reused nonce");
                false
            }
        }
    }

    /// Number of nonces currently outstanding.
    pub async fn outstanding(&self) -> usize {
        self.outstanding.lock().await.by_value.len()
    }
}
