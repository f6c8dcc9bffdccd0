//! Shared state handed to every handler

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::config::{BroadcastConfig, Config, RaceConfig};
use crate::storage::SharedStore;

/// Shared state for the race server
#[derive(Clone)]
pub struct AppState {
    /// Position store shared by the ping handler and every viewer task
    pub store: SharedStore,
    /// Delay, poll cadence and batch sizes for the broadcast stream
    pub broadcast: BroadcastConfig,
    /// Race description served by the status endpoints
    pub race: Arc<RaceConfig>,
    /// SHA-256 of the expected `Authorization` header value
    expected_auth: Option<[u8; 32]>,
}

impl AppState {
    pub fn new(config: &Config, store: SharedStore) -> Self {
        Self {
            store,
            broadcast: config.broadcast.clone(),
            race: Arc::new(config.race.clone()),
            expected_auth: config
                .ping_secret
                .as_deref()
                .map(|secret| digest(&format!("Bearer {}", secret))),
        }
    }

    /// Whether an ingestion secret is configured at all
    pub fn auth_configured(&self) -> bool {
        self.expected_auth.is_some()
    }

    /// Exact-match check of the `Authorization` header
    ///
    /// Digests are compared instead of the raw strings so the comparison
    /// does not stop at the first differing byte. No secret configured
    /// means nothing is authorized.
    pub fn is_authorized(&self, header: Option<&str>) -> bool {
        match (self.expected_auth, header) {
            (Some(expected), Some(given)) => {
                let given = digest(given);
                expected
                    .iter()
                    .zip(given.iter())
                    .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                    == 0
            }
            _ => false,
        }
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}
