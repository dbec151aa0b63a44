//! Daily-rotating visitor tokens
//!
//! A visitor is identified by `sha256(salt + ":" + address)` where the salt
//! is a random value stored under `salt:<date>` for 24 hours. Tokens from two
//! different days share no salt and cannot be linked to each other or back
//! to the address once the salt has expired.

use base64::prelude::*;
use chrono::NaiveDate;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::analytics::keys;
use crate::clock::Clock;
use crate::storage::{CounterStore, StorageResult};

/// Random bytes per salt (256 bits)
const SALT_BYTES: usize = 32;

pub struct Anonymizer {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    /// Salts are immutable once stored, so a resolved salt can be reused for the rest of its day
    salts: Cache<NaiveDate, Arc<str>>,
}

impl Anonymizer {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        let salts = Cache::builder()
            .max_capacity(4)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Self {
            store,
            clock,
            salts,
        }
    }

    /// Opaque token for `address`, stable for the current day only
    pub async fn anonymize(&self, address: &str) -> StorageResult<String> {
        let today = self.clock.today();
        let salt = self.salt_for(today).await?;
        Ok(token(&salt, address))
    }

    /// Today's salt, created on first use
    async fn salt_for(&self, date: NaiveDate) -> StorageResult<Arc<str>> {
        if let Some(salt) = self.salts.get(&date).await {
            return Ok(salt);
        }

        let key = keys::salt(date);
        let salt = match self.store.get(&key).await? {
            Some(existing) => existing,
            None => {
                // Losing a creation race is fine: put_if_absent hands back the winner
                let stored = self
                    .store
                    .put_if_absent(&key, &generate_salt(), keys::SALT_TTL)
                    .await?;
                debug!(%date, "created daily salt");
                stored
            }
        };

        let salt: Arc<str> = Arc::from(salt);
        self.salts.insert(date, Arc::clone(&salt)).await;
        Ok(salt)
    }
}

fn generate_salt() -> String {
    let bytes: [u8; SALT_BYTES] = rand::random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

fn token(salt: &str, address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(address.as_bytes());
    format!("{:x}", hasher.finalize())
}
