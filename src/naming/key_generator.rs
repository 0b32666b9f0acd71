//! Storage key generation for new uploads

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::naming::{StorageKey, TOKEN_LEN};

/// Letters a token is drawn from. No digits or symbols.
pub const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Date format of the day-bucket prefix.
pub const DAY_BUCKET_FORMAT: &str = "%Y%m%d";

/// Format a timestamp as a `YYYYMMDD` day-bucket.
pub fn day_bucket(at: DateTime<Utc>) -> String {
    at.format(DAY_BUCKET_FORMAT).to_string()
}

/// Draw a token of `TOKEN_LEN` letters from `rng`.
pub fn random_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Produces storage keys for uploads.
///
/// The random source is non-cryptographic and owned by the generator so that
/// tests can seed it.
pub struct KeyGenerator {
    rng: Mutex<SmallRng>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_os_rng()),
        }
    }

    /// Deterministic generator for tests.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Key for an upload happening at `now`.
    pub fn generate_at(&self, now: DateTime<Utc>) -> StorageKey {
        let token = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            random_token(&mut *rng)
        };
        StorageKey {
            day_bucket: day_bucket(now),
            token,
        }
    }

    /// Key for an upload happening now, bucketed by the current UTC date.
    pub fn generate(&self) -> StorageKey {
        self.generate_at(Utc::now())
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}
