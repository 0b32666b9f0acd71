//! Storage keys and the opaque handles handed out to clients.
//!
//! A storage key has the shape `<day-bucket>/<token>`: an 8-character date
//! stamp, a single `/`, and a 16-character token. A handle is the same key
//! with the separator dropped, so it is always 24 characters long.
//!
//! The encoding only hides the key layout. It is not encryption and offers no
//! access control: anyone holding a handle can read the blob, and any
//! 24-character string decodes to some syntactically valid key. Whether an
//! object actually lives there is decided by the store.

pub mod key_generator;

use std::fmt;

use thiserror::Error;

/// Length of the `YYYYMMDD` day-bucket prefix.
pub const DAY_BUCKET_LEN: usize = 8;
/// Length of the random token that follows the separator.
pub const TOKEN_LEN: usize = 16;
/// Length of an encoded handle.
pub const HANDLE_LEN: usize = DAY_BUCKET_LEN + TOKEN_LEN;
/// Separator between day-bucket and token inside a storage key.
pub const SEPARATOR: char = '/';

/// Returned when a string cannot be turned into a storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid name")]
pub struct InvalidHandle;

/// Backend key of one stored blob, `<day-bucket>/<token>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    day_bucket: String,
    token: String,
}

impl StorageKey {
    /// Build a key from its two halves. Lengths are counted in characters.
    pub fn new(day_bucket: &str, token: &str) -> Result<Self, InvalidHandle> {
        if day_bucket.chars().count() != DAY_BUCKET_LEN || token.chars().count() != TOKEN_LEN {
            return Err(InvalidHandle);
        }
        Ok(Self {
            day_bucket: day_bucket.to_string(),
            token: token.to_string(),
        })
    }

    /// Parse the `8 chars + '/' + 16 chars` form.
    pub fn parse(raw: &str) -> Result<Self, InvalidHandle> {
        let (split_at, sep) = raw.char_indices().nth(DAY_BUCKET_LEN).ok_or(InvalidHandle)?;
        if sep != SEPARATOR {
            return Err(InvalidHandle);
        }
        Self::new(&raw[..split_at], &raw[split_at + sep.len_utf8()..])
    }

    pub fn day_bucket(&self) -> &str {
        &self.day_bucket
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.day_bucket, SEPARATOR, self.token)
    }
}

/// Address the sweeper uses for a whole day-bucket: the date stamp followed by
/// a trailing separator and no token.
pub fn bucket_address(day_bucket: &str) -> String {
    format!("{}{}", day_bucket, SEPARATOR)
}

/// Turn a storage key into the 24-character handle given to clients.
pub fn encode(key: &StorageKey) -> String {
    let mut handle = String::with_capacity(key.day_bucket.len() + key.token.len());
    handle.push_str(&key.day_bucket);
    handle.push_str(&key.token);
    handle
}

/// Rebuild the storage key behind a handle.
///
/// Fails with [`InvalidHandle`] unless `handle` is exactly 24 characters.
pub fn decode(handle: &str) -> Result<StorageKey, InvalidHandle> {
    if handle.chars().count() != HANDLE_LEN {
        return Err(InvalidHandle);
    }
    let split_at = handle
        .char_indices()
        .nth(DAY_BUCKET_LEN)
        .map(|(idx, _)| idx)
        .ok_or(InvalidHandle)?;
    let (day_bucket, token) = handle.split_at(split_at);
    Ok(StorageKey {
        day_bucket: day_bucket.to_string(),
        token: token.to_string(),
    })
}
