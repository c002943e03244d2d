//! Tracking id generation.
//!
//! Format: `<prefix>-<YYYYMMDD>-<XXXXXX>` where the date is the approval date in UTC
//! and the suffix is three bytes from the OS random source, upper-case hex.

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};

/// Number of random bytes in the suffix (six hex digits).
const SUFFIX_BYTES: usize = 3;

/// Generate a tracking id for an issue approved at `approved_at`.
pub fn generate(prefix: &str, approved_at: DateTime<Utc>) -> String {
    let mut suffix = [0u8; SUFFIX_BYTES];
    OsRng.fill_bytes(&mut suffix);

    format!(
        "{}-{}-{}",
        prefix,
        approved_at.format("%Y%m%d"),
        hex::encode_upper(suffix)
    )
}

#[cfg(test)]
pub(crate) fn is_well_formed(id: &str) -> bool {
    let mut parts = id.split('-');
    let (Some(prefix), Some(date), Some(suffix), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    !prefix.is_empty()
        && prefix.chars().all(|c| c.is_ascii_lowercase())
        && date.len() == 8
        && date.chars().all(|c| c.is_ascii_digit())
        && suffix.len() == SUFFIX_BYTES * 2
        && suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}
