use std::collections::HashSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

pub fn generate_code_verifier() -> String {
    random_alphanumeric(128)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Opaque CSRF value for the authorization redirect.
pub fn generate_state() -> String {
    random_alphanumeric(32)
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Drops repeated IDs, keeping the first occurrence of each.
pub fn dedup_preserving_order<I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// File name prefix shared by every harvest snapshot.
pub const SNAPSHOT_PREFIX: &str = "top_tracks_";

pub fn snapshot_file_name(at: DateTime<Utc>) -> String {
    format!("{SNAPSHOT_PREFIX}{}.json", at.timestamp_millis())
}
