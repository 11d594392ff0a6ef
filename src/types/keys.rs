use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

const DEPLOYMENT_KEY_BYTES: usize = 27;

/// Generates an unguessable, URL-safe deployment key.
#[must_use]
pub fn generate_deployment_key() -> String {
    let mut bytes = [0u8; DEPLOYMENT_KEY_BYTES];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lowercase hex SHA-256 digest of a bundle.
#[must_use]
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
