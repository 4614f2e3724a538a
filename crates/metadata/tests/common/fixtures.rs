//! Test fixtures for generating test data.

use narcache_metadata::models::{CreateChunkParams, CreateNarFileParams, NarInfoParams};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counter for generating unique hashes within a test binary.
static HASH_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A store-path style hash (32 chars) derived from `seed`.
#[allow(dead_code)]
pub fn test_hash(seed: &str) -> String {
    sha256_hash(seed.as_bytes())[..32].to_string()
}

/// A store-path style hash that is unique within this test binary.
#[allow(dead_code)]
pub fn unique_hash(prefix: &str) -> String {
    let counter = HASH_COUNTER.fetch_add(1, Ordering::Relaxed);
    test_hash(&format!("{prefix}-{counter}"))
}

/// A fully populated, migrated narinfo for `hash`.
#[allow(dead_code)]
pub fn migrated_nar_info(hash: &str) -> NarInfoParams {
    let file_hash = sha256_hash(format!("file-{hash}").as_bytes());
    NarInfoParams {
        hash: hash.to_string(),
        store_path: Some(format!("/nix/store/{hash}-hello-2.12.1")),
        url: Some(format!("nar/{file_hash}.nar.xz")),
        compression: Some("xz".to_string()),
        file_hash: Some(format!("sha256:{file_hash}")),
        file_size: Some(4096),
        nar_hash: Some(format!("sha256:{}", sha256_hash(hash.as_bytes()))),
        nar_size: Some(16384),
        deriver: Some(format!("{hash}-hello-2.12.1.drv")),
        system: Some("x86_64-linux".to_string()),
        ca: None,
    }
}

#[allow(dead_code)]
pub fn nar_file(hash: &str, compression: &str, file_size: u64) -> CreateNarFileParams {
    CreateNarFileParams {
        hash: hash.to_string(),
        compression: compression.to_string(),
        query: String::new(),
        file_size,
        total_chunks: 0,
    }
}

#[allow(dead_code)]
pub fn chunk(seed: &str, size: u32) -> CreateChunkParams {
    CreateChunkParams {
        hash: sha256_hash(seed.as_bytes()),
        size,
    }
}

/// Sleep long enough for the next timestamp to differ at microsecond precision.
#[allow(dead_code)]
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
