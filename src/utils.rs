//! Utility functions for naming, hashing and filesystem cleanup

use crate::config::Config;
use crate::types::ProvenanceId;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Version tag of this worker, reported with every item
pub const RUNTIME_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Make an item name safe for use as a single path component
///
/// ```
/// use archive_worker::utils::escape_item_name;
///
/// assert_eq!(escape_item_name("verizon36pack:ab/c"), "verizon36pack_ab_c");
/// ```
pub fn escape_item_name(name: &str) -> String {
    name.replace([':', '/'], "_")
}

/// Build a WARC file base name: `<prefix>-<escaped-item-name>-<YYYYmmdd-HHMMSS>`
pub fn warc_file_base(prefix: &str, item_name: &str, at: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        escape_item_name(item_name),
        at.format("%Y%m%d-%H%M%S")
    )
}

/// Lowercase hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of a file's contents
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    Ok(sha256_hex(&std::fs::read(path)?))
}

/// Compute the provenance identifiers for a configuration.
///
/// The pipeline hash covers the serialized configuration; the script hash
/// covers the downloader's fetch-policy script. A missing or unreadable script
/// is logged and reported without a hash.
pub fn provenance(config: &Config) -> ProvenanceId {
    let pipeline_hash = match serde_json::to_vec(config) {
        Ok(bytes) => sha256_hex(&bytes),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize configuration for hashing");
            String::new()
        }
    };

    let script_hash = match hash_file(&config.fetch.script) {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::warn!(
                script = %config.fetch.script.display(),
                error = %e,
                "failed to hash fetch-policy script"
            );
            None
        }
    };

    ProvenanceId {
        pipeline_hash,
        script_hash,
        runtime_version: RUNTIME_VERSION.to_string(),
    }
}

/// Recursively delete a directory, treating "already gone" as success
pub async fn remove_dir_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete a file, treating "already gone" as success
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
