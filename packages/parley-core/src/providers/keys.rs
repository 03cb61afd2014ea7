//! Per-tenant provider API keys, encrypted at rest.
//!
//! Tenant keys are stored on the Organization record as AES-256-GCM blobs
//! laid out as `salt(16) ‖ nonce(12) ‖ ciphertext+tag`. The per-blob key is
//! derived as `SHA-256(master ‖ salt)`. Decrypted keys are cached in a
//! bounded map; the process-wide key from configuration is the fallback.

use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::protocol_constants::KEY_CACHE_MAX_ENTRIES;
use crate::repos::OrganizationRepo;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Errors from key vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Blob is shorter than the salt+nonce preamble.
    #[error("encrypted key blob is malformed")]
    Malformed,
    /// Authentication tag mismatch or corrupted ciphertext.
    #[error("failed to decrypt key blob")]
    Decrypt,
    /// Decrypted plaintext is not valid UTF-8.
    #[error("decrypted key is not valid UTF-8")]
    Encoding,
}

/// Symmetric vault for provider keys.
#[derive(Clone)]
pub struct KeyVault {
    master: [u8; 32],
}

impl KeyVault {
    /// Creates a vault from a 32-byte master secret.
    pub fn new(master: [u8; 32]) -> Self {
        Self { master }
    }

    /// Derives a master secret from arbitrary configuration material.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut master = [0u8; 32];
        master.copy_from_slice(&digest);
        Self { master }
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.master);
        hasher.update(salt);
        let mut key = [0u8; 32];
        key.copy_from_slice(&hasher.finalize());
        key
    }

    /// Encrypts a plaintext key into the at-rest blob layout.
    pub fn encrypt(&self, plaintext: &str) -> Vec<u8> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.derive_key(&salt)));
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .expect("AES-GCM encryption is infallible for in-memory buffers");

        let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        blob
    }

    /// Decrypts an at-rest blob back to the plaintext key.
    pub fn decrypt(&self, blob: &[u8]) -> Result<String, VaultError> {
        if blob.len() <= SALT_LEN + NONCE_LEN {
            return Err(VaultError::Malformed);
        }
        let (salt, rest) = blob.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.derive_key(salt)));
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::Encoding)
    }
}

/// Resolves the provider key for a request, preferring the tenant's own key.
///
/// Shared by all provider clients. Thread-safe; decrypted tenant keys are
/// cached in a bounded map.
pub struct ApiKeys {
    default_key: Option<String>,
    vault: Option<KeyVault>,
    orgs: Option<Arc<dyn OrganizationRepo>>,
    cache: Mutex<HashMap<String, String>>,
}

impl ApiKeys {
    /// Creates a resolver with only a process-wide key (no tenant keys).
    pub fn fixed(default_key: Option<String>) -> Self {
        Self {
            default_key,
            vault: None,
            orgs: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a resolver with tenant key support.
    pub fn with_tenant_keys(
        default_key: Option<String>,
        vault: KeyVault,
        orgs: Arc<dyn OrganizationRepo>,
    ) -> Self {
        Self {
            default_key,
            vault: Some(vault),
            orgs: Some(orgs),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a process-wide key is configured.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.default_key.is_some()
    }

    /// Resolves the key for a tenant, falling back to the process-wide key.
    ///
    /// Tenant lookup and decryption failures degrade to the fallback; they
    /// are logged, never surfaced to the caller.
    pub async fn for_tenant(&self, tenant_id: Option<&str>) -> Option<String> {
        if let Some(tenant) = tenant_id {
            if let Some(key) = self.cache.lock().get(tenant).cloned() {
                return Some(key);
            }
            if let Some(key) = self.resolve_tenant(tenant).await {
                let mut cache = self.cache.lock();
                if cache.len() >= KEY_CACHE_MAX_ENTRIES {
                    // Bounded: evict an arbitrary entry rather than grow
                    if let Some(evict) = cache.keys().next().cloned() {
                        cache.remove(&evict);
                    }
                }
                cache.insert(tenant.to_string(), key.clone());
                return Some(key);
            }
        }
        self.default_key.clone()
    }

    async fn resolve_tenant(&self, tenant_id: &str) -> Option<String> {
        let (vault, orgs) = match (&self.vault, &self.orgs) {
            (Some(v), Some(o)) => (v, o),
            _ => return None,
        };
        let org = match orgs.get(tenant_id).await {
            Ok(Some(org)) => org,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("[Keys] Organization lookup failed for {}: {}", tenant_id, e);
                return None;
            }
        };
        let blob = org.encrypted_provider_key?;
        match vault.decrypt(&blob) {
            Ok(key) => Some(key),
            Err(e) => {
                log::warn!("[Keys] Failed to decrypt key for tenant {}: {}", tenant_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Organization;
    use crate::repos::memory::InMemoryOrganizationRepo;

    fn vault() -> KeyVault {
        KeyVault::from_secret("test-master-secret")
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let vault = vault();
        let blob = vault.encrypt("sk-tenant-key");
        assert!(blob.len() > SALT_LEN + NONCE_LEN);
        assert_eq!(vault.decrypt(&blob).unwrap(), "sk-tenant-key");
    }

    #[test]
    fn blobs_differ_per_encryption() {
        let vault = vault();
        // Random salt and nonce: identical plaintexts produce distinct blobs
        assert_ne!(vault.encrypt("same"), vault.encrypt("same"));
    }

    #[test]
    fn tampered_blob_fails_decryption() {
        let vault = vault();
        let mut blob = vault.encrypt("sk-tenant-key");
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(matches!(vault.decrypt(&blob), Err(VaultError::Decrypt)));
    }

    #[test]
    fn truncated_blob_is_malformed() {
        let vault = vault();
        assert!(matches!(
            vault.decrypt(&[0u8; SALT_LEN + NONCE_LEN]),
            Err(VaultError::Malformed)
        ));
    }

    #[test]
    fn wrong_master_fails_decryption() {
        let blob = vault().encrypt("sk-tenant-key");
        let other = KeyVault::from_secret("different-secret");
        assert!(other.decrypt(&blob).is_err());
    }

    #[tokio::test]
    async fn for_tenant_prefers_org_key_and_caches() {
        let vault = vault();
        let orgs = Arc::new(InMemoryOrganizationRepo::default());
        orgs.put(Organization {
            id: "t1".into(),
            name: "Fund I".into(),
            encrypted_provider_key: Some(vault.encrypt("sk-tenant")),
        });

        let keys = ApiKeys::with_tenant_keys(Some("sk-default".into()), vault, orgs);
        assert_eq!(keys.for_tenant(Some("t1")).await.as_deref(), Some("sk-tenant"));
        // Cached on second resolve
        assert_eq!(keys.cache.lock().len(), 1);
        assert_eq!(keys.for_tenant(Some("t1")).await.as_deref(), Some("sk-tenant"));
    }

    #[tokio::test]
    async fn for_tenant_falls_back_to_default() {
        let keys = ApiKeys::fixed(Some("sk-default".into()));
        assert_eq!(keys.for_tenant(Some("unknown")).await.as_deref(), Some("sk-default"));
        assert_eq!(keys.for_tenant(None).await.as_deref(), Some("sk-default"));
    }

    #[tokio::test]
    async fn no_keys_resolves_to_none() {
        let keys = ApiKeys::fixed(None);
        assert_eq!(keys.for_tenant(None).await, None);
    }
}
