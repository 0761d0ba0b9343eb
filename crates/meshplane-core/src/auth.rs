//! Auth collaborator interface.
//!
//! Password hashing and 2FA verification live outside the core; the
//! dispatcher only delegates to an [`AuthProvider`] and wraps failures
//! like any other handler error. [`MemoryAuth`] is the in-process
//! implementation used by the shipped server and by tests.

use crate::error::{MeshError, MeshResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use subtle::ConstantTimeEq;
use tracing::debug;

/// External authentication collaborator consumed by the dispatcher.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Hash a plaintext password for storage.
    async fn create_password(&self, password: &str) -> MeshResult<String>;

    /// Check an email/password pair.
    async fn authenticate(&self, email: &str, password: &str) -> MeshResult<bool>;

    /// Check a one-time 2FA code for an account.
    async fn verify_2fa(&self, email: &str, code: &str) -> MeshResult<bool>;
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// In-memory AuthProvider: SHA-256 password hashes and static 2FA codes.
///
/// Accounts and codes are seeded out-of-band (ops tooling or test setup);
/// the RPC surface only ever reads them.
#[derive(Debug, Default)]
pub struct MemoryAuth {
    /// email → password hash.
    accounts: RwLock<HashMap<String, String>>,
    /// email → expected 2FA code.
    codes: RwLock<HashMap<String, String>>,
}

impl MemoryAuth {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with a plaintext password.
    pub fn add_account(&self, email: &str, password: &str) {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.insert(email.to_string(), sha256_hex(password));
        debug!(email, "Seeded auth account");
    }

    /// Seed the expected 2FA code for an account.
    pub fn set_code(&self, email: &str, code: &str) {
        let mut codes = self.codes.write().unwrap_or_else(|e| e.into_inner());
        codes.insert(email.to_string(), code.to_string());
    }

    /// Drop all accounts and codes. Testing/ops tooling only.
    pub fn reset(&self) {
        self.accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.codes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn create_password(&self, password: &str) -> MeshResult<String> {
        if password.is_empty() {
            return Err(MeshError::Auth("Password must not be empty".to_string()));
        }
        Ok(sha256_hex(password))
    }

    async fn authenticate(&self, email: &str, password: &str) -> MeshResult<bool> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let Some(stored) = accounts.get(email) else {
            return Ok(false);
        };
        Ok(constant_time_eq(stored, &sha256_hex(password)))
    }

    async fn verify_2fa(&self, email: &str, code: &str) -> MeshResult<bool> {
        let codes = self.codes.read().unwrap_or_else(|e| e.into_inner());
        let Some(expected) = codes.get(email) else {
            return Ok(false);
        };
        Ok(constant_time_eq(expected, code))
    }
}
