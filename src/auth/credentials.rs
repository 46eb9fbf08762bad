//! Bearer credential storage with an in-memory fast path.
//!
//! The durable layer is pluggable: production uses the OS keychain via
//! `keyring`, tests and ephemeral tooling use [`MemoryBackend`]. The
//! in-memory copy is authoritative for the current process - it is updated
//! before the durable write so concurrent readers never observe a
//! half-written state.

use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

/// Keychain service name
const SERVICE_NAME: &str = "com.medibook.client";

/// Keychain account under which the bearer token lives
const TOKEN_KEY: &str = "session-token";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Refusing to store an empty credential")]
    InvalidCredential,

    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Durable storage for a single opaque credential string.
///
/// Production: OS keychain via the `keyring` crate.
/// Testing: in-memory map.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialBackend: Send + Sync {
    fn write(&self, value: &str) -> Result<(), CredentialError>;

    /// Read the stored credential. `Ok(None)` means absent; `Err` is a
    /// genuine storage-layer fault.
    fn read(&self) -> Result<Option<String>, CredentialError>;

    fn delete(&self) -> Result<(), CredentialError>;
}

/// OS keychain backend.
pub struct KeyringBackend;

impl KeyringBackend {
    fn entry(&self) -> Result<Entry, CredentialError> {
        Entry::new(SERVICE_NAME, TOKEN_KEY)
            .map_err(|e| CredentialError::StorageError(e.to_string()))
    }
}

impl CredentialBackend for KeyringBackend {
    fn write(&self, value: &str) -> Result<(), CredentialError> {
        self.entry()?
            .set_password(value)
            .map_err(|e| CredentialError::StorageError(e.to_string()))
    }

    fn read(&self) -> Result<Option<String>, CredentialError> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::StorageError(e.to_string())),
        }
    }

    fn delete(&self) -> Result<(), CredentialError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::StorageError(e.to_string())),
        }
    }
}

/// In-memory backend for tests and short-lived tooling.
#[derive(Default)]
pub struct MemoryBackend {
    value: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialBackend for MemoryBackend {
    fn write(&self, value: &str) -> Result<(), CredentialError> {
        *self.value.lock().unwrap() = Some(value.to_string());
        Ok(())
    }

    fn read(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.value.lock().unwrap().clone())
    }

    fn delete(&self) -> Result<(), CredentialError> {
        *self.value.lock().unwrap() = None;
        Ok(())
    }
}

/// The single owner of the bearer credential.
///
/// At most one credential is active at a time; storing a new one fully
/// replaces the previous value. Normalization happens at write time only:
/// a `Bearer ` prefix is stripped here, and the request layer adds it back
/// when building the Authorization header.
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
    cached: Mutex<Option<String>>,
}

impl CredentialStore {
    pub fn new(backend: Box<dyn CredentialBackend>) -> Self {
        // Seed the fast path from durable storage; a fault here degrades
        // to "absent" rather than failing construction.
        let initial = match backend.read() {
            Ok(Some(value)) if !value.trim().is_empty() => Some(value),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential, treating as absent");
                None
            }
        };
        Self {
            backend,
            cached: Mutex::new(initial),
        }
    }

    /// Production store backed by the OS keychain.
    pub fn keyring() -> Self {
        Self::new(Box::new(KeyringBackend))
    }

    /// Ephemeral store with no durable layer.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    /// Persist a credential, replacing any prior value.
    ///
    /// The in-memory copy is updated before the durable write, so readers
    /// in this process see the new value even if the durable write is
    /// still in flight on the platform side.
    pub fn store(&self, credential: &str) -> Result<(), CredentialError> {
        let normalized = credential
            .strip_prefix("Bearer ")
            .unwrap_or(credential)
            .trim();
        if normalized.is_empty() {
            return Err(CredentialError::InvalidCredential);
        }

        *self.cached.lock().unwrap() = Some(normalized.to_string());
        self.backend.write(normalized)?;
        debug!("Stored session credential");
        Ok(())
    }

    /// Current credential, or `None` if absent.
    ///
    /// The in-memory copy is authoritative for the process lifetime; the
    /// durable layer is only consulted once, at construction. A cleared
    /// credential therefore stays cleared even if the platform store is
    /// slow to apply the delete.
    pub fn read(&self) -> Option<String> {
        self.cached.lock().unwrap().clone()
    }

    pub fn is_present(&self) -> bool {
        self.read().is_some()
    }

    /// Remove the credential from the fast path and durable storage.
    ///
    /// Idempotent. If a read immediately after the durable delete still
    /// returns a value, the delete is re-attempted once - some platform
    /// stores acknowledge a delete before it is visible to readers.
    pub fn clear(&self) -> Result<(), CredentialError> {
        *self.cached.lock().unwrap() = None;
        self.backend.delete()?;

        match self.backend.read() {
            Ok(Some(_)) => {
                warn!("Credential still readable after delete, retrying");
                self.backend.delete()?;
            }
            Ok(None) => {}
            Err(e) => {
                // A post-delete verification fault is not worth failing
                // the clear over; the fast path is already empty.
                debug!(error = %e, "Could not verify credential deletion");
            }
        }
        debug!("Cleared session credential");
        Ok(())
    }
}
