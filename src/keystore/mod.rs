//! Alias-addressed storage for private keys and their certificate chains.
//!
//! A store only holds entries; locking and rollback on failed persistence are
//! the caller's responsibility. [`MemoryKeyStore`] keeps entries for the
//! lifetime of the process and [`FileKeyStore`] persists them to a single
//! passphrase-protected file.

mod envelope;
mod file;
mod memory;

use std::fmt;
use std::path::PathBuf;

use secrecy::SecretBox;
use snafu::Snafu;

pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;

/// A private key and the certificate chain that carries its public key.
pub struct KeyEntry {
    private_key: SecretBox<[u8]>,
    certificate_chain: Vec<Vec<u8>>,
}

impl KeyEntry {
    /// Creates an entry from a PKCS#8 DER private key and DER certificates,
    /// leaf first.
    #[must_use]
    pub fn new(private_key: SecretBox<[u8]>, certificate_chain: Vec<Vec<u8>>) -> Self {
        Self {
            private_key,
            certificate_chain,
        }
    }

    /// The PKCS#8 DER private key.
    #[must_use]
    pub fn private_key(&self) -> &SecretBox<[u8]> {
        &self.private_key
    }

    /// The DER certificates, leaf first.
    #[must_use]
    pub fn certificate_chain(&self) -> &[Vec<u8>] {
        &self.certificate_chain
    }

    /// The leaf certificate.
    #[must_use]
    pub fn certificate(&self) -> Option<&[u8]> {
        self.certificate_chain.first().map(Vec::as_slice)
    }
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("certificates", &self.certificate_chain.len())
            .finish_non_exhaustive()
    }
}

/// Alias-addressed key storage.
pub trait KeyStore: Send + Sync {
    /// Looks up the entry stored under `alias`.
    fn entry(&self, alias: &str) -> Option<&KeyEntry>;

    /// The leaf certificate stored under `alias`.
    fn certificate(&self, alias: &str) -> Option<&[u8]> {
        self.entry(alias).and_then(KeyEntry::certificate)
    }

    /// Stores `entry` under `alias`, returning the entry it replaced.
    fn set_entry(&mut self, alias: &str, entry: KeyEntry) -> Option<KeyEntry>;

    /// Removes the entry stored under `alias`, if any.
    fn delete_entry(&mut self, alias: &str) -> Option<KeyEntry>;

    /// All aliases, in lexicographic order.
    fn aliases(&self) -> Vec<String>;

    /// Makes the current entries durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the entries could not be written.
    fn flush(&self) -> Result<(), KeyStoreError>;
}

/// Errors raised by key store implementations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum KeyStoreError {
    /// Reading or writing the store file failed.
    #[snafu(display("I/O error on key store {}", path.display()))]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The store contents could not be serialized.
    #[snafu(display("Failed to encode key store"))]
    Encode {
        /// The underlying error.
        source: serde_json::Error,
    },
    /// The store file is not a valid store document.
    #[snafu(display("Failed to decode key store"))]
    Decode {
        /// The underlying error.
        source: serde_json::Error,
    },
    /// The storage key could not be derived from the passphrase.
    #[snafu(display("Failed to derive key store encryption key"))]
    KeyDerivation {
        /// The underlying error.
        source: argon2::Error,
    },
    /// Encryption of the store contents failed.
    #[snafu(display("Failed to encrypt key store"))]
    Encrypt,
    /// The passphrase is wrong or the file was modified.
    #[snafu(display("Failed to decrypt key store; wrong passphrase or corrupt file"))]
    Decrypt,
    /// The file was written by an incompatible version.
    #[snafu(display("Unsupported key store version {version}"))]
    UnsupportedVersion {
        /// The version found in the file.
        version: u32,
    },
}

impl crate::Error for KeyStoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, KeyStoreError::Io { .. })
    }
}
