//! Error types and the [`Error`] trait.
//!
//! All errors in this library implement the [`Error`] trait, which extends
//! [`std::error::Error`] with retry semantics.

use snafu::{AsErrorSource, Snafu};

use crate::algorithm::SignatureAlgorithm;
use crate::crypto::certificate::CertificateError;
use crate::crypto::key::KeyError;
use crate::crypto::signer::SignatureError;
use crate::keystore::KeyStoreError;

/// Errors that may occur in the library.
pub trait Error: std::error::Error + AsErrorSource + Send + Sync + 'static {
    /// If true, this indicates that a failed operation may succeed if retried.
    fn is_retryable(&self) -> bool;
}

/// Errors returned by [`CryptoProvider`](crate::CryptoProvider) operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CryptoProviderError {
    /// The algorithm cannot be used for this operation in this build.
    #[snafu(display("Unsupported algorithm {algorithm}"))]
    UnsupportedAlgorithm {
        /// The rejected algorithm.
        algorithm: SignatureAlgorithm,
    },
    /// The algorithm has no meaning for the requested operation.
    #[snafu(display("Algorithm {algorithm} cannot be used to {operation}"))]
    InvalidAlgorithmForOperation {
        /// The rejected algorithm.
        algorithm: SignatureAlgorithm,
        /// The attempted operation.
        operation: &'static str,
    },
    /// No private key is stored under the alias.
    #[snafu(display("No signing key found for alias {alias:?}"))]
    KeyNotFound {
        /// The requested alias, if one was given.
        alias: Option<String>,
    },
    /// An HMAC signature was requested without a shared secret.
    #[snafu(display("HMAC signing requires a shared secret"))]
    MissingSharedSecret,
    /// The provider was built without a usable key store.
    #[snafu(display("No key store is configured"))]
    KeyStoreUnavailable,
    /// The key store lock was poisoned by a panicking writer.
    #[snafu(display("Key store is not accessible"))]
    KeyStoreAccess,
    /// Key pair generation failed.
    #[snafu(display("Failed to generate key pair"))]
    KeyGeneration {
        /// The underlying error.
        source: KeyError,
    },
    /// The self-signed certificate could not be created.
    #[snafu(display("Failed to create certificate"))]
    Certificate {
        /// The underlying error.
        source: CertificateError,
    },
    /// Stored key material could not be encoded or decoded.
    #[snafu(display("Invalid key material"))]
    KeyMaterial {
        /// The underlying error.
        source: KeyError,
    },
    /// The signature primitive rejected the key or failed.
    #[snafu(display("Failed to sign"))]
    Signing {
        /// The underlying error.
        source: SignatureError,
    },
    /// The key store could not be written; the in-memory change was undone.
    #[snafu(display("Failed to persist key store"))]
    StorePersistence {
        /// The underlying error.
        source: KeyStoreError,
    },
}

impl Error for CryptoProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            CryptoProviderError::StorePersistence { source } => source.is_retryable(),
            _ => false,
        }
    }
}
