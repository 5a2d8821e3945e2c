use snafu::Snafu;

use crate::algorithm::{SignatureAlgorithm, SignatureAlgorithmFamily};

/// The error type returned by signing and verification primitives.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SignatureError {
    /// The key belongs to a different family or curve than the algorithm.
    #[snafu(display("A {family:?} key cannot be used with {algorithm}"))]
    KeyMismatch {
        /// The requested algorithm.
        algorithm: SignatureAlgorithm,
        /// The family of the key that was supplied.
        family: SignatureAlgorithmFamily,
    },
    /// The algorithm is not computed with an asymmetric key.
    #[snafu(display("Algorithm {algorithm} is not an asymmetric signature algorithm"))]
    NotAsymmetric {
        /// The requested algorithm.
        algorithm: SignatureAlgorithm,
    },
    /// The signature primitive failed.
    #[snafu(display("Failed to compute {} signature", algorithm.primitive()))]
    Sign {
        /// The requested algorithm.
        algorithm: SignatureAlgorithm,
        /// The underlying error.
        source: rsa::signature::Error,
    },
    /// The encoded signature is not valid base64url.
    #[snafu(display("Signature is not valid base64url"))]
    Encoding {
        /// The underlying error.
        source: base64::DecodeError,
    },
    /// The decoded signature has the wrong shape for the algorithm.
    #[snafu(display("Malformed {algorithm} signature"))]
    Malformed {
        /// The requested algorithm.
        algorithm: SignatureAlgorithm,
        /// The underlying error.
        source: rsa::signature::Error,
    },
}

impl crate::Error for SignatureError {
    fn is_retryable(&self) -> bool {
        false
    }
}
