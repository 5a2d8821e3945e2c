//! JWS signature primitives.
//!
//! Asymmetric signatures dispatch on the decoded key so that an algorithm is
//! only ever computed with a key of its own family and curve.

mod ecdsa;
mod error;
pub(crate) mod hmac;
mod rsa;

use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use snafu::prelude::*;

pub use error::SignatureError;
use error::{EncodingSnafu, KeyMismatchSnafu};

use crate::algorithm::{SignatureAlgorithm, SignatureAlgorithmFamily};
use crate::crypto::key::{PrivateKey, PublicKey, PublicKeyInner};

/// Signs `input` with an RSA or EC private key.
pub(crate) fn sign(
    algorithm: SignatureAlgorithm,
    key: &PrivateKey,
    input: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    match (algorithm, key) {
        (
            SignatureAlgorithm::Rs256 | SignatureAlgorithm::Rs384 | SignatureAlgorithm::Rs512,
            PrivateKey::Rsa(key),
        ) => rsa::sign(algorithm, key, input),
        (SignatureAlgorithm::Es256, PrivateKey::P256(key)) => ecdsa::sign_p256(key, input),
        (SignatureAlgorithm::Es384, PrivateKey::P384(key)) => ecdsa::sign_p384(key, input),
        (SignatureAlgorithm::Es512, PrivateKey::P521(key)) => ecdsa::sign_p521(key, input),
        _ => KeyMismatchSnafu {
            algorithm,
            family: key.public_key().family(),
        }
        .fail(),
    }
}

/// Signs `input` and returns the signature in the encoding X.509 expects:
/// DER for ECDSA, the raw block for RSA.
pub(crate) fn sign_der(
    algorithm: SignatureAlgorithm,
    key: &PrivateKey,
    input: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    let signature = sign(algorithm, key, input)?;
    ecdsa::to_der(algorithm, &signature)
}

/// Checks a base64url-encoded signature against `input`.
///
/// Returns `Ok(false)` for a well-formed signature that does not verify, and
/// an error when the signature or key cannot be used with `algorithm` at all.
pub(crate) fn verify(
    algorithm: SignatureAlgorithm,
    key: &PublicKey,
    input: &[u8],
    encoded_signature: &str,
) -> Result<bool, SignatureError> {
    let signature = BASE64_URL_SAFE_NO_PAD
        .decode(encoded_signature)
        .context(EncodingSnafu)?;

    match (algorithm, &key.inner) {
        (
            SignatureAlgorithm::Rs256 | SignatureAlgorithm::Rs384 | SignatureAlgorithm::Rs512,
            PublicKeyInner::Rsa(key),
        ) => rsa::verify(algorithm, key, input, &signature),
        (SignatureAlgorithm::Es256, PublicKeyInner::P256(key)) => {
            ecdsa::verify_p256(key, input, &signature)
        }
        (SignatureAlgorithm::Es384, PublicKeyInner::P384(key)) => {
            ecdsa::verify_p384(key, input, &signature)
        }
        (SignatureAlgorithm::Es512, PublicKeyInner::P521(key)) => {
            ecdsa::verify_p521(key, input, &signature)
        }
        _ => KeyMismatchSnafu {
            algorithm,
            family: key.family(),
        }
        .fail(),
    }
}

/// Whether `algorithm` is computed with a key pair held in the key store.
pub(crate) fn is_asymmetric(algorithm: SignatureAlgorithm) -> bool {
    matches!(
        algorithm.family(),
        SignatureAlgorithmFamily::Rsa | SignatureAlgorithmFamily::Ec
    )
}
