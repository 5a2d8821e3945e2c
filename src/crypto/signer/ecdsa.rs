//! ECDSA in the JWS encoding: the fixed-width concatenation `r || s`.

use p256::ecdsa::signature::{Signer as _, Verifier as _};
use snafu::prelude::*;

use super::error::{MalformedSnafu, SignSnafu, SignatureError};
use crate::algorithm::{EllipticCurve, SignatureAlgorithm};

pub(super) fn sign_p256(key: &p256::SecretKey, input: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let signing_key = p256::ecdsa::SigningKey::from(key);
    let signature: p256::ecdsa::Signature = signing_key.try_sign(input).context(SignSnafu {
        algorithm: SignatureAlgorithm::Es256,
    })?;
    Ok(signature.to_bytes().to_vec())
}

pub(super) fn sign_p384(key: &p384::SecretKey, input: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let signing_key = p384::ecdsa::SigningKey::from(key);
    let signature: p384::ecdsa::Signature = signing_key.try_sign(input).context(SignSnafu {
        algorithm: SignatureAlgorithm::Es384,
    })?;
    Ok(signature.to_bytes().to_vec())
}

pub(super) fn sign_p521(key: &p521::SecretKey, input: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let context = SignSnafu {
        algorithm: SignatureAlgorithm::Es512,
    };
    let signing_key = p521::ecdsa::SigningKey::from_bytes(&key.to_bytes()).context(context)?;
    let signature: p521::ecdsa::Signature = signing_key.try_sign(input).context(context)?;
    Ok(signature.to_bytes().to_vec())
}

pub(super) fn verify_p256(
    key: &p256::PublicKey,
    input: &[u8],
    signature: &[u8],
) -> Result<bool, SignatureError> {
    let signature = p256::ecdsa::Signature::from_slice(signature).context(MalformedSnafu {
        algorithm: SignatureAlgorithm::Es256,
    })?;
    let verifying_key = p256::ecdsa::VerifyingKey::from(key);
    Ok(verifying_key.verify(input, &signature).is_ok())
}

pub(super) fn verify_p384(
    key: &p384::PublicKey,
    input: &[u8],
    signature: &[u8],
) -> Result<bool, SignatureError> {
    let signature = p384::ecdsa::Signature::from_slice(signature).context(MalformedSnafu {
        algorithm: SignatureAlgorithm::Es384,
    })?;
    let verifying_key = p384::ecdsa::VerifyingKey::from(key);
    Ok(verifying_key.verify(input, &signature).is_ok())
}

pub(super) fn verify_p521(
    key: &p521::PublicKey,
    input: &[u8],
    signature: &[u8],
) -> Result<bool, SignatureError> {
    let context = MalformedSnafu {
        algorithm: SignatureAlgorithm::Es512,
    };
    let signature = p521::ecdsa::Signature::from_slice(signature).context(context)?;
    let verifying_key =
        p521::ecdsa::VerifyingKey::from_sec1_bytes(&key.to_sec1_bytes()).context(context)?;
    Ok(verifying_key.verify(input, &signature).is_ok())
}

/// Re-encodes a fixed-width `r || s` signature as an ASN.1 `Ecdsa-Sig-Value`.
///
/// Signatures of algorithms without a curve are returned unchanged.
pub(super) fn to_der(
    algorithm: SignatureAlgorithm,
    signature: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    let context = MalformedSnafu { algorithm };
    Ok(match algorithm.curve() {
        Some(EllipticCurve::P256) => p256::ecdsa::Signature::from_slice(signature)
            .context(context)?
            .to_der()
            .as_bytes()
            .to_vec(),
        Some(EllipticCurve::P384) => p384::ecdsa::Signature::from_slice(signature)
            .context(context)?
            .to_der()
            .as_bytes()
            .to_vec(),
        Some(EllipticCurve::P521) => p521::ecdsa::Signature::from_slice(signature)
            .context(context)?
            .to_der()
            .as_bytes()
            .to_vec(),
        None => signature.to_vec(),
    })
}
