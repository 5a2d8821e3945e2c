use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding as _, Signer as _, Verifier as _};
use snafu::prelude::*;

use super::error::{MalformedSnafu, NotAsymmetricSnafu, SignSnafu, SignatureError};
use crate::algorithm::SignatureAlgorithm;

/// RSASSA-PKCS1-v1_5 signature over `input`.
pub(super) fn sign(
    algorithm: SignatureAlgorithm,
    key: &rsa::RsaPrivateKey,
    input: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    let key = key.clone();
    let signature = match algorithm {
        SignatureAlgorithm::Rs256 => SigningKey::<sha2::Sha256>::new(key).try_sign(input),
        SignatureAlgorithm::Rs384 => SigningKey::<sha2::Sha384>::new(key).try_sign(input),
        SignatureAlgorithm::Rs512 => SigningKey::<sha2::Sha512>::new(key).try_sign(input),
        _ => return NotAsymmetricSnafu { algorithm }.fail(),
    }
    .context(SignSnafu { algorithm })?;

    Ok(signature.to_vec())
}

/// Checks an RSASSA-PKCS1-v1_5 signature. A well-formed signature that does
/// not match yields `Ok(false)`.
pub(super) fn verify(
    algorithm: SignatureAlgorithm,
    key: &rsa::RsaPublicKey,
    input: &[u8],
    signature: &[u8],
) -> Result<bool, SignatureError> {
    let signature = Signature::try_from(signature).context(MalformedSnafu { algorithm })?;
    let key = key.clone();

    let valid = match algorithm {
        SignatureAlgorithm::Rs256 => VerifyingKey::<sha2::Sha256>::new(key)
            .verify(input, &signature)
            .is_ok(),
        SignatureAlgorithm::Rs384 => VerifyingKey::<sha2::Sha384>::new(key)
            .verify(input, &signature)
            .is_ok(),
        SignatureAlgorithm::Rs512 => VerifyingKey::<sha2::Sha512>::new(key)
            .verify(input, &signature)
            .is_ok(),
        _ => return NotAsymmetricSnafu { algorithm }.fail(),
    };

    Ok(valid)
}
