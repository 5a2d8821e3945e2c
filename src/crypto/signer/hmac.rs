use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};

use crate::algorithm::SignatureAlgorithm;

fn keyed<M: Mac + hmac::digest::KeyInit>(key: &[u8], input: &[u8]) -> M {
    let mut mac = <M as Mac>::new_from_slice(key).expect("Should not fail with HMAC-SHA");
    mac.update(input);
    mac
}

/// HMAC tag over `input`, or `None` if `algorithm` is not an HMAC algorithm.
pub(crate) fn sign(algorithm: SignatureAlgorithm, key: &[u8], input: &[u8]) -> Option<Vec<u8>> {
    let tag = match algorithm {
        SignatureAlgorithm::Hs256 => keyed::<Hmac<sha2::Sha256>>(key, input)
            .finalize()
            .into_bytes()
            .to_vec(),
        SignatureAlgorithm::Hs384 => keyed::<Hmac<sha2::Sha384>>(key, input)
            .finalize()
            .into_bytes()
            .to_vec(),
        SignatureAlgorithm::Hs512 => keyed::<Hmac<sha2::Sha512>>(key, input)
            .finalize()
            .into_bytes()
            .to_vec(),
        _ => return None,
    };
    Some(tag)
}

/// Compares `encoded_signature` with the tag over `input` in constant time.
///
/// Only the canonical unpadded base64url form is accepted, so a signature is
/// valid exactly when it equals the string [`sign`] would have produced.
pub(crate) fn verify(
    algorithm: SignatureAlgorithm,
    key: &[u8],
    input: &[u8],
    encoded_signature: &str,
) -> bool {
    let Ok(signature) = BASE64_URL_SAFE_NO_PAD.decode(encoded_signature) else {
        return false;
    };
    if BASE64_URL_SAFE_NO_PAD.encode(&signature) != encoded_signature {
        return false;
    }

    match algorithm {
        SignatureAlgorithm::Hs256 => keyed::<Hmac<sha2::Sha256>>(key, input)
            .verify_slice(&signature)
            .is_ok(),
        SignatureAlgorithm::Hs384 => keyed::<Hmac<sha2::Sha384>>(key, input)
            .verify_slice(&signature)
            .is_ok(),
        SignatureAlgorithm::Hs512 => keyed::<Hmac<sha2::Sha512>>(key, input)
            .verify_slice(&signature)
            .is_ok(),
        _ => false,
    }
}
