//! Passphrase-based encryption of the key store file.
//!
//! - **Key Derivation**: Argon2id, with the salt and cost parameters stored
//!   in the file so that they can be raised without breaking old stores
//! - **Encryption**: ChaCha20-Poly1305 with a fresh nonce per write

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::Aead as _;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit as _, Nonce};
use rand::RngCore as _;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret as _, SecretBox, SecretString};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use zeroize::Zeroizing;

use super::{
    DecodeSnafu, DecryptSnafu, EncodeSnafu, EncryptSnafu, KeyDerivationSnafu, KeyStoreError,
    UnsupportedVersionSnafu,
};
use crate::jwk::serde_utils::base64url;

/// Current envelope format version.
pub(crate) const VERSION: u32 = 1;

/// Argon2id memory cost in KiB (19 MiB)
const ARGON2_MEMORY_KIB: u32 = 19 * 1024;

/// Argon2id iteration count
const ARGON2_ITERATIONS: u32 = 2;

/// Argon2id parallelism (lanes)
const ARGON2_PARALLELISM: u32 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KdfParams {
    #[serde(with = "base64url")]
    salt: Vec<u8>,
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    kdf: KdfParams,
    #[serde(with = "base64url")]
    nonce: Vec<u8>,
    #[serde(with = "base64url")]
    ciphertext: Vec<u8>,
}

/// A storage key derived from the store passphrase, with the parameters
/// needed to derive it again.
pub(crate) struct SealingKey {
    key: SecretBox<[u8; KEY_LEN]>,
    kdf: KdfParams,
}

impl SealingKey {
    /// Derives a key for a new store, with a fresh salt.
    pub(crate) fn generate(passphrase: &SecretString) -> Result<Self, KeyStoreError> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        Self::derive(
            passphrase,
            KdfParams {
                salt,
                memory_kib: ARGON2_MEMORY_KIB,
                iterations: ARGON2_ITERATIONS,
                parallelism: ARGON2_PARALLELISM,
            },
        )
    }

    fn derive(passphrase: &SecretString, kdf: KdfParams) -> Result<Self, KeyStoreError> {
        let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(KEY_LEN))
            .context(KeyDerivationSnafu)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Box::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(passphrase.expose_secret().as_bytes(), &kdf.salt, &mut *key)
            .context(KeyDerivationSnafu)?;

        Ok(Self {
            key: SecretBox::new(key),
            kdf,
        })
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.key.expose_secret()))
    }

    /// Encrypts `plaintext` into a serialized envelope.
    pub(crate) fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        let mut nonce = vec![0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .ok()
            .context(EncryptSnafu)?;

        let envelope = Envelope {
            version: VERSION,
            kdf: self.kdf.clone(),
            nonce,
            ciphertext,
        };
        serde_json::to_vec_pretty(&envelope).context(EncodeSnafu)
    }

    /// Decrypts a serialized envelope, returning the key it was sealed with
    /// alongside the plaintext.
    pub(crate) fn open(
        passphrase: &SecretString,
        sealed: &[u8],
    ) -> Result<(Self, Zeroizing<Vec<u8>>), KeyStoreError> {
        let envelope: Envelope = serde_json::from_slice(sealed).context(DecodeSnafu)?;
        ensure!(
            envelope.version == VERSION,
            UnsupportedVersionSnafu {
                version: envelope.version
            }
        );
        ensure!(envelope.nonce.len() == NONCE_LEN, DecryptSnafu);

        let key = Self::derive(passphrase, envelope.kdf)?;
        let plaintext = key
            .cipher()
            .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
            .ok()
            .context(DecryptSnafu)?;

        Ok((key, Zeroizing::new(plaintext)))
    }
}
