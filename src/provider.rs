//! The signing-key provider.

use std::sync::RwLock;

use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use secrecy::{ExposeSecret as _, SecretString};
use snafu::prelude::*;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use crate::algorithm::{SignatureAlgorithm, SignatureAlgorithmFamily};
use crate::config::CryptoProviderConfig;
use crate::crypto::certificate;
use crate::crypto::key::{KeyError, PrivateKey, PublicKey};
use crate::crypto::signer::{self, hmac};
use crate::error::{
    CertificateSnafu, CryptoProviderError, InvalidAlgorithmForOperationSnafu, KeyGenerationSnafu,
    KeyMaterialSnafu, KeyNotFoundSnafu, KeyStoreAccessSnafu, KeyStoreUnavailableSnafu,
    MissingSharedSecretSnafu, SigningSnafu, StorePersistenceSnafu, UnsupportedAlgorithmSnafu,
};
use crate::jwk::{KeyUse, PublicJwk, PublicJwks};
use crate::keystore::{FileKeyStore, KeyEntry, KeyStore};
use crate::uuid::uuid_v4;

/// Generates, stores, and uses signing keys for JWS production and
/// verification.
///
/// Asymmetric keys live in a [`KeyStore`] under random UUID aliases and are
/// published as JWKs. HMAC and `none` need no store. Mutations take an
/// exclusive lock for the in-memory change and the flush that persists it;
/// if the flush fails, the change is undone before the error is returned.
pub struct CryptoProvider {
    store: Option<RwLock<Box<dyn KeyStore>>>,
    dn_name: String,
}

impl std::fmt::Debug for CryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoProvider")
            .field("has_key_store", &self.store.is_some())
            .field("dn_name", &self.dn_name)
            .finish()
    }
}

impl CryptoProvider {
    /// Builds a provider from configuration, opening the file key store when
    /// the configuration names one.
    ///
    /// A store that cannot be opened is logged and the provider continues
    /// without one. A store file that does not exist yet is not an error: the
    /// provider starts with an empty store and creates the file on the first
    /// write, so a mistyped path silently starts a fresh store.
    #[must_use]
    pub fn new(config: &CryptoProviderConfig) -> Self {
        let Some((path, secret, dn_name)) = config.key_store_settings() else {
            debug!("key store not configured");
            return Self::keyless();
        };

        match FileKeyStore::open(path, secret) {
            Ok(store) => Self::with_store(store, dn_name),
            Err(error) => {
                error!(path = %path.display(), %error, "failed to load key store");
                Self::keyless()
            }
        }
    }

    /// A provider with no key store, limited to `none` and HMAC.
    #[must_use]
    pub fn keyless() -> Self {
        Self {
            store: None,
            dn_name: String::new(),
        }
    }

    /// A provider over an already opened store. `dn_name` is the subject of
    /// the certificates issued for generated keys.
    #[must_use]
    pub fn with_store(store: impl KeyStore + 'static, dn_name: impl Into<String>) -> Self {
        Self {
            store: Some(RwLock::new(Box::new(store))),
            dn_name: dn_name.into(),
        }
    }

    /// Whether a key store is available.
    #[must_use]
    pub fn has_key_store(&self) -> bool {
        self.store.is_some()
    }

    /// Generates a key pair for `algorithm`, stores it under a new alias, and
    /// returns its public JWK. The JWK `kid` is the alias and its `exp` is
    /// `expiration` in epoch milliseconds.
    ///
    /// # Errors
    ///
    /// - [`InvalidAlgorithmForOperation`](CryptoProviderError::InvalidAlgorithmForOperation)
    ///   for `none` and HMAC algorithms.
    /// - [`Certificate`](CryptoProviderError::Certificate) if the configured
    ///   distinguished name is not a valid RFC 4514 name.
    /// - [`KeyStoreUnavailable`](CryptoProviderError::KeyStoreUnavailable) without a store.
    /// - [`StorePersistence`](CryptoProviderError::StorePersistence) if the store could
    ///   not be written; no key is retained in that case.
    pub fn generate_key(
        &self,
        algorithm: SignatureAlgorithm,
        expiration: OffsetDateTime,
    ) -> Result<PublicJwk, CryptoProviderError> {
        if !signer::is_asymmetric(algorithm) {
            return InvalidAlgorithmForOperationSnafu {
                algorithm,
                operation: "generate a key",
            }
            .fail();
        }
        let store = self.store.as_ref().context(KeyStoreUnavailableSnafu)?;

        let private_key = PrivateKey::generate(algorithm).context(KeyGenerationSnafu)?;
        let certificate =
            certificate::self_signed(&private_key, algorithm, &self.dn_name, expiration)
                .context(CertificateSnafu)?;
        let public_key = private_key.public_key();
        let entry = KeyEntry::new(
            private_key.to_pkcs8_der().context(KeyMaterialSnafu)?,
            vec![certificate],
        );
        drop(private_key);

        let alias = uuid_v4();
        {
            let mut store = store.write().map_err(|_| KeyStoreAccessSnafu.build())?;
            let replaced = store.set_entry(&alias, entry);
            if let Err(source) = store.flush() {
                match replaced {
                    Some(previous) => {
                        store.set_entry(&alias, previous);
                    }
                    None => {
                        store.delete_entry(&alias);
                    }
                }
                error!(%alias, error = %source, "failed to persist generated key");
                return Err(source).context(StorePersistenceSnafu);
            }
        }
        debug!(%alias, %algorithm, "generated signing key");

        Ok(PublicJwk::builder()
            .key(public_key.to_jwk())
            .key_use(KeyUse::Sign)
            .algorithm(algorithm.name())
            .kid(alias)
            .expiration_time(epoch_millis(expiration))
            .build())
    }

    /// Generates one key per algorithm and returns them as a JWK set.
    ///
    /// Each key is persisted as it is generated, so keys created before a
    /// failure remain in the store.
    ///
    /// # Errors
    ///
    /// Returns the first [`generate_key`](Self::generate_key) error.
    pub fn generate_jwks(
        &self,
        algorithms: &[SignatureAlgorithm],
        expiration: OffsetDateTime,
    ) -> Result<PublicJwks, CryptoProviderError> {
        algorithms
            .iter()
            .map(|&algorithm| self.generate_key(algorithm, expiration))
            .collect()
    }

    /// Signs `signing_input` and returns the base64url signature (no padding).
    ///
    /// - `none` yields an empty string.
    /// - HMAC algorithms key the MAC with `shared_secret`.
    /// - RSA and EC algorithms use the private key stored under `alias`.
    ///
    /// # Errors
    ///
    /// - [`MissingSharedSecret`](CryptoProviderError::MissingSharedSecret) for HMAC
    ///   without a secret.
    /// - [`KeyNotFound`](CryptoProviderError::KeyNotFound) if no private key is stored
    ///   under `alias`.
    /// - [`Signing`](CryptoProviderError::Signing) if the stored key does not belong
    ///   to the algorithm's family and curve.
    pub fn sign(
        &self,
        signing_input: &[u8],
        alias: Option<&str>,
        shared_secret: Option<&SecretString>,
        algorithm: SignatureAlgorithm,
    ) -> Result<String, CryptoProviderError> {
        let signature = match algorithm.family() {
            SignatureAlgorithmFamily::None => return Ok(String::new()),
            SignatureAlgorithmFamily::Hmac => {
                let secret = shared_secret.context(MissingSharedSecretSnafu)?;
                hmac::sign(algorithm, secret.expose_secret().as_bytes(), signing_input)
                    .context(UnsupportedAlgorithmSnafu { algorithm })?
            }
            SignatureAlgorithmFamily::Rsa | SignatureAlgorithmFamily::Ec => {
                let private_key = self.private_key(alias)?;
                signer::sign(algorithm, &private_key, signing_input).context(SigningSnafu)?
            }
        };

        Ok(BASE64_URL_SAFE_NO_PAD.encode(signature))
    }

    fn private_key(&self, alias: Option<&str>) -> Result<PrivateKey, CryptoProviderError> {
        let alias = alias
            .filter(|alias| !alias.is_empty())
            .context(KeyNotFoundSnafu { alias: None::<String> })?;
        let not_found = || {
            KeyNotFoundSnafu {
                alias: Some(alias.to_owned()),
            }
            .build()
        };

        let store = self.store.as_ref().ok_or_else(not_found)?;
        let store = store.read().map_err(|_| {
            error!("key store lock is poisoned");
            KeyStoreAccessSnafu.build()
        })?;
        let entry = store.entry(alias).ok_or_else(not_found)?;

        PrivateKey::from_pkcs8_der(entry.private_key().expose_secret()).context(KeyMaterialSnafu)
    }

    /// Checks `encoded_signature` over `signing_input`. Never fails: every
    /// problem is reported as `false`.
    ///
    /// - `none` accepts exactly the empty signature.
    /// - HMAC algorithms accept exactly the signature [`sign`](Self::sign) would
    ///   produce with `shared_secret`.
    /// - RSA and EC algorithms resolve the public key from `jwks` when it is
    ///   given (see [`public_key_from_jwks`](Self::public_key_from_jwks)), and
    ///   from the certificate stored under `alias` otherwise.
    #[must_use]
    pub fn verify_signature(
        &self,
        signing_input: &[u8],
        encoded_signature: &str,
        alias: Option<&str>,
        jwks: Option<&PublicJwks>,
        shared_secret: Option<&SecretString>,
        algorithm: SignatureAlgorithm,
    ) -> bool {
        match algorithm.family() {
            SignatureAlgorithmFamily::None => encoded_signature.is_empty(),
            SignatureAlgorithmFamily::Hmac => shared_secret.is_some_and(|secret| {
                hmac::verify(
                    algorithm,
                    secret.expose_secret().as_bytes(),
                    signing_input,
                    encoded_signature,
                )
            }),
            SignatureAlgorithmFamily::Rsa | SignatureAlgorithmFamily::Ec => {
                let public_key = match jwks {
                    Some(jwks) => match alias.map(|alias| Self::public_key_from_jwks(alias, jwks)) {
                        Some(Ok(public_key)) => public_key,
                        Some(Err(error)) => {
                            warn!(?alias, %error, "unusable key in JWK set");
                            return false;
                        }
                        None => None,
                    },
                    None => self.public_key(alias),
                };
                let Some(public_key) = public_key else {
                    debug!(?alias, %algorithm, "no public key to verify with");
                    return false;
                };

                match signer::verify(algorithm, &public_key, signing_input, encoded_signature) {
                    Ok(valid) => valid,
                    Err(error) => {
                        warn!(?alias, %algorithm, %error, "signature verification failed");
                        false
                    }
                }
            }
        }
    }

    /// Removes the key stored under `alias`. Removing an alias that does not
    /// exist succeeds.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreUnavailable`](CryptoProviderError::KeyStoreUnavailable) without a store.
    /// - [`StorePersistence`](CryptoProviderError::StorePersistence) if the store could
    ///   not be written; the key is kept in that case.
    pub fn delete_key(&self, alias: &str) -> Result<(), CryptoProviderError> {
        let store = self.store.as_ref().context(KeyStoreUnavailableSnafu)?;
        let mut store = store.write().map_err(|_| KeyStoreAccessSnafu.build())?;

        let removed = store.delete_entry(alias);
        if let Err(source) = store.flush() {
            if let Some(entry) = removed {
                store.set_entry(alias, entry);
            }
            error!(alias, error = %source, "failed to persist key deletion");
            return Err(source).context(StorePersistenceSnafu);
        }

        debug!(alias, existed = removed.is_some(), "deleted signing key");
        Ok(())
    }

    /// The public key of the certificate stored under `alias`.
    ///
    /// Lookup is best effort: an absent alias, a missing store, or an
    /// unreadable certificate all yield `None`, the latter two being logged.
    #[must_use]
    pub fn public_key(&self, alias: Option<&str>) -> Option<PublicKey> {
        let alias = alias.filter(|alias| !alias.is_empty())?;
        let store = self.store.as_ref()?;
        let Ok(store) = store.read() else {
            error!("key store lock is poisoned");
            return None;
        };

        match certificate::public_key(store.certificate(alias)?) {
            Ok(public_key) => Some(public_key),
            Err(error) => {
                error!(alias, %error, "failed to read stored certificate");
                None
            }
        }
    }

    /// Resolves the public key for `alias` from a JWK set.
    ///
    /// Entries whose `kid` equals `alias` are scanned in document order. Each
    /// one with an RSA or EC `alg` is decoded using that `alg` to pick the key
    /// family and curve, and the last such entry wins. Entries without a
    /// recognised asymmetric `alg` are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a matching entry cannot be decoded into a key.
    pub fn public_key_from_jwks(
        alias: &str,
        jwks: &PublicJwks,
    ) -> Result<Option<PublicKey>, KeyError> {
        let mut public_key = None;
        for jwk in jwks.keys_with_id(alias) {
            let Some(algorithm) = jwk
                .algorithm
                .as_deref()
                .and_then(|name| name.parse::<SignatureAlgorithm>().ok())
                .filter(|&algorithm| signer::is_asymmetric(algorithm))
            else {
                continue;
            };
            public_key = Some(PublicKey::from_jwk(algorithm, &jwk.key)?);
        }
        Ok(public_key)
    }

    /// Aliases of all stored keys, in lexicographic order.
    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        let Some(store) = self.store.as_ref() else {
            return Vec::new();
        };
        match store.read() {
            Ok(store) => store.aliases(),
            Err(_) => {
                error!("key store lock is poisoned");
                Vec::new()
            }
        }
    }
}

fn epoch_millis(instant: OffsetDateTime) -> i64 {
    i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use time::Duration;

    use super::*;
    use crate::jwk;
    use crate::keystore::{KeyStoreError, MemoryKeyStore};

    const DN: &str = "CN=Test Issuer";

    fn provider() -> CryptoProvider {
        CryptoProvider::with_store(MemoryKeyStore::new(), DN)
    }

    fn expiration() -> OffsetDateTime {
        OffsetDateTime::now_utc() + Duration::days(1)
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value)
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// A memory store whose flush fails while `failing` is set.
    struct FlakyStore {
        inner: MemoryKeyStore,
        failing: Arc<AtomicBool>,
    }

    impl KeyStore for FlakyStore {
        fn entry(&self, alias: &str) -> Option<&KeyEntry> {
            self.inner.entry(alias)
        }

        fn set_entry(&mut self, alias: &str, entry: KeyEntry) -> Option<KeyEntry> {
            self.inner.set_entry(alias, entry)
        }

        fn delete_entry(&mut self, alias: &str) -> Option<KeyEntry> {
            self.inner.delete_entry(alias)
        }

        fn aliases(&self) -> Vec<String> {
            self.inner.aliases()
        }

        fn flush(&self) -> Result<(), KeyStoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(KeyStoreError::Io {
                    path: "flaky".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            Ok(())
        }
    }

    fn flaky_provider() -> (CryptoProvider, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        let store = FlakyStore {
            inner: MemoryKeyStore::new(),
            failing: Arc::clone(&failing),
        };
        (CryptoProvider::with_store(store, DN), failing)
    }

    #[test]
    fn test_rs256_sign_and_verify() {
        let provider = provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Rs256, expiration())
            .unwrap();
        let alias = jwk.kid.as_deref().unwrap();

        let signature = provider
            .sign(b"abc", Some(alias), None, SignatureAlgorithm::Rs256)
            .unwrap();
        assert!(!signature.contains('='));

        assert!(provider.verify_signature(
            b"abc",
            &signature,
            Some(alias),
            None,
            None,
            SignatureAlgorithm::Rs256
        ));
        assert!(!provider.verify_signature(
            b"abd",
            &signature,
            Some(alias),
            None,
            None,
            SignatureAlgorithm::Rs256
        ));
    }

    #[test]
    fn test_generated_jwk_members() {
        let provider = provider();
        let expiration = OffsetDateTime::from_unix_timestamp(4_102_444_800).unwrap();

        let rsa = provider
            .generate_key(SignatureAlgorithm::Rs384, expiration)
            .unwrap();
        let value = serde_json::to_value(&rsa).unwrap();
        assert_eq!(
            value["kty"],
            SignatureAlgorithmFamily::Rsa.key_type().unwrap()
        );
        assert_eq!(value["use"], "sig");
        assert_eq!(value["alg"], "RS384");
        assert_eq!(value["e"], "AQAB");
        assert_eq!(value["exp"], 4_102_444_800_000_i64);
        assert_eq!(value["kid"].as_str().unwrap().len(), 36);

        let ec = provider
            .generate_key(SignatureAlgorithm::Es256, expiration)
            .unwrap();
        let value = serde_json::to_value(&ec).unwrap();
        assert_eq!(value["kty"], "EC");
        assert_eq!(value["crv"], "P-256");
        assert!(value.get("n").is_none());

        let mut aliases = vec![rsa.kid.unwrap(), ec.kid.unwrap()];
        aliases.sort();
        assert_eq!(provider.aliases(), aliases);
    }

    #[test]
    fn test_ec_sign_and_verify() {
        let provider = provider();
        for algorithm in [SignatureAlgorithm::Es256, SignatureAlgorithm::Es384] {
            let jwk = provider.generate_key(algorithm, expiration()).unwrap();
            let alias = jwk.kid.as_deref();

            let signature = provider.sign(b"payload", alias, None, algorithm).unwrap();
            assert!(provider.verify_signature(b"payload", &signature, alias, None, None, algorithm));

            // The published JWK verifies the same signature.
            let jwks = PublicJwks::from_iter([jwk.clone()]);
            assert!(provider.verify_signature(
                b"payload",
                &signature,
                alias,
                Some(&jwks),
                None,
                algorithm
            ));
        }
    }

    #[test]
    fn test_es512_generate_sign_and_verify() {
        let provider = provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es512, expiration())
            .unwrap();
        let value = serde_json::to_value(&jwk).unwrap();
        assert_eq!(value["crv"], "P-521");
        assert_eq!(value["alg"], "ES512");

        let alias = jwk.kid.as_deref();
        let signature = provider
            .sign(b"payload", alias, None, SignatureAlgorithm::Es512)
            .unwrap();
        assert!(provider.verify_signature(
            b"payload",
            &signature,
            alias,
            None,
            None,
            SignatureAlgorithm::Es512
        ));

        let jwks = PublicJwks::from_iter([jwk.clone()]);
        assert!(provider.verify_signature(
            b"payload",
            &signature,
            alias,
            Some(&jwks),
            None,
            SignatureAlgorithm::Es512
        ));
        assert!(!provider.verify_signature(
            b"payloaD",
            &signature,
            alias,
            Some(&jwks),
            None,
            SignatureAlgorithm::Es512
        ));
    }

    #[test]
    fn test_verify_against_jwks_with_foreign_key_types() {
        let provider = provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap();
        let signature = provider
            .sign(b"abc", jwk.kid.as_deref(), None, SignatureAlgorithm::Es256)
            .unwrap();

        let mut document = serde_json::json!({
            "keys": [
                {
                    "kty": "OKP",
                    "crv": "Ed25519",
                    "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo",
                    "kid": "okp"
                }
            ]
        });
        document["keys"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::to_value(&jwk).unwrap());
        let jwks: PublicJwks = serde_json::from_value(document).unwrap();
        assert_eq!(jwks.keys[0].key, jwk::PublicKey::UnknownOrPrivate);

        assert!(provider.verify_signature(
            b"abc",
            &signature,
            jwk.kid.as_deref(),
            Some(&jwks),
            None,
            SignatureAlgorithm::Es256
        ));
        assert!(!provider.verify_signature(
            b"abc",
            &signature,
            Some("okp"),
            Some(&jwks),
            None,
            SignatureAlgorithm::Es256
        ));
    }

    #[test]
    fn test_generate_with_ldap_style_subject() {
        for dn in [r"CN=Doe\, John, O=Gluu", "CN=Gluu, DC=gluu, DC=org", "UID=admin, O=Gluu"] {
            let provider = CryptoProvider::with_store(MemoryKeyStore::new(), dn);
            let jwk = provider
                .generate_key(SignatureAlgorithm::Es256, expiration())
                .unwrap();
            assert!(provider.public_key(jwk.kid.as_deref()).is_some(), "{dn}");
        }

        let provider = CryptoProvider::with_store(MemoryKeyStore::new(), "not a name");
        assert!(matches!(
            provider.generate_key(SignatureAlgorithm::Es256, expiration()),
            Err(CryptoProviderError::Certificate { .. })
        ));
        assert!(provider.aliases().is_empty());
    }

    #[test]
    fn test_generate_rejects_keyless_algorithms() {
        for algorithm in [SignatureAlgorithm::None, SignatureAlgorithm::Hs256] {
            assert!(matches!(
                provider().generate_key(algorithm, expiration()),
                Err(CryptoProviderError::InvalidAlgorithmForOperation { .. })
            ));
        }
    }

    #[test]
    fn test_keyless_provider() {
        let provider = CryptoProvider::keyless();
        assert!(!provider.has_key_store());
        assert!(matches!(
            provider.generate_key(SignatureAlgorithm::Rs256, expiration()),
            Err(CryptoProviderError::KeyStoreUnavailable)
        ));
        assert!(matches!(
            provider.delete_key("anything"),
            Err(CryptoProviderError::KeyStoreUnavailable)
        ));
        assert!(matches!(
            provider.sign(b"abc", Some("anything"), None, SignatureAlgorithm::Rs256),
            Err(CryptoProviderError::KeyNotFound { .. })
        ));
        assert!(provider.public_key(Some("anything")).is_none());
        assert!(provider.aliases().is_empty());

        let signature = provider
            .sign(b"abc", None, Some(&secret("s")), SignatureAlgorithm::Hs256)
            .unwrap();
        assert!(provider.verify_signature(
            b"abc",
            &signature,
            None,
            None,
            Some(&secret("s")),
            SignatureAlgorithm::Hs256
        ));
    }

    #[test]
    fn test_hmac_is_deterministic_and_keyed() {
        let provider = CryptoProvider::keyless();
        let key = secret("s3cr3t");

        let first = provider
            .sign(b"abc", None, Some(&key), SignatureAlgorithm::Hs256)
            .unwrap();
        let second = provider
            .sign(b"abc", None, Some(&key), SignatureAlgorithm::Hs256)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 43);

        assert!(!provider.verify_signature(
            b"abc",
            &first,
            None,
            None,
            Some(&secret("other")),
            SignatureAlgorithm::Hs256
        ));
        assert!(!provider.verify_signature(
            b"abc",
            &first,
            None,
            None,
            None,
            SignatureAlgorithm::Hs256
        ));
        assert!(matches!(
            provider.sign(b"abc", None, None, SignatureAlgorithm::Hs512),
            Err(CryptoProviderError::MissingSharedSecret)
        ));
    }

    #[test]
    fn test_none_algorithm() {
        let provider = CryptoProvider::keyless();
        let signature = provider
            .sign(b"anything", None, None, SignatureAlgorithm::None)
            .unwrap();
        assert_eq!(signature, "");

        assert!(provider.verify_signature(b"anything", "", None, None, None, SignatureAlgorithm::None));
        assert!(!provider.verify_signature(
            b"anything",
            "AAAA",
            None,
            None,
            None,
            SignatureAlgorithm::None
        ));
    }

    #[test]
    fn test_delete_then_sign_fails() {
        let provider = provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap();
        let alias = jwk.kid.unwrap();

        provider.delete_key(&alias).unwrap();
        assert!(matches!(
            provider.sign(b"abc", Some(&alias), None, SignatureAlgorithm::Es256),
            Err(CryptoProviderError::KeyNotFound { alias: Some(a) }) if a == alias
        ));
        assert!(provider.public_key(Some(&alias)).is_none());

        // Deleting again is not an error.
        provider.delete_key(&alias).unwrap();
    }

    #[test]
    fn test_sign_requires_alias() {
        let provider = provider();
        assert!(matches!(
            provider.sign(b"abc", None, None, SignatureAlgorithm::Rs256),
            Err(CryptoProviderError::KeyNotFound { alias: None })
        ));
        assert!(matches!(
            provider.sign(b"abc", Some(""), None, SignatureAlgorithm::Rs256),
            Err(CryptoProviderError::KeyNotFound { alias: None })
        ));
    }

    #[test]
    fn test_sign_with_key_of_other_family_fails() {
        let provider = provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap();

        assert!(matches!(
            provider.sign(b"abc", jwk.kid.as_deref(), None, SignatureAlgorithm::Rs256),
            Err(CryptoProviderError::Signing { .. })
        ));
    }

    #[test]
    fn test_public_key_matches_published_jwk() {
        let provider = provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Rs256, expiration())
            .unwrap();

        let public_key = provider.public_key(jwk.kid.as_deref()).unwrap();
        assert_eq!(public_key.family(), SignatureAlgorithmFamily::Rsa);
        assert_eq!(public_key.to_jwk(), jwk.key);

        assert!(provider.public_key(None).is_none());
        assert!(provider.public_key(Some("unknown")).is_none());
    }

    #[test]
    fn test_jwks_lookup_last_match_wins() {
        let provider = provider();
        let first = provider
            .generate_key(SignatureAlgorithm::Rs256, expiration())
            .unwrap();
        let second = provider
            .generate_key(SignatureAlgorithm::Rs256, expiration())
            .unwrap();

        let shared_kid = |jwk: &PublicJwk| PublicJwk {
            kid: Some("shared".to_owned()),
            ..jwk.clone()
        };
        let jwks = PublicJwks::from_iter([shared_kid(&first), shared_kid(&second)]);

        let resolved = CryptoProvider::public_key_from_jwks("shared", &jwks)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.to_jwk(), second.key);

        let signature = provider
            .sign(b"abc", second.kid.as_deref(), None, SignatureAlgorithm::Rs256)
            .unwrap();
        assert!(provider.verify_signature(
            b"abc",
            &signature,
            Some("shared"),
            Some(&jwks),
            None,
            SignatureAlgorithm::Rs256
        ));

        let signature = provider
            .sign(b"abc", first.kid.as_deref(), None, SignatureAlgorithm::Rs256)
            .unwrap();
        assert!(!provider.verify_signature(
            b"abc",
            &signature,
            Some("shared"),
            Some(&jwks),
            None,
            SignatureAlgorithm::Rs256
        ));
    }

    #[test]
    fn test_jwks_lookup_skips_entries_without_asymmetric_alg() {
        let key = jwk::RsaPublicKey::builder().n([0xC3; 256]).e([1, 0, 1]);
        let jwks = PublicJwks::from_iter([
            PublicJwk::builder().key(key).kid("k").build(),
            PublicJwk::builder()
                .key(jwk::RsaPublicKey::builder().n([0xC3; 256]).e([1, 0, 1]))
                .algorithm("HS256")
                .kid("k")
                .build(),
        ]);
        assert_eq!(CryptoProvider::public_key_from_jwks("k", &jwks).unwrap(), None);
        assert_eq!(
            CryptoProvider::public_key_from_jwks("missing", &jwks).unwrap(),
            None
        );
    }

    #[test]
    fn test_jwks_entry_with_mismatched_type_fails_verification() {
        init_tracing();
        let provider = provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap();
        let signature = provider
            .sign(b"abc", jwk.kid.as_deref(), None, SignatureAlgorithm::Es256)
            .unwrap();

        let mislabelled = PublicJwk {
            algorithm: Some("RS256".to_owned()),
            ..jwk.clone()
        };
        let jwks = PublicJwks::from_iter([mislabelled]);
        assert!(CryptoProvider::public_key_from_jwks(jwk.kid.as_deref().unwrap(), &jwks).is_err());
        assert!(!provider.verify_signature(
            b"abc",
            &signature,
            jwk.kid.as_deref(),
            Some(&jwks),
            None,
            SignatureAlgorithm::Es256
        ));
    }

    #[test]
    fn test_verify_with_jwks_but_no_alias_fails() {
        let provider = provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap();
        let signature = provider
            .sign(b"abc", jwk.kid.as_deref(), None, SignatureAlgorithm::Es256)
            .unwrap();
        let jwks = PublicJwks::from_iter([jwk]);

        assert!(!provider.verify_signature(
            b"abc",
            &signature,
            None,
            Some(&jwks),
            None,
            SignatureAlgorithm::Es256
        ));
    }

    #[test]
    fn test_malformed_signature_is_rejected() {
        let provider = provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap();

        for signature in ["", "%%%", "AAAA"] {
            assert!(!provider.verify_signature(
                b"abc",
                signature,
                jwk.kid.as_deref(),
                None,
                None,
                SignatureAlgorithm::Es256
            ));
        }
    }

    #[test]
    fn test_failed_flush_rolls_back_generation() {
        init_tracing();
        let (provider, failing) = flaky_provider();
        failing.store(true, Ordering::SeqCst);

        let err = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap_err();
        assert!(matches!(err, CryptoProviderError::StorePersistence { .. }));
        assert!(crate::Error::is_retryable(&err));
        assert!(provider.aliases().is_empty());
    }

    #[test]
    fn test_failed_flush_rolls_back_deletion() {
        init_tracing();
        let (provider, failing) = flaky_provider();
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap();
        let alias = jwk.kid.unwrap();

        failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            provider.delete_key(&alias),
            Err(CryptoProviderError::StorePersistence { .. })
        ));
        assert_eq!(provider.aliases(), [alias.clone()]);
        assert!(
            provider
                .sign(b"abc", Some(&alias), None, SignatureAlgorithm::Es256)
                .is_ok()
        );
    }

    #[test]
    fn test_generate_jwks() {
        let provider = provider();
        let jwks = provider
            .generate_jwks(
                &[SignatureAlgorithm::Rs256, SignatureAlgorithm::Es384],
                expiration(),
            )
            .unwrap();

        let algorithms: Vec<_> = jwks
            .keys
            .iter()
            .filter_map(|jwk| jwk.algorithm.as_deref())
            .collect();
        assert_eq!(algorithms, ["RS256", "ES384"]);
        assert_eq!(provider.aliases().len(), 2);

        assert!(
            provider
                .generate_jwks(&[SignatureAlgorithm::Es256, SignatureAlgorithm::Hs256], expiration())
                .is_err()
        );
        assert_eq!(provider.aliases().len(), 3);
    }

    #[test]
    fn test_file_backed_provider_survives_restart() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let config = CryptoProviderConfig::builder()
            .key_store_file(dir.path().join("keys.json"))
            .key_store_secret("changeit")
            .dn_name(DN)
            .build();

        let provider = CryptoProvider::new(&config);
        // A store file that does not exist yet opens as an empty store.
        assert!(provider.has_key_store());
        assert!(provider.aliases().is_empty());
        assert!(!dir.path().join("keys.json").exists());
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap();
        assert!(dir.path().join("keys.json").exists());
        let signature = provider
            .sign(b"abc", jwk.kid.as_deref(), None, SignatureAlgorithm::Es256)
            .unwrap();
        drop(provider);

        let restarted = CryptoProvider::new(&config);
        assert!(restarted.verify_signature(
            b"abc",
            &signature,
            jwk.kid.as_deref(),
            None,
            None,
            SignatureAlgorithm::Es256
        ));

        let wrong_secret = CryptoProviderConfig::builder()
            .key_store_file(dir.path().join("keys.json"))
            .key_store_secret("wrong")
            .dn_name(DN)
            .build();
        let locked_out = CryptoProvider::new(&wrong_secret);
        assert!(!locked_out.has_key_store());
        assert!(locked_out.public_key(jwk.kid.as_deref()).is_none());
    }

    #[test]
    fn test_provider_is_shareable_across_threads() {
        let provider = Arc::new(provider());
        let jwk = provider
            .generate_key(SignatureAlgorithm::Es256, expiration())
            .unwrap();
        let alias = jwk.kid.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let provider = Arc::clone(&provider);
                let alias = alias.clone();
                std::thread::spawn(move || {
                    let input = format!("message {i}");
                    let signature = provider
                        .sign(input.as_bytes(), Some(&alias), None, SignatureAlgorithm::Es256)
                        .unwrap();
                    provider.verify_signature(
                        input.as_bytes(),
                        &signature,
                        Some(&alias),
                        None,
                        None,
                        SignatureAlgorithm::Es256,
                    )
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
