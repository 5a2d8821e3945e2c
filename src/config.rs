//! Provider configuration.

use std::path::{Path, PathBuf};

use bon::Builder;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Deserializer};

/// Settings for a [`CryptoProvider`](crate::CryptoProvider).
///
/// The key store is only opened when all three values are present and
/// non-empty; otherwise the provider runs without one and can only handle
/// `none` and HMAC algorithms.
///
/// Deserializes from the camel-cased keys `keyStoreFile`, `keyStoreSecret`
/// and `dnName`.
#[derive(Debug, Default, Builder, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoProviderConfig {
    /// Location of the key store file.
    #[builder(into)]
    #[serde(default)]
    pub key_store_file: Option<PathBuf>,
    /// Passphrase protecting the key store file.
    #[builder(into)]
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub key_store_secret: Option<SecretString>,
    /// Subject of self-signed certificates, e.g. `CN=Issuer, O=Example`.
    #[builder(into)]
    #[serde(default)]
    pub dn_name: Option<String>,
}

fn deserialize_secret<'de, D: Deserializer<'de>>(de: D) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(de)?.map(SecretString::from))
}

impl CryptoProviderConfig {
    /// The key store settings, if all of them are present and non-empty.
    pub(crate) fn key_store_settings(&self) -> Option<(&Path, &SecretString, &str)> {
        let path = self
            .key_store_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())?;
        let secret = self
            .key_store_secret
            .as_ref()
            .filter(|secret| !secret.expose_secret().is_empty())?;
        let dn_name = self.dn_name.as_deref().filter(|dn| !dn.trim().is_empty())?;
        Some((path, secret, dn_name))
    }
}
