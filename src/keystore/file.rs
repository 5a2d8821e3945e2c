use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret as _, SecretBox, SecretString};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use super::envelope::SealingKey;
use super::{DecodeSnafu, EncodeSnafu, IoSnafu, KeyEntry, KeyStore, KeyStoreError};
use crate::jwk::serde_utils::base64url;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntryRef<'a> {
    #[serde(serialize_with = "base64url::serialize")]
    private_key: &'a [u8],
    certificate_chain: Vec<DerRef<'a>>,
}

#[derive(Serialize)]
struct DerRef<'a>(#[serde(serialize_with = "base64url::serialize")] &'a [u8]);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    #[serde(deserialize_with = "base64url::deserialize")]
    private_key: Vec<u8>,
    certificate_chain: Vec<Der>,
}

#[derive(Deserialize)]
struct Der(#[serde(deserialize_with = "base64url::deserialize")] Vec<u8>);

#[derive(Serialize)]
struct DocumentRef<'a> {
    entries: BTreeMap<&'a str, StoredEntryRef<'a>>,
}

#[derive(Deserialize)]
struct Document {
    entries: BTreeMap<String, StoredEntry>,
}

/// A key store persisted to a single file encrypted under a passphrase.
///
/// Every [`flush`](KeyStore::flush) rewrites the whole file by writing a
/// sibling temporary file and renaming it into place, so the file on disk
/// always holds either the previous or the new set of entries.
pub struct FileKeyStore {
    path: PathBuf,
    sealing_key: SealingKey,
    entries: BTreeMap<String, KeyEntry>,
}

impl fmt::Debug for FileKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileKeyStore")
            .field("path", &self.path)
            .field("aliases", &self.entries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl FileKeyStore {
    /// Opens the store at `path`, decrypting it with `passphrase`.
    ///
    /// A missing file opens as an empty store; the file is created on the
    /// first flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a key store, or
    /// was sealed with a different passphrase.
    pub fn open(path: impl Into<PathBuf>, passphrase: &SecretString) -> Result<Self, KeyStoreError> {
        let path = path.into();

        let sealed = match fs::read(&path) {
            Ok(sealed) => sealed,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "key store file not found, starting empty");
                return Ok(Self {
                    sealing_key: SealingKey::generate(passphrase)?,
                    path,
                    entries: BTreeMap::new(),
                });
            }
            Err(source) => return Err(source).context(IoSnafu { path }),
        };

        let (sealing_key, plaintext) = SealingKey::open(passphrase, &sealed)?;
        let document: Document = serde_json::from_slice(&plaintext).context(DecodeSnafu)?;
        let entries = document
            .entries
            .into_iter()
            .map(|(alias, stored)| {
                let chain = stored
                    .certificate_chain
                    .into_iter()
                    .map(|Der(der)| der)
                    .collect();
                let private_key =
                    SecretBox::new(Zeroizing::new(stored.private_key).as_slice().into());
                (alias, KeyEntry::new(private_key, chain))
            })
            .collect::<BTreeMap<_, _>>();

        tracing::debug!(path = %path.display(), entries = entries.len(), "opened key store");

        Ok(Self {
            path,
            sealing_key,
            entries,
        })
    }

    /// The file backing this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, contents: &[u8]) -> io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)?;
                parent
            }
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(parent)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        file.persist(&self.path)?;
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn entry(&self, alias: &str) -> Option<&KeyEntry> {
        self.entries.get(alias)
    }

    fn set_entry(&mut self, alias: &str, entry: KeyEntry) -> Option<KeyEntry> {
        self.entries.insert(alias.to_owned(), entry)
    }

    fn delete_entry(&mut self, alias: &str) -> Option<KeyEntry> {
        self.entries.remove(alias)
    }

    fn aliases(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn flush(&self) -> Result<(), KeyStoreError> {
        let document = DocumentRef {
            entries: self
                .entries
                .iter()
                .map(|(alias, entry)| {
                    let stored = StoredEntryRef {
                        private_key: entry.private_key().expose_secret(),
                        certificate_chain: entry
                            .certificate_chain()
                            .iter()
                            .map(|der| DerRef(der))
                            .collect(),
                    };
                    (alias.as_str(), stored)
                })
                .collect(),
        };
        let plaintext = Zeroizing::new(serde_json::to_vec(&document).context(EncodeSnafu)?);
        let sealed = self.sealing_key.seal(&plaintext)?;

        self.write_atomically(&sealed).context(IoSnafu {
            path: self.path.clone(),
        })?;
        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "flushed key store"
        );
        Ok(())
    }
}
