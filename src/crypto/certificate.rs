//! Self-signed X.509 wrappers for generated key pairs.
//!
//! The certificate only exists so that a public key can be kept beside its
//! private key in the store; nothing validates the chain.

use std::time::SystemTime;

use const_oid::ObjectIdentifier;
use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512, SHA_256_WITH_RSA_ENCRYPTION,
    SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use rsa::signature::{Keypair, Signer};
use snafu::prelude::*;
use time::{Duration, OffsetDateTime};
use x509_cert::builder::{Builder as _, CertificateBuilder, Profile};
use x509_cert::der::asn1::{Any, BitString};
use x509_cert::der::{Decode as _, Document, Encode as _};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{
    AlgorithmIdentifierOwned, DynSignatureAlgorithmIdentifier, EncodePublicKey,
    SignatureBitStringEncoding, SubjectPublicKeyInfoOwned,
};
use x509_cert::time::{Time, Validity};

use crate::algorithm::SignatureAlgorithm;
use crate::crypto::key::{KeyError, PrivateKey, PublicKey};
use crate::crypto::signer;

/// How far `notBefore` is backdated to tolerate clock skew between hosts.
pub const CLOCK_SKEW: Duration = Duration::seconds(10);

/// Errors raised while building or reading a certificate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CertificateError {
    /// No certificate signature scheme exists for this algorithm.
    #[snafu(display("Cannot issue a certificate signed with {algorithm}"))]
    UnsupportedAlgorithm {
        /// The requested algorithm.
        algorithm: SignatureAlgorithm,
    },
    /// The subject name has no attributes.
    #[snafu(display("Distinguished name is empty"))]
    EmptyDistinguishedName,
    /// The subject name is not a valid RFC 4514 string.
    #[snafu(display("Invalid distinguished name '{dn}'"))]
    InvalidDistinguishedName {
        /// The rejected name.
        dn: String,
        /// The underlying error.
        source: x509_cert::der::Error,
    },
    /// The public key could not be handed to the certificate builder.
    #[snafu(display("Failed to encode certificate key"))]
    KeyEncoding {
        /// The underlying error.
        source: KeyError,
    },
    /// A certificate field could not be DER encoded.
    #[snafu(display("Failed to encode certificate"))]
    Encode {
        /// The underlying error.
        source: x509_cert::der::Error,
    },
    /// The certificate builder failed.
    #[snafu(display("Failed to generate certificate"))]
    Generate {
        /// The underlying error.
        source: x509_cert::builder::Error,
    },
    /// The stored certificate is not valid DER.
    #[snafu(display("Failed to parse certificate"))]
    Parse {
        /// The underlying error.
        source: x509_cert::der::Error,
    },
    /// The certificate carries a public key this crate cannot use.
    #[snafu(display("Unusable certificate public key"))]
    PublicKey {
        /// The underlying error.
        source: KeyError,
    },
}

impl crate::Error for CertificateError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// The X.509 signature algorithm used to self-sign a key generated for
/// `algorithm`.
fn signature_algorithm(algorithm: SignatureAlgorithm) -> Option<AlgorithmIdentifierOwned> {
    // RFC 4055 requires explicit NULL parameters for PKCS#1 v1.5; RFC 5758
    // requires them to be absent for ECDSA.
    let (oid, parameters): (ObjectIdentifier, Option<Any>) = match algorithm {
        SignatureAlgorithm::Rs256 => (SHA_256_WITH_RSA_ENCRYPTION, Some(Any::null())),
        SignatureAlgorithm::Rs384 => (SHA_384_WITH_RSA_ENCRYPTION, Some(Any::null())),
        SignatureAlgorithm::Rs512 => (SHA_512_WITH_RSA_ENCRYPTION, Some(Any::null())),
        SignatureAlgorithm::Es256 => (ECDSA_WITH_SHA_256, None),
        SignatureAlgorithm::Es384 => (ECDSA_WITH_SHA_384, None),
        SignatureAlgorithm::Es512 => (ECDSA_WITH_SHA_512, None),
        _ => return None,
    };
    Some(AlgorithmIdentifierOwned { oid, parameters })
}

/// Parses an RFC 4514 subject such as `CN=Issuer, O=Example, C=US`.
///
/// Attribute names come from the `const-oid` database, so `DC`, `UID`,
/// `emailAddress` and `street` are accepted alongside the usual `CN`/`O`/`C`
/// set, case-insensitively. Escaped separators (`\,`) stay in the value.
pub(crate) fn parse_distinguished_name(dn: &str) -> Result<Name, CertificateError> {
    let compact = compact_separators(dn);
    ensure!(!compact.is_empty(), EmptyDistinguishedNameSnafu);
    compact
        .parse::<Name>()
        .context(InvalidDistinguishedNameSnafu { dn })
}

/// Drops unescaped whitespace around `,`, `+` and `=`, which RFC 4514
/// does not allow but most configured names contain.
fn compact_separators(dn: &str) -> String {
    fn trim_end(compact: &mut String, pinned: usize) {
        let keep = compact.trim_end().len().max(pinned);
        compact.truncate(keep);
    }

    let mut compact = String::with_capacity(dn.len());
    // Escaped characters before this offset are never trimmed.
    let mut pinned = 0;
    let mut after_separator = true;
    let mut chars = dn.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                compact.push(c);
                if let Some(escaped) = chars.next() {
                    compact.push(escaped);
                }
                pinned = compact.len();
                after_separator = false;
            }
            ',' | '+' | '=' => {
                trim_end(&mut compact, pinned);
                compact.push(c);
                pinned = compact.len();
                after_separator = true;
            }
            c if c.is_whitespace() && after_separator => {}
            c => {
                compact.push(c);
                after_separator = false;
            }
        }
    }
    trim_end(&mut compact, pinned);
    compact
}

/// Issues a DER certificate for `key`, signed by itself with the scheme
/// matching `algorithm`.
///
/// The serial number is the issuance instant in epoch milliseconds and the
/// validity runs from [`CLOCK_SKEW`] before now until `expiration`.
pub(crate) fn self_signed(
    key: &PrivateKey,
    algorithm: SignatureAlgorithm,
    dn: &str,
    expiration: OffsetDateTime,
) -> Result<Vec<u8>, CertificateError> {
    let signature_algorithm =
        signature_algorithm(algorithm).context(UnsupportedAlgorithmSnafu { algorithm })?;
    let subject = parse_distinguished_name(dn)?;

    let spki = key
        .public_key()
        .to_public_key_der()
        .context(KeyEncodingSnafu)?;
    let signer = SelfSigner {
        key,
        algorithm,
        signature_algorithm,
        subject_public_key: SubjectPublicKey(spki.clone()),
    };

    let now = OffsetDateTime::now_utc();
    let validity = Validity {
        not_before: asn1_time(now - CLOCK_SKEW)?,
        not_after: asn1_time(expiration)?,
    };

    let builder = CertificateBuilder::new(
        Profile::Root,
        serial_number(now)?,
        validity,
        subject,
        SubjectPublicKeyInfoOwned::from_der(&spki).context(EncodeSnafu)?,
        &signer,
    )
    .context(GenerateSnafu)?;
    let certificate = builder
        .build::<CertificateSignature>()
        .context(GenerateSnafu)?;
    certificate.to_der().context(EncodeSnafu)
}

fn serial_number(now: OffsetDateTime) -> Result<SerialNumber, CertificateError> {
    let millis = u64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or_default();
    SerialNumber::new(&millis.to_be_bytes()).context(EncodeSnafu)
}

fn asn1_time(instant: OffsetDateTime) -> Result<Time, CertificateError> {
    Time::try_from(SystemTime::from(instant)).context(EncodeSnafu)
}

/// Adapts a stored key to the certificate builder's signer interface.
struct SelfSigner<'a> {
    key: &'a PrivateKey,
    algorithm: SignatureAlgorithm,
    signature_algorithm: AlgorithmIdentifierOwned,
    subject_public_key: SubjectPublicKey,
}

/// DER `SubjectPublicKeyInfo` of the signing key.
#[derive(Clone)]
struct SubjectPublicKey(Vec<u8>);

impl EncodePublicKey for SubjectPublicKey {
    fn to_public_key_der(&self) -> x509_cert::spki::Result<Document> {
        Ok(Document::try_from(self.0.as_slice())?)
    }
}

impl Keypair for SelfSigner<'_> {
    type VerifyingKey = SubjectPublicKey;

    fn verifying_key(&self) -> SubjectPublicKey {
        self.subject_public_key.clone()
    }
}

impl DynSignatureAlgorithmIdentifier for SelfSigner<'_> {
    fn signature_algorithm_identifier(&self) -> x509_cert::spki::Result<AlgorithmIdentifierOwned> {
        Ok(self.signature_algorithm.clone())
    }
}

impl Signer<CertificateSignature> for SelfSigner<'_> {
    fn try_sign(&self, msg: &[u8]) -> Result<CertificateSignature, rsa::signature::Error> {
        signer::sign_der(self.algorithm, self.key, msg)
            .map(CertificateSignature)
            .map_err(rsa::signature::Error::from_source)
    }
}

/// A certificate signature in its X.509 encoding.
struct CertificateSignature(Vec<u8>);

impl SignatureBitStringEncoding for CertificateSignature {
    fn to_bitstring(&self) -> x509_cert::der::Result<BitString> {
        BitString::from_bytes(&self.0)
    }
}

/// Extracts the subject public key of a DER certificate.
pub(crate) fn public_key(der: &[u8]) -> Result<PublicKey, CertificateError> {
    let certificate = x509_cert::Certificate::from_der(der).context(ParseSnafu)?;
    let spki = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .context(ParseSnafu)?;
    PublicKey::from_public_key_der(&spki).context(PublicKeySnafu)
}
