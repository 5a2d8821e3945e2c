//! Asymmetric key material.
//!
//! Private keys live as PKCS#8 documents inside the key store and are only
//! decoded for the duration of a signing call. Public keys are reconstructed
//! from certificates or from JWKs and are opaque to callers apart from their
//! family, curve and encodings.

use const_oid::db::rfc5912::{ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1, SECP_521_R_1};
use p256::elliptic_curve::sec1::{EncodedPoint, ModulusSize, ToEncodedPoint as _};
use p256::elliptic_curve::{Curve, FieldBytesSize};
use rand::rngs::OsRng;
use rsa::BigUint;
use rsa::pkcs8::spki::{AlgorithmIdentifierRef, SubjectPublicKeyInfoRef};
use rsa::pkcs8::{
    DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _, EncodePublicKey as _,
    ObjectIdentifier, PrivateKeyInfo,
};
use rsa::traits::PublicKeyParts as _;
use secrecy::SecretBox;
use snafu::prelude::*;

use crate::algorithm::{EllipticCurve, SignatureAlgorithm, SignatureAlgorithmFamily};
use crate::jwk;

/// RSA modulus size for generated keys.
pub const RSA_KEY_BITS: usize = 2048;

/// Errors raised while generating, encoding or decoding key material.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum KeyError {
    /// The algorithm has no asymmetric key pair.
    #[snafu(display("Algorithm {algorithm} has no asymmetric key pair"))]
    NotAsymmetric {
        /// The rejected algorithm.
        algorithm: SignatureAlgorithm,
    },
    /// RSA key generation failed.
    #[snafu(display("Failed to generate RSA key"))]
    RsaGeneration {
        /// The underlying error.
        source: rsa::Error,
    },
    /// A PKCS#8 private key could not be encoded or decoded.
    #[snafu(display("Invalid PKCS#8 private key"))]
    Pkcs8 {
        /// The underlying error.
        source: rsa::pkcs8::Error,
    },
    /// A SubjectPublicKeyInfo could not be encoded or decoded.
    #[snafu(display("Invalid SubjectPublicKeyInfo"))]
    Spki {
        /// The underlying error.
        source: rsa::pkcs8::spki::Error,
    },
    /// The key uses an algorithm or curve this crate does not handle.
    #[snafu(display("Unsupported key algorithm {oid}"))]
    UnsupportedKeyAlgorithm {
        /// Algorithm or curve identifier found in the key.
        oid: ObjectIdentifier,
    },
    /// A JWK carried RSA parameters that do not form a valid key.
    #[snafu(display("Invalid RSA public key parameters"))]
    InvalidRsaKey {
        /// The underlying error.
        source: rsa::Error,
    },
    /// A JWK carried coordinates that are not a point on the curve.
    #[snafu(display("Invalid {curve:?} public key coordinates"))]
    InvalidEcPoint {
        /// The curve named by the JWK algorithm.
        curve: EllipticCurve,
    },
    /// The JWK key type does not match the family of its `alg`.
    #[snafu(display("JWK key type does not match algorithm {algorithm}"))]
    JwkKeyTypeMismatch {
        /// The algorithm named by the JWK.
        algorithm: SignatureAlgorithm,
    },
}

impl crate::Error for KeyError {
    fn is_retryable(&self) -> bool {
        false
    }
}

enum KeyKind {
    Rsa,
    Ec(EllipticCurve),
}

fn key_kind(algorithm: &AlgorithmIdentifierRef<'_>) -> Result<KeyKind, KeyError> {
    if algorithm.oid == RSA_ENCRYPTION {
        return Ok(KeyKind::Rsa);
    }
    if algorithm.oid != ID_EC_PUBLIC_KEY {
        return UnsupportedKeyAlgorithmSnafu { oid: algorithm.oid }.fail();
    }

    let curve = algorithm.parameters_oid().context(SpkiSnafu)?;
    if curve == SECP_256_R_1 {
        Ok(KeyKind::Ec(EllipticCurve::P256))
    } else if curve == SECP_384_R_1 {
        Ok(KeyKind::Ec(EllipticCurve::P384))
    } else if curve == SECP_521_R_1 {
        Ok(KeyKind::Ec(EllipticCurve::P521))
    } else {
        UnsupportedKeyAlgorithmSnafu { oid: curve }.fail()
    }
}

/// A decoded private key.
pub(crate) enum PrivateKey {
    Rsa(rsa::RsaPrivateKey),
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    P521(p521::SecretKey),
}

impl PrivateKey {
    /// Generates a key pair suitable for `algorithm`.
    pub(crate) fn generate(algorithm: SignatureAlgorithm) -> Result<Self, KeyError> {
        match (algorithm.family(), algorithm.curve()) {
            (SignatureAlgorithmFamily::Rsa, _) => {
                let key =
                    rsa::RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).context(RsaGenerationSnafu)?;
                Ok(Self::Rsa(key))
            }
            (SignatureAlgorithmFamily::Ec, Some(EllipticCurve::P256)) => {
                Ok(Self::P256(p256::SecretKey::random(&mut OsRng)))
            }
            (SignatureAlgorithmFamily::Ec, Some(EllipticCurve::P384)) => {
                Ok(Self::P384(p384::SecretKey::random(&mut OsRng)))
            }
            (SignatureAlgorithmFamily::Ec, Some(EllipticCurve::P521)) => {
                Ok(Self::P521(p521::SecretKey::random(&mut OsRng)))
            }
            _ => NotAsymmetricSnafu { algorithm }.fail(),
        }
    }

    pub(crate) fn from_pkcs8_der(der: &[u8]) -> Result<Self, KeyError> {
        let info = PrivateKeyInfo::try_from(der).context(Pkcs8Snafu)?;
        let key = match key_kind(&info.algorithm)? {
            KeyKind::Rsa => Self::Rsa(rsa::RsaPrivateKey::from_pkcs8_der(der).context(Pkcs8Snafu)?),
            KeyKind::Ec(EllipticCurve::P256) => {
                Self::P256(p256::SecretKey::from_pkcs8_der(der).context(Pkcs8Snafu)?)
            }
            KeyKind::Ec(EllipticCurve::P384) => {
                Self::P384(p384::SecretKey::from_pkcs8_der(der).context(Pkcs8Snafu)?)
            }
            KeyKind::Ec(EllipticCurve::P521) => {
                Self::P521(p521::SecretKey::from_pkcs8_der(der).context(Pkcs8Snafu)?)
            }
        };
        Ok(key)
    }

    pub(crate) fn to_pkcs8_der(&self) -> Result<SecretBox<[u8]>, KeyError> {
        let document = match self {
            Self::Rsa(key) => key.to_pkcs8_der(),
            Self::P256(key) => key.to_pkcs8_der(),
            Self::P384(key) => key.to_pkcs8_der(),
            Self::P521(key) => key.to_pkcs8_der(),
        }
        .context(Pkcs8Snafu)?;
        Ok(SecretBox::new(document.as_bytes().into()))
    }

    pub(crate) fn public_key(&self) -> PublicKey {
        let inner = match self {
            Self::Rsa(key) => PublicKeyInner::Rsa(key.to_public_key()),
            Self::P256(key) => PublicKeyInner::P256(key.public_key()),
            Self::P384(key) => PublicKeyInner::P384(key.public_key()),
            Self::P521(key) => PublicKeyInner::P521(key.public_key()),
        };
        PublicKey { inner }
    }
}

/// A public key resolved from the key store or from a JWK set.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKey {
    pub(crate) inner: PublicKeyInner,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PublicKeyInner {
    Rsa(rsa::RsaPublicKey),
    P256(p256::PublicKey),
    P384(p384::PublicKey),
    P521(p521::PublicKey),
}

impl PublicKey {
    /// The signature family this key can verify for.
    #[must_use]
    pub fn family(&self) -> SignatureAlgorithmFamily {
        match self.inner {
            PublicKeyInner::Rsa(_) => SignatureAlgorithmFamily::Rsa,
            _ => SignatureAlgorithmFamily::Ec,
        }
    }

    /// The named curve of EC keys.
    #[must_use]
    pub fn curve(&self) -> Option<EllipticCurve> {
        match self.inner {
            PublicKeyInner::Rsa(_) => None,
            PublicKeyInner::P256(_) => Some(EllipticCurve::P256),
            PublicKeyInner::P384(_) => Some(EllipticCurve::P384),
            PublicKeyInner::P521(_) => Some(EllipticCurve::P521),
        }
    }

    /// Decodes a DER `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or holds a key type
    /// other than RSA, P-256, P-384 or P-521.
    pub fn from_public_key_der(der: &[u8]) -> Result<Self, KeyError> {
        let spki = SubjectPublicKeyInfoRef::try_from(der).context(SpkiSnafu)?;
        let inner = match key_kind(&spki.algorithm)? {
            KeyKind::Rsa => {
                PublicKeyInner::Rsa(rsa::RsaPublicKey::from_public_key_der(der).context(SpkiSnafu)?)
            }
            KeyKind::Ec(EllipticCurve::P256) => {
                PublicKeyInner::P256(p256::PublicKey::from_public_key_der(der).context(SpkiSnafu)?)
            }
            KeyKind::Ec(EllipticCurve::P384) => {
                PublicKeyInner::P384(p384::PublicKey::from_public_key_der(der).context(SpkiSnafu)?)
            }
            KeyKind::Ec(EllipticCurve::P521) => {
                PublicKeyInner::P521(p521::PublicKey::from_public_key_der(der).context(SpkiSnafu)?)
            }
        };
        Ok(Self { inner })
    }

    /// Encodes the key as a DER `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn to_public_key_der(&self) -> Result<Vec<u8>, KeyError> {
        let document = match &self.inner {
            PublicKeyInner::Rsa(key) => key.to_public_key_der(),
            PublicKeyInner::P256(key) => key.to_public_key_der(),
            PublicKeyInner::P384(key) => key.to_public_key_der(),
            PublicKeyInner::P521(key) => key.to_public_key_der(),
        }
        .context(SpkiSnafu)?;
        Ok(document.as_bytes().to_vec())
    }

    /// The family-specific JWK members (`kty` plus `n`/`e` or `crv`/`x`/`y`).
    #[must_use]
    pub fn to_jwk(&self) -> jwk::PublicKey {
        match &self.inner {
            PublicKeyInner::Rsa(key) => jwk::RsaPublicKey::builder()
                .n(key.n().to_bytes_be())
                .e(key.e().to_bytes_be())
                .build()
                .into(),
            PublicKeyInner::P256(key) => {
                ec_jwk::<p256::NistP256>(EllipticCurve::P256, &key.to_encoded_point(false))
            }
            PublicKeyInner::P384(key) => {
                ec_jwk::<p384::NistP384>(EllipticCurve::P384, &key.to_encoded_point(false))
            }
            PublicKeyInner::P521(key) => {
                ec_jwk::<p521::NistP521>(EllipticCurve::P521, &key.to_encoded_point(false))
            }
        }
    }

    /// Rebuilds a public key from JWK members, using `algorithm` (the JWK's
    /// own `alg`) to select the family and, for EC keys, the curve.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not asymmetric, if the key type
    /// does not match it, or if the numeric members do not form a valid key.
    pub fn from_jwk(algorithm: SignatureAlgorithm, key: &jwk::PublicKey) -> Result<Self, KeyError> {
        let inner = match (algorithm.family(), algorithm.curve(), key) {
            (SignatureAlgorithmFamily::Rsa, _, jwk::PublicKey::Rsa(rsa_key)) => {
                let key = rsa::RsaPublicKey::new(
                    BigUint::from_bytes_be(&rsa_key.n),
                    BigUint::from_bytes_be(&rsa_key.e),
                )
                .context(InvalidRsaKeySnafu)?;
                PublicKeyInner::Rsa(key)
            }
            (SignatureAlgorithmFamily::Ec, Some(curve), jwk::PublicKey::Ec(ec_key)) => {
                let point = sec1_point(curve, &ec_key.x, &ec_key.y)?;
                let invalid = |_| InvalidEcPointSnafu { curve }.build();
                match curve {
                    EllipticCurve::P256 => {
                        PublicKeyInner::P256(p256::PublicKey::from_sec1_bytes(&point).map_err(invalid)?)
                    }
                    EllipticCurve::P384 => {
                        PublicKeyInner::P384(p384::PublicKey::from_sec1_bytes(&point).map_err(invalid)?)
                    }
                    EllipticCurve::P521 => {
                        PublicKeyInner::P521(p521::PublicKey::from_sec1_bytes(&point).map_err(invalid)?)
                    }
                }
            }
            (SignatureAlgorithmFamily::Rsa | SignatureAlgorithmFamily::Ec, _, _) => {
                return JwkKeyTypeMismatchSnafu { algorithm }.fail();
            }
            _ => return NotAsymmetricSnafu { algorithm }.fail(),
        };
        Ok(Self { inner })
    }
}

fn ec_jwk<C: Curve>(curve: EllipticCurve, point: &EncodedPoint<C>) -> jwk::PublicKey
where
    FieldBytesSize<C>: ModulusSize,
{
    jwk::EcPublicKey::builder()
        .crv(curve.name())
        .x(point
            .x()
            .expect("uncompressed point always has x coordinate")
            .to_vec())
        .y(point
            .y()
            .expect("uncompressed point always has y coordinate")
            .to_vec())
        .build()
        .into()
}

/// Builds an uncompressed SEC1 point, left-padding coordinates that were
/// encoded without their leading zero octets.
fn sec1_point(curve: EllipticCurve, x: &[u8], y: &[u8]) -> Result<Vec<u8>, KeyError> {
    let size = curve.coordinate_size();
    ensure!(x.len() <= size && y.len() <= size, InvalidEcPointSnafu { curve });

    let mut point = vec![0u8; 1 + 2 * size];
    point[0] = 0x04;
    point[1 + size - x.len()..=size].copy_from_slice(x);
    point[1 + 2 * size - y.len()..].copy_from_slice(y);
    Ok(point)
}
