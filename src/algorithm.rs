//! JWS signature algorithm descriptors (RFC 7518 §3.1).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::Snafu;

/// A JWS signature algorithm understood by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// Unsigned ("none").
    None,
    /// HMAC using SHA-256.
    Hs256,
    /// HMAC using SHA-384.
    Hs384,
    /// HMAC using SHA-512.
    Hs512,
    /// RSASSA-PKCS1-v1_5 using SHA-256.
    Rs256,
    /// RSASSA-PKCS1-v1_5 using SHA-384.
    Rs384,
    /// RSASSA-PKCS1-v1_5 using SHA-512.
    Rs512,
    /// ECDSA using P-256 and SHA-256.
    Es256,
    /// ECDSA using P-384 and SHA-384.
    Es384,
    /// ECDSA using P-521 and SHA-512.
    Es512,
}

/// The family of a [`SignatureAlgorithm`], which selects the code path used
/// for key generation, signing and verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithmFamily {
    /// No signature.
    None,
    /// Symmetric MAC keyed with a shared secret.
    Hmac,
    /// RSA key pairs.
    Rsa,
    /// Elliptic curve key pairs.
    Ec,
}

impl SignatureAlgorithmFamily {
    /// The JWK `kty` value for asymmetric families.
    #[must_use]
    pub fn key_type(self) -> Option<&'static str> {
        match self {
            SignatureAlgorithmFamily::Rsa => Some("RSA"),
            SignatureAlgorithmFamily::Ec => Some("EC"),
            SignatureAlgorithmFamily::None | SignatureAlgorithmFamily::Hmac => None,
        }
    }
}

/// Named elliptic curves used by the EC family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EllipticCurve {
    /// NIST P-256 (secp256r1).
    P256,
    /// NIST P-384 (secp384r1).
    P384,
    /// NIST P-521 (secp521r1).
    P521,
}

impl EllipticCurve {
    /// The JWK `crv` name of the curve.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EllipticCurve::P256 => "P-256",
            EllipticCurve::P384 => "P-384",
            EllipticCurve::P521 => "P-521",
        }
    }

    /// Size in bytes of one affine coordinate.
    #[must_use]
    pub fn coordinate_size(self) -> usize {
        match self {
            EllipticCurve::P256 => 32,
            EllipticCurve::P384 => 48,
            EllipticCurve::P521 => 66,
        }
    }
}

impl AsRef<str> for EllipticCurve {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

impl SignatureAlgorithm {
    /// Every algorithm, in declaration order.
    pub const ALL: [SignatureAlgorithm; 10] = [
        SignatureAlgorithm::None,
        SignatureAlgorithm::Hs256,
        SignatureAlgorithm::Hs384,
        SignatureAlgorithm::Hs512,
        SignatureAlgorithm::Rs256,
        SignatureAlgorithm::Rs384,
        SignatureAlgorithm::Rs512,
        SignatureAlgorithm::Es256,
        SignatureAlgorithm::Es384,
        SignatureAlgorithm::Es512,
    ];

    /// The JWA name, as used in the JWS `alg` header and the JWK `alg` member.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::None => "none",
            SignatureAlgorithm::Hs256 => "HS256",
            SignatureAlgorithm::Hs384 => "HS384",
            SignatureAlgorithm::Hs512 => "HS512",
            SignatureAlgorithm::Rs256 => "RS256",
            SignatureAlgorithm::Rs384 => "RS384",
            SignatureAlgorithm::Rs512 => "RS512",
            SignatureAlgorithm::Es256 => "ES256",
            SignatureAlgorithm::Es384 => "ES384",
            SignatureAlgorithm::Es512 => "ES512",
        }
    }

    /// The family this algorithm belongs to.
    #[must_use]
    pub fn family(self) -> SignatureAlgorithmFamily {
        match self {
            SignatureAlgorithm::None => SignatureAlgorithmFamily::None,
            SignatureAlgorithm::Hs256 | SignatureAlgorithm::Hs384 | SignatureAlgorithm::Hs512 => {
                SignatureAlgorithmFamily::Hmac
            }
            SignatureAlgorithm::Rs256 | SignatureAlgorithm::Rs384 | SignatureAlgorithm::Rs512 => {
                SignatureAlgorithmFamily::Rsa
            }
            SignatureAlgorithm::Es256 | SignatureAlgorithm::Es384 | SignatureAlgorithm::Es512 => {
                SignatureAlgorithmFamily::Ec
            }
        }
    }

    /// The primitive name of the underlying signature scheme.
    #[must_use]
    pub fn primitive(self) -> &'static str {
        match self {
            SignatureAlgorithm::None => "none",
            SignatureAlgorithm::Hs256 => "HmacSHA256",
            SignatureAlgorithm::Hs384 => "HmacSHA384",
            SignatureAlgorithm::Hs512 => "HmacSHA512",
            SignatureAlgorithm::Rs256 => "SHA256withRSA",
            SignatureAlgorithm::Rs384 => "SHA384withRSA",
            SignatureAlgorithm::Rs512 => "SHA512withRSA",
            SignatureAlgorithm::Es256 => "SHA256withECDSA",
            SignatureAlgorithm::Es384 => "SHA384withECDSA",
            SignatureAlgorithm::Es512 => "SHA512withECDSA",
        }
    }

    /// The named curve of EC algorithms.
    #[must_use]
    pub fn curve(self) -> Option<EllipticCurve> {
        match self {
            SignatureAlgorithm::Es256 => Some(EllipticCurve::P256),
            SignatureAlgorithm::Es384 => Some(EllipticCurve::P384),
            SignatureAlgorithm::Es512 => Some(EllipticCurve::P521),
            _ => None,
        }
    }
}

impl AsRef<str> for SignatureAlgorithm {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The algorithm name is not one this crate supports.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("Unsupported signature algorithm '{name}'"))]
pub struct UnknownAlgorithmError {
    /// The rejected name.
    pub name: String,
}

impl FromStr for SignatureAlgorithm {
    type Err = UnknownAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignatureAlgorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == s)
            .ok_or_else(|| UnknownAlgorithmError { name: s.to_owned() })
    }
}

impl Serialize for SignatureAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for SignatureAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for algorithm in SignatureAlgorithm::ALL {
            assert_eq!(algorithm.name().parse::<SignatureAlgorithm>(), Ok(algorithm));
        }
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let err = "PS256".parse::<SignatureAlgorithm>().unwrap_err();
        assert_eq!(err.name, "PS256");
        assert!("rs256".parse::<SignatureAlgorithm>().is_err());
    }

    #[test]
    fn test_family_and_curve() {
        assert_eq!(SignatureAlgorithm::None.family(), SignatureAlgorithmFamily::None);
        assert_eq!(SignatureAlgorithm::Hs384.family(), SignatureAlgorithmFamily::Hmac);
        assert_eq!(SignatureAlgorithm::Rs512.family(), SignatureAlgorithmFamily::Rsa);
        assert_eq!(SignatureAlgorithm::Es384.family(), SignatureAlgorithmFamily::Ec);

        assert_eq!(SignatureAlgorithm::Es256.curve(), Some(EllipticCurve::P256));
        assert_eq!(SignatureAlgorithm::Es512.curve(), Some(EllipticCurve::P521));
        assert_eq!(SignatureAlgorithm::Rs256.curve(), None);
        assert_eq!(EllipticCurve::P521.name(), "P-521");
    }

    #[test]
    fn test_serde_uses_jwa_names() {
        let json = serde_json::to_string(&SignatureAlgorithm::Es384).unwrap();
        assert_eq!(json, r#""ES384""#);
        let parsed: SignatureAlgorithm = serde_json::from_str(r#""none""#).unwrap();
        assert_eq!(parsed, SignatureAlgorithm::None);
        assert!(serde_json::from_str::<SignatureAlgorithm>(r#""XS256""#).is_err());
    }
}
