//! Signing-key provider for token issuers.
//!
//! Generates RSA and EC key pairs into a key store, publishes their public
//! halves as JWKs, and produces and checks JWS signatures for `none`, HMAC,
//! RSA and ECDSA algorithms.

#![forbid(unsafe_code)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod algorithm;
pub mod config;
pub mod crypto;
mod error;
pub mod jwk;
pub mod keystore;
mod provider;
mod uuid;

pub use algorithm::{
    EllipticCurve, SignatureAlgorithm, SignatureAlgorithmFamily, UnknownAlgorithmError,
};
pub use config::CryptoProviderConfig;
pub use error::{CryptoProviderError, Error};
pub use provider::CryptoProvider;

/// Documentation
pub mod _documentation {
    #[doc = include_str!("../README.md")]
    mod readme {}
}

/// Re-export of parts of the `secrecy` crate.
pub mod secrecy {
    pub use ::secrecy::{ExposeSecret, SecretBox, SecretString};
}
