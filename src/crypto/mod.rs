//! Key material, certificates and signature primitives.
//!
//! Only [`PublicKey`] and the error types are public; private keys never
//! leave the key store except while a signature is being computed.

pub mod certificate;
pub mod key;
pub mod signer;

pub use certificate::CertificateError;
pub use key::{KeyError, PublicKey};
pub use signer::SignatureError;
