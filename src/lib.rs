//! Digital sealing for CFDI 4.0 fiscal documents: cadena original
//! (canonical string) generation, CSD signing (RSA-SHA256 /
//! PKCS#1 v1.5), sello embedding and verification.
//!
//! # Examples
//! ```rust,no_run
//! use cfdi_sello::{verify_bytes, CanonicalizationTemplate};
//!
//! let xml = std::fs::read("cfdi_firmado.xml")?;
//! let cert = std::fs::read("csd.cer")?;
//! let result = verify_bytes(&xml, &cert, &CanonicalizationTemplate::cfdi40())?;
//! if !result.valid() {
//!     eprintln!("invalid sello: {:?}", result.reason());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
mod constants;
pub mod credential;
pub mod document;
pub mod sign;
pub mod template;
pub mod verify;

use thiserror::Error;

pub use credential::{CertificateError, DigitalCertificate, KeyError, PrivateKeySecret};
pub use document::{DocumentError, Node, StructuredDocument};
pub use sign::{embed, sign, CfdiSigner, SealedDocument, Sello, SigningError};
pub use template::{
    canonicalize, AttributeRule, CanonicalString, CanonicalizationTemplate, SelectionRule,
    TemplateError,
};
pub use verify::{verify, verify_bytes, VerificationFailure, VerificationResult};

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Signing(#[from] SigningError),
}
