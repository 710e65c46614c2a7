//! Sello generation and embedding.
use crate::constants::{COMPROBANTE, SELLO_ATTR};
use crate::credential::{CertificateError, DigitalCertificate, KeyError, PrivateKeySecret};
use crate::document::{DocumentError, StructuredDocument};
use crate::template::{canonicalize, CanonicalString, CanonicalizationTemplate, TemplateError};
use base64ct::{Base64, Encoding};
use log::debug;
use rsa::pkcs1v15::SigningKey;
use sha2::Sha256;
use signature::{SignatureEncoding, Signer};
use thiserror::Error;

/// Errors on the signing path.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signing primitive rejected input: {0}")]
    Primitive(String),
    #[error("certificate public key does not correspond to the private key")]
    KeyMismatch,
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// A sello: raw RSA signature bytes plus their base64 text form, bound
/// to the exact canonical string they were computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sello {
    bytes: Vec<u8>,
    base64: String,
}

impl Sello {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }
}

/// Signs a canonical string: SHA-256 over its UTF-8 bytes, RSA
/// PKCS#1 v1.5. The scheme is deterministic, so the same key and
/// canonical string always produce the same sello bytes.
pub fn sign(canonical: &CanonicalString, key: &PrivateKeySecret) -> Result<Sello, SigningError> {
    let signing_key = SigningKey::<Sha256>::new(key.key().clone());
    let signature = signing_key
        .try_sign(canonical.as_bytes())
        .map_err(|e| SigningError::Primitive(e.to_string()))?;
    let bytes = signature.to_vec();
    let base64 = Base64::encode_string(&bytes);
    debug!("sello generated, {} signature bytes", bytes.len());
    Ok(Sello { bytes, base64 })
}

/// Writes `sello_b64` into the `Sello` attribute of the signing node
/// (the `Comprobante` root) and serializes the document. The input
/// document is left untouched: on any error no bytes are produced.
pub fn embed(document: &StructuredDocument, sello_b64: &str) -> Result<Vec<u8>, DocumentError> {
    if document.root().local_name() != COMPROBANTE {
        return Err(DocumentError::MissingSigningNode(COMPROBANTE.to_string()));
    }
    let mut sealed = document.clone();
    sealed.root_mut().set_attribute(SELLO_ATTR, sello_b64);
    sealed.to_bytes()
}

/// A sealed document: the signed bytes plus the sello embedded in
/// them.
#[derive(Debug, Clone)]
pub struct SealedDocument {
    bytes: Vec<u8>,
    sello: Sello,
}

impl SealedDocument {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn sello(&self) -> &Sello {
        &self.sello
    }

    pub fn into_parts(self) -> (Vec<u8>, Sello) {
        (self.bytes, self.sello)
    }
}

/// Drives the full sealing pipeline with a loaded CSD credential
/// pair: canonicalize, sign, embed.
///
/// # Examples
/// ```rust,no_run
/// use cfdi_sello::{CanonicalizationTemplate, CfdiSigner, StructuredDocument};
///
/// let cert = std::fs::read("csd.cer")?;
/// let key = std::fs::read("csd.key")?;
/// let passphrase = std::env::var("CSD_PASSPHRASE")?;
/// let signer = CfdiSigner::from_bytes(&cert, &key, passphrase.as_bytes())?;
///
/// let document = StructuredDocument::parse(&std::fs::read("cfdi.xml")?)?;
/// let sealed = signer.seal(&document, &CanonicalizationTemplate::cfdi40())?;
/// std::fs::write("cfdi_firmado.xml", sealed.bytes())?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
// PrivateKeySecret's Debug impl keeps the key material out of the
// derived output.
#[derive(Debug)]
pub struct CfdiSigner {
    certificate: DigitalCertificate,
    key: PrivateKeySecret,
}

impl CfdiSigner {
    /// Pairs a certificate with its private key. A mismatched pair is
    /// rejected here instead of surfacing later as a verification
    /// failure.
    pub fn new(
        certificate: DigitalCertificate,
        key: PrivateKeySecret,
    ) -> Result<Self, SigningError> {
        if key.public_key() != *certificate.public_key() {
            return Err(SigningError::KeyMismatch);
        }
        Ok(Self { certificate, key })
    }

    /// Loads both credential halves from raw bytes: certificate as
    /// DER or PEM, private key as encrypted PKCS#8 DER.
    pub fn from_bytes(
        certificate_bytes: &[u8],
        key_bytes: &[u8],
        passphrase: &[u8],
    ) -> Result<Self, SigningError> {
        let certificate = DigitalCertificate::from_bytes(certificate_bytes)?;
        let key = PrivateKeySecret::from_encrypted_der(key_bytes, passphrase)?;
        Self::new(certificate, key)
    }

    pub fn certificate(&self) -> &DigitalCertificate {
        &self.certificate
    }

    /// Canonicalizes, signs and embeds in one step.
    pub fn seal(
        &self,
        document: &StructuredDocument,
        template: &CanonicalizationTemplate,
    ) -> Result<SealedDocument, SigningError> {
        let canonical = canonicalize(document, template)?;
        let sello = sign(&canonical, &self.key)?;
        let bytes = embed(document, sello.base64())?;
        Ok(SealedDocument { bytes, sello })
    }
}
