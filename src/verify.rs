//! Sello verification against a CSD certificate.
use crate::credential::{CertificateError, DigitalCertificate};
use crate::document::{DocumentError, StructuredDocument};
use crate::template::{canonicalize, CanonicalizationTemplate, TemplateError};
use base64ct::{Base64, Encoding};
use log::debug;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use sha2::Sha256;
use signature::Verifier;
use thiserror::Error;

/// Reasons a claimed sello fails verification. None of these abort:
/// an invalid sello is a normal, reportable result.
#[derive(Debug, Error)]
pub enum VerificationFailure {
    #[error("document carries no sello attribute")]
    MissingSignature,
    #[error("sello is not valid base64: {0}")]
    BadEncoding(String),
    #[error("sello does not match the document content and public key")]
    SignatureMismatch,
    #[error(transparent)]
    TemplateMismatch(#[from] TemplateError),
    #[error(transparent)]
    CertificateParse(#[from] CertificateError),
}

/// Terminal outcome of a verification: either valid, or invalid with
/// the specific reason.
#[derive(Debug)]
pub struct VerificationResult {
    valid: bool,
    reason: Option<VerificationFailure>,
}

impl VerificationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub(crate) fn failed(reason: VerificationFailure) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn reason(&self) -> Option<&VerificationFailure> {
        self.reason.as_ref()
    }
}

/// Checks the sello carried by `document` against the certificate's
/// public key.
///
/// The canonical string is recomputed through the same template the
/// signer used; the signature attribute is excluded by the template's
/// rule, so the recomputation reproduces the exact pre-signing
/// string. Pure: neither the document nor the certificate is touched.
pub fn verify(
    document: &StructuredDocument,
    certificate: &DigitalCertificate,
    template: &CanonicalizationTemplate,
) -> VerificationResult {
    let sello_b64 = match document.root().attribute(&template.signature_attribute) {
        Some(value) => value,
        None => return VerificationResult::failed(VerificationFailure::MissingSignature),
    };

    if !base64_shaped(sello_b64) {
        return VerificationResult::failed(VerificationFailure::BadEncoding(
            "unexpected characters in sello".to_string(),
        ));
    }
    let sello = match Base64::decode_vec(sello_b64) {
        Ok(bytes) => bytes,
        Err(e) => {
            return VerificationResult::failed(VerificationFailure::BadEncoding(e.to_string()))
        }
    };

    let canonical = match canonicalize(document, template) {
        Ok(canonical) => canonical,
        Err(e) => return VerificationResult::failed(VerificationFailure::TemplateMismatch(e)),
    };

    let signature = match Signature::try_from(sello.as_slice()) {
        Ok(signature) => signature,
        Err(_) => return VerificationResult::failed(VerificationFailure::SignatureMismatch),
    };
    let verifying_key = VerifyingKey::<Sha256>::new(certificate.public_key().clone());
    match verifying_key.verify(canonical.as_bytes(), &signature) {
        Ok(()) => {
            debug!("sello verified against certificate serial {}", certificate.serial());
            VerificationResult::ok()
        }
        Err(_) => VerificationResult::failed(VerificationFailure::SignatureMismatch),
    }
}

/// Convenience over raw inputs: parses the document and certificate,
/// then runs [`verify`]. A document that cannot be parsed at all is a
/// hard error; an unparseable certificate is reported as a
/// verification reason.
pub fn verify_bytes(
    xml: &[u8],
    certificate_bytes: &[u8],
    template: &CanonicalizationTemplate,
) -> Result<VerificationResult, DocumentError> {
    let document = StructuredDocument::parse(xml)?;
    let certificate = match DigitalCertificate::from_bytes(certificate_bytes) {
        Ok(certificate) => certificate,
        Err(e) => {
            return Ok(VerificationResult::failed(
                VerificationFailure::CertificateParse(e),
            ))
        }
    };
    Ok(verify(&document, &certificate, template))
}

/// Base64 shape check: `A-Za-z0-9+/` with up to two trailing `=`.
fn base64_shaped(value: &str) -> bool {
    let body = value.trim_end_matches('=');
    if value.len() - body.len() > 2 || body.is_empty() {
        return false;
    }
    body.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}
