//! CSD credential loading: certificates and encrypted private keys.
use chrono::{DateTime, Utc};
use log::debug;
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncryptedPrivateKeyInfo};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use thiserror::Error;
use x509_cert::der::{Decode, DecodePem, Encode};
use x509_cert::Certificate;

/// Certificate loading errors.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate is neither valid DER nor PEM (DER: {der}; PEM: {pem})")]
    Parse { der: String, pem: String },
    #[error("certificate public key is not an RSA key: {0}")]
    NotRsa(String),
    #[error("certificate validity is not representable: {0}")]
    Validity(String),
}

/// Private key loading errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to decrypt private key container (wrong passphrase or corrupt data): {0}")]
    Decryption(String),
    #[error("unsupported private key format: {0}")]
    UnsupportedFormat(String),
}

/// A decoded CSD certificate: RSA public key plus descriptive
/// metadata. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct DigitalCertificate {
    certificate: Certificate,
    public_key: RsaPublicKey,
    serial: String,
    issuer: String,
    subject: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl DigitalCertificate {
    /// Loads a certificate from raw bytes, trying binary DER first and
    /// falling back to PEM.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CertificateError> {
        let certificate = match Certificate::from_der(bytes) {
            Ok(certificate) => {
                debug!("certificate decoded from DER");
                certificate
            }
            Err(der_err) => match Certificate::from_pem(bytes) {
                Ok(certificate) => {
                    debug!("certificate decoded from PEM");
                    certificate
                }
                Err(pem_err) => {
                    return Err(CertificateError::Parse {
                        der: der_err.to_string(),
                        pem: pem_err.to_string(),
                    })
                }
            },
        };
        Self::from_certificate(certificate)
    }

    fn from_certificate(certificate: Certificate) -> Result<Self, CertificateError> {
        let tbs = &certificate.tbs_certificate;
        let spki_der = tbs
            .subject_public_key_info
            .to_der()
            .map_err(|e| CertificateError::NotRsa(e.to_string()))?;
        let public_key = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| CertificateError::NotRsa(e.to_string()))?;
        let serial = serial_decimal(tbs.serial_number.as_bytes());
        let issuer = tbs.issuer.to_string();
        let subject = tbs.subject.to_string();
        let not_before = validity_instant(&tbs.validity.not_before)?;
        let not_after = validity_instant(&tbs.validity.not_after)?;
        Ok(Self {
            certificate,
            public_key,
            serial,
            issuer,
            subject,
            not_before,
            not_after,
        })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Serial number as a decimal string, the form CFDI carries in
    /// `NoCertificado`.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Issuer distinguished name, RFC 4514 form.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Subject distinguished name, RFC 4514 form.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

fn validity_instant(time: &x509_cert::time::Time) -> Result<DateTime<Utc>, CertificateError> {
    let unix = time.to_date_time().unix_duration().as_secs() as i64;
    DateTime::from_timestamp(unix, 0)
        .ok_or_else(|| CertificateError::Validity(format!("timestamp out of range: {unix}")))
}

/// Big-endian serial bytes rendered in base 10.
fn serial_decimal(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0".to_string();
    }

    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            let value = (*digit as u32) * 256 + carry;
            *digit = (value % 10) as u8;
            carry = value / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }

    while digits.len() > 1 && matches!(digits.last(), Some(0)) {
        digits.pop();
    }

    digits.iter().rev().map(|d| (b'0' + *d) as char).collect()
}

/// A decrypted CSD private key. Held only as long as the caller keeps
/// it; the underlying RSA key material is zeroized on drop.
pub struct PrivateKeySecret {
    key: RsaPrivateKey,
}

impl PrivateKeySecret {
    /// Decrypts an encrypted PKCS#8 DER container with the supplied
    /// passphrase. The passphrase is used once and never stored.
    pub fn from_encrypted_der(bytes: &[u8], passphrase: &[u8]) -> Result<Self, KeyError> {
        let container = EncryptedPrivateKeyInfo::try_from(bytes).map_err(|e| {
            KeyError::UnsupportedFormat(format!("not an encrypted PKCS#8 container: {e}"))
        })?;
        let decrypted = container
            .decrypt(passphrase)
            .map_err(|e| KeyError::Decryption(e.to_string()))?;
        let key = RsaPrivateKey::from_pkcs8_der(decrypted.as_bytes()).map_err(|e| {
            KeyError::UnsupportedFormat(format!("decrypted container does not hold an RSA key: {e}"))
        })?;
        debug!("private key container decrypted");
        Ok(Self { key })
    }

    /// The public half, for cross-checking against a certificate.
    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }

    pub(crate) fn key(&self) -> &RsaPrivateKey {
        &self.key
    }
}

// Neither the key material nor anything derived from it belongs in
// logs or debug output.
impl fmt::Debug for PrivateKeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeySecret(..)")
    }
}
