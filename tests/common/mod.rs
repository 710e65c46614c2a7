use cfdi_sello::{
    CanonicalizationTemplate, CfdiSigner, DigitalCertificate, PrivateKeySecret, StructuredDocument,
};
use std::path::{Path, PathBuf};

#[allow(dead_code)]
pub const PASSPHRASE: &[u8] = b"12345678a";

pub fn fixture_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

pub fn read_fixture(relative: &str) -> Vec<u8> {
    std::fs::read(fixture_path(relative)).expect("read fixture")
}

#[allow(dead_code)]
pub fn sample_document() -> StructuredDocument {
    StructuredDocument::parse(&read_fixture("documents/cfdi.xml")).expect("parse sample document")
}

#[allow(dead_code)]
pub fn signer_certificate() -> DigitalCertificate {
    DigitalCertificate::from_bytes(&read_fixture("credentials/signer_cert.der"))
        .expect("load signer certificate")
}

#[allow(dead_code)]
pub fn other_certificate() -> DigitalCertificate {
    DigitalCertificate::from_bytes(&read_fixture("credentials/other_cert.der"))
        .expect("load other certificate")
}

#[allow(dead_code)]
pub fn signer_key() -> PrivateKeySecret {
    PrivateKeySecret::from_encrypted_der(
        &read_fixture("credentials/signer_key_encrypted.der"),
        PASSPHRASE,
    )
    .expect("load signer key")
}

#[allow(dead_code)]
pub fn signer() -> CfdiSigner {
    CfdiSigner::new(signer_certificate(), signer_key()).expect("build signer")
}

#[allow(dead_code)]
pub fn version_total_template() -> CanonicalizationTemplate {
    CanonicalizationTemplate::from_json_slice(&read_fixture("templates/version_total.json"))
        .expect("load template")
}
