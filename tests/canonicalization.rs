mod common;

use cfdi_sello::{canonicalize, embed, CanonicalizationTemplate, StructuredDocument, TemplateError};

// Full cadena original of the sample document under the built-in
// CFDI 4.0 template, attribute by attribute in template order.
const SAMPLE_CADENA: &str = "||4.0|A|12345|2024-03-09T12:00:00|01|30001000000400002434|Contado|1000.00|MXN|1160.00|I|PUE|64000|AAA010101AX5|EMPRESA EMISORA S.A. DE C.V.|601|BBB020202BX6|CLIENTE EJEMPLO|64000|601|G03|01010101|1|H87|Producto de prueba|1000.00|1000.00|02|1000.00|002|Tasa|0.160000|160.00|160.00||";

#[test]
fn cfdi40_template_produces_expected_cadena() {
    let document = common::sample_document();
    let cadena = canonicalize(&document, &CanonicalizationTemplate::cfdi40()).expect("canonicalize");
    assert_eq!(cadena.as_str(), SAMPLE_CADENA);
    assert_eq!(cadena.into_string(), SAMPLE_CADENA);
}

#[test]
fn canonicalization_is_deterministic() {
    let document = common::sample_document();
    let template = CanonicalizationTemplate::cfdi40();
    let first = canonicalize(&document, &template).expect("first run");
    let second = canonicalize(&document, &template).expect("second run");
    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[test]
fn template_artifact_selects_version_and_total() {
    let document = common::sample_document();
    let template = common::version_total_template();
    let cadena = canonicalize(&document, &template).expect("canonicalize");
    assert_eq!(cadena.as_str(), "4.0|1160.00");
}

#[test]
fn embedded_sello_does_not_change_the_cadena() {
    let document = common::sample_document();
    let template = CanonicalizationTemplate::cfdi40();
    let before = canonicalize(&document, &template).expect("unsigned cadena");

    let signed_bytes = embed(&document, "Zm9vYmFy").expect("embed");
    let signed = StructuredDocument::parse(&signed_bytes).expect("parse signed");
    assert_eq!(signed.root().attribute("Sello"), Some("Zm9vYmFy"));

    let after = canonicalize(&signed, &template).expect("signed cadena");
    assert_eq!(after, before);
}

#[test]
fn out_of_template_attribute_does_not_influence_the_cadena() {
    let mut document = common::sample_document();
    let template = CanonicalizationTemplate::cfdi40();
    let before = canonicalize(&document, &template).expect("before");

    document
        .root_mut()
        .set_attribute("Certificado", "c29tZSBjZXJ0aWZpY2F0ZQ==");
    let after = canonicalize(&document, &template).expect("after");
    assert_eq!(after, before);
}

#[test]
fn schema_version_mismatch_is_refused() {
    let mut document = common::sample_document();
    document.root_mut().set_attribute("Version", "3.3");
    let err = canonicalize(&document, &CanonicalizationTemplate::cfdi40()).unwrap_err();
    assert!(matches!(err, TemplateError::VersionMismatch { .. }));
}

#[test]
fn missing_required_node_is_refused() {
    let xml = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" Version="4.0"/>"#;
    let document = StructuredDocument::parse(xml.as_bytes()).expect("parse");
    let err = canonicalize(&document, &CanonicalizationTemplate::cfdi40()).unwrap_err();
    assert!(matches!(err, TemplateError::MissingAttribute { .. } | TemplateError::MissingNode(_)));
}
