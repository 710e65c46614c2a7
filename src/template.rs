//! Canonicalization templates and cadena original generation.
//!
//! A [`CanonicalizationTemplate`] is the versioned, declarative rule
//! set that decides which attributes of a document contribute to its
//! canonical string and in what order. The template is the single
//! source of truth: signing and verification both derive the string
//! through [`canonicalize`], so the two sides cannot drift apart.
use crate::constants::{CFDI_VERSION, COMPROBANTE, SELLO_ATTR, VERSION_ATTR};
use crate::document::StructuredDocument;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

type Result<T> = std::result::Result<T, TemplateError>;

/// Errors raised while applying a template to a document.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template targets version '{template}' but document declares '{document}'")]
    VersionMismatch { template: String, document: String },
    #[error("required node '{0}' not found in document")]
    MissingNode(String),
    #[error("required attribute '{attribute}' missing on node '{node}'")]
    MissingAttribute { node: String, attribute: String },
    #[error("invalid template: {0}")]
    Invalid(String),
}

/// One attribute selected by a rule. Optional attributes that are
/// absent contribute nothing, not an empty slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRule {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// Selects attributes from every node matching a root-inclusive path
/// of local names, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRule {
    pub path: Vec<String>,
    pub attributes: Vec<AttributeRule>,
    /// When set, at least one node must match the path.
    #[serde(default)]
    pub required: bool,
}

/// Versioned selection template. The version must match the
/// document's declared schema version attribute, otherwise
/// canonicalization refuses to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalizationTemplate {
    pub version: String,
    #[serde(default = "default_version_attribute")]
    pub version_attribute: String,
    /// The signature-bearing attribute. Never selected, even if a rule
    /// lists it: the canonical string of a signed document must equal
    /// the one computed before signing.
    #[serde(default = "default_signature_attribute")]
    pub signature_attribute: String,
    pub separator: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    pub rules: Vec<SelectionRule>,
}

fn default_version_attribute() -> String {
    VERSION_ATTR.to_string()
}

fn default_signature_attribute() -> String {
    SELLO_ATTR.to_string()
}

impl CanonicalizationTemplate {
    /// Loads a template from its JSON artifact form.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| TemplateError::Invalid(e.to_string()))
    }

    /// Built-in CFDI 4.0 cadena original rules, `||`-framed, covering
    /// the Comprobante, Emisor, Receptor, Concepto and Traslado
    /// attributes of the SAT cadena for the fields this crate handles.
    pub fn cfdi40() -> Self {
        Self {
            version: CFDI_VERSION.to_string(),
            version_attribute: VERSION_ATTR.to_string(),
            signature_attribute: SELLO_ATTR.to_string(),
            separator: "|".to_string(),
            prefix: "||".to_string(),
            suffix: "||".to_string(),
            rules: vec![
                rule(
                    &[COMPROBANTE],
                    true,
                    &[
                        ("Version", true),
                        ("Serie", false),
                        ("Folio", false),
                        ("Fecha", true),
                        ("FormaPago", false),
                        ("NoCertificado", false),
                        ("CondicionesDePago", false),
                        ("SubTotal", true),
                        ("Descuento", false),
                        ("Moneda", true),
                        ("TipoCambio", false),
                        ("Total", true),
                        ("TipoDeComprobante", true),
                        ("Exportacion", false),
                        ("MetodoPago", false),
                        ("LugarExpedicion", true),
                    ],
                ),
                rule(
                    &[COMPROBANTE, "Emisor"],
                    true,
                    &[("Rfc", true), ("Nombre", true), ("RegimenFiscal", true)],
                ),
                rule(
                    &[COMPROBANTE, "Receptor"],
                    true,
                    &[
                        ("Rfc", true),
                        ("Nombre", true),
                        ("DomicilioFiscalReceptor", true),
                        ("ResidenciaFiscal", false),
                        ("NumRegIdTrib", false),
                        ("RegimenFiscalReceptor", true),
                        ("UsoCFDI", true),
                    ],
                ),
                rule(
                    &[COMPROBANTE, "Conceptos", "Concepto"],
                    true,
                    &[
                        ("ClaveProdServ", true),
                        ("NoIdentificacion", false),
                        ("Cantidad", true),
                        ("ClaveUnidad", true),
                        ("Unidad", false),
                        ("Descripcion", true),
                        ("ValorUnitario", true),
                        ("Importe", true),
                        ("Descuento", false),
                        ("ObjetoImp", true),
                    ],
                ),
                rule(
                    &[COMPROBANTE, "Impuestos", "Traslados", "Traslado"],
                    false,
                    &[
                        ("Base", true),
                        ("Impuesto", true),
                        ("TipoFactor", true),
                        ("TasaOCuota", false),
                        ("Importe", false),
                    ],
                ),
                rule(
                    &[COMPROBANTE, "Impuestos"],
                    false,
                    &[("TotalImpuestosTrasladados", false)],
                ),
            ],
        }
    }
}

fn rule(path: &[&str], required: bool, attributes: &[(&str, bool)]) -> SelectionRule {
    SelectionRule {
        path: path.iter().map(|s| s.to_string()).collect(),
        attributes: attributes
            .iter()
            .map(|(name, required)| AttributeRule {
                name: name.to_string(),
                required: *required,
            })
            .collect(),
        required,
    }
}

/// The deterministic string a sello is computed over. Byte-exact:
/// equal template-scoped content always yields an identical value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalString(String);

impl CanonicalString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the canonical string of `document` under `template`.
///
/// Walks the template's rules in order, collecting the selected
/// attribute values of every matching node in document order, and
/// joins them with the template separator inside the template frame.
/// Read-only over the document; attributes outside the template's
/// selection never influence the result.
pub fn canonicalize(
    document: &StructuredDocument,
    template: &CanonicalizationTemplate,
) -> Result<CanonicalString> {
    let declared = document
        .root()
        .attribute(&template.version_attribute)
        .unwrap_or("");
    if declared != template.version {
        return Err(TemplateError::VersionMismatch {
            template: template.version.clone(),
            document: declared.to_string(),
        });
    }

    let mut values: Vec<&str> = Vec::new();
    for rule in &template.rules {
        let matches = document.find_all(&rule.path);
        if matches.is_empty() {
            if rule.required {
                return Err(TemplateError::MissingNode(rule.path.join("/")));
            }
            continue;
        }
        for node in matches {
            for attr in &rule.attributes {
                if attr.name == template.signature_attribute {
                    continue;
                }
                match node.attribute(&attr.name) {
                    Some(value) => values.push(value),
                    None if attr.required => {
                        return Err(TemplateError::MissingAttribute {
                            node: rule.path.join("/"),
                            attribute: attr.name.clone(),
                        });
                    }
                    None => {}
                }
            }
        }
    }

    let cadena = format!(
        "{}{}{}",
        template.prefix,
        values.join(&template.separator),
        template.suffix
    );
    debug!(
        "canonical string: {} selected values, {} bytes",
        values.len(),
        cadena.len()
    );
    Ok(CanonicalString(cadena))
}
