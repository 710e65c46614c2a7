pub(crate) const COMPROBANTE: &str = "Comprobante";
pub(crate) const SELLO_ATTR: &str = "Sello";
pub(crate) const VERSION_ATTR: &str = "Version";
pub(crate) const CFDI_VERSION: &str = "4.0";
