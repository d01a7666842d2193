//! Cheap detection of deployable templates.
//!
//! Only YAML-style file names are considered; JSON templates are relayed as-is.

pub const TEMPLATE_EXTENSIONS: [&str; 3] = [".yaml", ".yml", ".template"];
pub const TEMPLATE_HEADER: &str = "AWSTemplateFormatVersion";

pub fn is_template(file_name: &str, payload: &[u8]) -> bool {
    has_template_extension(file_name) && has_template_header(payload)
}

pub fn has_template_extension(file_name: &str) -> bool {
    TEMPLATE_EXTENSIONS
        .iter()
        .any(|extension| file_name.ends_with(extension))
}

/// Payloads that are not valid UTF-8 are never templates.
pub fn has_template_header(payload: &[u8]) -> bool {
    std::str::from_utf8(payload)
        .map(|text| text.starts_with(TEMPLATE_HEADER))
        .unwrap_or(false)
}
