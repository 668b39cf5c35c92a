use crate::error::SoftWarning;

/// External input for one generation request. Every field is optional:
/// empty or whitespace-only strings mean "skip this draw call", never
/// "draw blank text". The two offsets reposition the photo for manual
/// fine-tuning by an operator.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub full_name: String,
    pub designation: String,
    pub identifier: String,
    pub date_of_issue: String,
    pub institution: String,
    pub certificate_no: String,
    pub blood_group: String,
    pub photo: Option<Vec<u8>>,
    pub photo_dx: i32,
    pub photo_dy: i32,
}

impl GenerationRequest {
    pub(crate) fn field(value: &str) -> Option<&str> {
        let trimmed = value.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }
}

/// Counters for the finished document, cheap enough to always collect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationMetrics {
    pub pages_written: usize,
    pub draw_ops: usize,
    pub output_bytes: usize,
}

/// The finished document. Created once per request and owned by the caller
/// thereafter; the engine keeps no reference.
#[derive(Debug)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub warnings: Vec<SoftWarning>,
    pub metrics: GenerationMetrics,
}

/// Display-convenience filename from the identifying fields: whitespace runs
/// collapse to '-', fields join with '_'. Not a contract anyone depends on.
pub(crate) fn suggested_filename(request: &GenerationRequest, variant_label: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for value in [&request.identifier, &request.full_name] {
        if let Some(present) = GenerationRequest::field(value) {
            parts.push(sanitize_filename_part(present));
        }
    }
    if parts.is_empty() {
        parts.push(variant_label.to_string());
    }
    format!("{}.pdf", parts.join("_"))
}

fn sanitize_filename_part(raw: &str) -> String {
    raw.split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.'))
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
