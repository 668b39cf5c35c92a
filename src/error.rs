use std::fmt;

#[derive(Debug)]
pub enum CardstockError {
    /// A required asset (template, font) is missing, corrupt, or fails its
    /// integrity pin. The whole request fails.
    Asset(String),
    /// A layout invariant was violated: zero-width fit box, inverted clip
    /// slope, drawing before font registration. Programmer misuse.
    Layout(String),
    /// Structural failure while composing the output document.
    Pdf(String),
    /// Engine misconfiguration detected at build time.
    Config(String),
    Io(std::io::Error),
}

impl fmt::Display for CardstockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardstockError::Asset(message) => write!(f, "asset error: {}", message),
            CardstockError::Layout(message) => write!(f, "layout invariant violated: {}", message),
            CardstockError::Pdf(message) => write!(f, "pdf error: {}", message),
            CardstockError::Config(message) => write!(f, "invalid configuration: {}", message),
            CardstockError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for CardstockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CardstockError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CardstockError {
    fn from(value: std::io::Error) -> Self {
        CardstockError::Io(value)
    }
}

/// A non-fatal defect in an optional asset or field. Warnings are logged and
/// accumulated on the generated document; they never abort generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftWarning {
    PhotoUnusable(String),
    IconMissing(String),
    IconUnusable(String),
    FieldAbsent(&'static str),
}

impl fmt::Display for SoftWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoftWarning::PhotoUnusable(reason) => {
                write!(f, "photo skipped, could not be decoded: {}", reason)
            }
            SoftWarning::IconMissing(key) => {
                write!(f, "no badge icon registered for key '{}'", key)
            }
            SoftWarning::IconUnusable(reason) => {
                write!(f, "badge icon skipped, could not be decoded: {}", reason)
            }
            SoftWarning::FieldAbsent(field) => {
                write!(f, "expected field '{}' is absent, draw skipped", field)
            }
        }
    }
}
