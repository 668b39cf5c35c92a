use crate::compositor::{Compositor, FontId};
use crate::error::{CardstockError, SoftWarning};
use crate::layout::{centered_origin_x, title_case};
use crate::request::GenerationRequest;
use crate::types::{Color, Pt};
use log::warn;

// Certificate geometry, in points with a top-left origin. The template is a
// single landscape A4 page; these offsets line up with its printed artwork.
const PAGE: usize = 0;

const NAME_X: f32 = 140.0;
const NAME_Y: f32 = 262.0;
const NAME_SIZE: f32 = 28.0;

const INSTITUTION_X: f32 = 140.0;
const INSTITUTION_Y: f32 = 298.0;
const INSTITUTION_SIZE: f32 = 15.0;
const INSTITUTION_GRAY: f32 = 0.45;

const DATE_BAND_CENTER_X: f32 = 250.0;
const DATE_Y: f32 = 512.0;
const DATE_SIZE: f32 = 12.0;

const CERT_NO_X: f32 = 648.0;
const CERT_NO_Y: f32 = 512.0;
const CERT_NO_SIZE: f32 = 12.0;

pub(crate) struct CertificateFonts {
    pub(crate) display: FontId,
    pub(crate) regular: FontId,
    pub(crate) semibold: FontId,
}

/// Fixed draw script for the certificate template. Every field is optional
/// and positioned independently; a missing field removes its own glyphs and
/// nothing else. The certificate number is the one field whose absence is
/// routine, so only the other three surface a warning when missing.
pub(crate) fn compose(
    comp: &mut Compositor,
    fonts: &CertificateFonts,
    request: &GenerationRequest,
    warnings: &mut Vec<SoftWarning>,
) -> Result<(), CardstockError> {
    match GenerationRequest::field(&request.full_name) {
        Some(name) => {
            comp.draw_text(
                PAGE,
                &title_case(name),
                Pt::from_f32(NAME_X),
                Pt::from_f32(NAME_Y),
                Pt::from_f32(NAME_SIZE),
                fonts.display,
                Color::BLACK,
            )?;
        }
        None => skip_expected(warnings, "full_name"),
    }

    match GenerationRequest::field(&request.institution) {
        Some(institution) => {
            comp.draw_text(
                PAGE,
                institution,
                Pt::from_f32(INSTITUTION_X),
                Pt::from_f32(INSTITUTION_Y),
                Pt::from_f32(INSTITUTION_SIZE),
                fonts.regular,
                Color::gray(INSTITUTION_GRAY),
            )?;
        }
        None => skip_expected(warnings, "institution"),
    }

    match GenerationRequest::field(&request.date_of_issue) {
        Some(date) => {
            let size = Pt::from_f32(DATE_SIZE);
            let origin_x = centered_origin_x(
                date,
                comp.font(fonts.semibold)?,
                size,
                Pt::from_f32(DATE_BAND_CENTER_X),
            );
            comp.draw_text(
                PAGE,
                date,
                origin_x,
                Pt::from_f32(DATE_Y),
                size,
                fonts.semibold,
                Color::BLACK,
            )?;
        }
        None => skip_expected(warnings, "date_of_issue"),
    }

    // Routinely absent; no fallback text and no warning.
    if let Some(cert_no) = GenerationRequest::field(&request.certificate_no) {
        comp.draw_text(
            PAGE,
            cert_no,
            Pt::from_f32(CERT_NO_X),
            Pt::from_f32(CERT_NO_Y),
            Pt::from_f32(CERT_NO_SIZE),
            fonts.semibold,
            Color::BLACK,
        )?;
    }

    Ok(())
}

fn skip_expected(warnings: &mut Vec<SoftWarning>, field: &'static str) {
    warn!("certificate field '{}' absent, draw skipped", field);
    warnings.push(SoftWarning::FieldAbsent(field));
}
