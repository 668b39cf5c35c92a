use crate::clip::{ClipOutcome, ClipSilhouette, clip_to_silhouette};
use crate::compositor::{Compositor, FontId};
use crate::error::{CardstockError, SoftWarning};
use crate::layout::{fit_centered, title_case};
use crate::request::GenerationRequest;
use crate::types::{Color, Pt};
use log::warn;

// Identity-card geometry, in points with a top-left origin. CR80 card stock;
// the front face is page 0 artwork only, all data lands on the back face.
const DATA_PAGE: usize = 1;

const CARD_WIDTH: f32 = 243.0;

const NAME_Y: f32 = 30.0;
const NAME_BOX_RATIO: f32 = 0.8;
const NAME_MAX_SIZE: i32 = 18;

const DESIGNATION_Y: f32 = 44.0;
const DESIGNATION_BOX_RATIO: f32 = 0.7;
const DESIGNATION_MAX_SIZE: i32 = 8;

// The identifier is deliberately anchored at a fixed offset, not centered;
// the template prints a label to its left.
const IDENTIFIER_X: f32 = 100.0;
const IDENTIFIER_Y: f32 = 58.0;
const IDENTIFIER_SIZE: f32 = 7.0;

const DIVIDER_X: f32 = 96.0;
const DIVIDER_Y: f32 = 66.0;
const DIVIDER_WIDTH: f32 = 52.0;
const DIVIDER_HEIGHT: f32 = 0.8;
const DIVIDER_GRAY: f32 = 0.6;

const ICON_X: f32 = 112.0;
const ICON_Y: f32 = 72.0;
const ICON_SIZE: f32 = 18.0;

const PHOTO_X: f32 = 16.0;
const PHOTO_Y: f32 = 56.0;
const PHOTO_WIDTH: u32 = 72;
const PHOTO_HEIGHT: u32 = 84;
const PHOTO_SLOPE: u32 = 18;
// Oversample factor for the clipped photo raster; the embed box stays at the
// nominal size, so the downscale anti-aliases the cut edge at print quality.
const PHOTO_OVERSAMPLE: u32 = 4;

pub(crate) struct IdentityFonts {
    pub(crate) display: FontId,
    pub(crate) medium: FontId,
    pub(crate) semibold: FontId,
}

/// Icon lookup key for a blood-group value: lower-cased, with the sign
/// spelled out ("O+" -> "oplus", "AB-" -> "abminus").
pub(crate) fn normalize_blood_group_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace('+', "plus")
        .replace('-', "minus")
}

/// Fixed draw script for the identity-card template's data face. A template
/// shipping only the front face gets a blank data face appended by the
/// compositor on the first draw.
pub(crate) fn compose(
    comp: &mut Compositor,
    fonts: &IdentityFonts,
    request: &GenerationRequest,
    icon_bytes: Option<&[u8]>,
    warnings: &mut Vec<SoftWarning>,
) -> Result<(), CardstockError> {
    if let Some(name) = GenerationRequest::field(&request.full_name) {
        let text = name.to_uppercase();
        let layout = fit_centered(
            &text,
            comp.font(fonts.display)?,
            Pt::from_f32(CARD_WIDTH * NAME_BOX_RATIO),
            NAME_MAX_SIZE,
            Pt::from_f32(CARD_WIDTH / 2.0),
            Pt::from_f32(NAME_Y),
        )?;
        comp.draw_text(
            DATA_PAGE,
            &text,
            layout.origin_x,
            layout.origin_y,
            layout.font_size,
            fonts.display,
            Color::BLACK,
        )?;
    }

    if let Some(designation) = GenerationRequest::field(&request.designation) {
        let text = title_case(designation);
        let layout = fit_centered(
            &text,
            comp.font(fonts.medium)?,
            Pt::from_f32(CARD_WIDTH * DESIGNATION_BOX_RATIO),
            DESIGNATION_MAX_SIZE,
            Pt::from_f32(CARD_WIDTH / 2.0),
            Pt::from_f32(DESIGNATION_Y),
        )?;
        comp.draw_text(
            DATA_PAGE,
            &text,
            layout.origin_x,
            layout.origin_y,
            layout.font_size,
            fonts.medium,
            Color::BLACK,
        )?;
    }

    if let Some(identifier) = GenerationRequest::field(&request.identifier) {
        comp.draw_text(
            DATA_PAGE,
            &format!("#{}", identifier),
            Pt::from_f32(IDENTIFIER_X),
            Pt::from_f32(IDENTIFIER_Y),
            Pt::from_f32(IDENTIFIER_SIZE),
            fonts.semibold,
            Color::BLACK,
        )?;
    }

    if GenerationRequest::field(&request.blood_group).is_some() {
        // Divider first, icon on top; the overlap is intentional.
        comp.draw_rect(
            DATA_PAGE,
            Pt::from_f32(DIVIDER_X),
            Pt::from_f32(DIVIDER_Y),
            Pt::from_f32(DIVIDER_WIDTH),
            Pt::from_f32(DIVIDER_HEIGHT),
            Color::gray(DIVIDER_GRAY),
        )?;
        if let Some(bytes) = icon_bytes {
            match image::load_from_memory(bytes) {
                Ok(decoded) => {
                    comp.draw_image(
                        DATA_PAGE,
                        &decoded.to_rgba8(),
                        Pt::from_f32(ICON_X),
                        Pt::from_f32(ICON_Y),
                        Pt::from_f32(ICON_SIZE),
                        Pt::from_f32(ICON_SIZE),
                    )?;
                }
                Err(err) => {
                    warn!("badge icon undecodable: {}", err);
                    warnings.push(SoftWarning::IconUnusable(err.to_string()));
                }
            }
        }
    }

    if let Some(photo) = &request.photo {
        let silhouette = ClipSilhouette::new(PHOTO_WIDTH, PHOTO_HEIGHT, PHOTO_SLOPE)?;
        match clip_to_silhouette(photo, &silhouette, PHOTO_OVERSAMPLE)? {
            ClipOutcome::Clipped(clipped) => {
                comp.draw_image(
                    DATA_PAGE,
                    &clipped,
                    Pt::from_f32(PHOTO_X) + Pt::from_i32(request.photo_dx),
                    Pt::from_f32(PHOTO_Y) + Pt::from_i32(request.photo_dy),
                    Pt::from_i32(PHOTO_WIDTH as i32),
                    Pt::from_i32(PHOTO_HEIGHT as i32),
                )?;
            }
            ClipOutcome::Skipped(warning) => {
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }

    Ok(())
}
