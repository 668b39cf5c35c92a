use crate::error::CardstockError;
use crate::font::LoadedFont;
use crate::types::Pt;

/// Computed placement for one text field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutResult {
    pub font_size: Pt,
    pub origin_x: Pt,
    pub origin_y: Pt,
}

/// Largest integer font size, descending from `max_size`, whose rendered
/// width fits `max_width`. Font-size granularity is visually discrete and the
/// search space is small, so this is a plain linear walk; if even `min_size`
/// does not fit the text is allowed to overflow rather than fail.
pub fn fit_font_size(
    text: &str,
    font: &LoadedFont,
    max_width: Pt,
    max_size: i32,
    min_size: i32,
) -> Result<Pt, CardstockError> {
    if max_width <= Pt::ZERO {
        return Err(CardstockError::Layout(format!(
            "fit box width must be positive, got {}",
            max_width.to_f32()
        )));
    }
    if min_size < 1 || max_size < min_size {
        return Err(CardstockError::Layout(format!(
            "fit size bounds out of order: max {} min {}",
            max_size, min_size
        )));
    }
    let mut size = max_size;
    while size > min_size && font.text_width(Pt::from_i32(size), text) > max_width {
        size -= 1;
    }
    Ok(Pt::from_i32(size))
}

/// Horizontal origin that centers `text` at `size` on `box_center_x`.
pub fn centered_origin_x(text: &str, font: &LoadedFont, size: Pt, box_center_x: Pt) -> Pt {
    box_center_x - font.text_width(size, text) / 2
}

/// Fit-then-center in one step; what the drivers call for dynamic fields.
pub fn fit_centered(
    text: &str,
    font: &LoadedFont,
    max_width: Pt,
    max_size: i32,
    box_center_x: Pt,
    origin_y: Pt,
) -> Result<LayoutResult, CardstockError> {
    let font_size = fit_font_size(text, font, max_width, max_size, 1)?;
    Ok(LayoutResult {
        font_size,
        origin_x: centered_origin_x(text, font, font_size, box_center_x),
        origin_y,
    })
}

/// Upper-cases the first letter of each whitespace-separated token, leaving
/// the rest of the token untouched.
pub fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_returns_max_size_when_text_fits() {
        let font = LoadedFont::fixed_advance("Test", 500);
        // "abc" at size 18 is 27pt wide, well inside 100pt.
        let size = fit_font_size("abc", &font, Pt::from_f32(100.0), 18, 1).expect("fit");
        assert_eq!(size, Pt::from_i32(18));
    }

    #[test]
    fn fit_steps_down_to_the_largest_size_that_fits() {
        let font = LoadedFont::fixed_advance("Test", 500);
        // 30 glyphs at advance 0.5em: width = 15 * size. Box of 80pt admits
        // size 5 (75pt) but not size 6 (90pt).
        let text = "a".repeat(30);
        let size = fit_font_size(&text, &font, Pt::from_f32(80.0), 8, 1).expect("fit");
        assert_eq!(size, Pt::from_i32(5));
        assert!(font.text_width(size, &text) <= Pt::from_f32(80.0));
        assert!(font.text_width(Pt::from_i32(6), &text) > Pt::from_f32(80.0));
    }

    #[test]
    fn fit_bound_holds_for_every_result_above_the_floor() {
        let font = LoadedFont::fixed_advance("Test", 480);
        for len in 1..40 {
            let text = "x".repeat(len);
            let max_width = Pt::from_f32(60.0);
            let size = fit_font_size(&text, &font, max_width, 20, 1).expect("fit");
            if size > Pt::from_i32(1) {
                assert!(
                    font.text_width(size, &text) <= max_width,
                    "overflow at len {}",
                    len
                );
            }
        }
    }

    #[test]
    fn fit_floors_at_min_size_and_accepts_overflow() {
        let font = LoadedFont::fixed_advance("Test", 1000);
        let text = "w".repeat(200);
        let size = fit_font_size(&text, &font, Pt::from_f32(10.0), 12, 1).expect("fit");
        assert_eq!(size, Pt::from_i32(1));
        assert!(font.text_width(size, &text) > Pt::from_f32(10.0));
    }

    #[test]
    fn zero_width_box_is_rejected() {
        let font = LoadedFont::fixed_advance("Test", 500);
        let err = fit_font_size("abc", &font, Pt::ZERO, 12, 1).expect_err("must fail");
        assert!(matches!(err, CardstockError::Layout(_)));
    }

    #[test]
    fn inverted_size_bounds_are_rejected() {
        let font = LoadedFont::fixed_advance("Test", 500);
        let err = fit_font_size("abc", &font, Pt::from_f32(50.0), 4, 9).expect_err("must fail");
        assert!(matches!(err, CardstockError::Layout(_)));
    }

    #[test]
    fn centered_origin_balances_the_measured_width() {
        let font = LoadedFont::fixed_advance("Test", 500);
        let size = Pt::from_i32(10);
        let center = Pt::from_f32(120.0);
        let origin = centered_origin_x("abcd", &font, size, center);
        let width = font.text_width(size, "abcd");
        // origin + width == center + width/2 exactly, in fixed point.
        assert_eq!(origin + width, center + width / 2);
    }

    #[test]
    fn title_case_capitalizes_each_token() {
        assert_eq!(title_case("jane doe"), "Jane Doe");
        assert_eq!(title_case("senior staff nurse"), "Senior Staff Nurse");
        assert_eq!(title_case("  spaced   out "), "Spaced Out");
        assert_eq!(title_case(""), "");
    }
}
