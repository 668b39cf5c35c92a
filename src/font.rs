use crate::error::CardstockError;
use crate::types::Pt;
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub(crate) const FIRST_CHAR: u8 = 32;
pub(crate) const LAST_CHAR: u8 = 255;
const TABLE_LEN: usize = (LAST_CHAR - FIRST_CHAR) as usize + 1;

// 1000-unit fallback advance when a face has no usable space glyph.
const FALLBACK_ADVANCE: u16 = 600;

/// The subset of face data the layout engine and the embedded PDF font
/// objects both need: per-codepoint advances scaled to a 1000-unit em plus
/// the descriptor metrics.
#[derive(Debug, Clone)]
pub(crate) struct FaceMetrics {
    pub(crate) widths: Vec<u16>,
    pub(crate) missing_width: u16,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) is_fixed_pitch: bool,
}

impl FaceMetrics {
    fn advance_units(&self, ch: char) -> u16 {
        let code = ch as u32;
        let first = FIRST_CHAR as u32;
        let last = LAST_CHAR as u32;
        if code < first || code > last {
            return self.missing_width;
        }
        let advance = self.widths[(code - first) as usize];
        // Zero means the face had no glyph for this code point.
        if advance == 0 { self.missing_width } else { advance }
    }

    fn text_width_units(&self, text: &str) -> i32 {
        let mut total: i32 = 0;
        for ch in text.chars() {
            total = total.saturating_add(self.advance_units(ch) as i32);
        }
        total
    }

    fn covers(&self, text: &str) -> bool {
        let first = FIRST_CHAR as u32;
        let last = LAST_CHAR as u32;
        text.chars().all(|ch| {
            let code = ch as u32;
            code >= first && code <= last
        })
    }
}

#[derive(Debug)]
struct WidthCache {
    map: HashMap<(i64, String), Pt>,
    order: VecDeque<(i64, String)>,
    max_entries: usize,
}

impl WidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &(i64, String)) -> Option<Pt> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: (i64, String), value: Pt) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            match self.order.pop_front() {
                Some(old) => {
                    self.map.remove(&old);
                }
                None => break,
            }
        }
    }
}

/// A parsed font program. Width queries are pure functions of the advance
/// table and the string; the fit search re-measures the same string at many
/// sizes, so results are memoized behind a bounded FIFO cache.
pub struct LoadedFont {
    name: String,
    data: Arc<[u8]>,
    metrics: FaceMetrics,
    width_cache: Mutex<WidthCache>,
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFont")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl LoadedFont {
    pub fn parse(data: Arc<[u8]>, source_name: &str) -> Result<Self, CardstockError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|_| {
            CardstockError::Asset(format!("invalid font program for {}", source_name))
        })?;
        let name = face_name(&face).unwrap_or_else(|| source_name.to_string());
        let metrics = metrics_from_face(&face);
        drop(face);
        Ok(Self {
            name,
            data,
            metrics,
            width_cache: Mutex::new(WidthCache::new(4096)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn metrics(&self) -> &FaceMetrics {
        &self.metrics
    }

    /// Width of `text` rendered at `size`. Empty text measures zero; glyphs
    /// the face does not cover fall back to the face's missing-glyph advance.
    pub fn text_width(&self, size: Pt, text: &str) -> Pt {
        if text.is_empty() {
            return Pt::ZERO;
        }
        let key = (size.to_milli_i64(), text.to_string());
        if let Ok(cache) = self.width_cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit;
            }
        }
        let units = if self.metrics.covers(text) {
            self.metrics.text_width_units(text)
        } else {
            // Outside the fast table: shape the run so combining marks and
            // non-Latin scripts measure with their real advances.
            shaped_width_units(&self.data, text)
                .unwrap_or_else(|| self.metrics.text_width_units(text))
        };
        let value = size.mul_ratio(units, 1000);
        if let Ok(mut cache) = self.width_cache.lock() {
            cache.insert(key, value);
        }
        value
    }

    #[cfg(test)]
    pub(crate) fn fixed_advance(name: &str, advance: u16) -> Self {
        Self {
            name: name.to_string(),
            data: Arc::from(&[][..]),
            metrics: FaceMetrics {
                widths: vec![advance; TABLE_LEN],
                missing_width: advance,
                ascent: 800,
                descent: -200,
                cap_height: 700,
                italic_angle: 0,
                bbox: (-100, -250, 1000, 950),
                is_fixed_pitch: true,
            },
            width_cache: Mutex::new(WidthCache::new(4096)),
        }
    }
}

fn shaped_width_units(data: &[u8], text: &str) -> Option<i32> {
    let face = HbFace::from_slice(data, 0)?;
    let units_per_em = face.units_per_em().max(1) as i64;
    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return None;
    }
    let mut total: i64 = 0;
    for position in positions {
        total += ((position.x_advance as i64) * 1000 + units_per_em / 2) / units_per_em;
    }
    Some(total.clamp(0, i32::MAX as i64) as i32)
}

fn metrics_from_face(face: &ttf_parser::Face<'_>) -> FaceMetrics {
    let units_per_em = face.units_per_em().max(1);
    let scale = 1000.0 / units_per_em as f32;

    let mut widths = Vec::with_capacity(TABLE_LEN);
    for code in FIRST_CHAR..=LAST_CHAR {
        let advance = char::from_u32(code as u32)
            .and_then(|ch| face.glyph_index(ch))
            .and_then(|gid| face.glyph_hor_advance(gid))
            .unwrap_or(0);
        widths.push(scale_u16(advance, scale));
    }
    let space = widths[(b' ' - FIRST_CHAR) as usize];
    let missing_width = if space > 0 { space } else { FALLBACK_ADVANCE };

    let ascent = scale_i16(face.ascender(), scale);
    let descent = scale_i16(face.descender(), scale);
    let cap_height = face
        .capital_height()
        .map(|value| scale_i16(value, scale))
        .unwrap_or(ascent);
    let italic_angle = face
        .italic_angle()
        .map(|value| value.round() as i16)
        .unwrap_or(0);
    let bbox = face.global_bounding_box();

    FaceMetrics {
        widths,
        missing_width,
        ascent,
        descent,
        cap_height,
        italic_angle,
        bbox: (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        ),
        is_fixed_pitch: face.is_monospaced(),
    }
}

fn face_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;
    for entry in face.names() {
        let Some(value) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME => post = post.or(Some(value)),
            name_id::FULL_NAME => full = full.or(Some(value)),
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => family = family.or(Some(value)),
            _ => {}
        }
    }
    post.or(full).or(family)
}

fn scale_u16(value: u16, scale: f32) -> u16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(0, u16::MAX as i32) as u16
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
