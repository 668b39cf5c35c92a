use crate::error::CardstockError;
use crate::font::{FIRST_CHAR, LAST_CHAR, LoadedFont};
use crate::types::{Color, Pt};
use image::RgbaImage;
use log::debug;
use lopdf::content::{Content, Operation};
use lopdf::{
    Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId,
    Stream as LoStream, StringFormat, dictionary,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

pub(crate) fn pdf_err(err: lopdf::Error) -> CardstockError {
    CardstockError::Pdf(err.to_string())
}

/// Handle for a font registered with one compositor instance. Handles are
/// only meaningful for the compositor that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontId(usize);

struct RegisteredFont {
    font: LoadedFont,
    resource_name: String,
    object_id: ObjectId,
}

/// Owns the in-memory object graph of one output document: the parsed
/// template, the fonts and images embedded into it, and the draw operations
/// pending per page. Fonts must be registered before any draw call; the
/// compositor refuses to draw on a document with no fonts. Serialization
/// consumes the compositor, so no mutation can follow it.
pub struct Compositor {
    doc: LoDocument,
    pages_root: ObjectId,
    page_ids: Vec<ObjectId>,
    page_boxes: Vec<Vec<LoObject>>,
    page_heights: Vec<Pt>,
    fonts: Vec<RegisteredFont>,
    images: Vec<(String, ObjectId)>,
    images_by_hash: BTreeMap<u64, usize>,
    pending: Vec<Vec<Operation>>,
    draw_calls: usize,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor").finish_non_exhaustive()
    }
}

impl Compositor {
    pub fn load(template_bytes: &[u8]) -> Result<Self, CardstockError> {
        let doc = LoDocument::load_mem(template_bytes).map_err(|err| {
            CardstockError::Asset(format!("template is not a readable PDF: {}", err))
        })?;
        if doc.is_encrypted() {
            return Err(CardstockError::Asset(
                "template PDF is encrypted".to_string(),
            ));
        }
        let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        if page_ids.is_empty() {
            return Err(CardstockError::Asset(
                "template PDF has no pages".to_string(),
            ));
        }
        let pages_root = doc
            .catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(LoObject::as_reference)
            .map_err(pdf_err)?;

        let mut page_boxes = Vec::with_capacity(page_ids.len());
        let mut page_heights = Vec::with_capacity(page_ids.len());
        for page_id in &page_ids {
            let page = doc
                .get_object(*page_id)
                .and_then(LoObject::as_dict)
                .map_err(pdf_err)?;
            let media_box = page_box(page, &doc);
            page_heights.push(box_height(&media_box));
            page_boxes.push(media_box);
        }

        let pending = vec![Vec::new(); page_ids.len()];
        Ok(Self {
            doc,
            pages_root,
            page_ids,
            page_boxes,
            page_heights,
            fonts: Vec::new(),
            images: Vec::new(),
            images_by_hash: BTreeMap::new(),
            pending,
            draw_calls: 0,
        })
    }

    /// Embeds the font program into the document and returns a handle for
    /// draw calls. At least one font must be registered before drawing.
    pub fn register_font(&mut self, font: LoadedFont) -> Result<FontId, CardstockError> {
        let metrics = font.metrics().clone();
        let base_name = sanitize_font_name(font.name());

        let file_id = self.doc.add_object(LoStream::new(
            dictionary! { "Length1" => font.data().len() as i64 },
            font.data().to_vec(),
        ));
        let mut flags: i64 = 32;
        if metrics.is_fixed_pitch {
            flags |= 1;
        }
        let descriptor_id = self.doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => LoObject::Name(base_name.clone().into_bytes()),
            "Flags" => flags,
            "FontBBox" => vec![
                LoObject::Integer(metrics.bbox.0 as i64),
                LoObject::Integer(metrics.bbox.1 as i64),
                LoObject::Integer(metrics.bbox.2 as i64),
                LoObject::Integer(metrics.bbox.3 as i64),
            ],
            "ItalicAngle" => metrics.italic_angle as i64,
            "Ascent" => metrics.ascent as i64,
            "Descent" => metrics.descent as i64,
            "CapHeight" => metrics.cap_height as i64,
            "StemV" => 80,
            "MissingWidth" => metrics.missing_width as i64,
            "FontFile2" => file_id,
        });
        let widths: Vec<LoObject> = metrics
            .widths
            .iter()
            .map(|width| LoObject::Integer(*width as i64))
            .collect();
        let font_object_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => LoObject::Name(base_name.into_bytes()),
            "FirstChar" => FIRST_CHAR as i64,
            "LastChar" => LAST_CHAR as i64,
            "Widths" => widths,
            "FontDescriptor" => descriptor_id,
            "Encoding" => "WinAnsiEncoding",
        });

        let index = self.fonts.len();
        let resource_name = format!("CSF{}", index + 1);
        debug!("registered font '{}' as /{}", font.name(), resource_name);
        self.fonts.push(RegisteredFont {
            font,
            resource_name,
            object_id: font_object_id,
        });
        Ok(FontId(index))
    }

    pub fn font(&self, id: FontId) -> Result<&LoadedFont, CardstockError> {
        self.fonts
            .get(id.0)
            .map(|entry| &entry.font)
            .ok_or_else(|| {
                CardstockError::Layout(format!(
                    "font handle {} does not belong to this document",
                    id.0
                ))
            })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn pages_touched(&self) -> usize {
        self.pending.iter().filter(|ops| !ops.is_empty()).count()
    }

    pub fn draw_call_count(&self) -> usize {
        self.draw_calls
    }

    fn ensure_drawable(&self) -> Result<(), CardstockError> {
        if self.fonts.is_empty() {
            return Err(CardstockError::Layout(
                "draw call before any font was registered; \
                 register fonts immediately after loading the template"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// A template may ship with fewer pages than a driver addresses; blank
    /// pages are appended rather than failing, inheriting the last page box.
    fn ensure_page(&mut self, page: usize) -> Result<(), CardstockError> {
        while page >= self.page_ids.len() {
            let media_box = self
                .page_boxes
                .last()
                .cloned()
                .unwrap_or_else(default_media_box);
            let height = box_height(&media_box);
            let content_id = self
                .doc
                .add_object(LoStream::new(dictionary! {}, Vec::new()));
            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_root,
                "MediaBox" => LoObject::Array(media_box.clone()),
                "Resources" => dictionary! {},
                "Contents" => content_id,
            });

            let pages = self
                .doc
                .get_object_mut(self.pages_root)
                .and_then(LoObject::as_dict_mut)
                .map_err(pdf_err)?;
            let count = pages
                .get(b"Count")
                .and_then(LoObject::as_i64)
                .unwrap_or(self.page_ids.len() as i64);
            pages
                .get_mut(b"Kids")
                .and_then(LoObject::as_array_mut)
                .map_err(pdf_err)?
                .push(LoObject::Reference(page_id));
            pages.set("Count", count + 1);

            debug!("appended blank page {} to template", self.page_ids.len());
            self.page_ids.push(page_id);
            self.page_boxes.push(media_box);
            self.page_heights.push(height);
            self.pending.push(Vec::new());
        }
        Ok(())
    }

    /// Draws `text` with its baseline at `y_top` points below the page top.
    /// Empty text is a no-op: absent fields never produce stray glyphs.
    pub fn draw_text(
        &mut self,
        page: usize,
        text: &str,
        x: Pt,
        y_top: Pt,
        size: Pt,
        font: FontId,
        color: Color,
    ) -> Result<(), CardstockError> {
        self.ensure_drawable()?;
        if text.is_empty() {
            return Ok(());
        }
        self.ensure_page(page)?;
        let resource_name = self
            .fonts
            .get(font.0)
            .ok_or_else(|| {
                CardstockError::Layout(format!(
                    "font handle {} does not belong to this document",
                    font.0
                ))
            })?
            .resource_name
            .clone();
        let baseline = self.page_heights[page] - y_top;
        let encoded = encode_winansi(text);

        let ops = &mut self.pending[page];
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![
                LoObject::Name(resource_name.into_bytes()),
                size.to_f32().into(),
            ],
        ));
        ops.push(Operation::new(
            "rg",
            vec![color.r.into(), color.g.into(), color.b.into()],
        ));
        ops.push(Operation::new(
            "Td",
            vec![x.to_f32().into(), baseline.to_f32().into()],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![LoObject::String(encoded, StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
        ops.push(Operation::new("Q", vec![]));
        self.draw_calls += 1;
        Ok(())
    }

    /// Fills a rectangle whose top-left corner sits at `(x, y_top)`.
    pub fn draw_rect(
        &mut self,
        page: usize,
        x: Pt,
        y_top: Pt,
        width: Pt,
        height: Pt,
        color: Color,
    ) -> Result<(), CardstockError> {
        self.ensure_drawable()?;
        self.ensure_page(page)?;
        let bottom = self.page_heights[page] - y_top - height;

        let ops = &mut self.pending[page];
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "rg",
            vec![color.r.into(), color.g.into(), color.b.into()],
        ));
        ops.push(Operation::new(
            "re",
            vec![
                x.to_f32().into(),
                bottom.to_f32().into(),
                width.to_f32().into(),
                height.to_f32().into(),
            ],
        ));
        ops.push(Operation::new("f", vec![]));
        ops.push(Operation::new("Q", vec![]));
        self.draw_calls += 1;
        Ok(())
    }

    /// Embeds `image` (deduplicated by content) and paints it into the box
    /// whose top-left corner sits at `(x, y_top)`.
    pub fn draw_image(
        &mut self,
        page: usize,
        image: &RgbaImage,
        x: Pt,
        y_top: Pt,
        width: Pt,
        height: Pt,
    ) -> Result<(), CardstockError> {
        self.ensure_drawable()?;
        self.ensure_page(page)?;
        let resource_name = self.embed_rgba(image)?;
        let bottom = self.page_heights[page] - y_top - height;

        let ops = &mut self.pending[page];
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                width.to_f32().into(),
                0.into(),
                0.into(),
                height.to_f32().into(),
                x.to_f32().into(),
                bottom.to_f32().into(),
            ],
        ));
        ops.push(Operation::new(
            "Do",
            vec![LoObject::Name(resource_name.into_bytes())],
        ));
        ops.push(Operation::new("Q", vec![]));
        self.draw_calls += 1;
        Ok(())
    }

    fn embed_rgba(&mut self, image: &RgbaImage) -> Result<String, CardstockError> {
        let key = hash_rgba(image);
        if let Some(index) = self.images_by_hash.get(&key) {
            return Ok(self.images[*index].0.clone());
        }

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CardstockError::Layout(
                "cannot embed an image with no pixels".to_string(),
            ));
        }
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        let mut has_alpha = false;
        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            if a != 255 {
                has_alpha = true;
            }
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }

        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        if has_alpha {
            let smask_id = self.doc.add_object(LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha,
            ));
            dict.set("SMask", LoObject::Reference(smask_id));
        }
        let object_id = self.doc.add_object(LoStream::new(dict, rgb));

        let index = self.images.len();
        let resource_name = format!("CSIm{}", index + 1);
        self.images.push((resource_name.clone(), object_id));
        self.images_by_hash.insert(key, index);
        Ok(resource_name)
    }

    /// Flushes pending content and produces the final byte buffer. Consuming
    /// `self` makes post-serialization mutation impossible by construction.
    pub fn serialize(mut self) -> Result<Vec<u8>, CardstockError> {
        for index in 0..self.page_ids.len() {
            if self.pending[index].is_empty() {
                continue;
            }
            let page_id = self.page_ids[index];
            let operations = std::mem::take(&mut self.pending[index]);
            let content = Content { operations }.encode().map_err(pdf_err)?;

            let page_dict = self
                .doc
                .get_object(page_id)
                .and_then(LoObject::as_dict)
                .map_err(pdf_err)?
                .clone();
            let mut resources = page_resources_dict(&page_dict, &self.doc);
            let mut font_dict = sub_dictionary(&resources, b"Font", &self.doc);
            for entry in &self.fonts {
                font_dict.set(
                    entry.resource_name.as_bytes().to_vec(),
                    LoObject::Reference(entry.object_id),
                );
            }
            resources.set("Font", LoObject::Dictionary(font_dict));
            if !self.images.is_empty() {
                let mut xobject_dict = sub_dictionary(&resources, b"XObject", &self.doc);
                for (name, object_id) in &self.images {
                    xobject_dict.set(name.as_bytes().to_vec(), LoObject::Reference(*object_id));
                }
                resources.set("XObject", LoObject::Dictionary(xobject_dict));
            }

            {
                let page_mut = self
                    .doc
                    .get_object_mut(page_id)
                    .and_then(LoObject::as_dict_mut)
                    .map_err(pdf_err)?;
                page_mut.set("Resources", LoObject::Dictionary(resources));
            }
            self.doc
                .add_page_contents(page_id, content)
                .map_err(pdf_err)?;
        }

        self.doc.prune_objects();
        self.doc.renumber_objects();
        self.doc.compress();

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|err| CardstockError::Pdf(err.to_string()))?;
        debug!(
            "serialized document: {} pages, {} draw calls, {} bytes",
            self.page_ids.len(),
            self.draw_calls,
            out.len()
        );
        Ok(out)
    }
}

fn default_media_box() -> Vec<LoObject> {
    vec![0.into(), 0.into(), 612.into(), 792.into()]
}

fn page_box(page: &LoDictionary, doc: &LoDocument) -> Vec<LoObject> {
    for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
        match page.get(key) {
            Ok(LoObject::Array(values)) => return values.clone(),
            Ok(LoObject::Reference(id)) => {
                if let Ok(values) = doc.get_object(*id).and_then(LoObject::as_array) {
                    return values.clone();
                }
            }
            _ => {}
        }
    }
    default_media_box()
}

fn box_height(media_box: &[LoObject]) -> Pt {
    let y0 = media_box.get(1).and_then(object_to_f32).unwrap_or(0.0);
    let y1 = media_box.get(3).and_then(object_to_f32).unwrap_or(792.0);
    Pt::from_f32(y1 - y0)
}

fn object_to_f32(object: &LoObject) -> Option<f32> {
    match object {
        LoObject::Integer(value) => Some(*value as f32),
        LoObject::Real(value) => Some(*value),
        _ => None,
    }
}

fn page_resources_dict(page: &LoDictionary, doc: &LoDocument) -> LoDictionary {
    match page.get(b"Resources") {
        Ok(LoObject::Dictionary(dict)) => dict.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|object| object.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => LoDictionary::new(),
    }
}

fn sub_dictionary(resources: &LoDictionary, key: &[u8], doc: &LoDocument) -> LoDictionary {
    match resources.get(key) {
        Ok(LoObject::Dictionary(dict)) => dict.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|object| object.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => LoDictionary::new(),
    }
}

fn sanitize_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect();
    if cleaned.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        cleaned
    }
}

fn hash_rgba(image: &RgbaImage) -> u64 {
    let mut hasher = DefaultHasher::new();
    image.dimensions().hash(&mut hasher);
    image.as_raw().hash(&mut hasher);
    hasher.finish()
}

/// Maps text to WinAnsi (cp1252) bytes for the literal string operand of Tj.
/// Code points outside the encoding degrade to '?'; measurement still used
/// their real advances, so layout does not shift.
fn encode_winansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => b'?',
        };
        out.push(byte);
    }
    out
}

#[cfg(test)]
pub(crate) mod testpdf {
    use super::*;

    /// Builds a minimal n-page template PDF in memory.
    pub(crate) fn template_pdf(pages: usize, width: f32, height: f32) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<LoObject> = Vec::with_capacity(pages);
        for index in 0..pages {
            let content = format!("BT 72 {} Td ET", 700 - index as i32);
            let content_id = doc.add_object(LoStream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {},
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    LoObject::Real(width),
                    LoObject::Real(height),
                ],
            });
            kids.push(LoObject::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save template");
        out
    }
}
