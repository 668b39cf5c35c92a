use crate::error::{CardstockError, SoftWarning};
use image::RgbaImage;
use tiny_skia::{FillRule, FilterQuality, Mask, PathBuilder, Pixmap, PixmapPaint, Transform};

/// Badge-cut photo silhouette: a `width` x `height` rectangle whose bottom
/// corner region is removed by the straight line from `(0, height)` up to
/// `(width, height - slope)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipSilhouette {
    width: u32,
    height: u32,
    slope: u32,
}

impl ClipSilhouette {
    pub fn new(width: u32, height: u32, slope: u32) -> Result<Self, CardstockError> {
        if width == 0 || height == 0 {
            return Err(CardstockError::Layout(format!(
                "silhouette must have positive area, got {}x{}",
                width, height
            )));
        }
        if slope >= height {
            return Err(CardstockError::Layout(format!(
                "silhouette slope {} would invert the clip polygon (height {})",
                slope, height
            )));
        }
        Ok(Self {
            width,
            height,
            slope,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn slope(&self) -> u32 {
        self.slope
    }
}

/// What the clip pass produced. A photo that cannot be decoded is reported,
/// not raised: the photo is optional and its absence must never abort the
/// rest of the layout.
#[derive(Debug)]
pub enum ClipOutcome {
    Clipped(RgbaImage),
    Skipped(SoftWarning),
}

/// Masks `photo_bytes` to the silhouette at `output_scale` times its nominal
/// size. The source is stretched to exactly fill the target box (aspect ratio
/// is deliberately not preserved; the template defines a fixed box and legacy
/// output stretches into it). The caller embeds the oversampled raster at the
/// nominal box size, so the downscale anti-aliases the cut edge.
pub fn clip_to_silhouette(
    photo_bytes: &[u8],
    silhouette: &ClipSilhouette,
    output_scale: u32,
) -> Result<ClipOutcome, CardstockError> {
    if output_scale == 0 {
        return Err(CardstockError::Layout(
            "clip output scale must be at least 1".to_string(),
        ));
    }
    let out_w = silhouette.width.checked_mul(output_scale).ok_or_else(|| {
        CardstockError::Layout("clip surface width overflows".to_string())
    })?;
    let out_h = silhouette.height.checked_mul(output_scale).ok_or_else(|| {
        CardstockError::Layout("clip surface height overflows".to_string())
    })?;

    let decoded = match image::load_from_memory(photo_bytes) {
        Ok(decoded) => decoded,
        Err(err) => {
            return Ok(ClipOutcome::Skipped(SoftWarning::PhotoUnusable(
                err.to_string(),
            )));
        }
    };
    let source = decoded.to_rgba8();
    let (src_w, src_h) = source.dimensions();
    if src_w == 0 || src_h == 0 {
        return Ok(ClipOutcome::Skipped(SoftWarning::PhotoUnusable(
            "photo has no pixels".to_string(),
        )));
    }

    let mut surface = Pixmap::new(out_w, out_h).ok_or_else(|| {
        CardstockError::Layout(format!("invalid clip surface size {}x{}", out_w, out_h))
    })?;
    let mask = silhouette_mask(silhouette, output_scale, out_w, out_h)?;
    let photo = pixmap_from_rgba(&source).ok_or_else(|| {
        CardstockError::Layout(format!("invalid photo surface size {}x{}", src_w, src_h))
    })?;

    let stretch = Transform::from_row(
        out_w as f32 / src_w as f32,
        0.0,
        0.0,
        out_h as f32 / src_h as f32,
        0.0,
        0.0,
    );
    let mut paint = PixmapPaint::default();
    paint.quality = FilterQuality::Bilinear;
    surface.draw_pixmap(0, 0, photo.as_ref(), &paint, stretch, Some(&mask));

    Ok(ClipOutcome::Clipped(rgba_from_pixmap(&surface)))
}

fn silhouette_mask(
    silhouette: &ClipSilhouette,
    scale: u32,
    out_w: u32,
    out_h: u32,
) -> Result<Mask, CardstockError> {
    let w = (silhouette.width * scale) as f32;
    let h = (silhouette.height * scale) as f32;
    let cut = ((silhouette.height - silhouette.slope) * scale) as f32;

    let mut builder = PathBuilder::new();
    builder.move_to(0.0, 0.0);
    builder.line_to(w, 0.0);
    builder.line_to(w, cut);
    builder.line_to(0.0, h);
    builder.close();
    let path = builder
        .finish()
        .ok_or_else(|| CardstockError::Layout("degenerate silhouette path".to_string()))?;

    let mut mask = Mask::new(out_w, out_h).ok_or_else(|| {
        CardstockError::Layout(format!("invalid mask size {}x{}", out_w, out_h))
    })?;
    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
    Ok(mask)
}

fn pixmap_from_rgba(source: &RgbaImage) -> Option<Pixmap> {
    let (w, h) = source.dimensions();
    let mut pixmap = Pixmap::new(w, h)?;
    for (pixel, out) in source.pixels().zip(pixmap.pixels_mut()) {
        let [r, g, b, a] = pixel.0;
        *out = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

fn rgba_from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut data = Vec::with_capacity((pixmap.width() * pixmap.height() * 4) as usize);
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
        .unwrap_or_else(|| RgbaImage::new(pixmap.width(), pixmap.height()))
}
