mod assets;
mod certificate;
mod clip;
mod compositor;
mod error;
mod font;
mod identity;
mod layout;
mod request;
mod types;

pub use assets::AssetSource;
pub use clip::{ClipOutcome, ClipSilhouette, clip_to_silhouette};
pub use compositor::{Compositor, FontId};
pub use error::{CardstockError, SoftWarning};
pub use font::LoadedFont;
pub use layout::{LayoutResult, centered_origin_x, fit_centered, fit_font_size, title_case};
pub use request::{GeneratedDocument, GenerationMetrics, GenerationRequest};
pub use types::{Color, Pt};

use log::{debug, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Which template recipe to run for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Certificate,
    IdentityCard,
}

impl Variant {
    fn label(&self) -> &'static str {
        match self {
            Variant::Certificate => "certificate",
            Variant::IdentityCard => "identity-card",
        }
    }
}

/// One pre-designed template document, optionally pinned to a SHA-256 digest
/// so a silently swapped asset fails loudly instead of shifting output.
#[derive(Debug, Clone)]
pub struct TemplateRef {
    pub source: AssetSource,
    pub sha256: Option<String>,
}

impl TemplateRef {
    pub fn new(source: AssetSource) -> Self {
        Self {
            source,
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, digest_hex: impl Into<String>) -> Self {
        self.sha256 = Some(digest_hex.into());
        self
    }
}

struct PipelineFonts {
    regular: LoadedFont,
    semibold: LoadedFont,
    display: LoadedFont,
    medium: LoadedFont,
}

/// The generation engine. Holds immutable configuration plus the byte cache;
/// every `generate` call owns its compositor, fonts, and buffers, so the
/// engine is freely shared across worker threads with no further locking.
impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

pub struct Engine {
    certificate_template: TemplateRef,
    identity_template: TemplateRef,
    body_regular: AssetSource,
    body_semibold: AssetSource,
    display: AssetSource,
    medium: AssetSource,
    icon_dir: Option<PathBuf>,
    cache: assets::ByteCache,
}

#[derive(Default)]
pub struct EngineBuilder {
    certificate_template: Option<TemplateRef>,
    identity_template: Option<TemplateRef>,
    body_regular: Option<AssetSource>,
    body_semibold: Option<AssetSource>,
    display: Option<AssetSource>,
    medium: Option<AssetSource>,
    icon_dir: Option<PathBuf>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn certificate_template(mut self, template: TemplateRef) -> Self {
        self.certificate_template = Some(template);
        self
    }

    pub fn identity_template(mut self, template: TemplateRef) -> Self {
        self.identity_template = Some(template);
        self
    }

    pub fn body_regular_font(mut self, source: AssetSource) -> Self {
        self.body_regular = Some(source);
        self
    }

    pub fn body_semibold_font(mut self, source: AssetSource) -> Self {
        self.body_semibold = Some(source);
        self
    }

    pub fn display_font(mut self, source: AssetSource) -> Self {
        self.display = Some(source);
        self
    }

    pub fn medium_font(mut self, source: AssetSource) -> Self {
        self.medium = Some(source);
        self
    }

    /// Directory of pre-rendered blood-group badge icons, one `<key>.png`
    /// per normalized key. Optional: without it every lookup is a soft miss.
    pub fn badge_icon_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.icon_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<Engine, CardstockError> {
        Ok(Engine {
            certificate_template: required(self.certificate_template, "certificate template")?,
            identity_template: required(self.identity_template, "identity template")?,
            body_regular: required(self.body_regular, "body regular font")?,
            body_semibold: required(self.body_semibold, "body semibold font")?,
            display: required(self.display, "display font")?,
            medium: required(self.medium, "medium font")?,
            icon_dir: self.icon_dir,
            cache: assets::ByteCache::default(),
        })
    }
}

fn required<T>(value: Option<T>, what: &str) -> Result<T, CardstockError> {
    value.ok_or_else(|| CardstockError::Config(format!("{} is not configured", what)))
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Runs the whole pipeline for one request: load assets, lay out, draw,
    /// serialize. Synchronous and self-contained; nothing is shared with
    /// concurrent requests except the read-mostly byte cache.
    pub fn generate(
        &self,
        variant: Variant,
        request: &GenerationRequest,
    ) -> Result<GeneratedDocument, CardstockError> {
        let fonts = PipelineFonts {
            regular: LoadedFont::parse(self.cache.load(&self.body_regular)?, "body-regular")?,
            semibold: LoadedFont::parse(self.cache.load(&self.body_semibold)?, "body-semibold")?,
            display: LoadedFont::parse(self.cache.load(&self.display)?, "display")?,
            medium: LoadedFont::parse(self.cache.load(&self.medium)?, "medium")?,
        };
        self.run_pipeline(variant, request, fonts)
    }

    fn run_pipeline(
        &self,
        variant: Variant,
        request: &GenerationRequest,
        fonts: PipelineFonts,
    ) -> Result<GeneratedDocument, CardstockError> {
        let template_ref = match variant {
            Variant::Certificate => &self.certificate_template,
            Variant::IdentityCard => &self.identity_template,
        };
        let template_bytes = self.cache.load(&template_ref.source)?;
        if let Some(pin) = &template_ref.sha256 {
            assets::verify_sha256(&template_bytes, pin)?;
        }

        let mut comp = Compositor::load(&template_bytes)?;
        let mut warnings = Vec::new();
        match variant {
            Variant::Certificate => {
                let handles = certificate::CertificateFonts {
                    display: comp.register_font(fonts.display)?,
                    regular: comp.register_font(fonts.regular)?,
                    semibold: comp.register_font(fonts.semibold)?,
                };
                certificate::compose(&mut comp, &handles, request, &mut warnings)?;
            }
            Variant::IdentityCard => {
                let handles = identity::IdentityFonts {
                    display: comp.register_font(fonts.display)?,
                    medium: comp.register_font(fonts.medium)?,
                    semibold: comp.register_font(fonts.semibold)?,
                };
                let icon = self.resolve_badge_icon(request, &mut warnings);
                identity::compose(&mut comp, &handles, request, icon.as_deref(), &mut warnings)?;
            }
        }

        let pages_written = comp.page_count();
        let draw_ops = comp.draw_call_count();
        let bytes = comp.serialize()?;
        debug!(
            "{} generated: {} pages, {} ops, {} bytes, {} warnings",
            variant.label(),
            pages_written,
            draw_ops,
            bytes.len(),
            warnings.len()
        );
        Ok(GeneratedDocument {
            filename: request::suggested_filename(request, variant.label()),
            metrics: GenerationMetrics {
                pages_written,
                draw_ops,
                output_bytes: bytes.len(),
            },
            bytes,
            warnings,
        })
    }

    fn resolve_badge_icon(
        &self,
        request: &GenerationRequest,
        warnings: &mut Vec<SoftWarning>,
    ) -> Option<Arc<[u8]>> {
        let group = GenerationRequest::field(&request.blood_group)?;
        let key = identity::normalize_blood_group_key(group);
        let Some(dir) = &self.icon_dir else {
            warn!("no badge icon directory configured, skipping icon '{}'", key);
            warnings.push(SoftWarning::IconMissing(key));
            return None;
        };
        let path = dir.join(format!("{}.png", key));
        match self.cache.load(&AssetSource::path(path)) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!("badge icon '{}' unavailable: {}", key, err);
                warnings.push(SoftWarning::IconMissing(key));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::testpdf;
    use base64::Engine as _;
    use lopdf::Document as LoDocument;
    use sha2::{Digest, Sha256};

    fn pdf_data_uri(bytes: &[u8]) -> AssetSource {
        AssetSource::data_uri(format!(
            "data:application/pdf;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ))
    }

    fn unused_font_source() -> AssetSource {
        AssetSource::data_uri("data:font/ttf;base64,")
    }

    fn synthetic_fonts() -> PipelineFonts {
        PipelineFonts {
            regular: LoadedFont::fixed_advance("Regular", 500),
            semibold: LoadedFont::fixed_advance("Semibold", 510),
            display: LoadedFont::fixed_advance("Display", 520),
            medium: LoadedFont::fixed_advance("Medium", 800),
        }
    }

    fn test_engine(icon_dir: Option<PathBuf>) -> Engine {
        let certificate = testpdf::template_pdf(1, 842.0, 595.0);
        let identity = testpdf::template_pdf(2, 243.0, 153.0);
        let mut builder = Engine::builder()
            .certificate_template(TemplateRef::new(pdf_data_uri(&certificate)))
            .identity_template(TemplateRef::new(pdf_data_uri(&identity)))
            .body_regular_font(unused_font_source())
            .body_semibold_font(unused_font_source())
            .display_font(unused_font_source())
            .medium_font(unused_font_source());
        if let Some(dir) = icon_dir {
            builder = builder.badge_icon_dir(dir);
        }
        builder.build().expect("engine")
    }

    fn icon_fixture_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cardstock_icons_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let icon = image::RgbaImage::from_pixel(4, 4, image::Rgba([120, 0, 0, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        icon.write_to(&mut bytes, image::ImageFormat::Png)
            .expect("encode");
        std::fs::write(dir.join("oplus.png"), bytes.into_inner()).expect("write icon");
        dir
    }

    #[test]
    fn builder_reports_the_first_missing_piece() {
        let err = Engine::builder().build().expect_err("must fail");
        assert!(matches!(err, CardstockError::Config(_)));
        assert!(err.to_string().contains("certificate template"));
    }

    #[test]
    fn generation_is_deterministic_end_to_end() {
        let engine = test_engine(Some(icon_fixture_dir()));
        let request = GenerationRequest {
            full_name: "jane doe".to_string(),
            designation: "senior staff nurse".to_string(),
            identifier: "RN-104".to_string(),
            blood_group: "O+".to_string(),
            ..GenerationRequest::default()
        };
        let first = engine
            .run_pipeline(Variant::IdentityCard, &request, synthetic_fonts())
            .expect("first run");
        let second = engine
            .run_pipeline(Variant::IdentityCard, &request, synthetic_fonts())
            .expect("second run");
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.metrics, second.metrics);
    }

    #[test]
    fn known_blood_group_finds_its_icon_and_unknown_is_a_soft_miss() {
        let engine = test_engine(Some(icon_fixture_dir()));

        let with_icon = engine
            .run_pipeline(
                Variant::IdentityCard,
                &GenerationRequest {
                    blood_group: "O+".to_string(),
                    ..GenerationRequest::default()
                },
                synthetic_fonts(),
            )
            .expect("generate");
        assert!(with_icon.warnings.is_empty());

        let missing = engine
            .run_pipeline(
                Variant::IdentityCard,
                &GenerationRequest {
                    blood_group: "AB-".to_string(),
                    ..GenerationRequest::default()
                },
                synthetic_fonts(),
            )
            .expect("generate");
        assert_eq!(
            missing.warnings,
            vec![SoftWarning::IconMissing("abminus".to_string())]
        );

        let unknown = engine
            .run_pipeline(
                Variant::IdentityCard,
                &GenerationRequest {
                    blood_group: "XX".to_string(),
                    ..GenerationRequest::default()
                },
                synthetic_fonts(),
            )
            .expect("generate");
        assert_eq!(
            unknown.warnings,
            vec![SoftWarning::IconMissing("xx".to_string())]
        );
    }

    #[test]
    fn template_sha_pin_rejects_swapped_bytes() {
        let certificate = testpdf::template_pdf(1, 842.0, 595.0);
        let identity = testpdf::template_pdf(2, 243.0, 153.0);
        let wrong_pin = {
            let mut hex = String::new();
            for byte in Sha256::digest(b"some other template") {
                hex.push_str(&format!("{:02x}", byte));
            }
            hex
        };
        let engine = Engine::builder()
            .certificate_template(
                TemplateRef::new(pdf_data_uri(&certificate)).with_sha256(wrong_pin),
            )
            .identity_template(TemplateRef::new(pdf_data_uri(&identity)))
            .body_regular_font(unused_font_source())
            .body_semibold_font(unused_font_source())
            .display_font(unused_font_source())
            .medium_font(unused_font_source())
            .build()
            .expect("engine");
        let err = engine
            .run_pipeline(
                Variant::Certificate,
                &GenerationRequest::default(),
                synthetic_fonts(),
            )
            .expect_err("must fail");
        assert!(err.to_string().contains("sha256 mismatch"));
    }

    #[test]
    fn generated_document_carries_filename_and_metrics() {
        let engine = test_engine(None);
        let request = GenerationRequest {
            full_name: "jane doe".to_string(),
            identifier: "RN-104".to_string(),
            institution: "City Hospital".to_string(),
            date_of_issue: "05-06-2024".to_string(),
            ..GenerationRequest::default()
        };
        let document = engine
            .run_pipeline(Variant::Certificate, &request, synthetic_fonts())
            .expect("generate");
        assert_eq!(document.filename, "RN-104_jane-doe.pdf");
        assert_eq!(document.metrics.pages_written, 1);
        assert_eq!(document.metrics.draw_ops, 3);
        assert_eq!(document.metrics.output_bytes, document.bytes.len());

        let reloaded = LoDocument::load_mem(&document.bytes).expect("reload");
        assert_eq!(reloaded.get_pages().len(), 1);
    }

    #[test]
    fn missing_template_asset_fails_the_whole_request() {
        let engine = Engine::builder()
            .certificate_template(TemplateRef::new(AssetSource::path(
                "/nonexistent/certificate.pdf",
            )))
            .identity_template(TemplateRef::new(AssetSource::path(
                "/nonexistent/identity.pdf",
            )))
            .body_regular_font(unused_font_source())
            .body_semibold_font(unused_font_source())
            .display_font(unused_font_source())
            .medium_font(unused_font_source())
            .build()
            .expect("engine");
        let err = engine
            .run_pipeline(
                Variant::Certificate,
                &GenerationRequest::default(),
                synthetic_fonts(),
            )
            .expect_err("must fail");
        assert!(matches!(err, CardstockError::Asset(_)));
    }
}
