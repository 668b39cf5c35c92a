use crate::error::CardstockError;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

/// Where an immutable binary asset comes from. Sources are resolved at most
/// once per engine; the fetched bytes are cached for the engine's lifetime.
#[derive(Debug, Clone)]
pub enum AssetSource {
    Path(PathBuf),
    /// `data:<mime>;base64,<payload>`, the form template and icon blobs take
    /// when they arrive inline from the hosting application.
    DataUri(String),
}

impl AssetSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        AssetSource::Path(path.into())
    }

    pub fn data_uri(uri: impl Into<String>) -> Self {
        AssetSource::DataUri(uri.into())
    }

    fn cache_key(&self) -> String {
        match self {
            AssetSource::Path(path) => format!("path:{}", path.display()),
            AssetSource::DataUri(uri) => format!("data:{}", uri),
        }
    }

    fn fetch(&self) -> Result<Vec<u8>, CardstockError> {
        match self {
            AssetSource::Path(path) => fs::read(path).map_err(|err| {
                CardstockError::Asset(format!("cannot read {}: {}", path.display(), err))
            }),
            AssetSource::DataUri(uri) => decode_data_uri(uri),
        }
    }
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>, CardstockError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| CardstockError::Asset("data URI must start with 'data:'".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| CardstockError::Asset("data URI has no payload separator".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(CardstockError::Asset(
            "only base64 data URIs are supported".to_string(),
        ));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| CardstockError::Asset(format!("invalid base64 payload: {}", err)))
}

type CacheCell = Arc<OnceLock<Result<Arc<[u8]>, String>>>;

/// Read-mostly byte cache keyed by asset identity. Concurrent misses for one
/// key coalesce into a single fetch: every caller gets the same cell and
/// `get_or_init` admits exactly one writer.
#[derive(Default)]
pub(crate) struct ByteCache {
    cells: Mutex<HashMap<String, CacheCell>>,
}

impl ByteCache {
    pub(crate) fn load(&self, source: &AssetSource) -> Result<Arc<[u8]>, CardstockError> {
        let cell = {
            let mut cells = self
                .cells
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cells.entry(source.cache_key()).or_default().clone()
        };
        let slot = cell.get_or_init(|| {
            source
                .fetch()
                .map(Arc::from)
                .map_err(|err| err.to_string())
        });
        match slot {
            Ok(bytes) => Ok(bytes.clone()),
            Err(message) => Err(CardstockError::Asset(message.clone())),
        }
    }
}

/// Checks template bytes against a pinned SHA-256 hex digest.
pub(crate) fn verify_sha256(bytes: &[u8], expected_hex: &str) -> Result<(), CardstockError> {
    let actual = hex_string(&Sha256::digest(bytes));
    if actual.eq_ignore_ascii_case(expected_hex.trim()) {
        Ok(())
    } else {
        Err(CardstockError::Asset(format!(
            "sha256 mismatch: expected {} found {}",
            expected_hex.trim(),
            actual
        )))
    }
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn data_uri_round_trips() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"badge bytes");
        let source = AssetSource::data_uri(format!("data:image/png;base64,{}", payload));
        let cache = ByteCache::default();
        let bytes = cache.load(&source).expect("decode");
        assert_eq!(bytes.as_ref(), b"badge bytes");
    }

    #[test]
    fn data_uri_without_base64_marker_is_rejected() {
        let source = AssetSource::data_uri("data:text/plain,hello");
        let err = ByteCache::default().load(&source).expect_err("must fail");
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn repeated_loads_share_one_buffer() {
        let dir = std::env::temp_dir().join(format!("cardstock_assets_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("font.bin");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(b"\x00\x01\x00\x00glyf").expect("write");
        drop(file);

        let cache = ByteCache::default();
        let source = AssetSource::path(&path);
        let first = cache.load(&source).expect("first load");
        let second = cache.load(&source).expect("second load");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn missing_file_is_an_asset_error() {
        let cache = ByteCache::default();
        let err = cache
            .load(&AssetSource::path("/nonexistent/cardstock/template.pdf"))
            .expect_err("must fail");
        assert!(matches!(err, CardstockError::Asset(_)));
    }

    #[test]
    fn sha256_pin_accepts_match_and_rejects_mismatch() {
        let bytes = b"template bytes";
        let good = hex_string(&Sha256::digest(bytes));
        verify_sha256(bytes, &good).expect("match");
        verify_sha256(bytes, &good.to_uppercase()).expect("case-insensitive match");
        let err = verify_sha256(bytes, "deadbeef").expect_err("mismatch");
        assert!(err.to_string().contains("sha256 mismatch"));
    }
}
