//! Weights cache management for downloaded checkpoints
//!
//! Downloaded model graphs live under `<cache root>/checkpoints/<file name>`.
//! The root is taken from the `CACHE_DIR` environment variable, falling back
//! to the platform cache directory.

use crate::error::{InpaintError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "CACHE_DIR";

const CHECKPOINTS_DIR: &str = "checkpoints";

/// Information about a cached checkpoint file
#[derive(Debug, Clone)]
pub struct CachedWeightsInfo {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Checkpoint cache manager
#[derive(Debug)]
pub struct WeightsCache {
    checkpoint_dir: PathBuf,
}

impl WeightsCache {
    /// Create a cache rooted at `$CACHE_DIR` or the platform cache directory
    ///
    /// # Errors
    /// - Failed to determine the cache directory
    /// - Failed to create the checkpoints directory
    pub fn new() -> Result<Self> {
        Self::with_custom_cache_dir(&Self::cache_root()?)
    }

    /// Create a cache under a custom root directory
    ///
    /// # Errors
    /// - Failed to create the checkpoints directory
    pub fn with_custom_cache_dir(cache_root: &Path) -> Result<Self> {
        let checkpoint_dir = cache_root.join(CHECKPOINTS_DIR);
        if !checkpoint_dir.exists() {
            fs::create_dir_all(&checkpoint_dir).map_err(|e| {
                InpaintError::file_io_error("create checkpoints directory", &checkpoint_dir, &e)
            })?;
        }
        Ok(Self { checkpoint_dir })
    }

    fn cache_root() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                InpaintError::invalid_config(format!(
                    "Failed to determine cache directory. Set the {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join("lama-cleaner"))
    }

    /// File name a URL is cached under
    ///
    /// Uses the last path segment without query or fragment. URLs without a
    /// usable segment fall back to a hash of the URL.
    ///
    /// # Examples
    /// ```
    /// use lama_cleaner::cache::WeightsCache;
    ///
    /// let name = WeightsCache::url_to_file_name(
    ///     "https://huggingface.co/Carve/LaMa-ONNX/resolve/main/lama_fp32.onnx?download=true",
    /// );
    /// assert_eq!(name, "lama_fp32.onnx");
    /// ```
    #[must_use]
    pub fn url_to_file_name(url: &str) -> String {
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        let after_scheme = without_query
            .split_once("://")
            .map_or(without_query, |(_, rest)| rest);
        let segment = after_scheme
            .split_once('/')
            .and_then(|(_, path)| path.rsplit('/').next())
            .filter(|segment| !segment.is_empty());

        if let Some(segment) = segment {
            return segment.to_string();
        }

        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("weights-{}.onnx", digest.get(..16).unwrap_or(&digest))
    }

    /// Path a URL is (or will be) cached at
    #[must_use]
    pub fn checkpoint_path(&self, url: &str) -> PathBuf {
        self.checkpoint_dir.join(Self::url_to_file_name(url))
    }

    /// Whether a non-empty checkpoint exists for the URL
    #[must_use]
    pub fn is_cached(&self, url: &str) -> bool {
        fs::metadata(self.checkpoint_path(url)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    #[must_use]
    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// List cached checkpoint files sorted by name
    ///
    /// # Errors
    /// - Failed to read the checkpoints directory
    pub fn scan_checkpoints(&self) -> Result<Vec<CachedWeightsInfo>> {
        let mut checkpoints = Vec::new();
        if !self.checkpoint_dir.exists() {
            return Ok(checkpoints);
        }

        let entries = fs::read_dir(&self.checkpoint_dir).map_err(|e| {
            InpaintError::file_io_error("read checkpoints directory", &self.checkpoint_dir, &e)
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            // Leftovers of interrupted downloads
            if path.extension().is_some_and(|ext| ext == "part") {
                continue;
            }
            checkpoints.push(CachedWeightsInfo {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                path,
                size_bytes: meta.len(),
            });
        }

        checkpoints.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(checkpoints)
    }

    /// Remove every cached checkpoint, returning the removed file names
    ///
    /// # Errors
    /// - Failed to remove a checkpoint file
    pub fn clear_all(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for info in self.scan_checkpoints()? {
            log::info!("Removing cached checkpoint: {}", info.file_name);
            fs::remove_file(&info.path)
                .map_err(|e| InpaintError::file_io_error("remove checkpoint", &info.path, &e))?;
            removed.push(info.file_name);
        }
        Ok(removed)
    }
}

/// Format a byte count for display
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS.first().unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit).unwrap_or(&"B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_url_to_file_name() {
        assert_eq!(
            WeightsCache::url_to_file_name(
                "https://github.com/Sanster/models/releases/download/add_big_lama/big-lama.pt"
            ),
            "big-lama.pt"
        );
        assert_eq!(
            WeightsCache::url_to_file_name("https://example.com/a/lama.onnx#frag"),
            "lama.onnx"
        );

        let hashed = WeightsCache::url_to_file_name("https://example.com");
        assert!(hashed.starts_with("weights-"));
        assert_eq!(hashed, WeightsCache::url_to_file_name("https://example.com"));
    }

    #[test]
    fn test_checkpoint_layout() {
        let root = TempDir::new().unwrap();
        let cache = WeightsCache::with_custom_cache_dir(root.path()).unwrap();
        assert_eq!(cache.checkpoint_dir(), root.path().join("checkpoints"));
        assert!(cache.checkpoint_dir().is_dir());

        let url = "https://example.com/models/lama.onnx";
        assert_eq!(
            cache.checkpoint_path(url),
            root.path().join("checkpoints").join("lama.onnx")
        );
    }

    #[test]
    fn test_is_cached_requires_non_empty_file() {
        let root = TempDir::new().unwrap();
        let cache = WeightsCache::with_custom_cache_dir(root.path()).unwrap();
        let url = "https://example.com/lama.onnx";

        assert!(!cache.is_cached(url));
        fs::write(cache.checkpoint_path(url), b"").unwrap();
        assert!(!cache.is_cached(url));
        fs::write(cache.checkpoint_path(url), b"graph").unwrap();
        assert!(cache.is_cached(url));
    }

    #[test]
    fn test_scan_and_clear() {
        let root = TempDir::new().unwrap();
        let cache = WeightsCache::with_custom_cache_dir(root.path()).unwrap();
        fs::write(cache.checkpoint_dir().join("b.onnx"), b"12345").unwrap();
        fs::write(cache.checkpoint_dir().join("a.onnx"), b"1").unwrap();
        fs::write(cache.checkpoint_dir().join("c.onnx.part"), b"1").unwrap();
        fs::create_dir(cache.checkpoint_dir().join("nested")).unwrap();

        let checkpoints = cache.scan_checkpoints().unwrap();
        let names: Vec<_> = checkpoints.iter().map(|c| c.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.onnx", "b.onnx"]);
        assert_eq!(checkpoints[1].size_bytes, 5);

        let removed = cache.clear_all().unwrap();
        assert_eq!(removed.len(), 2);
        assert!(cache.scan_checkpoints().unwrap().is_empty());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(200 * 1024 * 1024), "200.0 MB");
    }
}
